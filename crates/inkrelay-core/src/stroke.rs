//! Stroke model.
//!
//! A stroke is one completed freehand drawing action: an ordered series of
//! points plus its brush style. Strokes are immutable once appended to a
//! room's log; undo and clear remove whole records, never edit them.

use kurbo::Point;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Drawing tool that produced a stroke.
///
/// Erasing is modeled as a stroke in the background color, not a distinct
/// log operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    #[default]
    Pencil,
    Eraser,
}

/// A completed stroke as stored in the room log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stroke {
    /// Unique id, server-assigned when the client did not supply one.
    pub id: String,
    /// Participant that drew the stroke. Always the connection's bound
    /// identity; the client-declared author is never trusted.
    pub author_id: String,
    /// Path points in canvas coordinates.
    pub points: Vec<Point>,
    /// Brush color (CSS color string, passed through as-is).
    pub color: String,
    /// Brush width in pixels.
    pub width: f64,
    #[serde(default)]
    pub tool: Tool,
    /// Creation time in epoch milliseconds. Display only; log order is
    /// authoritative.
    pub timestamp: u64,
}

/// A stroke as received from a client, before the server fills in the
/// missing fields.
///
/// The payload is intentionally permissive: no point-count or color
/// validation happens here, and the declared `author_id` is discarded on
/// append.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrokeDraft {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub author_id: Option<String>,
    #[serde(default)]
    pub points: Vec<Point>,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub tool: Tool,
    #[serde(default)]
    pub timestamp: Option<u64>,
}

impl Stroke {
    /// Materialize a draft into a stored record: assign a uuid when the id
    /// is missing, stamp the current time when the timestamp is missing,
    /// and override the author with the bound participant id.
    pub fn from_draft(draft: StrokeDraft, author_id: &str) -> Self {
        Self {
            id: draft.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            author_id: author_id.to_string(),
            points: draft.points,
            color: draft.color,
            width: draft.width,
            tool: draft.tool,
            timestamp: draft.timestamp.unwrap_or_else(now_ms),
        }
    }
}

/// Current time in epoch milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
