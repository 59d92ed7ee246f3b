//! Room and participant state.
//!
//! A room is an isolated collaboration session keyed by an external id,
//! owning its participant directory and its stroke log. Rooms are created
//! lazily on first reference and never pre-declared.

use serde::{Deserialize, Serialize};

use crate::history::StrokeLog;
use crate::stroke::now_ms;

/// Default color palette for participants that join without a color.
const PARTICIPANT_PALETTE: [&str; 12] = [
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#96CEB4", "#FFEAA7", "#DDA0DD", "#98D8C8", "#F7DC6F",
    "#BB8FCE", "#85C1E9", "#F8B500", "#00CED1",
];

/// Last reported pointer position of a participant.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CursorPosition {
    pub x: f64,
    pub y: f64,
}

/// One connected user's identity and live presence within a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub color: String,
    /// Defaults to the origin until the first cursor event.
    #[serde(default)]
    pub cursor: CursorPosition,
    pub joined_at: u64,
}

impl Participant {
    /// Build a participant, defaulting name and color deterministically
    /// from the id when the client supplied neither.
    pub fn new(id: &str, name: Option<String>, color: Option<String>) -> Self {
        let name = name.unwrap_or_else(|| default_name(id));
        let color = color.unwrap_or_else(|| default_color(id).to_string());
        Self {
            id: id.to_string(),
            name,
            color,
            cursor: CursorPosition::default(),
            joined_at: now_ms(),
        }
    }
}

/// `User-<prefix>` fallback display name.
fn default_name(id: &str) -> String {
    let prefix: String = id.chars().take(4).collect();
    format!("User-{}", prefix)
}

/// Deterministic palette pick so the same id always lands on the same color.
fn default_color(id: &str) -> &'static str {
    let sum: usize = id.bytes().map(usize::from).sum();
    PARTICIPANT_PALETTE[sum % PARTICIPANT_PALETTE.len()]
}

/// Diagnostic summary of one live room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: String,
    pub participant_count: usize,
    pub stroke_count: usize,
    pub created_at: u64,
}

/// Per-room authoritative state: the participant directory plus the owned
/// stroke log.
///
/// Participants are kept in insertion order; re-joining with an existing id
/// replaces the entry in place rather than duplicating it.
#[derive(Debug)]
pub struct Room {
    pub id: String,
    participants: Vec<Participant>,
    pub log: StrokeLog,
    pub created_at: u64,
}

impl Room {
    pub fn new(id: &str) -> Self {
        log::debug!("creating room {}", id);
        Self {
            id: id.to_string(),
            participants: Vec::new(),
            log: StrokeLog::new(),
            created_at: now_ms(),
        }
    }

    /// Insert or overwrite a participant entry.
    pub fn join(&mut self, participant: Participant) -> &Participant {
        if let Some(idx) = self
            .participants
            .iter()
            .position(|p| p.id == participant.id)
        {
            self.participants[idx] = participant;
            &self.participants[idx]
        } else {
            self.participants.push(participant);
            self.participants.last().unwrap()
        }
    }

    /// Remove a participant. Returns whether an entry was removed.
    pub fn leave(&mut self, participant_id: &str) -> bool {
        let before = self.participants.len();
        self.participants.retain(|p| p.id != participant_id);
        self.participants.len() != before
    }

    pub fn participant(&self, participant_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == participant_id)
    }

    /// Update a participant's cursor. No-op for unknown ids.
    pub fn update_cursor(&mut self, participant_id: &str, x: f64, y: f64) -> Option<&Participant> {
        let participant = self
            .participants
            .iter_mut()
            .find(|p| p.id == participant_id)?;
        participant.cursor = CursorPosition { x, y };
        Some(participant)
    }

    /// All participants in insertion order.
    pub fn users(&self) -> &[Participant] {
        &self.participants
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.id.clone(),
            participant_count: self.participants.len(),
            stroke_count: self.log.len(),
            created_at: self.created_at,
        }
    }
}
