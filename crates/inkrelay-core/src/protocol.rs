//! Wire protocol for the room-sync relay.
//!
//! Messages are JSON, tagged by a `type` field:
//! ```json
//! { "type": "join_room", "roomId": "r1", "userId": "u1" }
//! { "type": "stroke_complete", "stroke": { "points": [...], "color": "#000", "width": 3.0 } }
//! { "type": "cursor_move", "x": 10.0, "y": 20.0 }
//! ```

use kurbo::Point;
use serde::{Deserialize, Serialize};

use crate::room::Participant;
use crate::stroke::{Stroke, StrokeDraft};

/// Line style of a transient drawing segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentStyle {
    pub color: String,
    pub width: f64,
}

/// A transient in-progress line segment, broadcast for low-latency feedback
/// and never stored; the finished stroke supersedes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub start: Point,
    pub end: Point,
    pub style: SegmentStyle,
}

/// Messages received from clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Bind this connection to a room as the given participant.
    JoinRoom {
        room_id: String,
        user_id: String,
        #[serde(default)]
        user_name: Option<String>,
        #[serde(default)]
        user_color: Option<String>,
    },
    /// Transient in-progress segment; relayed, never logged.
    DrawingStep {
        #[serde(flatten)]
        segment: Segment,
    },
    /// A finished stroke to append to the room log.
    StrokeComplete { stroke: StrokeDraft },
    /// Pointer moved.
    CursorMove { x: f64, y: f64 },
    /// Remove the sender's most recent surviving stroke.
    UndoRequest,
    /// Discard the whole room history.
    ClearRequest,
}

/// Messages sent to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Full snapshot, sent to the joining connection only.
    RoomState {
        history: Vec<Stroke>,
        users: Vec<Participant>,
    },
    /// Presence notice to the rest of the room.
    UserJoined { user: Participant },
    /// Relayed transient segment, tagged with its sender.
    RemoteDraw {
        user_id: String,
        #[serde(flatten)]
        segment: Segment,
    },
    /// A stroke was appended to the log.
    StrokeAdded { stroke: Stroke },
    /// Presence relay of a cursor move.
    CursorUpdate {
        user_id: String,
        x: f64,
        y: f64,
        name: String,
        color: String,
    },
    /// Authoritative post-undo/post-clear history, sent to the whole room
    /// including the originator.
    HistoryUpdate { history: Vec<Stroke> },
    /// A participant left the room.
    UserLeft { user_id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_room_deserialize() {
        let json = r#"{"type":"join_room","roomId":"r1","userId":"u1","userName":"Ada"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::JoinRoom {
                room_id,
                user_id,
                user_name,
                user_color,
            } => {
                assert_eq!(room_id, "r1");
                assert_eq!(user_id, "u1");
                assert_eq!(user_name.as_deref(), Some("Ada"));
                assert!(user_color.is_none());
            }
            _ => panic!("wrong message type"),
        }
    }

    #[test]
    fn test_drawing_step_flattens_segment() {
        let json = r##"{
            "type": "drawing_step",
            "start": {"x": 0.0, "y": 1.0},
            "end": {"x": 2.0, "y": 3.0},
            "style": {"color": "#000000", "width": 3.0}
        }"##;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::DrawingStep { segment } => {
                assert_eq!(segment.start.y, 1.0);
                assert_eq!(segment.end.x, 2.0);
                assert_eq!(segment.style.width, 3.0);
            }
            _ => panic!("wrong message type"),
        }
    }

    #[test]
    fn test_stroke_complete_accepts_minimal_payload() {
        // Malformed-by-presentation-standards strokes are accepted as-is.
        let json = r#"{"type":"stroke_complete","stroke":{}}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::StrokeComplete { stroke } => {
                assert!(stroke.points.is_empty());
                assert!(stroke.id.is_none());
            }
            _ => panic!("wrong message type"),
        }
    }

    #[test]
    fn test_undo_and_clear_have_no_payload() {
        let undo: ClientMessage = serde_json::from_str(r#"{"type":"undo_request"}"#).unwrap();
        assert!(matches!(undo, ClientMessage::UndoRequest));
        let clear: ClientMessage = serde_json::from_str(r#"{"type":"clear_request"}"#).unwrap();
        assert!(matches!(clear, ClientMessage::ClearRequest));
    }

    #[test]
    fn test_cursor_update_serialize() {
        let msg = ServerMessage::CursorUpdate {
            user_id: "u1".to_string(),
            x: 5.0,
            y: 6.0,
            name: "Ada".to_string(),
            color: "#FF6B6B".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"cursor_update\""));
        assert!(json.contains("\"userId\":\"u1\""));
    }

    #[test]
    fn test_history_update_roundtrip() {
        let msg = ServerMessage::HistoryUpdate { history: vec![] };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"history\":[]"));
        let back: ServerMessage = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, ServerMessage::HistoryUpdate { history } if history.is_empty()));
    }

    #[test]
    fn test_unknown_type_fails_parse() {
        let result = serde_json::from_str::<ClientMessage>(r#"{"type":"teleport"}"#);
        assert!(result.is_err());
    }
}
