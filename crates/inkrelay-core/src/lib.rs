//! inkrelay Core Library
//!
//! Platform-agnostic data structures and logic for the inkrelay collaborative
//! canvas server: the stroke model, the per-room append-only stroke log, room
//! and participant state, and the wire protocol types.

pub mod error;
pub mod history;
pub mod protocol;
pub mod room;
pub mod stroke;

pub use error::RelayError;
pub use history::StrokeLog;
pub use protocol::{ClientMessage, Segment, SegmentStyle, ServerMessage};
pub use room::{CursorPosition, Participant, Room, RoomSummary};
pub use stroke::{Stroke, StrokeDraft, Tool, now_ms};
