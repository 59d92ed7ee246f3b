//! Error types.

use thiserror::Error;

/// Errors surfaced by the relay.
///
/// Mutation paths never fail: unknown rooms are created on reference and
/// malformed payloads degrade to no-ops. Not-found only exists at the
/// read-only diagnostic query.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("room not found: {0}")]
    RoomNotFound(String),
}
