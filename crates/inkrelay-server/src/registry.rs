//! Room registry and fan-out channels.
//!
//! The registry owns every live room: its participant directory, its stroke
//! log, and the broadcast channel its bound connections listen on. Rooms are
//! created lazily on first reference; a room that drops to zero participants
//! is deleted after a grace period, and only if it is still empty when the
//! timer fires.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use inkrelay_core::{
    Participant, RelayError, Room, RoomSummary, ServerMessage, Stroke, StrokeDraft,
};

/// How long an empty room survives before deletion.
pub const ROOM_GRACE: Duration = Duration::from_secs(60);

const CHANNEL_CAPACITY: usize = 256;

/// Identity of one live connection, distinct from the participant id it
/// binds to.
pub type ConnectionId = Uuid;

/// Fan-out target of a broadcast message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Every connection in the room except the originator. The default for
    /// drawing, stroke, cursor, and presence events.
    Others,
    /// Every connection in the room, the originator included. Only undo and
    /// clear use this: the originator must reconcile its optimistic local
    /// state against the authoritative history.
    All,
}

/// A message traveling through a room's broadcast channel.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub from: ConnectionId,
    pub scope: Scope,
    pub msg: ServerMessage,
}

impl Envelope {
    pub fn new(from: ConnectionId, scope: Scope, msg: ServerMessage) -> Self {
        Self { from, scope, msg }
    }

    /// Receiver-side filter deciding whether this envelope reaches the
    /// given connection.
    pub fn should_deliver(&self, connection: ConnectionId) -> bool {
        match self.scope {
            Scope::All => true,
            Scope::Others => self.from != connection,
        }
    }
}

/// One live room plus its broadcast channel.
struct RoomHandle {
    room: Room,
    tx: broadcast::Sender<Envelope>,
}

impl RoomHandle {
    fn new(room_id: &str) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            room: Room::new(room_id),
            tx,
        }
    }
}

/// Everything a joining connection needs: its subscription, the stored
/// participant record, and the full room snapshot.
pub struct JoinState {
    pub rx: broadcast::Receiver<Envelope>,
    pub user: Participant,
    pub history: Vec<Stroke>,
    pub users: Vec<Participant>,
}

/// Registry of all live rooms.
///
/// All room mutations go through `&self` methods holding the room's map
/// entry, so operations on one room never interleave. The grace timer only
/// re-checks emptiness and deletes; it never touches a log.
pub struct Registry {
    rooms: DashMap<String, RoomHandle>,
    grace: Duration,
}

impl Registry {
    pub fn new() -> Self {
        Self::with_grace(ROOM_GRACE)
    }

    pub fn with_grace(grace: Duration) -> Self {
        Self {
            rooms: DashMap::new(),
            grace,
        }
    }

    /// Resolve a room, creating it on first reference. Referencing an
    /// unknown id never fails at this layer.
    fn get_or_create(&self, room_id: &str) -> dashmap::mapref::one::RefMut<'_, String, RoomHandle> {
        self.rooms
            .entry(room_id.to_string())
            .or_insert_with(|| RoomHandle::new(room_id))
    }

    /// Insert or overwrite a participant and subscribe to the room,
    /// creating the room on first reference.
    pub fn join(&self, room_id: &str, participant: Participant) -> JoinState {
        let mut handle = self.get_or_create(room_id);
        let user = handle.room.join(participant).clone();
        let rx = handle.tx.subscribe();
        let history = handle.room.log.snapshot();
        let users = handle.room.users().to_vec();
        info!("user {} joined room {}", user.id, room_id);
        JoinState {
            rx,
            user,
            history,
            users,
        }
    }

    /// Remove a participant. When the room empties, schedule a
    /// delete-if-still-empty after the grace period; a rejoin during the
    /// window simply makes the timer a no-op.
    pub fn leave(self: &Arc<Self>, room_id: &str, user_id: &str) -> bool {
        let Some(mut handle) = self.rooms.get_mut(room_id) else {
            return false;
        };
        let removed = handle.room.leave(user_id);
        let now_empty = handle.room.is_empty();
        drop(handle);

        if removed {
            info!("user {} left room {}", user_id, room_id);
        }
        if now_empty {
            let registry = Arc::clone(self);
            let room_id = room_id.to_string();
            let grace = self.grace;
            tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                registry.delete_if_empty(&room_id);
            });
        }
        removed
    }

    /// Remove room state unconditionally.
    pub fn delete(&self, room_id: &str) {
        if self.rooms.remove(room_id).is_some() {
            info!("deleted room {}", room_id);
        }
    }

    fn delete_if_empty(&self, room_id: &str) {
        let still_empty = self
            .rooms
            .get(room_id)
            .map(|h| h.room.is_empty())
            .unwrap_or(false);
        if still_empty {
            self.delete(room_id);
        } else {
            debug!("grace timer fired for room {} but it refilled", room_id);
        }
    }

    /// Append a finished stroke, overriding the declared author with the
    /// connection's bound participant id. Returns the stored record. The
    /// room is created if it does not exist, like every mutation path.
    pub fn append_stroke(&self, room_id: &str, draft: StrokeDraft, author_id: &str) -> Stroke {
        let mut handle = self.get_or_create(room_id);
        handle.room.log.append(draft, author_id).clone()
    }

    /// Undo the author's most recent surviving stroke and return the full
    /// resulting history.
    pub fn undo(&self, room_id: &str, author_id: &str) -> Vec<Stroke> {
        match self.rooms.get_mut(room_id) {
            Some(mut handle) => {
                handle.room.log.remove_last_by_author(author_id);
                handle.room.log.snapshot()
            }
            None => Vec::new(),
        }
    }

    /// Discard the room's whole history and return the (empty) result.
    pub fn clear(&self, room_id: &str) -> Vec<Stroke> {
        if let Some(mut handle) = self.rooms.get_mut(room_id) {
            handle.room.log.clear();
        }
        Vec::new()
    }

    /// Update a participant's cursor, returning the updated record.
    pub fn update_cursor(
        &self,
        room_id: &str,
        user_id: &str,
        x: f64,
        y: f64,
    ) -> Option<Participant> {
        let mut handle = self.rooms.get_mut(room_id)?;
        handle.room.update_cursor(user_id, x, y).cloned()
    }

    /// Send an envelope to every subscriber of a room. Delivery filtering
    /// happens receiver-side via [`Envelope::should_deliver`].
    pub fn broadcast(&self, room_id: &str, envelope: Envelope) {
        if let Some(handle) = self.rooms.get(room_id) {
            // Send only fails when the room has no subscribers.
            let _ = handle.tx.send(envelope);
        }
    }

    /// Read-only summaries of every live room.
    pub fn summaries(&self) -> Vec<RoomSummary> {
        self.rooms.iter().map(|h| h.room.summary()).collect()
    }

    /// Diagnostic lookup; the one place an unknown room is an error.
    pub fn diagnostics(&self, room_id: &str) -> Result<RoomSummary, RelayError> {
        self.rooms
            .get(room_id)
            .map(|h| h.room.summary())
            .ok_or_else(|| RelayError::RoomNotFound(room_id.to_string()))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
