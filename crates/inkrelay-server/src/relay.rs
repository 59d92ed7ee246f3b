//! Session relay: binds one WebSocket connection to at most one room and
//! participant, translates inbound events into registry operations, and fans
//! the results out to the rest of the room.
//!
//! A connection moves `Unbound -> Bound -> Closed`. The only way out of
//! `Unbound` is a join; every other event received there is silently
//! dropped. A bound connection never re-binds to a second room.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use inkrelay_core::{ClientMessage, Participant, ServerMessage};

use crate::registry::{ConnectionId, Envelope, Registry, Scope};

/// Lifecycle of one connection's room binding.
enum SessionState {
    Unbound,
    Bound { room_id: String, user_id: String },
    Closed,
}

/// What the relay should do on this connection after handling one inbound
/// event. Broadcasts to the room happen inside `handle`; this only carries
/// what goes back on the originating socket.
pub enum SessionAction {
    /// Nothing to send back.
    None,
    /// The connection just bound to a room: deliver the snapshot and start
    /// listening on the room channel.
    Joined {
        reply: ServerMessage,
        rx: broadcast::Receiver<Envelope>,
    },
}

/// Per-connection protocol state machine.
pub struct Session {
    pub id: ConnectionId,
    state: SessionState,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Unbound,
        }
    }

    /// Translate one inbound event into registry mutations and fan-out.
    pub fn handle(&mut self, registry: &Arc<Registry>, msg: ClientMessage) -> SessionAction {
        match msg {
            ClientMessage::JoinRoom {
                room_id,
                user_id,
                user_name,
                user_color,
            } => {
                if !matches!(self.state, SessionState::Unbound) {
                    // Second join on a bound (or closed) connection.
                    debug!("ignoring join_room on non-unbound connection {}", self.id);
                    return SessionAction::None;
                }

                let participant = Participant::new(&user_id, user_name, user_color);
                let state = registry.join(&room_id, participant);

                registry.broadcast(
                    &room_id,
                    Envelope::new(
                        self.id,
                        Scope::Others,
                        ServerMessage::UserJoined {
                            user: state.user.clone(),
                        },
                    ),
                );

                self.state = SessionState::Bound {
                    room_id,
                    user_id: state.user.id.clone(),
                };
                SessionAction::Joined {
                    reply: ServerMessage::RoomState {
                        history: state.history,
                        users: state.users,
                    },
                    rx: state.rx,
                }
            }
            ClientMessage::DrawingStep { segment } => {
                let Some((room_id, user_id)) = self.binding() else {
                    return SessionAction::None;
                };
                registry.broadcast(
                    &room_id,
                    Envelope::new(
                        self.id,
                        Scope::Others,
                        ServerMessage::RemoteDraw { user_id, segment },
                    ),
                );
                SessionAction::None
            }
            ClientMessage::StrokeComplete { stroke } => {
                let Some((room_id, user_id)) = self.binding() else {
                    return SessionAction::None;
                };
                // The declared author is untrusted; the bound participant id
                // wins so undo scoping cannot be corrupted.
                let stored = registry.append_stroke(&room_id, stroke, &user_id);
                registry.broadcast(
                    &room_id,
                    Envelope::new(
                        self.id,
                        Scope::Others,
                        ServerMessage::StrokeAdded { stroke: stored },
                    ),
                );
                SessionAction::None
            }
            ClientMessage::CursorMove { x, y } => {
                let Some((room_id, user_id)) = self.binding() else {
                    return SessionAction::None;
                };
                if let Some(user) = registry.update_cursor(&room_id, &user_id, x, y) {
                    registry.broadcast(
                        &room_id,
                        Envelope::new(
                            self.id,
                            Scope::Others,
                            ServerMessage::CursorUpdate {
                                user_id,
                                x,
                                y,
                                name: user.name,
                                color: user.color,
                            },
                        ),
                    );
                }
                SessionAction::None
            }
            ClientMessage::UndoRequest => {
                let Some((room_id, user_id)) = self.binding() else {
                    return SessionAction::None;
                };
                let history = registry.undo(&room_id, &user_id);
                // Authoritative history goes to everyone, the sender
                // included, so optimistic local edits reconcile.
                registry.broadcast(
                    &room_id,
                    Envelope::new(self.id, Scope::All, ServerMessage::HistoryUpdate { history }),
                );
                SessionAction::None
            }
            ClientMessage::ClearRequest => {
                let Some((room_id, _)) = self.binding() else {
                    return SessionAction::None;
                };
                let history = registry.clear(&room_id);
                registry.broadcast(
                    &room_id,
                    Envelope::new(self.id, Scope::All, ServerMessage::HistoryUpdate { history }),
                );
                SessionAction::None
            }
        }
    }

    /// Leave the room and stop accepting events.
    pub fn disconnect(&mut self, registry: &Arc<Registry>) {
        if let Some((room_id, user_id)) = self.binding() {
            registry.leave(&room_id, &user_id);
            registry.broadcast(
                &room_id,
                Envelope::new(
                    self.id,
                    Scope::Others,
                    ServerMessage::UserLeft {
                        user_id: user_id.clone(),
                    },
                ),
            );
        }
        self.state = SessionState::Closed;
    }

    fn binding(&self) -> Option<(String, String)> {
        match &self.state {
            SessionState::Bound { room_id, user_id } => {
                Some((room_id.clone(), user_id.clone()))
            }
            _ => None,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Drive one WebSocket connection until it closes.
pub async fn handle_socket(socket: WebSocket, registry: Arc<Registry>) {
    let mut session = Session::new();
    info!("new connection: {}", session.id);

    let (mut sender, mut receiver) = socket.split();
    let mut room_rx: Option<broadcast::Receiver<Envelope>> = None;

    loop {
        tokio::select! {
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(msg) => match session.handle(&registry, msg) {
                                SessionAction::Joined { reply, rx } => {
                                    room_rx = Some(rx);
                                    if !send_msg(&mut sender, &reply).await {
                                        break;
                                    }
                                }
                                SessionAction::None => {}
                            },
                            Err(err) => {
                                // Malformed frames degrade to a no-op.
                                debug!("dropping unparseable frame from {}: {}", session.id, err);
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // ignore ping/pong/binary
                    Some(Err(err)) => {
                        warn!("websocket error for {}: {}", session.id, err);
                        break;
                    }
                }
            }

            outbound = room_recv(&mut room_rx) => {
                if let Some(envelope) = outbound {
                    if envelope.should_deliver(session.id)
                        && !send_msg(&mut sender, &envelope.msg).await
                    {
                        break;
                    }
                }
            }
        }
    }

    session.disconnect(&registry);
    info!("connection closed: {}", session.id);
}

/// Wait on the room channel, or forever while unbound.
async fn room_recv(rx: &mut Option<broadcast::Receiver<Envelope>>) -> Option<Envelope> {
    match rx {
        Some(rx) => match rx.recv().await {
            Ok(envelope) => Some(envelope),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("room channel lagged, skipped {} messages", skipped);
                None
            }
            Err(broadcast::error::RecvError::Closed) => None,
        },
        None => std::future::pending().await,
    }
}

async fn send_msg(
    sender: &mut (impl SinkExt<Message> + Unpin),
    msg: &ServerMessage,
) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(err) => {
            warn!("failed to serialize outbound message: {}", err);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkrelay_core::{Segment, SegmentStyle, StrokeDraft};
    use kurbo::Point;

    fn registry() -> Arc<Registry> {
        Arc::new(Registry::new())
    }

    fn join(session: &mut Session, registry: &Arc<Registry>, room: &str, user: &str)
        -> (ServerMessage, broadcast::Receiver<Envelope>) {
        let action = session.handle(
            registry,
            ClientMessage::JoinRoom {
                room_id: room.to_string(),
                user_id: user.to_string(),
                user_name: None,
                user_color: None,
            },
        );
        match action {
            SessionAction::Joined { reply, rx } => (reply, rx),
            SessionAction::None => panic!("join was ignored"),
        }
    }

    fn draft(x: f64) -> StrokeDraft {
        StrokeDraft {
            points: vec![Point::new(x, x)],
            color: "#000000".to_string(),
            width: 3.0,
            ..StrokeDraft::default()
        }
    }

    /// Drain the next envelope that should reach `me`.
    fn next_for(rx: &mut broadcast::Receiver<Envelope>, me: ConnectionId) -> Option<ServerMessage> {
        while let Ok(envelope) = rx.try_recv() {
            if envelope.should_deliver(me) {
                return Some(envelope.msg);
            }
        }
        None
    }

    #[tokio::test]
    async fn test_stroke_broadcast_suppresses_echo() {
        let registry = registry();
        let mut s1 = Session::new();
        let mut s2 = Session::new();
        let (_, mut rx1) = join(&mut s1, &registry, "r1", "alice");
        let (_, mut rx2) = join(&mut s2, &registry, "r1", "bob");

        // rx1 sees bob's presence first.
        assert!(matches!(
            next_for(&mut rx1, s1.id),
            Some(ServerMessage::UserJoined { .. })
        ));

        s1.handle(&registry, ClientMessage::StrokeComplete { stroke: draft(1.0) });

        match next_for(&mut rx2, s2.id) {
            Some(ServerMessage::StrokeAdded { stroke }) => {
                assert_eq!(stroke.author_id, "alice");
            }
            other => panic!("expected stroke_added, got {:?}", other),
        }
        // Nothing deliverable comes back to the sender.
        assert!(next_for(&mut rx1, s1.id).is_none());
    }

    #[tokio::test]
    async fn test_undo_broadcast_includes_sender() {
        let registry = registry();
        let mut s1 = Session::new();
        let mut s2 = Session::new();
        let (_, mut rx1) = join(&mut s1, &registry, "r1", "alice");
        let (_, mut rx2) = join(&mut s2, &registry, "r1", "bob");
        next_for(&mut rx1, s1.id); // drain bob's user_joined

        s1.handle(&registry, ClientMessage::StrokeComplete { stroke: draft(1.0) });
        s1.handle(&registry, ClientMessage::StrokeComplete { stroke: draft(2.0) });
        next_for(&mut rx2, s2.id);
        next_for(&mut rx2, s2.id);

        s1.handle(&registry, ClientMessage::UndoRequest);

        let h1 = match next_for(&mut rx1, s1.id) {
            Some(ServerMessage::HistoryUpdate { history }) => history,
            _ => panic!("sender did not receive history_update"),
        };
        let h2 = match next_for(&mut rx2, s2.id) {
            Some(ServerMessage::HistoryUpdate { history }) => history,
            _ => panic!("other did not receive history_update"),
        };
        assert_eq!(h1.len(), 1);
        let ids1: Vec<&str> = h1.iter().map(|s| s.id.as_str()).collect();
        let ids2: Vec<&str> = h2.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids1, ids2);
    }

    #[tokio::test]
    async fn test_clear_broadcasts_empty_history_to_all() {
        let registry = registry();
        let mut s1 = Session::new();
        let mut s2 = Session::new();
        let (_, mut rx1) = join(&mut s1, &registry, "r1", "alice");
        let (_, mut rx2) = join(&mut s2, &registry, "r1", "bob");
        next_for(&mut rx1, s1.id);

        s1.handle(&registry, ClientMessage::StrokeComplete { stroke: draft(1.0) });
        next_for(&mut rx2, s2.id);

        // Any participant may clear, not just the author.
        s2.handle(&registry, ClientMessage::ClearRequest);

        for (rx, me) in [(&mut rx1, s1.id), (&mut rx2, s2.id)] {
            match next_for(rx, me) {
                Some(ServerMessage::HistoryUpdate { history }) => assert!(history.is_empty()),
                _ => panic!("missing history_update"),
            }
        }
        assert_eq!(registry.diagnostics("r1").unwrap().stroke_count, 0);
    }

    #[tokio::test]
    async fn test_forged_author_is_overridden() {
        let registry = registry();
        let mut s1 = Session::new();
        let mut s2 = Session::new();
        let (_, _rx1) = join(&mut s1, &registry, "r1", "alice");
        let (_, mut rx2) = join(&mut s2, &registry, "r1", "bob");

        let mut forged = draft(1.0);
        forged.author_id = Some("bob".to_string());
        s1.handle(&registry, ClientMessage::StrokeComplete { stroke: forged });

        match next_for(&mut rx2, s2.id) {
            Some(ServerMessage::StrokeAdded { stroke }) => {
                assert_eq!(stroke.author_id, "alice");
            }
            _ => panic!("expected stroke_added"),
        }

        // Bob's undo must not remove alice's stroke.
        s2.handle(&registry, ClientMessage::UndoRequest);
        assert_eq!(registry.diagnostics("r1").unwrap().stroke_count, 1);
    }

    #[tokio::test]
    async fn test_drawing_step_relays_with_sender_id() {
        let registry = registry();
        let mut s1 = Session::new();
        let mut s2 = Session::new();
        let (_, _rx1) = join(&mut s1, &registry, "r1", "alice");
        let (_, mut rx2) = join(&mut s2, &registry, "r1", "bob");

        s1.handle(
            &registry,
            ClientMessage::DrawingStep {
                segment: Segment {
                    start: Point::new(0.0, 0.0),
                    end: Point::new(5.0, 5.0),
                    style: SegmentStyle {
                        color: "#ff0000".to_string(),
                        width: 2.0,
                    },
                },
            },
        );

        match next_for(&mut rx2, s2.id) {
            Some(ServerMessage::RemoteDraw { user_id, segment }) => {
                assert_eq!(user_id, "alice");
                assert_eq!(segment.end.x, 5.0);
            }
            _ => panic!("expected remote_draw"),
        }
        // The transient segment never reaches the log.
        assert_eq!(registry.diagnostics("r1").unwrap().stroke_count, 0);
    }

    #[tokio::test]
    async fn test_cursor_move_updates_directory_and_relays() {
        let registry = registry();
        let mut s1 = Session::new();
        let mut s2 = Session::new();
        let (_, _rx1) = join(&mut s1, &registry, "r1", "alice");
        let (_, mut rx2) = join(&mut s2, &registry, "r1", "bob");

        s1.handle(&registry, ClientMessage::CursorMove { x: 7.0, y: 9.0 });

        match next_for(&mut rx2, s2.id) {
            Some(ServerMessage::CursorUpdate { user_id, x, y, .. }) => {
                assert_eq!(user_id, "alice");
                assert_eq!((x, y), (7.0, 9.0));
            }
            _ => panic!("expected cursor_update"),
        }
    }

    #[tokio::test]
    async fn test_events_while_unbound_are_ignored() {
        let registry = registry();
        let mut session = Session::new();

        let actions = [
            session.handle(&registry, ClientMessage::CursorMove { x: 1.0, y: 1.0 }),
            session.handle(&registry, ClientMessage::StrokeComplete { stroke: draft(1.0) }),
            session.handle(&registry, ClientMessage::UndoRequest),
            session.handle(&registry, ClientMessage::ClearRequest),
        ];
        assert!(actions.iter().all(|a| matches!(a, SessionAction::None)));
        assert!(registry.summaries().is_empty());
    }

    #[tokio::test]
    async fn test_second_join_is_ignored() {
        let registry = registry();
        let mut session = Session::new();
        let (_, _rx) = join(&mut session, &registry, "r1", "alice");

        let action = session.handle(
            &registry,
            ClientMessage::JoinRoom {
                room_id: "r2".to_string(),
                user_id: "alice".to_string(),
                user_name: None,
                user_color: None,
            },
        );
        assert!(matches!(action, SessionAction::None));
        // The second room was never created.
        assert!(registry.diagnostics("r2").is_err());
        assert_eq!(registry.diagnostics("r1").unwrap().participant_count, 1);
    }

    #[tokio::test]
    async fn test_join_snapshot_matches_current_history() {
        let registry = registry();
        let mut s1 = Session::new();
        let (_, _rx1) = join(&mut s1, &registry, "r1", "alice");
        s1.handle(&registry, ClientMessage::StrokeComplete { stroke: draft(1.0) });
        s1.handle(&registry, ClientMessage::StrokeComplete { stroke: draft(2.0) });

        let mut s2 = Session::new();
        let (reply, _rx2) = join(&mut s2, &registry, "r1", "bob");
        match reply {
            ServerMessage::RoomState { history, users } => {
                assert_eq!(history.len(), 2);
                assert_eq!(history[0].points[0].x, 1.0);
                assert_eq!(history[1].points[0].x, 2.0);
                let ids: Vec<&str> = users.iter().map(|u| u.id.as_str()).collect();
                assert_eq!(ids, vec!["alice", "bob"]);
            }
            _ => panic!("expected room_state snapshot"),
        }
    }

    #[tokio::test]
    async fn test_disconnect_broadcasts_user_left_and_closes() {
        let registry = registry();
        let mut s1 = Session::new();
        let mut s2 = Session::new();
        let (_, _rx1) = join(&mut s1, &registry, "r1", "alice");
        let (_, mut rx2) = join(&mut s2, &registry, "r1", "bob");

        s1.disconnect(&registry);

        match next_for(&mut rx2, s2.id) {
            Some(ServerMessage::UserLeft { user_id }) => assert_eq!(user_id, "alice"),
            _ => panic!("expected user_left"),
        }
        assert_eq!(registry.diagnostics("r1").unwrap().participant_count, 1);

        // A closed session accepts nothing, join included.
        let action = s1.handle(
            &registry,
            ClientMessage::JoinRoom {
                room_id: "r1".to_string(),
                user_id: "alice".to_string(),
                user_name: None,
                user_color: None,
            },
        );
        assert!(matches!(action, SessionAction::None));
    }
}
