//! inkrelay WebSocket room-sync server.
//!
//! Maintains per-room authoritative drawing state and relays live
//! drawing/cursor/undo/clear events between the connections bound to each
//! room. State is in-memory only and lives for the life of the process.
//!
//! ## Protocol
//!
//! Messages are JSON tagged by a `type` field:
//! ```json
//! { "type": "join_room", "roomId": "r1", "userId": "u1", "userName": "Ada" }
//! { "type": "stroke_complete", "stroke": { "points": [...], "color": "#000", "width": 3.0 } }
//! { "type": "undo_request" }
//! ```

mod registry;
mod relay;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State, ws::WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::info;

use inkrelay_core::{RoomSummary, now_ms};

use crate::registry::Registry;

const DEFAULT_PORT: u16 = 3001;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inkrelay_server=info,tower_http=info".into()),
        )
        .init();

    let registry = Arc::new(Registry::new());

    let app = Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/rooms", get(list_rooms))
        .route("/rooms/{room_id}", get(room_info))
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(registry);

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("inkrelay server listening on {}", addr);
    info!("WebSocket endpoint: ws://localhost:{}/ws", port);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

/// Status page.
async fn index() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "message": "inkrelay canvas server is running",
        "timestamp": now_ms(),
    }))
}

/// Health check.
async fn health() -> &'static str {
    "ok"
}

/// Read-only listing of every live room.
async fn list_rooms(State(registry): State<Arc<Registry>>) -> Json<Vec<RoomSummary>> {
    Json(registry.summaries())
}

/// Diagnostic lookup of one room; the only not-found in the system.
async fn room_info(
    Path(room_id): Path<String>,
    State(registry): State<Arc<Registry>>,
) -> impl IntoResponse {
    match registry.diagnostics(&room_id) {
        Ok(summary) => (
            StatusCode::OK,
            Json(json!({
                "roomId": summary.id,
                "userCount": summary.participant_count,
                "strokeCount": summary.stroke_count,
            })),
        ),
        Err(err) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": err.to_string() })),
        ),
    }
}

/// WebSocket upgrade into the session relay.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(registry): State<Arc<Registry>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| relay::handle_socket(socket, registry))
}
