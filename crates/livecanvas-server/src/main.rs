//! LiveCanvas WebSocket Relay Server
//!
//! Relays storage updates, presence, broadcast events and thread metadata
//! between clients in the same room.
//!
//! ## Protocol
//!
//! Messages are JSON tagged by `type`:
//! ```json
//! { "type": "join", "room": "room-id" }
//! { "type": "sync", "data": "<base64-encoded-loro-bytes>" }
//! { "type": "presence", "state": { "cursor": { "x": 100, "y": 200 }, "message": null } }
//! { "type": "broadcast", "event": { "x": 100, "y": 200, "value": "🔥" } }
//! ```

mod room;

use std::{net::SocketAddr, sync::Arc};

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use livecanvas_core::presence::ConnectionId;
use livecanvas_core::sync::{ClientMessage, ServerMessage, encode_payload};
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use room::{AppState, Envelope};

const DEFAULT_ADDR: &str = "0.0.0.0:3030";

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "livecanvas_server=info,tower_http=info".into()),
        )
        .init();

    let addr_str = std::env::var("LIVECANVAS_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let addr: SocketAddr = match addr_str.parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Invalid LIVECANVAS_ADDR {}: {}", addr_str, e);
            return;
        }
    };

    let state = Arc::new(AppState::new());

    let app = Router::new()
        .route("/", get(index))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    info!("LiveCanvas relay server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            return;
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
    }
}

/// Index page
async fn index() -> &'static str {
    "LiveCanvas Relay Server - Connect via WebSocket at /ws"
}

/// Health check
async fn health() -> &'static str {
    "ok"
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

fn to_text(msg: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(msg) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            warn!("Failed to encode server message: {}", e);
            None
        }
    }
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection: ConnectionId = state.next_connection_id();
    info!("New connection: {}", connection);

    let (mut sender, mut receiver) = socket.split();
    let mut current_room: Option<String> = None;
    let mut room_rx: Option<broadcast::Receiver<Envelope>> = None;

    loop {
        tokio::select! {
            // Handle incoming messages from client
            msg = receiver.next() => {
                let client_msg = match msg {
                    Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(client_msg) => client_msg,
                        Err(e) => {
                            warn!("Invalid message from {}: {}", connection, e);
                            let err = ServerMessage::Error {
                                message: format!("Invalid message: {}", e),
                            };
                            if let Some(reply) = to_text(&err) {
                                let _ = sender.send(reply).await;
                            }
                            continue;
                        }
                    },
                    // Binary frames carry raw storage updates
                    Some(Ok(Message::Binary(data))) => ClientMessage::Sync { data: encode_payload(&data) },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue, // Ignore ping/pong
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", connection, e);
                        break;
                    }
                };

                match client_msg {
                    ClientMessage::Join { room } => {
                        // Leave current room if any
                        if let Some(old_room) = current_room.take() {
                            state.leave_room(&old_room, connection);
                        }

                        let (rx, joined) = state.join_room(&room, connection);
                        room_rx = Some(rx);
                        current_room = Some(room);

                        let Some(reply) = to_text(&joined) else { continue };
                        if sender.send(reply).await.is_err() {
                            break;
                        }
                    }
                    ClientMessage::Leave => {
                        if let Some(room) = current_room.take() {
                            state.leave_room(&room, connection);
                        }
                        room_rx = None;
                    }
                    other => {
                        let reply = match &current_room {
                            Some(room) => state.handle(room, connection, other),
                            None => Some(ServerMessage::Error {
                                message: "Join a room first".to_string(),
                            }),
                        };
                        if let Some(reply) = reply.as_ref().and_then(to_text) {
                            if sender.send(reply).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            }

            // Handle broadcast messages from room
            msg = async {
                match &mut room_rx {
                    Some(rx) => rx.recv().await,
                    None => {
                        // No room joined, just wait forever
                        std::future::pending().await
                    }
                }
            } => {
                match msg {
                    Ok(envelope) => {
                        // Don't echo back to sender
                        if !envelope.is_for(connection) {
                            continue;
                        }
                        let Some(out) = to_text(&envelope.message) else { continue };
                        if sender.send(out).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Connection {} lagged, {} messages dropped", connection, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        room_rx = None;
                    }
                }
            }
        }
    }

    // Cleanup on disconnect
    if let Some(room) = current_room {
        state.leave_room(&room, connection);
    }
    info!("Connection closed: {}", connection);
}
