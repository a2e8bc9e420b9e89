pub mod handlers;
mod host;
mod player;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt, Sink};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::protocol::{ClientMessage, ServerMessage, PROTOCOL_VERSION};
use crate::state::AppState;
use crate::types::{PlayerId, Role, RoomCode};

/// What a socket is bound to. Updated by `join`, `host_create_session` and
/// `host_attach`.
#[derive(Debug)]
pub struct Connection {
    pub role: Role,
    pub code: Option<RoomCode>,
    pub player_id: Option<PlayerId>,
    /// Room channel opened together with the latest bind, not yet picked
    /// up by the socket loop
    subscription: Option<broadcast::Receiver<ServerMessage>>,
}

impl Connection {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            code: None,
            player_id: None,
            subscription: None,
        }
    }

    fn bind(
        &mut self,
        code: RoomCode,
        player_id: Option<PlayerId>,
        rx: broadcast::Receiver<ServerMessage>,
    ) {
        self.code = Some(code);
        self.player_id = player_id;
        self.subscription = Some(rx);
    }

    fn unbind(&mut self) {
        self.code = None;
        self.player_id = None;
        self.subscription = None;
    }

    pub(crate) fn take_subscription(&mut self) -> Option<broadcast::Receiver<ServerMessage>> {
        self.subscription.take()
    }
}

/// WebSocket upgrade handler for player apps
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, Role::Player, state))
}

/// WebSocket upgrade handler for the host display (behind Basic auth)
pub async fn host_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, Role::Host, state))
}

async fn send_json<S>(sender: &mut S, msg: &ServerMessage) -> bool
where
    S: Sink<Message> + Unpin,
{
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            tracing::error!("Failed to serialize message: {}", e);
            true
        }
    }
}

async fn next_room_message(
    rx: &mut Option<broadcast::Receiver<ServerMessage>>,
) -> Result<ServerMessage, RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        // Not in a room: wait forever
        None => std::future::pending().await,
    }
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, role: Role, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut conn = Connection::new(role);

    tracing::info!("WebSocket connected with role: {:?}", role);

    let welcome = ServerMessage::Welcome {
        protocol: PROTOCOL_VERSION.to_string(),
        role,
        server_now: chrono::Utc::now(),
    };
    if !send_json(&mut sender, &welcome).await {
        tracing::error!("Failed to send welcome message");
        return;
    }

    let mut room_rx: Option<broadcast::Receiver<ServerMessage>> = None;
    let mut subscribed: Option<RoomCode> = None;

    loop {
        tokio::select! {
            room_msg = next_room_message(&mut room_rx) => {
                match room_msg {
                    Ok(msg) => {
                        if matches!(msg, ServerMessage::SessionClosed { .. }) {
                            conn.unbind();
                            room_rx = None;
                            subscribed = None;
                        }
                        if !send_json(&mut sender, &msg).await {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Socket lagged {} messages behind, resending snapshot", skipped);
                        let snapshot = match (&conn.code, conn.role) {
                            (Some(code), Role::Host) => state.host_snapshot(code).await,
                            (Some(code), Role::Player) => state.public_snapshot(code).await,
                            (None, _) => None,
                        };
                        if let Some(snapshot) = snapshot {
                            if !send_json(&mut sender, &ServerMessage::Snapshot { snapshot }).await {
                                break;
                            }
                        }
                    }
                    Err(RecvError::Closed) => {
                        room_rx = None;
                        subscribed = None;
                    }
                }
            }

            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!("Received message: {}", text);

                        let response = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => handlers::handle_message(client_msg, &mut conn, &state).await,
                            Err(e) => {
                                tracing::warn!("Failed to parse client message: {}", e);
                                Some(ServerMessage::error(
                                    "PARSE_ERROR",
                                    format!("Invalid message format: {}", e),
                                ))
                            }
                        };

                        // Follow the connection to its (new) room before replying
                        if let Some(rx) = conn.take_subscription() {
                            room_rx = Some(rx);
                            subscribed = conn.code.clone();
                        } else if conn.code != subscribed {
                            room_rx = match &conn.code {
                                Some(code) => state.subscribe(code, conn.role).await,
                                None => None,
                            };
                            subscribed = conn.code.clone();
                        }

                        if let Some(response) = response {
                            if !send_json(&mut sender, &response).await {
                                tracing::error!("Failed to send response");
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("WebSocket closed");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    // The host owns its room: no host, no game
    if conn.role == Role::Host {
        if let Some(code) = &conn.code {
            state.close_session(code, "Host disconnected").await;
        }
    }

    tracing::info!("WebSocket connection closed for role: {:?}", role);
}
