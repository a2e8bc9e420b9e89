//! Host message handlers

use crate::protocol::ServerMessage;
use crate::state::AppState;
use crate::types::{normalize_code, GamePhase, Role, RoomCode};
use crate::ws::Connection;
use std::sync::Arc;

pub async fn handle_create_session(
    state: &Arc<AppState>,
    conn: &mut Connection,
) -> Option<ServerMessage> {
    match state.create_session_subscribed().await {
        Ok((game, rx)) => {
            let previous = conn.code.take();
            conn.bind(game.code.clone(), None, rx);
            if let Some(previous) = previous {
                tracing::info!("Host moved from {} to {}", previous, game.code);
                state
                    .close_session(&previous, "Host started a new session")
                    .await;
            }
            let join_url = state.join_url(&game.code);
            Some(ServerMessage::SessionCreated { game, join_url })
        }
        Err(e) => Some(e.into()),
    }
}

pub async fn handle_attach(
    state: &Arc<AppState>,
    conn: &mut Connection,
    code: RoomCode,
) -> Option<ServerMessage> {
    let code = normalize_code(&code);
    match state.attach(&code, Role::Host).await {
        Some((snapshot, rx)) => {
            tracing::info!("Host attached to {}", code);
            conn.bind(code, None, rx);
            Some(ServerMessage::Snapshot { snapshot })
        }
        None => Some(crate::error::GameError::RoomNotFound(code).into()),
    }
}

pub async fn handle_transition_phase(
    state: &Arc<AppState>,
    code: &str,
    phase: GamePhase,
) -> Option<ServerMessage> {
    tracing::info!("Host requested {} -> {:?}", code, phase);
    // The phase broadcast reaches the host through the room channel
    state.transition_phase(code, phase).await.err().map(Into::into)
}

pub async fn handle_end_game(state: &Arc<AppState>, code: &str) -> Option<ServerMessage> {
    state.end_game(code).await.err().map(Into::into)
}

pub async fn handle_close_session(
    state: &Arc<AppState>,
    conn: &mut Connection,
    code: &str,
) -> Option<ServerMessage> {
    let reason = "Closed by host";
    state.close_session(code, reason).await;
    conn.unbind();
    Some(ServerMessage::SessionClosed {
        code: code.to_string(),
        reason: reason.to_string(),
    })
}
