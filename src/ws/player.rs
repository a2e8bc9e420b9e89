//! Player message handlers

use crate::protocol::ServerMessage;
use crate::state::AppState;
use crate::types::{normalize_code, AnswerId, PlayerId, RoomCode};
use crate::ws::Connection;
use std::sync::Arc;

pub async fn handle_join(
    state: &Arc<AppState>,
    conn: &mut Connection,
    code: RoomCode,
    name: String,
    player_id: Option<PlayerId>,
) -> Option<ServerMessage> {
    let code = normalize_code(&code);
    tracing::info!("Join request for {} as {}", code, name);

    let (player, snapshot, rx) = match state
        .join_subscribed(&code, &name, player_id.as_deref())
        .await
    {
        Ok(joined) => joined,
        Err(e) => return Some(e.into()),
    };

    conn.bind(code, Some(player.id.clone()), rx);
    Some(ServerMessage::Joined { player, snapshot })
}

pub async fn handle_request_start(
    state: &Arc<AppState>,
    code: &str,
    player_id: &str,
) -> Option<ServerMessage> {
    // Success is visible in the next snapshot
    state.request_start(code, player_id).await.err().map(Into::into)
}

pub async fn handle_submit_answer(
    state: &Arc<AppState>,
    code: &str,
    player_id: &str,
    text: &str,
) -> Option<ServerMessage> {
    match state.submit_answer(code, player_id, text).await {
        Ok(answer) => Some(ServerMessage::AnswerAccepted {
            answer_id: answer.id,
        }),
        Err(e) => Some(e.into()),
    }
}

pub async fn handle_vote(
    state: &Arc<AppState>,
    code: &str,
    player_id: &str,
    answer_id: &AnswerId,
) -> Option<ServerMessage> {
    match state.cast_vote(code, player_id, answer_id).await {
        Ok(_) => Some(ServerMessage::VoteAccepted {
            answer_id: answer_id.clone(),
            votes: None,
        }),
        Err(e) => Some(e.into()),
    }
}
