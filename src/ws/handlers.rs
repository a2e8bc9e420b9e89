//! WebSocket message dispatch
//!
//! Authorization and room binding are checked here, then the message is
//! dispatched to the role-specific handler modules.

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use crate::types::Role;
use std::sync::Arc;

use super::{host, player, Connection};

/// Macro to check host authorization and return early if unauthorized
macro_rules! check_host {
    ($conn:expr, $action:expr) => {
        if $conn.role != Role::Host {
            return Some(ServerMessage::error(
                "UNAUTHORIZED",
                format!("Only the host can {}", $action),
            ));
        }
    };
}

/// Macro to pull the bound (room, player) out of a connection or bail out
macro_rules! joined {
    ($conn:expr) => {
        match (&$conn.code, &$conn.player_id) {
            (Some(code), Some(player_id)) => (code.clone(), player_id.clone()),
            _ => {
                return Some(ServerMessage::error(
                    "NOT_JOINED",
                    "Join a room first",
                ))
            }
        }
    };
}

/// Macro to pull the room a host socket is attached to
macro_rules! attached {
    ($conn:expr) => {
        match &$conn.code {
            Some(code) => code.clone(),
            None => {
                return Some(ServerMessage::error(
                    "NO_SESSION",
                    "Create or attach to a session first",
                ))
            }
        }
    };
}

/// Handle client messages and return optional response
pub async fn handle_message(
    msg: ClientMessage,
    conn: &mut Connection,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    match msg {
        // Player messages
        ClientMessage::Join {
            code,
            name,
            player_id,
        } => player::handle_join(state, conn, code, name, player_id).await,

        ClientMessage::RequestStart => {
            let (code, player_id) = joined!(conn);
            player::handle_request_start(state, &code, &player_id).await
        }

        ClientMessage::SubmitAnswer { text } => {
            let (code, player_id) = joined!(conn);
            player::handle_submit_answer(state, &code, &player_id, &text).await
        }

        ClientMessage::Vote { answer_id } => {
            let (code, player_id) = joined!(conn);
            player::handle_vote(state, &code, &player_id, &answer_id).await
        }

        // Host-only commands (authorization checked before dispatch)
        ClientMessage::HostCreateSession => {
            check_host!(conn, "create sessions");
            host::handle_create_session(state, conn).await
        }

        ClientMessage::HostAttach { code } => {
            check_host!(conn, "attach to sessions");
            host::handle_attach(state, conn, code).await
        }

        ClientMessage::HostTransitionPhase { phase } => {
            check_host!(conn, "transition phases");
            let code = attached!(conn);
            host::handle_transition_phase(state, &code, phase).await
        }

        ClientMessage::HostEndGame => {
            check_host!(conn, "end the game");
            let code = attached!(conn);
            host::handle_end_game(state, &code).await
        }

        ClientMessage::HostCloseSession => {
            check_host!(conn, "close sessions");
            let code = attached!(conn);
            host::handle_close_session(state, conn, &code).await
        }
    }
}
