//! REST endpoints mirroring the `games/{code}/{state|players|answers}` layout.
//!
//! Player endpoints are public; the `/host/api` ones sit behind Basic auth.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{GameError, GameResult};
use crate::protocol::{AnswerView, PlayerView, SessionSnapshot, SessionSummary};
use crate::state::AppState;
use crate::types::*;

impl GameError {
    pub fn status(&self) -> StatusCode {
        match self {
            GameError::RoomNotFound(_) | GameError::PlayerNotFound | GameError::AnswerNotFound => {
                StatusCode::NOT_FOUND
            }
            GameError::GameOver => StatusCode::GONE,
            GameError::RoomFull(_)
            | GameError::AlreadyAnswered
            | GameError::AlreadyVoted
            | GameError::WrongPhase(_)
            | GameError::InvalidTransition { .. }
            | GameError::Precondition(_)
            | GameError::Conflict => StatusCode::CONFLICT,
            GameError::EmptyName
            | GameError::NameTooLong(_)
            | GameError::EmptyAnswer
            | GameError::AnswerTooLong(_)
            | GameError::SelfVote => StatusCode::BAD_REQUEST,
            GameError::TooManySessions => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Error body: `{code, msg}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub msg: String,
}

impl IntoResponse for GameError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code().to_string(),
            msg: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

fn room_not_found(code: &str) -> GameError {
    GameError::RoomNotFound(code.to_string())
}

async fn snapshot_of(state: &AppState, code: &str) -> GameResult<SessionSnapshot> {
    state
        .public_snapshot(code)
        .await
        .ok_or_else(|| room_not_found(code))
}

/// `games/{code}/state`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateView {
    pub state: GamePhase,
    pub round_no: u32,
    pub prompt: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub version: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JoinBody {
    pub name: String,
    #[serde(default)]
    pub player_id: Option<PlayerId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnswerBody {
    pub player_id: PlayerId,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoteBody {
    pub player_id: PlayerId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteResult {
    pub answer_id: AnswerId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhaseBody {
    pub phase: GamePhase,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedSession {
    pub game: Game,
    pub join_url: String,
}

/// GET /api/games/{code}
pub async fn get_game(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> GameResult<Json<SessionSnapshot>> {
    let code = normalize_code(&code);
    snapshot_of(&state, &code).await.map(Json)
}

/// GET /api/games/{code}/state
pub async fn get_state(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> GameResult<Json<StateView>> {
    let code = normalize_code(&code);
    let snapshot = snapshot_of(&state, &code).await?;
    Ok(Json(StateView {
        state: snapshot.state,
        round_no: snapshot.round_no,
        prompt: snapshot.prompt,
        deadline: snapshot.deadline,
        version: snapshot.version,
    }))
}

/// GET /api/games/{code}/players
pub async fn get_players(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> GameResult<Json<Vec<PlayerView>>> {
    let code = normalize_code(&code);
    Ok(Json(snapshot_of(&state, &code).await?.players))
}

/// GET /api/games/{code}/answers
pub async fn get_answers(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> GameResult<Json<Vec<AnswerView>>> {
    let code = normalize_code(&code);
    Ok(Json(snapshot_of(&state, &code).await?.answers))
}

/// POST /api/games/{code}/players
pub async fn join_game(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Json(body): Json<JoinBody>,
) -> GameResult<(StatusCode, Json<Player>)> {
    let code = normalize_code(&code);
    let player = state
        .join(&code, &body.name, body.player_id.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(player)))
}

/// POST /api/games/{code}/players/{player_id}/start
pub async fn request_start(
    State(state): State<Arc<AppState>>,
    Path((code, player_id)): Path<(String, String)>,
) -> GameResult<StatusCode> {
    let code = normalize_code(&code);
    state.request_start(&code, &player_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/games/{code}/answers
pub async fn submit_answer(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Json(body): Json<AnswerBody>,
) -> GameResult<(StatusCode, Json<Answer>)> {
    let code = normalize_code(&code);
    let answer = state
        .submit_answer(&code, &body.player_id, &body.content)
        .await?;
    Ok((StatusCode::CREATED, Json(answer)))
}

/// POST /api/games/{code}/answers/{answer_id}/votes
pub async fn cast_vote(
    State(state): State<Arc<AppState>>,
    Path((code, answer_id)): Path<(String, String)>,
    Json(body): Json<VoteBody>,
) -> GameResult<Json<VoteResult>> {
    let code = normalize_code(&code);
    // The running total stays hidden from players until results
    state.cast_vote(&code, &body.player_id, &answer_id).await?;
    Ok(Json(VoteResult { answer_id }))
}

/// GET /host/api/games
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<Vec<SessionSummary>> {
    Json(state.list_sessions().await)
}

/// POST /host/api/games
pub async fn create_session(
    State(state): State<Arc<AppState>>,
) -> GameResult<(StatusCode, Json<CreatedSession>)> {
    let game = state.create_session().await?;
    let join_url = state.join_url(&game.code);
    Ok((StatusCode::CREATED, Json(CreatedSession { game, join_url })))
}

/// GET /host/api/games/{code}
pub async fn host_snapshot(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> GameResult<Json<SessionSnapshot>> {
    let code = normalize_code(&code);
    state
        .host_snapshot(&code)
        .await
        .map(Json)
        .ok_or_else(|| room_not_found(&code))
}

/// DELETE /host/api/games/{code}
pub async fn close_session(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> GameResult<StatusCode> {
    let code = normalize_code(&code);
    state
        .close_session(&code, "Closed by host")
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or_else(|| room_not_found(&code))
}

/// POST /host/api/games/{code}/phase
pub async fn transition_phase(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Json(body): Json<PhaseBody>,
) -> GameResult<Json<Game>> {
    let code = normalize_code(&code);
    state.transition_phase(&code, body.phase).await.map(Json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_statuses() {
        assert_eq!(
            GameError::RoomNotFound("ABCD".to_string()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(GameError::GameOver.status(), StatusCode::GONE);
        assert_eq!(GameError::Conflict.status(), StatusCode::CONFLICT);
        assert_eq!(
            GameError::WrongPhase(GamePhase::Lobby).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(GameError::EmptyAnswer.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_state_of_missing_room() {
        let state = Arc::new(AppState::new());
        let result = get_state(State(state), Path("nope".to_string())).await;
        assert_eq!(
            result.unwrap_err(),
            GameError::RoomNotFound("NOPE".to_string())
        );
    }

    #[tokio::test]
    async fn test_join_through_handler() {
        let state = Arc::new(AppState::new());
        let game = state.create_session().await.unwrap();

        let (status, Json(player)) = join_game(
            State(state.clone()),
            Path(game.code.to_lowercase()),
            Json(JoinBody {
                name: "Ada".to_string(),
                player_id: None,
            }),
        )
        .await
        .unwrap();

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(player.name, "Ada");
        let Json(players) = get_players(State(state), Path(game.code)).await.unwrap();
        assert_eq!(players.len(), 1);
    }
}
