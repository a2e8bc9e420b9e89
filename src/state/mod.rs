mod answer;
mod phase;
mod player;
pub mod round;
pub mod score;
mod session;
mod vote;

pub use round::{Advance, FALLBACK_PROMPT};
pub use score::top_answer;
pub use session::Session;

use crate::prompt::{PromptService, StaticPromptService};
use crate::relay::PromptRelay;
use crate::types::*;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared application state
///
/// Every room lives behind one lock, so each mutation (vote, answer, phase
/// change) is applied atomically and published in the order it happened.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<RwLock<HashMap<RoomCode, Session>>>,
    /// Rules applied to newly created rooms
    pub config: GameConfig,
    pub max_sessions: usize,
    /// Base URL players use to reach the server (for join links)
    pub public_url: String,
    pub prompts: Arc<dyn PromptService>,
    /// Built-in prompt relay, exposed at /api/prompt when LLM providers are configured
    pub relay: Option<Arc<PromptRelay>>,
}

impl AppState {
    pub fn new() -> Self {
        Self::new_with(
            GameConfig::default(),
            Arc::new(StaticPromptService::default()),
        )
    }

    pub fn new_with(config: GameConfig, prompts: Arc<dyn PromptService>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            config,
            max_sessions: 100,
            public_url: "http://localhost:6866".to_string(),
            prompts,
            relay: None,
        }
    }

    pub fn with_relay(mut self, relay: Option<Arc<PromptRelay>>) -> Self {
        self.relay = relay;
        self
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GameError;
    use chrono::{Duration, Utc};

    async fn lobby_with_players(state: &AppState, names: &[&str]) -> (RoomCode, Vec<Player>) {
        let game = state.create_session().await.unwrap();
        let mut players = Vec::new();
        for name in names {
            players.push(state.join(&game.code, name, None).await.unwrap());
        }
        (game.code, players)
    }

    #[tokio::test]
    async fn test_create_session() {
        let state = AppState::new();
        let game = state.create_session().await.unwrap();

        assert_eq!(game.phase, GamePhase::Lobby);
        assert_eq!(game.round_no, 0);
        assert_eq!(game.code.len(), 4);
        assert!(game.code.chars().all(|c| c.is_ascii_uppercase()));
        assert!(state.get_game(&game.code).await.is_some());
    }

    #[tokio::test]
    async fn test_session_limit() {
        let mut state = AppState::new();
        state.max_sessions = 1;
        state.create_session().await.unwrap();

        let result = state.create_session().await;
        assert_eq!(result.unwrap_err(), GameError::TooManySessions);
    }

    #[tokio::test]
    async fn test_close_session_notifies_subscribers() {
        let state = AppState::new();
        let (code, _) = lobby_with_players(&state, &["Ada"]).await;
        let mut rx = state.subscribe(&code, Role::Player).await.unwrap();

        state.close_session(&code, "Host left").await;

        match rx.recv().await.unwrap() {
            crate::protocol::ServerMessage::SessionClosed { reason, .. } => {
                assert_eq!(reason, "Host left")
            }
            other => panic!("unexpected message: {:?}", other),
        }
        assert!(state.get_game(&code).await.is_none());
    }

    #[tokio::test]
    async fn test_full_round_via_ticks() {
        let state = AppState::new();
        let (code, players) = lobby_with_players(&state, &["Ada", "Bob"]).await;

        // Nothing happens until someone asks to start
        assert_eq!(state.tick_session(&code, Utc::now()).await.unwrap(), None);

        state.request_start(&code, &players[0].id).await.unwrap();
        let step = state.tick_session(&code, Utc::now()).await.unwrap();
        assert_eq!(step, Some(Advance::To(GamePhase::SubmittingAnswers)));

        let game = state.get_game(&code).await.unwrap();
        assert_eq!(game.round_no, 1);
        assert!(game.prompt.is_some());
        // Start flag consumed
        assert!(state
            .get_player(&code, &players[0].id)
            .await
            .is_some_and(|p| !p.start_game));

        let a1 = state
            .submit_answer(&code, &players[0].id, "I open the chest")
            .await
            .unwrap();
        state
            .submit_answer(&code, &players[1].id, "I poke it with a stick")
            .await
            .unwrap();

        // Everyone answered: voting starts before the timer runs out
        let step = state.tick_session(&code, Utc::now()).await.unwrap();
        assert_eq!(step, Some(Advance::To(GamePhase::Voting)));

        state.cast_vote(&code, &players[1].id, &a1.id).await.unwrap();
        // Ada can still vote, so voting stays open
        assert_eq!(state.tick_session(&code, Utc::now()).await.unwrap(), None);

        let later = Utc::now() + Duration::seconds(31);
        let step = state.tick_session(&code, later).await.unwrap();
        assert_eq!(step, Some(Advance::To(GamePhase::FinishedVoting)));

        let game = state.get_game(&code).await.unwrap();
        let winner = game.last_winner.unwrap();
        assert_eq!(winner.player_id, players[0].id);
        assert_eq!(
            state.get_player(&code, &players[0].id).await.unwrap().score,
            1000
        );

        // Results screen expires into the next round with a fresh prompt
        let later = later + Duration::seconds(11);
        let step = state.tick_session(&code, later).await.unwrap();
        assert_eq!(step, Some(Advance::To(GamePhase::SubmittingAnswers)));
        let snapshot = state.host_snapshot(&code).await.unwrap();
        assert_eq!(snapshot.round_no, 2);
        assert!(snapshot.answers.is_empty());
        assert!(snapshot.players.iter().all(|p| !p.has_voted));
    }

    #[tokio::test]
    async fn test_max_rounds_ends_game_and_closes_room() {
        let config = GameConfig {
            max_rounds: Some(1),
            ..GameConfig::default()
        };
        let state = AppState::new_with(config, Arc::new(StaticPromptService::default()));
        let (code, players) = lobby_with_players(&state, &["Ada"]).await;

        state.request_start(&code, &players[0].id).await.unwrap();
        state.tick_session(&code, Utc::now()).await.unwrap();
        state
            .transition_phase(&code, GamePhase::Voting)
            .await
            .unwrap();
        state
            .transition_phase(&code, GamePhase::FinishedVoting)
            .await
            .unwrap();

        let later = Utc::now() + Duration::seconds(11);
        let step = state.tick_session(&code, later).await.unwrap();
        assert_eq!(step, Some(Advance::To(GamePhase::GameOver)));

        let err = state.join(&code, "Late", None).await.unwrap_err();
        assert_eq!(err, GameError::GameOver);

        let much_later = later + Duration::seconds(11);
        let step = state.tick_session(&code, much_later).await.unwrap();
        assert_eq!(step, Some(Advance::Close));
        assert!(state.get_game(&code).await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_start_requests_start_one_round() {
        let state = Arc::new(AppState::new());
        let (code, players) = lobby_with_players(&state, &["Ada", "Bob", "Cy"]).await;

        for p in &players {
            state.request_start(&code, &p.id).await.unwrap();
        }

        let mut tasks = Vec::new();
        for _ in 0..5 {
            let state = state.clone();
            let code = code.clone();
            tasks.push(tokio::spawn(async move {
                state.tick_session(&code, Utc::now()).await
            }));
        }

        let mut started = 0;
        for task in tasks {
            if let Ok(Some(Advance::To(GamePhase::SubmittingAnswers))) = task.await.unwrap() {
                started += 1;
            }
        }

        assert_eq!(started, 1);
        assert_eq!(state.get_game(&code).await.unwrap().round_no, 1);
    }
}
