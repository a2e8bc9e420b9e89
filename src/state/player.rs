use super::{AppState, Session};
use crate::error::{GameError, GameResult};
use crate::protocol::{ServerMessage, SessionSnapshot};
use crate::types::*;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

impl Session {
    /// Add a player, or resume one when `player_id` is already in the room
    pub fn join(
        &mut self,
        name: &str,
        player_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> GameResult<Player> {
        if self.game.phase == GamePhase::GameOver {
            return Err(GameError::GameOver);
        }

        let name = name.trim();
        if name.is_empty() {
            return Err(GameError::EmptyName);
        }
        let max_name = self.game.config.max_name_chars;
        if name.chars().count() > max_name {
            return Err(GameError::NameTooLong(max_name));
        }

        if let Some(existing) = player_id.and_then(|id| self.player_mut(id)) {
            existing.name = name.to_string();
            let player = existing.clone();
            self.touch();
            return Ok(player);
        }

        let max_players = self.game.config.max_players;
        if self.players.len() >= max_players {
            return Err(GameError::RoomFull(max_players));
        }

        let player = Player {
            id: ulid::Ulid::new().to_string(),
            name: name.to_string(),
            score: 0,
            has_voted: false,
            start_game: false,
            joined_at: now,
        };
        self.players.push(player.clone());
        self.touch();
        Ok(player)
    }

    /// Flag that a player wants the game to start; the server consumes it
    pub fn request_start(&mut self, player_id: &str) -> GameResult<()> {
        if self.game.phase != GamePhase::Lobby {
            return Err(GameError::WrongPhase(self.game.phase));
        }
        let player = self
            .player_mut(player_id)
            .ok_or(GameError::PlayerNotFound)?;
        if !player.start_game {
            player.start_game = true;
            self.touch();
        }
        Ok(())
    }

    pub fn start_requested(&self) -> bool {
        self.players.iter().any(|p| p.start_game)
    }
}

impl AppState {
    pub async fn join(
        &self,
        code: &str,
        name: &str,
        player_id: Option<&str>,
    ) -> GameResult<Player> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(code)
            .ok_or_else(|| GameError::RoomNotFound(code.to_string()))?;

        let player = session.join(name, player_id, Utc::now())?;
        session.publish();

        tracing::info!("Player {} ({}) joined {}", player.name, player.id, code);
        Ok(player)
    }

    /// Join and subscribe to the players' channel under one lock. The
    /// receiver picks up exactly where the returned snapshot leaves off.
    pub async fn join_subscribed(
        &self,
        code: &str,
        name: &str,
        player_id: Option<&str>,
    ) -> GameResult<(Player, SessionSnapshot, broadcast::Receiver<ServerMessage>)> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(code)
            .ok_or_else(|| GameError::RoomNotFound(code.to_string()))?;

        let player = session.join(name, player_id, Utc::now())?;
        session.publish();
        let rx = session.subscribe(Role::Player);

        tracing::info!("Player {} ({}) joined {}", player.name, player.id, code);
        Ok((player, session.public_snapshot(), rx))
    }

    pub async fn request_start(&self, code: &str, player_id: &str) -> GameResult<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(code)
            .ok_or_else(|| GameError::RoomNotFound(code.to_string()))?;

        session.request_start(player_id)?;
        session.publish();

        tracing::info!("Player {} requested start in {}", player_id, code);
        Ok(())
    }

    pub async fn get_player(&self, code: &str, player_id: &str) -> Option<Player> {
        self.sessions
            .read()
            .await
            .get(code)
            .and_then(|s| s.player(player_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new("ABCD".to_string(), GameConfig::default())
    }

    #[test]
    fn test_join_trims_and_validates_name() {
        let mut s = session();
        let player = s.join("  Ada  ", None, Utc::now()).unwrap();
        assert_eq!(player.name, "Ada");
        assert_eq!(player.score, 0);
        assert!(!player.has_voted);

        assert_eq!(s.join("   ", None, Utc::now()), Err(GameError::EmptyName));
        let long = "x".repeat(25);
        assert_eq!(
            s.join(&long, None, Utc::now()),
            Err(GameError::NameTooLong(24))
        );
    }

    #[test]
    fn test_rejoin_keeps_score() {
        let mut s = session();
        let player = s.join("Ada", None, Utc::now()).unwrap();
        s.player_mut(&player.id).unwrap().score = 2000;

        let resumed = s.join("Ada the Bold", Some(&player.id), Utc::now()).unwrap();
        assert_eq!(resumed.id, player.id);
        assert_eq!(resumed.score, 2000);
        assert_eq!(resumed.name, "Ada the Bold");
        assert_eq!(s.players.len(), 1);
    }

    #[test]
    fn test_room_full() {
        let mut s = session();
        for i in 0..8 {
            s.join(&format!("P{}", i), None, Utc::now()).unwrap();
        }
        assert_eq!(
            s.join("Late", None, Utc::now()),
            Err(GameError::RoomFull(8))
        );
    }

    #[test]
    fn test_join_rejected_after_game_over() {
        let mut s = session();
        s.enter_phase(GamePhase::GameOver, Utc::now()).unwrap();
        assert_eq!(s.join("Ada", None, Utc::now()), Err(GameError::GameOver));
    }

    #[test]
    fn test_request_start_only_in_lobby() {
        let mut s = session();
        let player = s.join("Ada", None, Utc::now()).unwrap();

        assert!(!s.start_requested());
        s.request_start(&player.id).unwrap();
        assert!(s.start_requested());

        assert_eq!(s.request_start("nobody"), Err(GameError::PlayerNotFound));

        s.game.prompt = Some("prompt".to_string());
        s.enter_phase(GamePhase::SubmittingAnswers, Utc::now())
            .unwrap();
        assert!(!s.start_requested());
        assert_eq!(
            s.request_start(&player.id),
            Err(GameError::WrongPhase(GamePhase::SubmittingAnswers))
        );
    }

    #[tokio::test]
    async fn test_join_unknown_room() {
        let state = AppState::new();
        let result = state.join("ZZZZ", "Ada", None).await;
        assert_eq!(result, Err(GameError::RoomNotFound("ZZZZ".to_string())));
    }
}
