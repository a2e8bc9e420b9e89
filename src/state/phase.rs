use super::{AppState, Session};
use crate::error::{GameError, GameResult};
use crate::protocol::ServerMessage;
use crate::types::*;
use chrono::{DateTime, Duration, Utc};

const ALL_PHASES: [GamePhase; 6] = [
    GamePhase::PreGame,
    GamePhase::Lobby,
    GamePhase::SubmittingAnswers,
    GamePhase::Voting,
    GamePhase::FinishedVoting,
    GamePhase::GameOver,
];

impl Session {
    /// Check if a phase transition is valid
    pub fn is_valid_phase_transition(from: &GamePhase, to: &GamePhase) -> bool {
        use GamePhase::*;

        match (from, to) {
            (PreGame, Lobby) => true,
            (Lobby, SubmittingAnswers) => true,
            (SubmittingAnswers, Voting) => true,
            (Voting, FinishedVoting) => true,
            // Next round
            (FinishedVoting, SubmittingAnswers) => true,

            (GameOver, GameOver) => false,
            // Host can end the game from anywhere
            (_, GameOver) => true,

            _ => false,
        }
    }

    pub fn get_valid_transitions(from: &GamePhase) -> Vec<GamePhase> {
        ALL_PHASES
            .iter()
            .filter(|to| Self::is_valid_phase_transition(from, to))
            .copied()
            .collect()
    }

    fn deadline_for(&self, phase: GamePhase, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let config = &self.game.config;
        let seconds = match phase {
            GamePhase::SubmittingAnswers => config.answer_seconds,
            GamePhase::Voting => config.voting_seconds,
            GamePhase::FinishedVoting | GamePhase::GameOver => config.results_seconds,
            GamePhase::PreGame | GamePhase::Lobby => return None,
        };
        Some(now + Duration::seconds(i64::from(seconds)))
    }

    /// Move to `to`, applying the phase's entry effects, and publish the change
    pub fn enter_phase(&mut self, to: GamePhase, now: DateTime<Utc>) -> GameResult<()> {
        let from = self.game.phase;
        if !Self::is_valid_phase_transition(&from, &to) {
            return Err(GameError::InvalidTransition { from, to });
        }

        match to {
            GamePhase::SubmittingAnswers => {
                if self.game.prompt.is_none() {
                    return Err(GameError::Precondition(
                        "A round needs a prompt before answers can be submitted".to_string(),
                    ));
                }
                self.game.round_no += 1;
                self.answers.clear();
                for player in &mut self.players {
                    player.has_voted = false;
                    player.start_game = false;
                }
            }
            GamePhase::FinishedVoting => {
                let winner = self.score_round();
                self.announce(ServerMessage::RoundResult {
                    round_no: self.game.round_no,
                    winner,
                });
            }
            _ => {}
        }

        self.game.phase = to;
        self.game.phase_deadline = self.deadline_for(to, now);
        self.touch();

        tracing::info!(
            "Session {} {:?} -> {:?} (round {})",
            self.game.code,
            from,
            to,
            self.game.round_no
        );

        self.announce(self.phase_message(now));
        self.publish();
        Ok(())
    }

    pub fn phase_message(&self, now: DateTime<Utc>) -> ServerMessage {
        ServerMessage::Phase {
            phase: self.game.phase,
            round_no: self.game.round_no,
            prompt: self.game.prompt.clone(),
            deadline: self.game.phase_deadline,
            server_now: now,
            valid_transitions: Self::get_valid_transitions(&self.game.phase),
        }
    }
}

impl AppState {
    /// Host-driven phase change. Starting a round fetches a prompt first.
    pub async fn transition_phase(&self, code: &str, to: GamePhase) -> GameResult<Game> {
        if to == GamePhase::SubmittingAnswers {
            return self.start_round(code, Utc::now()).await;
        }

        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(code)
            .ok_or_else(|| GameError::RoomNotFound(code.to_string()))?;

        session.enter_phase(to, Utc::now())?;
        Ok(session.game.clone())
    }

    pub async fn end_game(&self, code: &str) -> GameResult<Game> {
        self.transition_phase(code, GamePhase::GameOver).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        use GamePhase::*;
        assert!(Session::is_valid_phase_transition(&Lobby, &SubmittingAnswers));
        assert!(Session::is_valid_phase_transition(&SubmittingAnswers, &Voting));
        assert!(Session::is_valid_phase_transition(&Voting, &FinishedVoting));
        assert!(Session::is_valid_phase_transition(&FinishedVoting, &SubmittingAnswers));
        assert!(Session::is_valid_phase_transition(&Voting, &GameOver));

        assert!(!Session::is_valid_phase_transition(&Lobby, &Voting));
        assert!(!Session::is_valid_phase_transition(&Voting, &SubmittingAnswers));
        assert!(!Session::is_valid_phase_transition(&GameOver, &Lobby));
        assert!(!Session::is_valid_phase_transition(&GameOver, &GameOver));

        assert_eq!(
            Session::get_valid_transitions(&FinishedVoting),
            vec![SubmittingAnswers, GameOver]
        );
        assert!(Session::get_valid_transitions(&GameOver).is_empty());
    }

    #[test]
    fn test_invalid_transition_is_rejected() {
        let mut s = Session::new("ABCD".to_string(), GameConfig::default());
        let result = s.enter_phase(GamePhase::Voting, Utc::now());
        assert_eq!(
            result,
            Err(GameError::InvalidTransition {
                from: GamePhase::Lobby,
                to: GamePhase::Voting
            })
        );
        assert_eq!(s.game.phase, GamePhase::Lobby);
    }

    #[test]
    fn test_round_needs_prompt() {
        let mut s = Session::new("ABCD".to_string(), GameConfig::default());
        let result = s.enter_phase(GamePhase::SubmittingAnswers, Utc::now());
        assert!(matches!(result, Err(GameError::Precondition(_))));
        assert_eq!(s.game.round_no, 0);
    }

    #[test]
    fn test_phase_deadlines() {
        let mut s = Session::new("ABCD".to_string(), GameConfig::default());
        let now = Utc::now();
        assert!(s.game.phase_deadline.is_none());

        s.game.prompt = Some("prompt".to_string());
        s.enter_phase(GamePhase::SubmittingAnswers, now).unwrap();
        assert_eq!(s.game.phase_deadline, Some(now + Duration::seconds(30)));

        s.enter_phase(GamePhase::Voting, now).unwrap();
        assert_eq!(s.game.phase_deadline, Some(now + Duration::seconds(30)));

        s.enter_phase(GamePhase::FinishedVoting, now).unwrap();
        assert_eq!(s.game.phase_deadline, Some(now + Duration::seconds(10)));
    }

    #[test]
    fn test_phase_change_is_announced() {
        let mut s = Session::new("ABCD".to_string(), GameConfig::default());
        let mut rx = s.subscribe(Role::Player);

        s.enter_phase(GamePhase::GameOver, Utc::now()).unwrap();

        match rx.try_recv().unwrap() {
            ServerMessage::Phase { phase, .. } => assert_eq!(phase, GamePhase::GameOver),
            other => panic!("unexpected message: {:?}", other),
        }
        assert!(matches!(
            rx.try_recv().unwrap(),
            ServerMessage::Snapshot { .. }
        ));
    }
}
