use super::{AppState, Session};
use crate::error::{GameError, GameResult};
use crate::protocol::ServerMessage;
use crate::types::*;
use chrono::{DateTime, Utc};

impl Session {
    /// Record a player's answer for the current round (one per player)
    pub fn submit_answer(
        &mut self,
        player_id: &str,
        text: &str,
        now: DateTime<Utc>,
    ) -> GameResult<Answer> {
        if self.game.phase != GamePhase::SubmittingAnswers {
            return Err(GameError::WrongPhase(self.game.phase));
        }
        if self.player(player_id).is_none() {
            return Err(GameError::PlayerNotFound);
        }

        let content = text.trim();
        if content.is_empty() {
            return Err(GameError::EmptyAnswer);
        }
        let max_chars = self.game.config.max_answer_chars;
        if content.chars().count() > max_chars {
            return Err(GameError::AnswerTooLong(max_chars));
        }
        if self.answer_by(player_id).is_some() {
            return Err(GameError::AlreadyAnswered);
        }

        let answer = Answer {
            id: ulid::Ulid::new().to_string(),
            player_id: player_id.to_string(),
            content: content.to_string(),
            votes: 0,
            seq: self.next_seq(),
            submitted_at: now,
        };
        self.answers.push(answer.clone());
        self.touch();
        Ok(answer)
    }

    /// Every joined player has an answer in (and at least one player joined)
    pub fn all_answered(&self) -> bool {
        !self.players.is_empty() && self.players.iter().all(|p| self.answer_by(&p.id).is_some())
    }
}

impl AppState {
    pub async fn submit_answer(
        &self,
        code: &str,
        player_id: &str,
        text: &str,
    ) -> GameResult<Answer> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(code)
            .ok_or_else(|| GameError::RoomNotFound(code.to_string()))?;

        let answer = session.submit_answer(player_id, text, Utc::now())?;
        session.announce(ServerMessage::AnswerAccepted {
            answer_id: answer.id.clone(),
        });
        session.publish();

        tracing::info!(
            "Answer {} from {} in {} ({}/{})",
            answer.id,
            player_id,
            code,
            session.answers.len(),
            session.players.len()
        );
        Ok(answer)
    }
}
