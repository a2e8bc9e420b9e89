use super::{AppState, Session};
use crate::error::{GameError, GameResult};
use crate::prompt::{PromptReply, PromptRequest};
use crate::types::*;
use chrono::{DateTime, Utc};

/// Used whenever the prompt service fails or returns nothing
pub const FALLBACK_PROMPT: &str = "You enter a mysterious dungeon...";

const OPENING_MESSAGE: &str =
    "Generate a creative DnD scenario for the players to respond to. Keep it to a few sentences and end by asking what they do.";

/// What a room should do next, decided by `Session::evaluate`
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    To(GamePhase),
    Close,
}

impl Session {
    /// Decide whether the room is due to move on at `now`
    pub fn evaluate(&self, now: DateTime<Utc>) -> Option<Advance> {
        if self.round_pending {
            return None;
        }

        let expired = self.game.phase_deadline.is_some_and(|d| now >= d);

        match self.game.phase {
            GamePhase::PreGame => None,
            GamePhase::Lobby => {
                let enough = self.players.len() >= self.game.config.min_players;
                (enough && self.start_requested()).then_some(Advance::To(GamePhase::SubmittingAnswers))
            }
            GamePhase::SubmittingAnswers => {
                (expired || self.all_answered()).then_some(Advance::To(GamePhase::Voting))
            }
            GamePhase::Voting => {
                (expired || self.all_voted()).then_some(Advance::To(GamePhase::FinishedVoting))
            }
            GamePhase::FinishedVoting => expired.then(|| {
                if self.rounds_exhausted() {
                    Advance::To(GamePhase::GameOver)
                } else {
                    Advance::To(GamePhase::SubmittingAnswers)
                }
            }),
            GamePhase::GameOver => expired.then_some(Advance::Close),
        }
    }

    pub fn rounds_exhausted(&self) -> bool {
        self.game
            .config
            .max_rounds
            .is_some_and(|max| self.game.round_no >= max)
    }

    /// Message for the prompt service: an opening scenario, or a reaction
    /// to the last round's winning answer
    pub fn prompt_message(&self) -> String {
        match &self.game.last_winner {
            Some(winner) if winner.round_no == self.game.round_no => format!(
                "The party decided: \"{}\" (suggested by {}). Describe what happens as a result, then present a new scenario for the players to respond to.",
                winner.content, winner.player_name
            ),
            _ if self.game.round_no > 0 => {
                "Nobody agreed on what to do. Describe how the dungeon reacts to their hesitation, then present a new scenario for the players to respond to.".to_string()
            }
            _ => OPENING_MESSAGE.to_string(),
        }
    }
}

impl AppState {
    /// Fetch a prompt and open the next round.
    ///
    /// The fetch happens outside the lock; the result is only applied if the
    /// room is still in the phase and round it was requested for. Fetch and
    /// apply run on their own task, so the pending flag is cleared even when
    /// the caller goes away mid-fetch.
    pub async fn start_round(&self, code: &str, now: DateTime<Utc>) -> GameResult<Game> {
        let (request, expected_phase, expected_round) = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(code)
                .ok_or_else(|| GameError::RoomNotFound(code.to_string()))?;

            if session.round_pending {
                return Err(GameError::Conflict);
            }
            let from = session.game.phase;
            if !Session::is_valid_phase_transition(&from, &GamePhase::SubmittingAnswers) {
                return Err(GameError::InvalidTransition {
                    from,
                    to: GamePhase::SubmittingAnswers,
                });
            }
            let min_players = session.game.config.min_players;
            if session.players.len() < min_players {
                return Err(GameError::Precondition(format!(
                    "At least {} player(s) must join first",
                    min_players
                )));
            }

            session.round_pending = true;
            let request = PromptRequest {
                session_id: session.prompt_session.clone(),
                message: session.prompt_message(),
            };
            (request, from, session.game.round_no)
        };

        let state = self.clone();
        let code = code.to_string();
        let task = tokio::spawn(async move {
            let reply = state.fetch_prompt(request).await;
            state
                .apply_prompt(&code, reply, expected_phase, expected_round, now)
                .await
        });

        task.await.unwrap_or_else(|e| {
            tracing::error!("Round start task failed: {}", e);
            Err(GameError::Conflict)
        })
    }

    async fn apply_prompt(
        &self,
        code: &str,
        reply: PromptReply,
        expected_phase: GamePhase,
        expected_round: u32,
        now: DateTime<Utc>,
    ) -> GameResult<Game> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(code)
            .ok_or_else(|| GameError::RoomNotFound(code.to_string()))?;
        session.round_pending = false;

        if session.game.phase != expected_phase || session.game.round_no != expected_round {
            tracing::warn!(
                "Discarding prompt for {}: room moved on to {:?} round {}",
                code,
                session.game.phase,
                session.game.round_no
            );
            return Err(GameError::Conflict);
        }

        if reply.session_id.is_some() {
            session.prompt_session = reply.session_id;
        }
        session.game.prompt = Some(reply.text);
        // The fetch may have taken a while; count the round's time from now
        session.enter_phase(GamePhase::SubmittingAnswers, now.max(Utc::now()))?;
        Ok(session.game.clone())
    }

    async fn fetch_prompt(&self, request: PromptRequest) -> PromptReply {
        match self.prompts.send(request).await {
            Ok(reply) if !reply.text.trim().is_empty() => PromptReply {
                text: reply.text.trim().to_string(),
                session_id: reply.session_id,
            },
            Ok(_) => {
                tracing::warn!("Prompt service returned an empty prompt, using fallback");
                PromptReply::fallback()
            }
            Err(e) => {
                tracing::error!("Prompt service failed: {}, using fallback", e);
                PromptReply::fallback()
            }
        }
    }

    /// Run one step of the phase driver for a room
    pub async fn tick_session(&self, code: &str, now: DateTime<Utc>) -> GameResult<Option<Advance>> {
        let advance = {
            let sessions = self.sessions.read().await;
            let session = sessions
                .get(code)
                .ok_or_else(|| GameError::RoomNotFound(code.to_string()))?;
            session.evaluate(now)
        };

        match advance {
            None => Ok(None),
            Some(Advance::To(GamePhase::SubmittingAnswers)) => {
                match self.start_round(code, now).await {
                    Ok(_) => Ok(Some(Advance::To(GamePhase::SubmittingAnswers))),
                    // Someone else started (or is starting) this round
                    Err(GameError::Conflict) | Err(GameError::InvalidTransition { .. }) => Ok(None),
                    Err(e) => Err(e),
                }
            }
            Some(Advance::To(phase)) => {
                let mut sessions = self.sessions.write().await;
                let session = sessions
                    .get_mut(code)
                    .ok_or_else(|| GameError::RoomNotFound(code.to_string()))?;

                // Re-check under the write lock
                if session.evaluate(now) != Some(Advance::To(phase)) {
                    return Ok(None);
                }
                session.enter_phase(phase, now)?;
                Ok(Some(Advance::To(phase)))
            }
            Some(Advance::Close) => Ok(self
                .close_session(code, "Game over")
                .await
                .map(|_| Advance::Close)),
        }
    }

    /// Tick every open room once
    pub async fn tick_all(&self, now: DateTime<Utc>) -> usize {
        let codes = self.session_codes().await;
        let results =
            futures::future::join_all(codes.iter().map(|code| self.tick_session(code, now))).await;

        results
            .into_iter()
            .zip(codes.iter())
            .filter_map(|(result, code)| match result {
                Ok(step) => step,
                Err(e) => {
                    tracing::debug!("Tick for {} failed: {}", code, e);
                    None
                }
            })
            .count()
    }
}
