use super::AppState;
use crate::error::{GameError, GameResult};
use crate::protocol::{AnswerView, PlayerView, ServerMessage, SessionSnapshot, SessionSummary};
use crate::types::*;
use chrono::Utc;
use rand::Rng;
use tokio::sync::broadcast;

/// Room codes are short and typed by hand, so only unambiguous letters (no I, L, O)
const CODE_CHARS: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ";
const CODE_LENGTH: usize = 4;
const MAX_CODE_ATTEMPTS: usize = 32;

fn generate_room_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_CHARS[rng.random_range(0..CODE_CHARS.len())] as char)
        .collect()
}

/// One room: the authoritative copy of `games/{code}`
pub struct Session {
    pub game: Game,
    /// Join order is the slot order on the host display
    pub players: Vec<Player>,
    /// Submission order, cleared at the start of every round
    pub answers: Vec<Answer>,
    /// Opaque conversation id handed back by the prompt service
    pub prompt_session: Option<String>,
    /// A prompt fetch for the next round is in flight
    pub(crate) round_pending: bool,
    next_answer_seq: u64,
    tx: broadcast::Sender<ServerMessage>,
    host_tx: broadcast::Sender<ServerMessage>,
}

impl Session {
    pub fn new(code: RoomCode, config: GameConfig) -> Self {
        let (tx, _rx) = broadcast::channel(100);
        let (host_tx, _host_rx) = broadcast::channel(100);
        Self {
            game: Game {
                code,
                version: 1,
                phase: GamePhase::Lobby,
                round_no: 0,
                prompt: None,
                phase_deadline: None,
                config,
                created_at: Utc::now(),
                last_winner: None,
                scored_round: None,
            },
            players: Vec::new(),
            answers: Vec::new(),
            prompt_session: None,
            round_pending: false,
            next_answer_seq: 0,
            tx,
            host_tx,
        }
    }

    pub fn code(&self) -> &str {
        &self.game.code
    }

    pub(crate) fn touch(&mut self) {
        self.game.version += 1;
    }

    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == player_id)
    }

    pub(crate) fn player_mut(&mut self, player_id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == player_id)
    }

    /// The answer a player submitted this round, if any
    pub fn answer_by(&self, player_id: &str) -> Option<&Answer> {
        self.answers.iter().find(|a| a.player_id == player_id)
    }

    pub(crate) fn next_seq(&mut self) -> u64 {
        self.next_answer_seq += 1;
        self.next_answer_seq
    }

    pub fn subscribe(&self, role: Role) -> broadcast::Receiver<ServerMessage> {
        match role {
            Role::Host => self.host_tx.subscribe(),
            Role::Player => self.tx.subscribe(),
        }
    }

    /// Send a message to every connection in the room
    pub fn announce(&self, msg: ServerMessage) {
        // No receivers is fine
        let _ = self.tx.send(msg.clone());
        let _ = self.host_tx.send(msg);
    }

    /// Send a message to the host connection only
    pub fn announce_host(&self, msg: ServerMessage) {
        let _ = self.host_tx.send(msg);
    }

    /// Push the current room state to players and host
    pub fn publish(&self) {
        let _ = self.tx.send(ServerMessage::Snapshot {
            snapshot: self.public_snapshot(),
        });
        let _ = self.host_tx.send(ServerMessage::Snapshot {
            snapshot: self.host_snapshot(),
        });
    }

    pub fn public_snapshot(&self) -> SessionSnapshot {
        self.snapshot(false)
    }

    pub fn host_snapshot(&self) -> SessionSnapshot {
        self.snapshot(true)
    }

    fn snapshot(&self, reveal_all: bool) -> SessionSnapshot {
        let phase = self.game.phase;
        let show_content = reveal_all
            || matches!(
                phase,
                GamePhase::Voting | GamePhase::FinishedVoting | GamePhase::GameOver
            );
        let show_results =
            reveal_all || matches!(phase, GamePhase::FinishedVoting | GamePhase::GameOver);

        let answers = if show_content {
            self.answers
                .iter()
                .map(|a| AnswerView {
                    id: a.id.clone(),
                    content: a.content.clone(),
                    player_id: show_results.then(|| a.player_id.clone()),
                    votes: show_results.then_some(a.votes),
                })
                .collect()
        } else {
            Vec::new()
        };

        let players = self
            .players
            .iter()
            .map(|p| PlayerView {
                id: p.id.clone(),
                name: p.name.clone(),
                score: p.score,
                has_voted: p.has_voted,
                has_answered: self.answer_by(&p.id).is_some(),
                start_game: p.start_game,
            })
            .collect();

        SessionSnapshot {
            code: self.game.code.clone(),
            state: phase,
            version: self.game.version,
            round_no: self.game.round_no,
            prompt: self.game.prompt.clone(),
            deadline: self.game.phase_deadline,
            players,
            answers,
            last_winner: self.game.last_winner.clone(),
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            code: self.game.code.clone(),
            phase: self.game.phase,
            round_no: self.game.round_no,
            player_count: self.players.len(),
            created_at: self.game.created_at,
        }
    }
}

impl AppState {
    /// Open a new room in the Lobby phase
    pub async fn create_session(&self) -> GameResult<Game> {
        self.create_session_subscribed().await.map(|(game, _)| game)
    }

    /// Open a new room with the host channel already subscribed
    pub async fn create_session_subscribed(
        &self,
    ) -> GameResult<(Game, broadcast::Receiver<ServerMessage>)> {
        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.max_sessions {
            tracing::warn!("Refusing to create session: {} already active", sessions.len());
            return Err(GameError::TooManySessions);
        }

        let code = (0..MAX_CODE_ATTEMPTS)
            .map(|_| generate_room_code())
            .find(|code| !sessions.contains_key(code))
            .ok_or(GameError::TooManySessions)?;

        let session = Session::new(code.clone(), self.config.clone());
        let game = session.game.clone();
        let rx = session.subscribe(Role::Host);
        sessions.insert(code.clone(), session);

        tracing::info!("Created session {}", code);
        Ok((game, rx))
    }

    /// Tear a room down, telling everyone connected to it first
    pub async fn close_session(&self, code: &str, reason: &str) -> Option<Game> {
        let session = self.sessions.write().await.remove(code)?;
        session.announce(ServerMessage::SessionClosed {
            code: code.to_string(),
            reason: reason.to_string(),
        });
        tracing::info!("Closed session {}: {}", code, reason);
        Some(session.game)
    }

    pub async fn get_game(&self, code: &str) -> Option<Game> {
        self.sessions.read().await.get(code).map(|s| s.game.clone())
    }

    pub async fn public_snapshot(&self, code: &str) -> Option<SessionSnapshot> {
        self.sessions
            .read()
            .await
            .get(code)
            .map(|s| s.public_snapshot())
    }

    pub async fn host_snapshot(&self, code: &str) -> Option<SessionSnapshot> {
        self.sessions.read().await.get(code).map(|s| s.host_snapshot())
    }

    pub async fn list_sessions(&self) -> Vec<SessionSummary> {
        let mut list: Vec<_> = self
            .sessions
            .read()
            .await
            .values()
            .map(|s| s.summary())
            .collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        list
    }

    /// Snapshot and subscription taken together, so nothing published in
    /// between is missed
    pub async fn attach(
        &self,
        code: &str,
        role: Role,
    ) -> Option<(SessionSnapshot, broadcast::Receiver<ServerMessage>)> {
        let sessions = self.sessions.read().await;
        let session = sessions.get(code)?;
        let snapshot = match role {
            Role::Host => session.host_snapshot(),
            Role::Player => session.public_snapshot(),
        };
        Some((snapshot, session.subscribe(role)))
    }

    pub async fn session_codes(&self) -> Vec<RoomCode> {
        self.sessions.read().await.keys().cloned().collect()
    }

    pub async fn subscribe(
        &self,
        code: &str,
        role: Role,
    ) -> Option<broadcast::Receiver<ServerMessage>> {
        self.sessions.read().await.get(code).map(|s| s.subscribe(role))
    }

    /// Link players open to join a room
    pub fn join_url(&self, code: &str) -> String {
        format!("{}/join/{}", self.public_url.trim_end_matches('/'), code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_code_alphabet() {
        for _ in 0..100 {
            let code = generate_room_code();
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(code.bytes().all(|b| CODE_CHARS.contains(&b)));
        }
    }

    #[test]
    fn test_public_snapshot_hides_answers_until_voting() {
        let mut session = Session::new("ABCD".to_string(), GameConfig::default());
        let ada = session.join("Ada", None, Utc::now()).unwrap();
        session.game.prompt = Some("A dragon blocks the bridge".to_string());
        session
            .enter_phase(GamePhase::SubmittingAnswers, Utc::now())
            .unwrap();
        session
            .submit_answer(&ada.id, "Offer it tea", Utc::now())
            .unwrap();

        let public = session.public_snapshot();
        assert!(public.answers.is_empty());
        assert!(public.players[0].has_answered);

        let host = session.host_snapshot();
        assert_eq!(host.answers.len(), 1);
        assert_eq!(host.answers[0].player_id.as_deref(), Some(ada.id.as_str()));

        session.enter_phase(GamePhase::Voting, Utc::now()).unwrap();
        let public = session.public_snapshot();
        assert_eq!(public.answers.len(), 1);
        assert!(public.answers[0].player_id.is_none());
        assert!(public.answers[0].votes.is_none());

        session
            .enter_phase(GamePhase::FinishedVoting, Utc::now())
            .unwrap();
        let public = session.public_snapshot();
        assert_eq!(public.answers[0].votes, Some(0));
    }

    #[test]
    fn test_join_url() {
        let mut state = AppState::new();
        state.public_url = "https://dungeon.example/".to_string();
        assert_eq!(state.join_url("WXYZ"), "https://dungeon.example/join/WXYZ");
    }
}
