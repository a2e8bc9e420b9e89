use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque ID types for readability
pub type RoomCode = String;
pub type PlayerId = String;
pub type AnswerId = String;

/// Room codes are typed by hand; accept any case and stray whitespace
pub fn normalize_code(code: &str) -> RoomCode {
    code.trim().to_uppercase()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum GamePhase {
    /// No room joined yet (client side) / host main menu
    PreGame,
    Lobby,
    SubmittingAnswers,
    Voting,
    FinishedVoting,
    GameOver,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameConfig {
    pub max_players: usize,
    pub min_players: usize,
    pub answer_seconds: u32,
    pub voting_seconds: u32,
    /// How long results (and the final GameOver screen) stay up
    pub results_seconds: u32,
    pub win_points: u32,
    pub max_answer_chars: usize,
    pub max_name_chars: usize,
    /// None = play until the host ends the game
    pub max_rounds: Option<u32>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            max_players: 8,
            min_players: 1,
            answer_seconds: 30,
            voting_seconds: 30,
            results_seconds: 10,
            win_points: 1000,
            max_answer_chars: 300,
            max_name_chars: 24,
            max_rounds: None,
        }
    }
}

impl GameConfig {
    /// Load game rules from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_players = env_parse("MAX_PLAYERS", defaults.max_players).max(1);
        let min_players = env_parse("MIN_PLAYERS", defaults.min_players).clamp(1, max_players);

        let max_rounds = std::env::var("MAX_ROUNDS")
            .ok()
            .and_then(|s| s.trim().parse::<u32>().ok())
            .filter(|n| *n > 0);

        Self {
            max_players,
            min_players,
            answer_seconds: env_parse("ANSWER_SECONDS", defaults.answer_seconds),
            voting_seconds: env_parse("VOTING_SECONDS", defaults.voting_seconds),
            results_seconds: env_parse("RESULTS_SECONDS", defaults.results_seconds),
            win_points: env_parse("WIN_POINTS", defaults.win_points),
            max_answer_chars: env_parse("MAX_ANSWER_CHARS", defaults.max_answer_chars),
            max_name_chars: env_parse("MAX_NAME_CHARS", defaults.max_name_chars),
            max_rounds,
        }
    }
}

/// Parse an env var, logging and falling back to `default` when it is unusable
pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy + std::fmt::Debug,
{
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Invalid {} '{}', using default {:?}", key, raw, default);
                default
            }
        },
        Err(_) => default,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub code: RoomCode,
    pub version: u64,
    pub phase: GamePhase,
    pub round_no: u32,
    pub prompt: Option<String>,
    pub phase_deadline: Option<DateTime<Utc>>,
    pub config: GameConfig,
    pub created_at: DateTime<Utc>,
    /// Winner of the most recently scored round
    pub last_winner: Option<RoundWinner>,
    /// Round number that has already been scored (scoring is idempotent)
    pub scored_round: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub score: u32,
    pub has_voted: bool,
    /// Transient "please start" request, cleared when the round starts
    pub start_game: bool,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    pub id: AnswerId,
    pub player_id: PlayerId,
    pub content: String,
    pub votes: u32,
    /// Submission order within the round, used to break vote ties
    pub seq: u64,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundWinner {
    pub round_no: u32,
    pub answer_id: AnswerId,
    pub player_id: PlayerId,
    pub player_name: String,
    pub content: String,
    pub votes: u32,
    pub points: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Player,
}
