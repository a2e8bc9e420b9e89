use crate::types::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a room. Passing a known `player_id` resumes that player.
    Join {
        code: RoomCode,
        name: String,
        #[serde(default)]
        player_id: Option<PlayerId>,
    },
    RequestStart,
    SubmitAnswer {
        text: String,
    },
    Vote {
        answer_id: AnswerId,
    },
    // Host-only messages
    HostCreateSession,
    HostAttach {
        code: RoomCode,
    },
    HostTransitionPhase {
        phase: GamePhase,
    },
    HostEndGame,
    HostCloseSession,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        protocol: String,
        role: Role,
        server_now: DateTime<Utc>,
    },
    SessionCreated {
        game: Game,
        join_url: String,
    },
    Joined {
        player: Player,
        snapshot: SessionSnapshot,
    },
    /// Whole-room state, re-sent after every change
    Snapshot {
        snapshot: SessionSnapshot,
    },
    Phase {
        phase: GamePhase,
        round_no: u32,
        prompt: Option<String>,
        deadline: Option<DateTime<Utc>>,
        server_now: DateTime<Utc>,
        valid_transitions: Vec<GamePhase>,
    },
    AnswerAccepted {
        answer_id: AnswerId,
    },
    /// `votes` is only filled in on the host channel
    VoteAccepted {
        answer_id: AnswerId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        votes: Option<u32>,
    },
    RoundResult {
        round_no: u32,
        winner: Option<RoundWinner>,
    },
    SessionClosed {
        code: RoomCode,
        reason: String,
    },
    Error {
        code: String,
        msg: String,
    },
}

impl ServerMessage {
    pub fn error(code: impl Into<String>, msg: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.into(),
            msg: msg.into(),
        }
    }
}

impl From<crate::error::GameError> for ServerMessage {
    fn from(e: crate::error::GameError) -> Self {
        ServerMessage::error(e.code(), e.to_string())
    }
}

/// The `games/{code}` subtree as seen by one audience (players or host)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSnapshot {
    pub code: RoomCode,
    pub state: GamePhase,
    pub version: u64,
    pub round_no: u32,
    pub prompt: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub players: Vec<PlayerView>,
    pub answers: Vec<AnswerView>,
    pub last_winner: Option<RoundWinner>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
    pub score: u32,
    pub has_voted: bool,
    pub has_answered: bool,
    pub start_game: bool,
}

/// Answer as published; author and votes stay hidden until results
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerView {
    pub id: AnswerId,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_id: Option<PlayerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub votes: Option<u32>,
}

/// Short room listing for the host API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub code: RoomCode,
    pub phase: GamePhase,
    pub round_no: u32,
    pub player_count: usize,
    pub created_at: DateTime<Utc>,
}
