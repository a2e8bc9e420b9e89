use crate::types::{GamePhase, RoomCode};

/// Errors produced by game operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GameError {
    #[error("That room does not exist: {0}")]
    RoomNotFound(RoomCode),

    #[error("This game has ended")]
    GameOver,

    #[error("Room is full ({0} players)")]
    RoomFull(usize),

    #[error("Player not found")]
    PlayerNotFound,

    #[error("Answer not found")]
    AnswerNotFound,

    #[error("Please enter your name")]
    EmptyName,

    #[error("Name is longer than {0} characters")]
    NameTooLong(usize),

    #[error("Please enter an answer")]
    EmptyAnswer,

    #[error("Answer is longer than {0} characters")]
    AnswerTooLong(usize),

    #[error("You already answered this round")]
    AlreadyAnswered,

    #[error("You already voted this round")]
    AlreadyVoted,

    #[error("You cannot vote for your own answer")]
    SelfVote,

    #[error("Not allowed while the game is in {0:?}")]
    WrongPhase(GamePhase),

    #[error("Invalid phase transition from {from:?} to {to:?}")]
    InvalidTransition { from: GamePhase, to: GamePhase },

    #[error("{0}")]
    Precondition(String),

    #[error("Too many active sessions")]
    TooManySessions,

    #[error("Room changed while the request was in flight")]
    Conflict,
}

impl GameError {
    /// Stable error code sent to clients
    pub fn code(&self) -> &'static str {
        match self {
            GameError::RoomNotFound(_) => "ROOM_NOT_FOUND",
            GameError::GameOver => "GAME_OVER",
            GameError::RoomFull(_) => "ROOM_FULL",
            GameError::PlayerNotFound => "PLAYER_NOT_FOUND",
            GameError::AnswerNotFound => "ANSWER_NOT_FOUND",
            GameError::EmptyName => "EMPTY_NAME",
            GameError::NameTooLong(_) => "NAME_TOO_LONG",
            GameError::EmptyAnswer => "EMPTY_ANSWER",
            GameError::AnswerTooLong(_) => "ANSWER_TOO_LONG",
            GameError::AlreadyAnswered => "ALREADY_ANSWERED",
            GameError::AlreadyVoted => "ALREADY_VOTED",
            GameError::SelfVote => "SELF_VOTE",
            GameError::WrongPhase(_) => "WRONG_PHASE",
            GameError::InvalidTransition { .. } => "INVALID_TRANSITION",
            GameError::Precondition(_) => "PRECONDITION_FAILED",
            GameError::TooManySessions => "TOO_MANY_SESSIONS",
            GameError::Conflict => "CONFLICT",
        }
    }
}

pub type GameResult<T> = Result<T, GameError>;
