//! Error types shared by the game server and its HTTP surface.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::types::GameStatus;
use crate::validation::ValidationError;

/// Result type for game operations
pub type GameResult<T> = Result<T, GameError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GameError {
    #[error("session {0} not found")]
    SessionNotFound(String),

    #[error("player {0} is not in this session")]
    PlayerNotInSession(String),

    #[error("session is not accepting new players")]
    NotAcceptingPlayers,

    #[error("player {0} is already in this session")]
    AlreadyInSession(String),

    #[error("session is full ({0} players)")]
    SessionFull(usize),

    #[error("single player session already has a player")]
    SinglePlayerTaken,

    #[error("session is {actual}, expected {expected}")]
    InvalidStatus {
        expected: GameStatus,
        actual: GameStatus,
    },

    #[error("multiplayer game needs at least 2 players")]
    NotEnoughPlayers,

    #[error("no door is currently presented")]
    NoActiveDoor,

    #[error("player has already responded to this door")]
    AlreadyResponded,

    #[error("session has already completed")]
    SessionCompleted,

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl GameError {
    /// Stable wire code used by the REST and realtime error payloads
    pub fn code(&self) -> &'static str {
        match self {
            GameError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            GameError::PlayerNotInSession(_) => "PLAYER_NOT_IN_SESSION",
            GameError::NotAcceptingPlayers => "NOT_ACCEPTING_PLAYERS",
            GameError::AlreadyInSession(_) => "ALREADY_IN_SESSION",
            GameError::SessionFull(_) => "SESSION_FULL",
            GameError::SinglePlayerTaken => "SINGLE_PLAYER_TAKEN",
            GameError::InvalidStatus { .. } => "INVALID_STATUS",
            GameError::NotEnoughPlayers => "NOT_ENOUGH_PLAYERS",
            GameError::NoActiveDoor => "NO_ACTIVE_DOOR",
            GameError::AlreadyResponded => "ALREADY_RESPONDED",
            GameError::SessionCompleted => "SESSION_COMPLETED",
            GameError::Validation(_) => "VALIDATION_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GameError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            GameError::PlayerNotInSession(_) => StatusCode::FORBIDDEN,
            GameError::Validation(_) => StatusCode::BAD_REQUEST,
            GameError::AlreadyInSession(_)
            | GameError::SessionFull(_)
            | GameError::SinglePlayerTaken
            | GameError::AlreadyResponded => StatusCode::CONFLICT,
            GameError::NotAcceptingPlayers
            | GameError::InvalidStatus { .. }
            | GameError::NotEnoughPlayers
            | GameError::NoActiveDoor
            | GameError::SessionCompleted => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl IntoResponse for GameError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {} ({})", self, self.code());
        }
        let body = Json(json!({
            "success": false,
            "error": self.code(),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}
