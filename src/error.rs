//! Error types for the quiz-arena service
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific matchmaking and match lifecycle scenarios
#[derive(Debug, thiserror::Error)]
pub enum ArenaError {
    #[error("Player not found: {player_id}")]
    PlayerNotFound { player_id: String },

    #[error("Game room not found: {room_id}")]
    RoomNotFound { room_id: String },

    #[error("Player {player_id} already answered question {index}")]
    AlreadyAnswered { player_id: String, index: usize },

    #[error("Game is not active: {room_id}")]
    GameNotActive { room_id: String },

    #[error("No questions available for difficulty {difficulty}, level {level}")]
    NoQuestionsAvailable { difficulty: String, level: u8 },

    #[error("Match already claimed for {player_id}")]
    DuplicateMatchAttempt { player_id: String },

    #[error("Player {player_id} is already in a game")]
    AlreadyInGame { player_id: String },

    #[error("Queue store operation failed: {message}")]
    StoreFailure { message: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}
