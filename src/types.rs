//! Common types used throughout the quiz-arena service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for players (durable identity, issued by the account store)
pub type PlayerId = String;

/// Identifier for a live client connection
pub type ConnectionId = String;

/// Unique identifier for game rooms, derived from participants + creation time
pub type RoomId = String;

/// Difficulty tier a player queues for and a room plays at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "easy"),
            Difficulty::Medium => write!(f, "medium"),
            Difficulty::Hard => write!(f, "hard"),
        }
    }
}

impl std::str::FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty: {}", other)),
        }
    }
}

/// An online player as tracked by the registry. Ephemeral; the durable
/// profile lives behind the `PlayerDirectory` collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnlinePlayer {
    pub id: PlayerId,
    pub connection: ConnectionId,
    pub username: String,
    /// Durable rating snapshot taken at registration time
    pub rating: i32,
    pub difficulty: Difficulty,
    /// Preferred match length in seconds
    pub time_limit_seconds: u32,
    /// Preferred question category tags (empty = any)
    pub tags: Vec<String>,
    pub in_game: bool,
    pub joined_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl OnlinePlayer {
    /// Compact identity/rating view used in event payloads
    pub fn brief(&self) -> PlayerBrief {
        PlayerBrief {
            id: self.id.clone(),
            username: self.username.clone(),
            rating: self.rating,
        }
    }
}

/// Compact player view embedded in outbound events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerBrief {
    pub id: PlayerId,
    pub username: String,
    pub rating: i32,
}

/// Metadata record for a waiting player. Lives only in the shared queue
/// store, under a TTL; one per identity system-wide.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueTicket {
    pub player_id: PlayerId,
    pub rating: i32,
    pub difficulty: Difficulty,
    pub time_limit_seconds: u32,
    pub enqueued_at: DateTime<Utc>,
}

/// A quiz question drawn from the preloaded pool. Immutable once drawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub prompt: String,
    pub operand_a: String,
    pub operand_b: String,
    pub answer: String,
    /// Operator/category tags, e.g. "sum", "quotient"
    pub tags: Vec<String>,
    /// Intrinsic difficulty level, 1–10
    pub level: u8,
    pub difficulty: Difficulty,
}

/// Lifecycle states of a game room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameState {
    Waiting,
    Active,
    Completed,
}

/// Why a match ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndReason {
    Normal,
    OpponentDisconnect,
    Stale,
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndReason::Normal => write!(f, "normal"),
            EndReason::OpponentDisconnect => write!(f, "opponent-disconnect"),
            EndReason::Stale => write!(f, "stale"),
        }
    }
}

/// Per-player scoring state inside a match
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub score: u32,
    pub correct_answers: u32,
    /// Total elapsed answer time in milliseconds
    pub total_time_ms: u64,
    pub streak: u32,
    pub best_streak: u32,
    pub questions_answered: u32,
}

/// A single recorded answer for one (question index, player) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub answer: String,
    pub correct: bool,
    pub time_spent_ms: u64,
    pub submitted_at: DateTime<Utc>,
}

/// Final per-player outcome of a finished match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerResult {
    pub player_id: PlayerId,
    pub username: String,
    pub rating_before: i32,
    pub rating_delta: i32,
    pub final_score: u32,
    pub correct_answers: u32,
    pub total_time_ms: u64,
    pub best_streak: u32,
    pub won: bool,
}

/// Final outcome of a finished match, handed to persistence and to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameResults {
    pub room_id: RoomId,
    pub winner: PlayerId,
    pub players: Vec<PlayerResult>,
    pub duration_ms: u64,
    pub end_reason: EndReason,
    pub final_meter: u32,
}

/// Public summary of a room, sent with match-found
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSummary {
    pub id: RoomId,
    pub players: Vec<PlayerBrief>,
    pub created_at: DateTime<Utc>,
    pub state: GameState,
    pub question_meter: u32,
    pub difficulty: Difficulty,
}

/// Point-in-time view of a running match, for state requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub room_id: RoomId,
    pub state: GameState,
    pub progress: std::collections::HashMap<PlayerId, usize>,
    pub scores: std::collections::HashMap<PlayerId, ScoreRecord>,
    pub question_meter: u32,
    pub time_remaining_ms: u64,
}

/// Aggregate view of the matchmaking queue (debug/status event)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatus {
    pub total_waiting: usize,
    pub average_wait_seconds: u64,
    pub waiting: Vec<WaitingEntry>,
}

/// One waiting player in the queue status payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitingEntry {
    pub player_id: PlayerId,
    pub rating: i32,
    pub difficulty: Difficulty,
    pub wait_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_difficulty_roundtrip() {
        for (text, diff) in [
            ("easy", Difficulty::Easy),
            ("medium", Difficulty::Medium),
            ("hard", Difficulty::Hard),
        ] {
            assert_eq!(text.parse::<Difficulty>().unwrap(), diff);
            assert_eq!(diff.to_string(), text);
        }
        assert!("extreme".parse::<Difficulty>().is_err());
    }

    #[test]
    fn test_end_reason_display() {
        assert_eq!(
            EndReason::OpponentDisconnect.to_string(),
            "opponent-disconnect"
        );
        assert_eq!(EndReason::Normal.to_string(), "normal");
    }
}
