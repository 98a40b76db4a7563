//! Outbound events and their delivery seam
//!
//! The wire transport is out of scope; each connected player is assumed to
//! have a bidirectional event channel. Everything the core needs to tell a
//! client goes through the `EventSink` trait as an `OutboundEvent`.

pub mod sink;

pub use sink::{ChannelEventSink, EventSink, RecordingEventSink};

use crate::types::{
    EndReason, GameResults, GameSnapshot, PlayerBrief, PlayerId, Question, QueueStatus,
    RoomSummary,
};
use serde::{Deserialize, Serialize};

/// Events delivered to a single client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OutboundEvent {
    PlayerRegistered {
        player: PlayerBrief,
    },
    LobbyJoined {
        player: PlayerBrief,
    },
    MatchFound {
        room: RoomSummary,
        opponent: PlayerBrief,
        my_player_id: PlayerId,
        initial_question_meter: u32,
    },
    GameStarted {
        state: GameSnapshot,
        question: Question,
        question_index: usize,
    },
    NextQuestion {
        question: Question,
        question_index: usize,
        state: GameSnapshot,
        question_meter: u32,
    },
    OpponentScoreUpdate {
        opponent_id: PlayerId,
        score: u32,
        correct_answers: u32,
    },
    SearchCancelled,
    GameEnded {
        reason: EndReason,
        results: GameResults,
    },
    GameStateUpdate {
        state: GameSnapshot,
        current_question: Option<Question>,
    },
    QueueStatus(QueueStatus),
    Error {
        message: String,
    },
}

impl OutboundEvent {
    /// Short name used by tests and logs
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundEvent::PlayerRegistered { .. } => "player-registered",
            OutboundEvent::LobbyJoined { .. } => "lobby-joined",
            OutboundEvent::MatchFound { .. } => "match-found",
            OutboundEvent::GameStarted { .. } => "game-started",
            OutboundEvent::NextQuestion { .. } => "next-question",
            OutboundEvent::OpponentScoreUpdate { .. } => "opponent-score-update",
            OutboundEvent::SearchCancelled => "search-cancelled",
            OutboundEvent::GameEnded { .. } => "game-ended",
            OutboundEvent::GameStateUpdate { .. } => "game-state-update",
            OutboundEvent::QueueStatus(_) => "queue-status",
            OutboundEvent::Error { .. } => "error",
        }
    }
}
