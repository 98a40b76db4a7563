//! External collaborator interfaces
//!
//! The account/profile document store and the push messaging service are
//! out of scope; the core talks to them through these traits. All calls are
//! fire-and-forget from the core's perspective: failures are logged by the
//! caller and never block matchmaking or match teardown.

use crate::error::{ArenaError, Result};
use crate::types::{Difficulty, EndReason, PlayerId, RoomId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// Durable player profile as read from the account store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub player_id: PlayerId,
    pub username: String,
    pub rating: i32,
    pub preferred_difficulty: Difficulty,
    pub preferred_time_limit_seconds: u32,
}

/// Read access to durable player profiles
#[async_trait]
pub trait PlayerDirectory: Send + Sync {
    async fn profile(&self, player_id: &PlayerId) -> Result<Option<PlayerProfile>>;
}

/// A completed match as persisted to the document store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    pub room_id: RoomId,
    pub player1: PlayerId,
    pub player2: PlayerId,
    pub score_player1: u32,
    pub score_player2: u32,
    pub winner: Option<PlayerId>,
    pub end_reason: EndReason,
    pub duration_seconds: u64,
    pub played_at: DateTime<Utc>,
}

/// Write access for completed match records
#[async_trait]
pub trait MatchStore: Send + Sync {
    async fn record_match(&self, record: MatchRecord) -> Result<()>;
}

/// Push notifications delivered out-of-band (mobile push, in-app alerts)
#[async_trait]
pub trait PushNotifier: Send + Sync {
    async fn notify_match_found(&self, player_id: &PlayerId, opponent_name: &str) -> Result<()>;
    async fn notify_opponent_disconnected(&self, player_id: &PlayerId) -> Result<()>;
}

/// In-memory directory seeded by tests and the queue-tester binary
#[derive(Debug, Default)]
pub struct InMemoryPlayerDirectory {
    profiles: Mutex<HashMap<PlayerId, PlayerProfile>>,
}

impl InMemoryPlayerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, profile: PlayerProfile) {
        if let Ok(mut profiles) = self.profiles.lock() {
            profiles.insert(profile.player_id.clone(), profile);
        }
    }
}

#[async_trait]
impl PlayerDirectory for InMemoryPlayerDirectory {
    async fn profile(&self, player_id: &PlayerId) -> Result<Option<PlayerProfile>> {
        let profiles = self.profiles.lock().map_err(|_| ArenaError::InternalError {
            message: "Failed to acquire directory lock".to_string(),
        })?;
        Ok(profiles.get(player_id).cloned())
    }
}

/// In-memory match store that keeps records for assertions
#[derive(Debug, Default)]
pub struct InMemoryMatchStore {
    records: Mutex<Vec<MatchRecord>>,
}

impl InMemoryMatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<MatchRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl MatchStore for InMemoryMatchStore {
    async fn record_match(&self, record: MatchRecord) -> Result<()> {
        let mut records = self.records.lock().map_err(|_| ArenaError::InternalError {
            message: "Failed to acquire match store lock".to_string(),
        })?;
        records.push(record);
        Ok(())
    }
}

/// Notifier that records pushes instead of delivering them
#[derive(Debug, Default)]
pub struct RecordingPushNotifier {
    pushes: Mutex<Vec<(PlayerId, String)>>,
}

impl RecordingPushNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pushes(&self) -> Vec<(PlayerId, String)> {
        self.pushes.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PushNotifier for RecordingPushNotifier {
    async fn notify_match_found(&self, player_id: &PlayerId, opponent_name: &str) -> Result<()> {
        if let Ok(mut pushes) = self.pushes.lock() {
            pushes.push((player_id.clone(), format!("match-found:{}", opponent_name)));
        }
        Ok(())
    }

    async fn notify_opponent_disconnected(&self, player_id: &PlayerId) -> Result<()> {
        if let Ok(mut pushes) = self.pushes.lock() {
            pushes.push((player_id.clone(), "opponent-disconnected".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::current_timestamp;

    #[tokio::test]
    async fn test_directory_lookup() {
        let directory = InMemoryPlayerDirectory::new();
        directory.insert(PlayerProfile {
            player_id: "p1".to_string(),
            username: "alice".to_string(),
            rating: 1340,
            preferred_difficulty: Difficulty::Hard,
            preferred_time_limit_seconds: 90,
        });

        let profile = directory.profile(&"p1".to_string()).await.unwrap().unwrap();
        assert_eq!(profile.username, "alice");
        assert!(directory.profile(&"p2".to_string()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_match_store_records() {
        let store = InMemoryMatchStore::new();
        store
            .record_match(MatchRecord {
                room_id: "r1".to_string(),
                player1: "a".to_string(),
                player2: "b".to_string(),
                score_player1: 12,
                score_player2: 8,
                winner: Some("a".to_string()),
                end_reason: EndReason::Normal,
                duration_seconds: 60,
                played_at: current_timestamp(),
            })
            .await
            .unwrap();

        let records = store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].winner.as_deref(), Some("a"));
    }
}
