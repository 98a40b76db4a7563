//! Shared matchmaking queue store
//!
//! Queue state that must be visible across server processes lives in a
//! shared, low-latency store: one ordered set per
//! (difficulty, time-limit, rating-bucket) plus one expiring ticket record
//! per waiting player. The ticket TTL is the self-healing mechanism against
//! crashed holders; the sweep removes ordered-set members whose ticket is
//! gone.

pub mod memory;
pub mod redis;

pub use self::memory::InMemoryQueueStore;
pub use self::redis::RedisQueueStore;

use crate::error::Result;
use crate::types::{PlayerId, QueueTicket};
use async_trait::async_trait;
use std::time::Duration;

/// Operations the matchmaking coordinator needs from the shared store.
///
/// Implementations must make `remove_ticket` atomic: at most one caller may
/// observe `true` for a given ticket, which is what makes match creation
/// at-most-once across racing processes.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Add a waiting player to a bucket queue, scored by rating.
    async fn add_waiting(&self, key: &str, player_id: &PlayerId, rating: i32) -> Result<()>;

    /// Remove a player from a bucket queue. Returns whether a member was removed.
    async fn remove_waiting(&self, key: &str, player_id: &PlayerId) -> Result<bool>;

    /// All members of a bucket queue, ordered by score (rating) ascending.
    async fn waiting_entries(&self, key: &str) -> Result<Vec<(PlayerId, i32)>>;

    /// All bucket queue keys currently known to the store.
    async fn queue_keys(&self) -> Result<Vec<String>>;

    /// Write a player's ticket with the given TTL, replacing any prior one.
    async fn put_ticket(&self, ticket: &QueueTicket, ttl: Duration) -> Result<()>;

    /// Read a player's ticket, if present and not expired.
    async fn get_ticket(&self, player_id: &PlayerId) -> Result<Option<QueueTicket>>;

    /// Delete a player's ticket. Returns whether a live ticket was deleted;
    /// a `false` here means someone else already claimed the player.
    async fn remove_ticket(&self, player_id: &PlayerId) -> Result<bool>;
}
