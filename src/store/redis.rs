//! Redis-backed queue store
//!
//! Bucket queues are ZSETs (member = player id, score = rating) and tickets
//! are JSON values under `SET ... EX`, so a crashed process's entries age out
//! on their own. `DEL` returning 1 is the single-claim primitive match
//! creation relies on.

use crate::error::{ArenaError, Result};
use crate::store::QueueStore;
use crate::types::{PlayerId, QueueTicket};
use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use std::time::Duration;
use tracing::debug;

const QUEUE_KEY_PATTERN: &str = "mm:queue:*";

fn ticket_key(player_id: &str) -> String {
    format!("mm:ticket:{}", player_id)
}

fn store_err(context: &str, err: redis::RedisError) -> anyhow::Error {
    ArenaError::StoreFailure {
        message: format!("{}: {}", context, err),
    }
    .into()
}

/// `QueueStore` backed by a shared Redis instance
pub struct RedisQueueStore {
    client: Client,
}

impl RedisQueueStore {
    /// Create a store from a Redis URL, e.g. `redis://localhost:6379/0`.
    pub fn new(url: &str) -> Result<Self> {
        let client = Client::open(url).map_err(|e| store_err("invalid redis url", e))?;
        debug!("Redis queue store configured for {}", url);
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| store_err("connect", e))
    }
}

#[async_trait]
impl QueueStore for RedisQueueStore {
    async fn add_waiting(&self, key: &str, player_id: &PlayerId, rating: i32) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: () = conn
            .zadd(key, player_id, rating)
            .await
            .map_err(|e| store_err("zadd", e))?;
        Ok(())
    }

    async fn remove_waiting(&self, key: &str, player_id: &PlayerId) -> Result<bool> {
        let mut conn = self.connection().await?;
        let removed: i64 = conn
            .zrem(key, player_id)
            .await
            .map_err(|e| store_err("zrem", e))?;
        Ok(removed > 0)
    }

    async fn waiting_entries(&self, key: &str) -> Result<Vec<(PlayerId, i32)>> {
        let mut conn = self.connection().await?;
        let entries: Vec<(String, i32)> = conn
            .zrange_withscores(key, 0, -1)
            .await
            .map_err(|e| store_err("zrange", e))?;
        Ok(entries)
    }

    async fn queue_keys(&self) -> Result<Vec<String>> {
        let mut conn = self.connection().await?;
        let mut keys = Vec::new();
        let mut iter = conn
            .scan_match::<_, String>(QUEUE_KEY_PATTERN)
            .await
            .map_err(|e| store_err("scan", e))?;
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }
        Ok(keys)
    }

    async fn put_ticket(&self, ticket: &QueueTicket, ttl: Duration) -> Result<()> {
        let payload = serde_json::to_string(ticket)?;
        let mut conn = self.connection().await?;
        let _: () = conn
            .set_ex(ticket_key(&ticket.player_id), payload, ttl.as_secs())
            .await
            .map_err(|e| store_err("set_ex", e))?;
        Ok(())
    }

    async fn get_ticket(&self, player_id: &PlayerId) -> Result<Option<QueueTicket>> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn
            .get(ticket_key(player_id))
            .await
            .map_err(|e| store_err("get", e))?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn remove_ticket(&self, player_id: &PlayerId) -> Result<bool> {
        let mut conn = self.connection().await?;
        let removed: i64 = conn
            .del(ticket_key(player_id))
            .await
            .map_err(|e| store_err("del", e))?;
        Ok(removed > 0)
    }
}
