//! In-memory queue store for tests and single-process deployments

use crate::error::{ArenaError, Result};
use crate::store::QueueStore;
use crate::types::{PlayerId, QueueTicket};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct TicketEntry {
    ticket: QueueTicket,
    expires_at: Instant,
}

#[derive(Default)]
struct Inner {
    queues: HashMap<String, Vec<(PlayerId, i32)>>,
    tickets: HashMap<PlayerId, TicketEntry>,
}

/// Process-local `QueueStore`. Ticket expiry is checked lazily on read, the
/// same observable behavior a TTL key gives.
#[derive(Default)]
pub struct InMemoryQueueStore {
    inner: Mutex<Inner>,
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| {
            ArenaError::InternalError {
                message: "Failed to acquire queue store lock".to_string(),
            }
            .into()
        })
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn add_waiting(&self, key: &str, player_id: &PlayerId, rating: i32) -> Result<()> {
        let mut inner = self.lock()?;
        let queue = inner.queues.entry(key.to_string()).or_default();
        queue.retain(|(id, _)| id != player_id);
        queue.push((player_id.clone(), rating));
        queue.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        Ok(())
    }

    async fn remove_waiting(&self, key: &str, player_id: &PlayerId) -> Result<bool> {
        let mut inner = self.lock()?;
        let Some(queue) = inner.queues.get_mut(key) else {
            return Ok(false);
        };
        let before = queue.len();
        queue.retain(|(id, _)| id != player_id);
        Ok(queue.len() != before)
    }

    async fn waiting_entries(&self, key: &str) -> Result<Vec<(PlayerId, i32)>> {
        let inner = self.lock()?;
        Ok(inner.queues.get(key).cloned().unwrap_or_default())
    }

    async fn queue_keys(&self) -> Result<Vec<String>> {
        let inner = self.lock()?;
        Ok(inner
            .queues
            .iter()
            .filter(|(_, queue)| !queue.is_empty())
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn put_ticket(&self, ticket: &QueueTicket, ttl: Duration) -> Result<()> {
        let mut inner = self.lock()?;
        inner.tickets.insert(
            ticket.player_id.clone(),
            TicketEntry {
                ticket: ticket.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get_ticket(&self, player_id: &PlayerId) -> Result<Option<QueueTicket>> {
        let mut inner = self.lock()?;
        match inner.tickets.get(player_id) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.ticket.clone())),
            Some(_) => {
                inner.tickets.remove(player_id);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn remove_ticket(&self, player_id: &PlayerId) -> Result<bool> {
        let mut inner = self.lock()?;
        match inner.tickets.remove(player_id) {
            Some(entry) => Ok(entry.expires_at > Instant::now()),
            None => Ok(false),
        }
    }
}
