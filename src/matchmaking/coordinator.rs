//! Match coordination: admission, staged expansion, at-most-once creation

use crate::error::{ArenaError, Result};
use crate::events::{EventSink, OutboundEvent};
use crate::game::GameDriver;
use crate::matchmaking::bucket::{bucket_for, queue_key, scope_buckets, SearchScope, BUCKET_COUNT};
use crate::metrics::MetricsCollector;
use crate::persistence::PushNotifier;
use crate::registry::PlayerRegistry;
use crate::store::QueueStore;
use crate::types::{
    Difficulty, OnlinePlayer, PlayerId, QueueStatus, QueueTicket, RoomId, WaitingEntry,
};
use crate::utils::{current_timestamp, rating_difference};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

/// Coordinator policy knobs
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// TTL on the per-player ticket record; the self-healing bound on
    /// entries orphaned by crashed processes
    pub ticket_ttl: Duration,
    /// Delay before the search widens to adjacent buckets
    pub first_expansion_delay: Duration,
    /// Delay (from enqueue) before the search widens to all buckets
    pub full_expansion_delay: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            ticket_ttl: Duration::from_secs(180),
            first_expansion_delay: Duration::from_secs(2),
            full_expansion_delay: Duration::from_secs(8),
        }
    }
}

/// Result of an enqueue call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// An opponent was already waiting; the match was created immediately
    Matched(RoomId),
    /// No compatible opponent yet; the player is now waiting
    Queued,
}

#[derive(Clone)]
struct PendingSearch {
    player: OnlinePlayer,
    enqueued_at: DateTime<Utc>,
}

/// Orchestrates queue admission, pairing and search expansion.
///
/// The pending-search table is the in-process "callback" registry: an entry
/// exists exactly while a search is live, and consuming it is what makes the
/// match-found notification fire at most once per search.
pub struct MatchCoordinator {
    store: Arc<dyn QueueStore>,
    registry: Arc<PlayerRegistry>,
    driver: Arc<GameDriver>,
    events: Arc<dyn EventSink>,
    notifier: Arc<dyn PushNotifier>,
    metrics: Arc<MetricsCollector>,
    config: CoordinatorConfig,
    pending: Mutex<HashMap<PlayerId, PendingSearch>>,
    /// Serializes scan + claim + queue-insert so two in-process searches
    /// cannot pair against the same opponent or miss each other
    pairing: AsyncMutex<()>,
}

impl MatchCoordinator {
    pub fn new(
        store: Arc<dyn QueueStore>,
        registry: Arc<PlayerRegistry>,
        driver: Arc<GameDriver>,
        events: Arc<dyn EventSink>,
        notifier: Arc<dyn PushNotifier>,
        metrics: Arc<MetricsCollector>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            store,
            registry,
            driver,
            events,
            notifier,
            metrics,
            config,
            pending: Mutex::new(HashMap::new()),
            pairing: AsyncMutex::new(()),
        }
    }

    fn pending_lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<PlayerId, PendingSearch>>> {
        self.pending.lock().map_err(|_| {
            ArenaError::InternalError {
                message: "Failed to acquire pending-search lock".to_string(),
            }
            .into()
        })
    }

    fn is_searching(&self, player_id: &PlayerId) -> bool {
        self.pending
            .lock()
            .map(|p| p.contains_key(player_id))
            .unwrap_or(false)
    }

    fn update_waiting_gauge(&self) {
        if let Ok(pending) = self.pending.lock() {
            self.metrics.queue().players_waiting.set(pending.len() as i64);
        }
    }

    /// Admit a player into matchmaking. Tries the immediate match first;
    /// otherwise inserts the player into the bucket queue and schedules the
    /// staged expansion. A repeated enqueue replaces the previous search.
    pub async fn enqueue(self: Arc<Self>, player: OnlinePlayer) -> Result<EnqueueOutcome> {
        if self.driver.rooms().has_valid_room(&player.id)? {
            return Err(ArenaError::AlreadyInGame {
                player_id: player.id.clone(),
            }
            .into());
        }

        // Uniqueness invariant: at most one queue entry per identity
        self.remove_search(&player.id).await?;

        self.metrics.queue().players_queued_total.inc();
        let search = PendingSearch {
            player: player.clone(),
            enqueued_at: current_timestamp(),
        };
        self.pending_lock()?
            .insert(player.id.clone(), search.clone());

        let outcome = self.immediate_or_queue(&search).await;
        match &outcome {
            Ok(EnqueueOutcome::Matched(room_id)) => {
                info!("Immediate match for {}: room {}", player.id, room_id);
            }
            Ok(EnqueueOutcome::Queued) => {
                debug!(
                    "Player {} queued (rating {}, {} {}s)",
                    player.id, player.rating, player.difficulty, player.time_limit_seconds
                );
                Arc::clone(&self).spawn_staged_expansion(player);
            }
            Err(_) => {
                // Admission failed midway; drop the pending entry again
                self.pending_lock()?.remove(&player.id);
            }
        }
        self.update_waiting_gauge();
        outcome
    }

    /// Under the pairing lock: scan the own bucket, and either create the
    /// match or insert the player into the queue. Ticket-before-queue-entry
    /// ordering keeps an entry from ever being visible without metadata.
    async fn immediate_or_queue(&self, search: &PendingSearch) -> Result<EnqueueOutcome> {
        let _guard = self.pairing.lock().await;
        let player = &search.player;

        if let Some((opponent_id, opponent_ticket)) = self
            .scan_for_opponent(player, SearchScope::OwnBucket)
            .await?
        {
            if let Some(room_id) = self
                .create_match(search, &opponent_id, &opponent_ticket, "immediate")
                .await?
            {
                return Ok(EnqueueOutcome::Matched(room_id));
            }
        }

        let ticket = QueueTicket {
            player_id: player.id.clone(),
            rating: player.rating,
            difficulty: player.difficulty,
            time_limit_seconds: player.time_limit_seconds,
            enqueued_at: search.enqueued_at,
        };
        self.store.put_ticket(&ticket, self.config.ticket_ttl).await?;
        let key = queue_key(
            player.difficulty,
            player.time_limit_seconds,
            bucket_for(player.rating),
        );
        self.store.add_waiting(&key, &player.id, player.rating).await?;

        Ok(EnqueueOutcome::Queued)
    }

    /// Delayed re-attempts: adjacent buckets after the short delay, all
    /// buckets after the long one. Each stage re-validates that the search
    /// is still live.
    fn spawn_staged_expansion(self: Arc<Self>, player: OnlinePlayer) {
        let first = self.config.first_expansion_delay;
        let full = self
            .config
            .full_expansion_delay
            .saturating_sub(self.config.first_expansion_delay);
        let coordinator = self;

        tokio::spawn(async move {
            tokio::time::sleep(first).await;
            if !coordinator.is_searching(&player.id) {
                return;
            }
            match coordinator
                .try_match(&player, SearchScope::AdjacentBuckets, "adjacent")
                .await
            {
                Ok(Some(room_id)) => {
                    info!("Adjacent-bucket match for {}: room {}", player.id, room_id);
                    return;
                }
                Ok(None) => {}
                Err(e) => warn!("Adjacent expansion failed for {}: {}", player.id, e),
            }

            tokio::time::sleep(full).await;
            if !coordinator.is_searching(&player.id) {
                return;
            }
            match coordinator
                .try_match(&player, SearchScope::AllBuckets, "full")
                .await
            {
                Ok(Some(room_id)) => {
                    info!("Full-range match for {}: room {}", player.id, room_id)
                }
                Ok(None) => {}
                Err(e) => warn!("Full expansion failed for {}: {}", player.id, e),
            }
        });
    }

    /// One delayed re-attempt at the given scope.
    async fn try_match(
        &self,
        player: &OnlinePlayer,
        scope: SearchScope,
        stage: &str,
    ) -> Result<Option<RoomId>> {
        let _guard = self.pairing.lock().await;

        let Some(search) = self.pending_lock()?.get(&player.id).cloned() else {
            return Ok(None);
        };
        // A queued search whose ticket aged out is dead; drop it
        if self.store.get_ticket(&player.id).await?.is_none() {
            self.pending_lock()?.remove(&player.id);
            self.update_waiting_gauge();
            return Ok(None);
        }

        let Some((opponent_id, opponent_ticket)) =
            self.scan_for_opponent(player, scope).await?
        else {
            return Ok(None);
        };

        let matched = self
            .create_match(&search, &opponent_id, &opponent_ticket, stage)
            .await?;
        self.update_waiting_gauge();
        Ok(matched)
    }

    /// Scan the scope's buckets for the best compatible waiting opponent:
    /// smallest rating difference, earliest enqueue on ties. Candidates must
    /// have a live ticket with equal difficulty/time-limit and must not be
    /// busy.
    async fn scan_for_opponent(
        &self,
        player: &OnlinePlayer,
        scope: SearchScope,
    ) -> Result<Option<(PlayerId, QueueTicket)>> {
        let own = bucket_for(player.rating);
        let mut best: Option<(PlayerId, QueueTicket, i32)> = None;

        for bucket in scope_buckets(own, scope) {
            let key = queue_key(player.difficulty, player.time_limit_seconds, bucket);
            for (candidate_id, rating) in self.store.waiting_entries(&key).await? {
                if candidate_id == player.id {
                    continue;
                }
                let Some(ticket) = self.store.get_ticket(&candidate_id).await? else {
                    continue;
                };
                if ticket.difficulty != player.difficulty
                    || ticket.time_limit_seconds != player.time_limit_seconds
                {
                    continue;
                }
                match self.registry.player_by_id(&candidate_id)? {
                    Some(candidate) if !candidate.in_game => {}
                    _ => continue,
                }

                let diff = rating_difference(rating, player.rating);
                let better = match &best {
                    None => true,
                    Some((_, best_ticket, best_diff)) => {
                        diff < *best_diff
                            || (diff == *best_diff && ticket.enqueued_at < best_ticket.enqueued_at)
                    }
                };
                if better {
                    best = Some((candidate_id, ticket, diff));
                }
            }
        }

        Ok(best.map(|(id, ticket, _)| (id, ticket)))
    }

    /// Create the match for a chosen pair. The opponent's ticket is claimed
    /// first (the store makes that claim atomic across processes), then both
    /// players are marked busy and removed from every bucket queue BEFORE
    /// any notification fires. Returns `None` when the opponent was no
    /// longer claimable, which sends the initiating search back to waiting.
    async fn create_match(
        &self,
        search: &PendingSearch,
        opponent_id: &PlayerId,
        opponent_ticket: &QueueTicket,
        stage: &str,
    ) -> Result<Option<RoomId>> {
        let player = &search.player;

        if !self.store.remove_ticket(opponent_id).await? {
            debug!(
                "{}",
                ArenaError::DuplicateMatchAttempt {
                    player_id: opponent_id.clone(),
                }
            );
            return Ok(None);
        }

        let Some(opponent) = self.registry.player_by_id(opponent_id)? else {
            // Claimed a ticket for a player this process no longer knows;
            // clear the queue remnants and resume searching
            self.remove_from_buckets(
                opponent_id,
                opponent_ticket.difficulty,
                opponent_ticket.time_limit_seconds,
            )
            .await?;
            return Ok(None);
        };
        if opponent.in_game {
            return Ok(None);
        }

        // Our own ticket may or may not exist (immediate path has none)
        self.store.remove_ticket(&player.id).await?;

        self.registry.set_in_game(&player.id, true)?;
        self.registry.set_in_game(&opponent.id, true)?;

        self.remove_from_buckets(&player.id, player.difficulty, player.time_limit_seconds)
            .await?;
        self.remove_from_buckets(
            opponent_id,
            opponent_ticket.difficulty,
            opponent_ticket.time_limit_seconds,
        )
        .await?;

        // Consume both pending searches; this is the exactly-once guard on
        // the match-found notifications
        let opponent_search = {
            let mut pending = self.pending_lock()?;
            pending.remove(&player.id);
            pending.remove(opponent_id)
        };

        let created = self
            .driver
            .rooms()
            .create_room([player.clone(), opponent.clone()]);
        let (room_id, room_arc) = match created {
            Ok(pair) => pair,
            Err(e) => {
                self.registry.set_in_game(&player.id, false)?;
                self.registry.set_in_game(&opponent.id, false)?;
                return Err(e);
            }
        };

        let (summary, meter) = {
            let room = room_arc.lock().map_err(|_| ArenaError::InternalError {
                message: "Failed to acquire room lock".to_string(),
            })?;
            (room.summary(), room.question_meter())
        };

        self.events
            .send(
                &player.id,
                OutboundEvent::MatchFound {
                    room: summary.clone(),
                    opponent: opponent.brief(),
                    my_player_id: player.id.clone(),
                    initial_question_meter: meter,
                },
            )
            .await?;
        self.events
            .send(
                &opponent.id,
                OutboundEvent::MatchFound {
                    room: summary,
                    opponent: player.brief(),
                    my_player_id: opponent.id.clone(),
                    initial_question_meter: meter,
                },
            )
            .await?;

        for (target, other_name) in [
            (player.id.clone(), opponent.username.clone()),
            (opponent.id.clone(), player.username.clone()),
        ] {
            let notifier = self.notifier.clone();
            tokio::spawn(async move {
                if let Err(e) = notifier.notify_match_found(&target, &other_name).await {
                    warn!("Match-found push failed for {}: {}", target, e);
                }
            });
        }

        let now = current_timestamp();
        let wait = (now - search.enqueued_at).num_milliseconds().max(0) as f64 / 1000.0;
        self.metrics.record_match_created(stage, wait);
        let opponent_wait = (now - opponent_ticket.enqueued_at)
            .num_milliseconds()
            .max(0) as f64
            / 1000.0;
        self.metrics
            .queue()
            .queue_wait_seconds
            .observe(opponent_wait);
        drop(opponent_search);

        Arc::clone(&self.driver).schedule_start(room_id.clone());
        Ok(Some(room_id))
    }

    async fn remove_from_buckets(
        &self,
        player_id: &PlayerId,
        difficulty: Difficulty,
        time_limit_seconds: u32,
    ) -> Result<()> {
        for bucket in 0..BUCKET_COUNT {
            let key = queue_key(difficulty, time_limit_seconds, bucket);
            self.store.remove_waiting(&key, player_id).await?;
        }
        Ok(())
    }

    /// Cancel a live search. Idempotent: unknown or already-matched players
    /// are a no-op. Returns whether anything was removed.
    pub async fn cancel(&self, player_id: &PlayerId) -> Result<bool> {
        self.remove_search(player_id).await
    }

    /// Disconnect-path removal; identical semantics to `cancel`.
    pub async fn on_disconnect(&self, player_id: &PlayerId) -> Result<bool> {
        self.remove_search(player_id).await
    }

    async fn remove_search(&self, player_id: &PlayerId) -> Result<bool> {
        let pending_entry = self.pending_lock()?.remove(player_id);
        let ticket = self.store.get_ticket(player_id).await?;
        let had_ticket = self.store.remove_ticket(player_id).await?;

        let prefs = ticket
            .map(|t| (t.difficulty, t.time_limit_seconds))
            .or_else(|| {
                pending_entry
                    .as_ref()
                    .map(|p| (p.player.difficulty, p.player.time_limit_seconds))
            });
        if let Some((difficulty, time_limit)) = prefs {
            self.remove_from_buckets(player_id, difficulty, time_limit)
                .await?;
        }

        let removed = pending_entry.is_some() || had_ticket;
        if removed {
            self.metrics.queue().searches_cancelled_total.inc();
            debug!("Search removed for {}", player_id);
        }
        self.update_waiting_gauge();
        Ok(removed)
    }

    /// Remove queue entries whose ticket has expired. Covers crashed
    /// processes and missed cancellations.
    pub async fn sweep_expired(&self) -> Result<usize> {
        let mut removed = 0;
        for key in self.store.queue_keys().await? {
            for (player_id, _) in self.store.waiting_entries(&key).await? {
                if self.store.get_ticket(&player_id).await?.is_none()
                    && self.store.remove_waiting(&key, &player_id).await?
                {
                    self.pending_lock()?.remove(&player_id);
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            self.metrics
                .queue()
                .entries_swept_total
                .inc_by(removed as u64);
            info!("Queue sweep removed {} expired entries", removed);
        }
        self.update_waiting_gauge();
        Ok(removed)
    }

    /// Aggregate queue view for the status event.
    pub fn queue_status(&self) -> Result<QueueStatus> {
        let pending = self.pending_lock()?;
        let now = current_timestamp();

        let waiting: Vec<WaitingEntry> = pending
            .values()
            .map(|search| WaitingEntry {
                player_id: search.player.id.clone(),
                rating: search.player.rating,
                difficulty: search.player.difficulty,
                wait_seconds: (now - search.enqueued_at).num_seconds().max(0) as u64,
            })
            .collect();

        let average_wait_seconds = if waiting.is_empty() {
            0
        } else {
            waiting.iter().map(|w| w.wait_seconds).sum::<u64>() / waiting.len() as u64
        };

        Ok(QueueStatus {
            total_waiting: waiting.len(),
            average_wait_seconds,
            waiting,
        })
    }

    pub fn searching_count(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }
}
