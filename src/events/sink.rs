//! Event delivery implementations

use crate::error::Result;
use crate::events::OutboundEvent;
use crate::types::PlayerId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

/// Delivery seam between the core and whatever transport carries events to
/// clients. Sends to players without a live channel are silently dropped;
/// the core never blocks on delivery.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send(&self, player_id: &PlayerId, event: OutboundEvent) -> Result<()>;
}

/// Per-player unbounded channels. The transport layer registers a sender per
/// connection and drains the matching receiver.
#[derive(Default)]
pub struct ChannelEventSink {
    channels: Mutex<HashMap<PlayerId, mpsc::UnboundedSender<OutboundEvent>>>,
}

impl ChannelEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a channel for a player, returning the receiving half.
    /// Re-attaching (reconnect) replaces the old sender; the stale receiver
    /// closes on its own.
    pub fn attach(&self, player_id: PlayerId) -> mpsc::UnboundedReceiver<OutboundEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut channels) = self.channels.lock() {
            channels.insert(player_id, tx);
        }
        rx
    }

    /// Detach a player's channel.
    pub fn detach(&self, player_id: &PlayerId) {
        if let Ok(mut channels) = self.channels.lock() {
            channels.remove(player_id);
        }
    }

    pub fn attached_count(&self) -> usize {
        self.channels.lock().map(|c| c.len()).unwrap_or(0)
    }
}

#[async_trait]
impl EventSink for ChannelEventSink {
    async fn send(&self, player_id: &PlayerId, event: OutboundEvent) -> Result<()> {
        let sender = self
            .channels
            .lock()
            .ok()
            .and_then(|channels| channels.get(player_id).cloned());

        match sender {
            Some(tx) => {
                if tx.send(event).is_err() {
                    debug!("Dropped event for {}: channel closed", player_id);
                }
            }
            None => debug!("Dropped event for {}: no channel attached", player_id),
        }
        Ok(())
    }
}

/// Records every event per player; used by tests and the queue-tester binary.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<(PlayerId, OutboundEvent)>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded (player, event) pairs.
    pub fn all(&self) -> Vec<(PlayerId, OutboundEvent)> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Events delivered to one player.
    pub fn events_for(&self, player_id: &str) -> Vec<OutboundEvent> {
        self.all()
            .into_iter()
            .filter(|(id, _)| id == player_id)
            .map(|(_, event)| event)
            .collect()
    }

    /// Count events of a given kind across all players.
    pub fn count_kind(&self, kind: &str) -> usize {
        self.all()
            .iter()
            .filter(|(_, event)| event.kind() == kind)
            .count()
    }

    /// Count events of a given kind for one player.
    pub fn count_kind_for(&self, player_id: &str, kind: &str) -> usize {
        self.events_for(player_id)
            .iter()
            .filter(|event| event.kind() == kind)
            .count()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn send(&self, player_id: &PlayerId, event: OutboundEvent) -> Result<()> {
        if let Ok(mut events) = self.events.lock() {
            events.push((player_id.clone(), event));
        }
        Ok(())
    }
}
