//! Metrics collection using Prometheus

use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use std::sync::Arc;

/// Main metrics collector for the service
#[derive(Clone)]
pub struct MetricsCollector {
    registry: Arc<Registry>,
    service_metrics: ServiceMetrics,
    queue_metrics: QueueMetrics,
    game_metrics: GameMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,
    /// Health status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,
    /// Players currently registered
    pub players_online: IntGauge,
}

/// Matchmaking queue metrics
#[derive(Clone)]
pub struct QueueMetrics {
    /// Total enqueue requests
    pub players_queued_total: IntCounter,
    /// Matches created, labeled by search stage (immediate/adjacent/full)
    pub matches_created_total: IntCounterVec,
    /// Searches cancelled or dropped by disconnect
    pub searches_cancelled_total: IntCounter,
    /// Queue entries removed by the expiry sweep
    pub entries_swept_total: IntCounter,
    /// Players currently waiting
    pub players_waiting: IntGauge,
    /// Time spent waiting before a match
    pub queue_wait_seconds: Histogram,
}

/// Game lifecycle metrics
#[derive(Clone)]
pub struct GameMetrics {
    /// Rooms created
    pub rooms_created_total: IntCounter,
    /// Rooms finished, labeled by end reason
    pub rooms_completed_total: IntCounterVec,
    /// Rooms force-ended by the stale sweep
    pub rooms_reaped_total: IntCounter,
    /// Rooms currently live
    pub active_rooms: IntGauge,
    /// Questions issued to players
    pub questions_served_total: IntCounter,
    /// Answers recorded, labeled by correctness
    pub answers_total: IntCounterVec,
}

impl MetricsCollector {
    /// Create a collector with a fresh registry
    pub fn new() -> Result<Self> {
        Self::with_registry(Arc::new(Registry::new()))
    }

    /// Create a collector on a caller-supplied registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let queue_metrics = QueueMetrics::new(&registry)?;
        let game_metrics = GameMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            queue_metrics,
            game_metrics,
        })
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn queue(&self) -> &QueueMetrics {
        &self.queue_metrics
    }

    pub fn game(&self) -> &GameMetrics {
        &self.game_metrics
    }

    /// Record a created match and the stage that found it.
    pub fn record_match_created(&self, stage: &str, wait_seconds: f64) {
        self.queue_metrics
            .matches_created_total
            .with_label_values(&[stage])
            .inc();
        self.queue_metrics.queue_wait_seconds.observe(wait_seconds);
        self.game_metrics.rooms_created_total.inc();
    }

    /// Record a finished room by end reason.
    pub fn record_room_completed(&self, reason: &str) {
        self.game_metrics
            .rooms_completed_total
            .with_label_values(&[reason])
            .inc();
    }

    /// Record an answer submission.
    pub fn record_answer(&self, correct: bool) {
        let label = if correct { "correct" } else { "incorrect" };
        self.game_metrics
            .answers_total
            .with_label_values(&[label])
            .inc();
    }

    /// Update health status gauge (0=unhealthy, 1=degraded, 2=healthy).
    pub fn update_health_status(&self, status: i64) {
        self.service_metrics.health_status.set(status);
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds = IntGauge::with_opts(Opts::new(
            "arena_uptime_seconds",
            "Service uptime in seconds",
        ))?;
        let health_status = IntGauge::with_opts(Opts::new(
            "arena_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        ))?;
        let players_online = IntGauge::with_opts(Opts::new(
            "arena_players_online",
            "Players currently registered",
        ))?;

        registry.register(Box::new(uptime_seconds.clone()))?;
        registry.register(Box::new(health_status.clone()))?;
        registry.register(Box::new(players_online.clone()))?;

        Ok(Self {
            uptime_seconds,
            health_status,
            players_online,
        })
    }
}

impl QueueMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let players_queued_total = IntCounter::with_opts(Opts::new(
            "arena_players_queued_total",
            "Total enqueue requests",
        ))?;
        let matches_created_total = IntCounterVec::new(
            Opts::new("arena_matches_created_total", "Matches created"),
            &["stage"],
        )?;
        let searches_cancelled_total = IntCounter::with_opts(Opts::new(
            "arena_searches_cancelled_total",
            "Searches cancelled or dropped",
        ))?;
        let entries_swept_total = IntCounter::with_opts(Opts::new(
            "arena_queue_entries_swept_total",
            "Queue entries removed by the expiry sweep",
        ))?;
        let players_waiting = IntGauge::with_opts(Opts::new(
            "arena_players_waiting",
            "Players currently waiting in the queue",
        ))?;
        let queue_wait_seconds = Histogram::with_opts(HistogramOpts::new(
            "arena_queue_wait_seconds",
            "Time waited before a match",
        ))?;

        registry.register(Box::new(players_queued_total.clone()))?;
        registry.register(Box::new(matches_created_total.clone()))?;
        registry.register(Box::new(searches_cancelled_total.clone()))?;
        registry.register(Box::new(entries_swept_total.clone()))?;
        registry.register(Box::new(players_waiting.clone()))?;
        registry.register(Box::new(queue_wait_seconds.clone()))?;

        Ok(Self {
            players_queued_total,
            matches_created_total,
            searches_cancelled_total,
            entries_swept_total,
            players_waiting,
            queue_wait_seconds,
        })
    }
}

impl GameMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let rooms_created_total = IntCounter::with_opts(Opts::new(
            "arena_rooms_created_total",
            "Game rooms created",
        ))?;
        let rooms_completed_total = IntCounterVec::new(
            Opts::new("arena_rooms_completed_total", "Game rooms finished"),
            &["reason"],
        )?;
        let rooms_reaped_total = IntCounter::with_opts(Opts::new(
            "arena_rooms_reaped_total",
            "Rooms force-ended by the stale sweep",
        ))?;
        let active_rooms = IntGauge::with_opts(Opts::new(
            "arena_active_rooms",
            "Rooms currently live",
        ))?;
        let questions_served_total = IntCounter::with_opts(Opts::new(
            "arena_questions_served_total",
            "Questions issued to players",
        ))?;
        let answers_total = IntCounterVec::new(
            Opts::new("arena_answers_total", "Answers recorded"),
            &["result"],
        )?;

        registry.register(Box::new(rooms_created_total.clone()))?;
        registry.register(Box::new(rooms_completed_total.clone()))?;
        registry.register(Box::new(rooms_reaped_total.clone()))?;
        registry.register(Box::new(active_rooms.clone()))?;
        registry.register(Box::new(questions_served_total.clone()))?;
        registry.register(Box::new(answers_total.clone()))?;

        Ok(Self {
            rooms_created_total,
            rooms_completed_total,
            rooms_reaped_total,
            active_rooms,
            questions_served_total,
            answers_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_registers_metrics() {
        let collector = MetricsCollector::new().unwrap();
        collector.queue().players_queued_total.inc();
        collector.record_match_created("immediate", 0.05);
        collector.record_room_completed("normal");
        collector.record_answer(true);

        let families = collector.registry().gather();
        assert!(!families.is_empty());

        let names: Vec<String> = families.iter().map(|f| f.get_name().to_string()).collect();
        assert!(names.iter().any(|n| n.contains("players_queued")));
        assert!(names.iter().any(|n| n.contains("matches_created")));
        assert!(names.iter().any(|n| n.contains("rooms_completed")));
    }

    #[test]
    fn test_two_collectors_do_not_collide() {
        let a = MetricsCollector::new().unwrap();
        let b = MetricsCollector::new().unwrap();
        a.queue().players_queued_total.inc();
        assert_eq!(b.queue().players_queued_total.get(), 0);
    }
}
