//! Health check endpoints and Prometheus metrics server
//!
//! HTTP endpoints for liveness, readiness and Prometheus scraping, served
//! with Axum alongside the game service.

use crate::game::GameRoomManager;
use crate::metrics::collector::MetricsCollector;
use crate::registry::PlayerRegistry;
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Health server configuration
#[derive(Debug, Clone)]
pub struct HealthServerConfig {
    /// Port to bind the health server to
    pub port: u16,
    /// Host to bind to (typically "0.0.0.0" for all interfaces)
    pub host: String,
}

impl Default for HealthServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
        }
    }
}

/// Shared state for the health endpoints
#[derive(Clone)]
pub struct HealthServerState {
    pub metrics_collector: Arc<MetricsCollector>,
    pub registry: Arc<PlayerRegistry>,
    pub rooms: Arc<GameRoomManager>,
}

/// HTTP server exposing health and metrics endpoints
pub struct HealthServer {
    config: HealthServerConfig,
    state: HealthServerState,
    shutdown_tx: broadcast::Sender<()>,
}

impl HealthServer {
    pub fn new(
        config: HealthServerConfig,
        metrics_collector: Arc<MetricsCollector>,
        registry: Arc<PlayerRegistry>,
        rooms: Arc<GameRoomManager>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            state: HealthServerState {
                metrics_collector,
                registry,
                rooms,
            },
            shutdown_tx,
        }
    }

    /// Bind and serve until a stop signal arrives.
    pub async fn start(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .context("Invalid health server address")?;

        let app = self.create_router();
        let listener = TcpListener::bind(addr).await?;

        info!("Health server listening on http://{}", addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Health server shutdown signal received");
            })
            .await?;

        info!("Health server stopped");
        Ok(())
    }

    fn create_router(&self) -> Router {
        Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_handler))
            .route("/ready", get(ready_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(self.state.clone())
    }

    /// Signal the serving task to stop.
    pub async fn stop(&self) -> Result<()> {
        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("Failed to send shutdown signal to health server: {}", e);
        }
        Ok(())
    }
}

async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "service": "quiz-arena",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ["/health", "/ready", "/metrics"],
    }))
}

async fn health_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    let registry_stats = state.registry.stats().ok();
    let room_stats = state.rooms.stats().ok();

    let healthy = registry_stats.is_some() && room_stats.is_some();
    state
        .metrics_collector
        .update_health_status(if healthy { 2 } else { 0 });

    let body = json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "players_online": registry_stats.as_ref().map(|s| s.total_online),
        "players_in_game": registry_stats.as_ref().map(|s| s.in_game),
        "active_rooms": room_stats.as_ref().map(|s| s.active_rooms),
        "rooms_created": room_stats.as_ref().map(|s| s.rooms_created),
    });

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

async fn ready_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "ready": true })))
}

async fn metrics_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    let registry = state.metrics_collector.registry();
    let families = registry.gather();

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    match encoder.encode(&families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; version=0.0.4")],
            format!("failed to encode metrics: {}", e).into_bytes(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::GameSettings;
    use crate::question::{QuestionSelector, StaticQuestionSource};
    use crate::registry::RegistryConfig;

    fn state() -> HealthServerState {
        let selector = Arc::new(QuestionSelector::new(&StaticQuestionSource::new()).unwrap());
        HealthServerState {
            metrics_collector: Arc::new(MetricsCollector::new().unwrap()),
            registry: Arc::new(PlayerRegistry::new(RegistryConfig::default())),
            rooms: Arc::new(GameRoomManager::new(selector, GameSettings::default())),
        }
    }

    #[tokio::test]
    async fn test_health_handler_reports_healthy() {
        let state = state();
        let response = health_handler(State(state.clone())).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.metrics_collector.service().health_status.get(), 2);
    }

    #[tokio::test]
    async fn test_metrics_handler_encodes() {
        let state = state();
        state.metrics_collector.queue().players_queued_total.inc();
        let response = metrics_handler(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
