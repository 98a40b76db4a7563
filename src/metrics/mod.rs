//! Metrics and monitoring for the quiz-arena service
//!
//! Prometheus metrics collection plus the HTTP server exposing health and
//! metrics endpoints.

pub mod collector;
pub mod health;

pub use collector::{GameMetrics, MetricsCollector, QueueMetrics, ServiceMetrics};
pub use health::{HealthServer, HealthServerConfig};
