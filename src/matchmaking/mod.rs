//! Matchmaking queue and coordinator
//!
//! Waiting players live in the shared store, sharded into one ordered set
//! per (difficulty, time-limit, rating-bucket). The coordinator performs the
//! immediate-match attempt on admission, widens the search radius on a
//! staged schedule, and guarantees at-most-once match creation under racing
//! lookups.

pub mod bucket;
pub mod coordinator;

pub use bucket::{bucket_for, queue_key, scope_buckets, SearchScope, BUCKET_COUNT};
pub use coordinator::{CoordinatorConfig, EnqueueOutcome, MatchCoordinator};
