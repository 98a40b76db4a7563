//! Rating buckets and queue key sharding
//!
//! Six fixed half-open rating bands shard the waiting list purely as queue
//! keys; nothing about a bucket is persisted.

use crate::types::Difficulty;

/// Number of fixed rating bands
pub const BUCKET_COUNT: usize = 6;

/// Upper bounds of the first five bands; the last band is unbounded
const BOUNDS: [i32; 5] = [400, 800, 1200, 1600, 2000];

/// How far a search reaches across buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// The player's own bucket only (immediate attempt)
    OwnBucket,
    /// Own plus directly adjacent buckets (first expansion)
    AdjacentBuckets,
    /// Every bucket (final expansion)
    AllBuckets,
}

/// The bucket index a rating falls into.
pub fn bucket_for(rating: i32) -> usize {
    BOUNDS
        .iter()
        .position(|bound| rating < *bound)
        .unwrap_or(BUCKET_COUNT - 1)
}

/// The buckets a search at the given scope covers, own bucket first so the
/// closest candidates are scanned before widening.
pub fn scope_buckets(own: usize, scope: SearchScope) -> Vec<usize> {
    match scope {
        SearchScope::OwnBucket => vec![own],
        SearchScope::AdjacentBuckets => {
            let mut buckets = vec![own];
            if own > 0 {
                buckets.push(own - 1);
            }
            if own + 1 < BUCKET_COUNT {
                buckets.push(own + 1);
            }
            buckets
        }
        SearchScope::AllBuckets => {
            let mut buckets = vec![own];
            buckets.extend((0..BUCKET_COUNT).filter(|b| *b != own));
            buckets
        }
    }
}

/// Shared-store key for one (difficulty, time-limit, bucket) waiting list.
pub fn queue_key(difficulty: Difficulty, time_limit_seconds: u32, bucket: usize) -> String {
    format!("mm:queue:{}:{}:{}", difficulty, time_limit_seconds, bucket)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_bounds() {
        assert_eq!(bucket_for(0), 0);
        assert_eq!(bucket_for(399), 0);
        assert_eq!(bucket_for(400), 1);
        assert_eq!(bucket_for(799), 1);
        assert_eq!(bucket_for(800), 2);
        assert_eq!(bucket_for(1199), 2);
        assert_eq!(bucket_for(1200), 3);
        assert_eq!(bucket_for(1999), 4);
        assert_eq!(bucket_for(2000), 5);
        assert_eq!(bucket_for(9000), 5);
    }

    #[test]
    fn test_scope_own() {
        assert_eq!(scope_buckets(3, SearchScope::OwnBucket), vec![3]);
    }

    #[test]
    fn test_scope_adjacent_clamps_at_edges() {
        assert_eq!(scope_buckets(0, SearchScope::AdjacentBuckets), vec![0, 1]);
        assert_eq!(
            scope_buckets(3, SearchScope::AdjacentBuckets),
            vec![3, 2, 4]
        );
        assert_eq!(
            scope_buckets(5, SearchScope::AdjacentBuckets),
            vec![5, 4]
        );
    }

    #[test]
    fn test_scope_all_covers_everything_own_first() {
        let buckets = scope_buckets(2, SearchScope::AllBuckets);
        assert_eq!(buckets[0], 2);
        assert_eq!(buckets.len(), BUCKET_COUNT);
        let mut sorted = buckets.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_queue_key_format() {
        assert_eq!(queue_key(Difficulty::Easy, 60, 3), "mm:queue:easy:60:3");
        assert_eq!(queue_key(Difficulty::Hard, 90, 0), "mm:queue:hard:90:0");
    }
}
