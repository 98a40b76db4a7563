//! Utility functions for the quiz-arena service

use crate::types::{PlayerId, RoomId};
use chrono::{DateTime, Utc};

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Derive a room id from the two participant identities and a creation
/// timestamp. No central ID issuer is involved, so two racing creations for
/// the same pair still produce distinct ids.
pub fn derive_room_id(a: &PlayerId, b: &PlayerId, created_at: DateTime<Utc>) -> RoomId {
    format!("{}_{}_{}", a, b, created_at.timestamp_millis())
}

/// Calculate the absolute difference between two ratings
pub fn rating_difference(rating1: i32, rating2: i32) -> i32 {
    (rating1 - rating2).abs()
}

/// Check if two ratings are within the given tolerance
pub fn ratings_within_tolerance(rating1: i32, rating2: i32, tolerance: i32) -> bool {
    rating_difference(rating1, rating2) <= tolerance
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_room_id_is_stable_per_pair_and_time() {
        let ts = current_timestamp();
        let id1 = derive_room_id(&"alice".to_string(), &"bob".to_string(), ts);
        let id2 = derive_room_id(&"alice".to_string(), &"bob".to_string(), ts);
        assert_eq!(id1, id2);
        assert!(id1.starts_with("alice_bob_"));
    }

    #[test]
    fn test_rating_difference() {
        assert_eq!(rating_difference(1500, 1400), 100);
        assert_eq!(rating_difference(1400, 1500), 100);
        assert_eq!(rating_difference(1500, 1500), 0);
    }

    #[test]
    fn test_ratings_within_tolerance() {
        assert!(ratings_within_tolerance(1500, 1450, 100));
        assert!(!ratings_within_tolerance(1500, 1350, 100));
        assert!(ratings_within_tolerance(1500, 1500, 0));
    }
}
