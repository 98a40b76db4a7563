//! Concurrency and uniqueness properties of the matchmaking queue

mod fixtures;

use fixtures::TestHarness;
use quiz_arena::matchmaking::EnqueueOutcome;
use std::time::Duration;

/// Racing enqueues for two mutually compatible players must produce exactly
/// one room, with each side notified exactly once.
#[tokio::test]
async fn test_racing_enqueues_create_exactly_one_match() {
    for round in 0..20 {
        let harness = TestHarness::fast();
        harness.register("alice", 1000).await;
        harness.register("bob", 1040).await;

        let service_a = harness.service.clone();
        let service_b = harness.service.clone();
        let conn_a = TestHarness::conn("alice");
        let conn_b = TestHarness::conn("bob");
        let (a, b) = tokio::join!(
            service_a.join_queue(&conn_a),
            service_b.join_queue(&conn_b),
        );
        a.unwrap();
        b.unwrap();

        // Let any in-flight pairing settle
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(
            harness.driver.rooms().active_room_count().unwrap(),
            1,
            "round {}: exactly one room",
            round
        );
        assert_eq!(
            harness.events.count_kind_for("alice", "match-found"),
            1,
            "round {}: alice notified once",
            round
        );
        assert_eq!(
            harness.events.count_kind_for("bob", "match-found"),
            1,
            "round {}: bob notified once",
            round
        );
        assert_eq!(harness.queue_entries_for("alice").await, 0);
        assert_eq!(harness.queue_entries_for("bob").await, 0);
    }
}

/// Many compatible players racing in must pair off without anyone being
/// double-matched.
#[tokio::test]
async fn test_many_racing_players_pair_without_duplicates() {
    let harness = TestHarness::fast();
    let count = 8;
    for i in 0..count {
        harness.register(&format!("p{}", i), 1000 + i as i32 * 10).await;
    }

    let mut joins = Vec::new();
    for i in 0..count {
        let service = harness.service.clone();
        joins.push(tokio::spawn(async move {
            service.join_queue(&TestHarness::conn(&format!("p{}", i))).await
        }));
    }
    for join in joins {
        join.await.unwrap().unwrap();
    }

    // Everyone is in the same bucket; give the expansions time to drain any
    // odd leftovers
    tokio::time::sleep(Duration::from_millis(250)).await;

    // Exactly count/2 rooms, each player in at most one
    assert_eq!(
        harness.driver.rooms().active_room_count().unwrap(),
        count / 2
    );
    for i in 0..count {
        let id = format!("p{}", i);
        assert_eq!(
            harness.events.count_kind_for(&id, "match-found"),
            1,
            "{} matched exactly once",
            id
        );
        assert_eq!(harness.queue_entries_for(&id).await, 0);
    }
}

/// Interleaved enqueue/cancel churn never leaves more than one queue entry
/// per identity, and a cancelled player never ends up matched afterwards.
#[tokio::test]
async fn test_enqueue_cancel_churn_preserves_uniqueness() {
    let harness = TestHarness::fast();
    harness.register("churner", 1000).await;

    for _ in 0..10 {
        let outcome = harness
            .service
            .join_queue(&TestHarness::conn("churner"))
            .await
            .unwrap();
        assert_eq!(outcome, EnqueueOutcome::Queued);
        assert_eq!(harness.queue_entries_for("churner").await, 1);

        harness
            .service
            .cancel_search(&TestHarness::conn("churner"))
            .await
            .unwrap();
        assert_eq!(harness.queue_entries_for("churner").await, 0);
    }

    // Re-enqueue on top of a live search replaces it, never duplicates
    harness
        .service
        .join_queue(&TestHarness::conn("churner"))
        .await
        .unwrap();
    harness
        .service
        .join_queue(&TestHarness::conn("churner"))
        .await
        .unwrap();
    assert_eq!(harness.queue_entries_for("churner").await, 1);
    assert_eq!(harness.coordinator.searching_count(), 1);
}

/// Cancellation racing the opponent's enqueue either matches before the
/// cancel or not at all; there is no half-matched state.
#[tokio::test]
async fn test_cancel_racing_enqueue_is_clean() {
    for _ in 0..10 {
        let harness = TestHarness::fast();
        harness.register("alice", 1000).await;
        harness.register("bob", 1040).await;

        harness
            .service
            .join_queue(&TestHarness::conn("alice"))
            .await
            .unwrap();

        let cancel_service = harness.service.clone();
        let join_service = harness.service.clone();
        let conn_alice = TestHarness::conn("alice");
        let conn_bob = TestHarness::conn("bob");
        let (cancelled, joined) = tokio::join!(
            cancel_service.cancel_search(&conn_alice),
            join_service.join_queue(&conn_bob),
        );
        let cancelled = cancelled.unwrap();
        let joined = joined.unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        let rooms = harness.driver.rooms().active_room_count().unwrap();

        match joined {
            EnqueueOutcome::Matched(_) => {
                // The pairing won the race; both sides were notified and the
                // cancel either no-oped or only cleared the queue leftovers
                assert_eq!(rooms, 1);
                assert_eq!(harness.events.count_kind_for("alice", "match-found"), 1);
            }
            EnqueueOutcome::Queued => {
                assert!(cancelled);
                assert_eq!(rooms, 0);
                assert_eq!(harness.events.count_kind_for("alice", "match-found"), 0);
            }
        }
        assert_eq!(harness.queue_entries_for("alice").await, 0);
    }
}

mod properties {
    use proptest::prelude::*;
    use quiz_arena::game::scoring;
    use quiz_arena::question::QuestionSelector;

    proptest! {
        /// The meter walk is floored at zero at every step: it always equals
        /// the signed walk clamped to non-negative.
        #[test]
        fn meter_stays_floored_at_zero(
            initial in 0u32..40,
            answers in proptest::collection::vec(any::<bool>(), 0..200),
            rating in 0i32..3000,
        ) {
            let mut meter = initial;
            let mut expected = initial as i64;
            for correct in answers {
                let level = QuestionSelector::level_from_meter(meter);
                let change = scoring::meter_change(correct, rating, level);
                meter = meter.saturating_add_signed(change);
                expected = (expected + change as i64).max(0);
                prop_assert_eq!(meter as i64, expected);
            }
        }

        /// The streak bonus is always one of the published increments.
        #[test]
        fn streak_bonus_is_from_the_table(streak in 1u32..1000) {
            let bonus = scoring::streak_bonus(streak);
            prop_assert!(matches!(bonus, 1 | 3 | 5 | 10));
        }

        /// Every rating lands in exactly one bucket, and neighbors differ by
        /// at most one bucket per 400 points.
        #[test]
        fn bucket_assignment_is_total_and_monotonic(rating in 0i32..5000) {
            use quiz_arena::matchmaking::bucket_for;
            let bucket = bucket_for(rating);
            prop_assert!(bucket < quiz_arena::matchmaking::BUCKET_COUNT);
            let next = bucket_for(rating + 1);
            prop_assert!(next >= bucket);
            prop_assert!(next - bucket <= 1);
        }
    }
}
