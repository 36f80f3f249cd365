//! Edge case tests for ferry-engine
//!
//! These tests cover boundary conditions and unusual inputs.

use ferry_engine::{
    Conflict, EnqueueMeta, EntityType, ErrorClass, OperationKind, OperationQueue,
    OperationStatus, QueueSnapshot, RemoteCall, RemoteError, Resolution, RetryPolicy,
    Transition,
};
use proptest::prelude::*;
use serde_json::json;
use std::time::Duration;

fn timeout() -> RemoteError {
    RemoteError::Timeout("request timed out".into())
}

// ============================================================================
// Payload Edge Cases
// ============================================================================

#[test]
fn unicode_payloads_survive_snapshot() {
    let mut queue = OperationQueue::new();

    let senders = vec![
        "日本語テスト",
        "Привет мир",
        "مرحبا بالعالم",
        "🎉🚀💯",
        "Hello\nWorld\tTab",
        "Null\0Test",
    ];

    for sender in &senders {
        queue.enqueue(
            OperationKind::CreateBooking,
            json!({"sender": sender}),
            EnqueueMeta::default(),
            1000,
        );
    }

    let json = queue.snapshot().to_json().unwrap();
    let restored = OperationQueue::from_snapshot(QueueSnapshot::from_json(&json).unwrap()).unwrap();

    for (op, sender) in restored.operations().iter().zip(&senders) {
        assert_eq!(op.payload["sender"], *sender);
    }
}

#[test]
fn deeply_nested_optimistic_data() {
    let mut queue = OperationQueue::new();

    let mut nested = json!({"value": "leaf"});
    for _ in 0..50 {
        nested = json!({"nested": nested});
    }

    let id = queue.enqueue(
        OperationKind::UpdateBooking,
        json!({"id": "B1", "updates": {}}),
        EnqueueMeta::default().optimistic(nested.clone()),
        1000,
    );

    assert_eq!(queue.get(&id).unwrap().optimistic_data, Some(nested.clone()));

    // optimistic data becomes the local side of a conflict
    queue.begin_attempt(&id, 2000).unwrap();
    let err = RemoteError::Http {
        status: 409,
        message: "stale".into(),
        server_data: None,
    };
    queue
        .record_outcome(&id, Err(&err), true, &RetryPolicy::default(), 2001)
        .unwrap();
    assert_eq!(queue.conflicts()[0].local_data, nested);
}

#[test]
fn null_updates_on_mark_delivered_fall_back_to_status() {
    let mut queue = OperationQueue::new();
    let id = queue.enqueue(
        OperationKind::MarkDelivered,
        json!({"bookingId": "B9", "updates": null}),
        EnqueueMeta::default(),
        1000,
    );

    let call = RemoteCall::from_operation(queue.get(&id).unwrap()).unwrap();
    assert!(matches!(call, RemoteCall::UpdateBookingStatus { .. }));
}

// ============================================================================
// Ordering Edge Cases
// ============================================================================

#[test]
fn offline_enqueues_keep_order() {
    let mut queue = OperationQueue::new();

    // same entity, same timestamp
    let first = queue.enqueue(
        OperationKind::UpdateBooking,
        json!({"id": "B1", "updates": {"status": "loaded"}}),
        EnqueueMeta::default().entity(EntityType::Booking, "B1"),
        1000,
    );
    let second = queue.enqueue(
        OperationKind::MarkDelivered,
        json!({"bookingId": "B1"}),
        EnqueueMeta::default().entity(EntityType::Booking, "B1"),
        1000,
    );

    let pending: Vec<_> = queue.list_pending().iter().map(|op| op.id.clone()).collect();
    assert_eq!(pending, vec![first, second]);
}

#[test]
fn retried_operation_keeps_its_slot() {
    let mut queue = OperationQueue::new();
    let policy = RetryPolicy::default();

    let a = queue.enqueue(OperationKind::CreateBooking, json!({}), EnqueueMeta::default(), 1);
    let b = queue.enqueue(OperationKind::CreateBooking, json!({}), EnqueueMeta::default(), 2);

    queue.begin_attempt(&a, 10).unwrap();
    queue
        .record_outcome(&a, Err(&timeout()), true, &policy, 11)
        .unwrap();

    let pending: Vec<_> = queue.list_pending().iter().map(|op| op.id.clone()).collect();
    assert_eq!(pending, vec![a.clone(), b]);
    assert_eq!(queue.get(&a).unwrap().id, a);
}

#[test]
fn enqueue_during_attempt_is_appended() {
    let mut queue = OperationQueue::new();
    let a = queue.enqueue(OperationKind::CreateBooking, json!({}), EnqueueMeta::default(), 1);

    assert!(queue.begin_pass());
    let snapshot: Vec<_> = queue.list_pending().iter().map(|op| op.id.clone()).collect();
    queue.begin_attempt(&a, 2).unwrap();

    let b = queue.enqueue(OperationKind::CreateBooking, json!({}), EnqueueMeta::default(), 3);

    assert_eq!(snapshot, vec![a.clone()]);
    assert_eq!(queue.operations().last().unwrap().id, b);
    assert_eq!(queue.get(&b).unwrap().status, OperationStatus::Pending);
}

// ============================================================================
// Conflict Edge Cases
// ============================================================================

#[test]
fn keep_local_then_conflict_again() {
    let mut queue = OperationQueue::new();
    let policy = RetryPolicy::default();
    let id = queue.enqueue(
        OperationKind::UpdateBooking,
        json!({"id": "B1", "updates": {"weight": 10}}),
        EnqueueMeta::default(),
        1000,
    );

    let conflict_at = |version: u64| RemoteError::Conflict {
        message: "version mismatch".into(),
        server_version: Some(version),
        server_data: None,
    };

    queue.begin_attempt(&id, 2000).unwrap();
    queue
        .record_outcome(&id, Err(&conflict_at(3)), true, &policy, 2001)
        .unwrap();
    queue.resolve_conflict(&id, Resolution::KeepLocal).unwrap();

    queue.begin_attempt(&id, 3000).unwrap();
    let transition = queue
        .record_outcome(&id, Err(&conflict_at(5)), true, &policy, 3001)
        .unwrap();

    assert_eq!(transition, Transition::Conflicted { server_version: 5 });
    assert_eq!(queue.conflicts().len(), 1);
    assert_eq!(queue.conflicts()[0].server_version, 5);
}

#[test]
fn bulk_resolution_is_independent() {
    let mut queue = OperationQueue::new();
    let ids: Vec<_> = (0..3)
        .map(|i| {
            let id = queue.enqueue(
                OperationKind::UpdateBooking,
                json!({"id": format!("B{i}"), "updates": {}}),
                EnqueueMeta::default(),
                1000,
            );
            let op = queue.get(&id).unwrap().clone();
            queue
                .register_conflict(Conflict::for_operation(&op, Some(i), None, 2000))
                .unwrap();
            id
        })
        .collect();

    // one resolved early; the rest still resolve
    queue.resolve_conflict(&ids[1], Resolution::Cancel).unwrap();

    let open: Vec<_> = queue.conflicts().iter().map(|c| c.operation_id.clone()).collect();
    let results: Vec<_> = open
        .iter()
        .map(|id| queue.resolve_conflict(id, Resolution::KeepServer))
        .collect();

    assert!(results.iter().all(Result::is_ok));
    assert!(queue.is_empty());
    assert!(!queue.has_conflicts());
}

#[test]
fn conflict_message_on_server_error_wins() {
    let mut queue = OperationQueue::new();
    let id = queue.enqueue(OperationKind::CreateBooking, json!({}), EnqueueMeta::default(), 1);
    queue.begin_attempt(&id, 2).unwrap();

    let err = RemoteError::Http {
        status: 500,
        message: "could not serialize access due to concurrent update".into(),
        server_data: None,
    };
    let transition = queue
        .record_outcome(&id, Err(&err), true, &RetryPolicy::default(), 3)
        .unwrap();

    assert_eq!(transition, Transition::Conflicted { server_version: 0 });
}

// ============================================================================
// Retry Edge Cases
// ============================================================================

#[test]
fn offline_failure_without_status_is_retried() {
    let mut queue = OperationQueue::new();
    let id = queue.enqueue(OperationKind::CreateBooking, json!({}), EnqueueMeta::default(), 1);
    queue.begin_attempt(&id, 2).unwrap();

    let transition = queue
        .record_outcome(
            &id,
            Err(&RemoteError::Other("unexpected end of stream".into())),
            false,
            &RetryPolicy::default(),
            3,
        )
        .unwrap();

    assert!(matches!(transition, Transition::Retry { retry_count: 1, .. }));
}

#[test]
fn custom_policy_delays() {
    let policy = RetryPolicy::new(Duration::from_millis(250), Duration::from_secs(2));
    assert_eq!(policy.delay(0), Duration::from_millis(250));
    assert_eq!(policy.delay(3), Duration::from_secs(2));
}

#[test]
fn permanent_failure_class_is_reported() {
    let mut queue = OperationQueue::new();
    let id = queue.enqueue(OperationKind::Unknown, json!({}), EnqueueMeta::default(), 1);
    queue.begin_attempt(&id, 2).unwrap();

    let err = RemoteCall::from_operation(queue.get(&id).unwrap()).unwrap_err();
    let transition = queue
        .record_outcome(&id, Err(&err), false, &RetryPolicy::default(), 3)
        .unwrap();

    assert_eq!(
        transition,
        Transition::Failed {
            retry_count: 1,
            class: ErrorClass::Permanent,
        }
    );
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_backoff_formula(attempt in 0u32..64) {
        let policy = RetryPolicy::default();
        let expected = 1000u128
            .saturating_mul(1u128 << attempt.min(63))
            .min(30_000);
        prop_assert_eq!(policy.delay(attempt).as_millis(), expected);
    }

    #[test]
    fn prop_enqueue_preserves_order(count in 0usize..50) {
        let mut queue = OperationQueue::new();
        let ids: Vec<_> = (0..count)
            .map(|i| {
                queue.enqueue(
                    OperationKind::CreateBooking,
                    json!({"n": i}),
                    EnqueueMeta::default(),
                    1000,
                )
            })
            .collect();

        let restored = OperationQueue::from_snapshot(queue.snapshot()).unwrap();
        let pending: Vec<_> = restored.list_pending().iter().map(|op| op.id.clone()).collect();
        prop_assert_eq!(pending, ids);
    }

    #[test]
    fn prop_retry_count_bounded(max_retries in 0u32..8, failures in 1usize..20) {
        let mut queue = OperationQueue::new();
        let policy = RetryPolicy::default();
        let id = queue.enqueue(
            OperationKind::CreateBooking,
            json!({}),
            EnqueueMeta::default().max_retries(max_retries),
            0,
        );

        let mut attempts = 0;
        for n in 0..failures {
            if queue.begin_attempt(&id, n as u64).is_none() {
                break;
            }
            attempts += 1;
            queue
                .record_outcome(&id, Err(&timeout()), true, &policy, n as u64)
                .unwrap();
            let op = queue.get(&id).unwrap();
            prop_assert!(op.retry_count <= max_retries);
        }

        let op = queue.get(&id).unwrap();
        prop_assert!(attempts <= max_retries.max(1) as usize);
        if attempts == max_retries.max(1) as usize {
            prop_assert_eq!(op.status, OperationStatus::Failed);
        }
    }
}
