//! Batch Invariants
//!
//! Atomicity, ordering, partition homogeneity, mutual exclusivity and
//! rule precedence.

use crate::common::*;

// ============================================================================
// Atomicity
// ============================================================================

#[test]
fn failing_operation_leaves_store_unchanged() {
    let t = TestEngine::new();
    t.seed("p", "existing", int(1));
    t.seed("p", "victim", int(2));
    let before = t.snapshot();

    let result = t.run(vec![
        Operation::insert(key("p", "new1"), int(10)),
        Operation::replace(key("p", "victim"), int(20)),
        Operation::delete(key("p", "existing")),
        Operation::merge(key("p", "absent"), int(30)),
        Operation::insert(key("p", "new2"), int(40)),
    ]);

    let rejection = result.rejection().unwrap();
    assert_eq!(rejection.code, ErrorCode::EntityNotFound);
    assert_eq!(rejection.index, Some(3));
    // Same entities, same properties, same ETags
    assert_eq!(t.snapshot(), before);
}

#[test]
fn retrieve_after_failed_batch_is_not_found() {
    let t = TestEngine::new();
    t.seed("p", "b", int(1));

    let result = t.run(vec![
        Operation::insert(key("p", "a"), int(1)),
        Operation::insert(key("p", "b"), int(2)),
    ]);
    assert_eq!(result.error_code(), Some(ErrorCode::EntityAlreadyExists));

    let retrieved = t.retrieve("p", "a");
    assert_eq!(retrieved.error_code(), Some(ErrorCode::EntityNotFound));
}

#[test]
fn stale_etag_aborts_whole_changeset() {
    let t = TestEngine::new();
    let first = t.seed("p", "a", int(1));
    t.run(vec![Operation::replace(key("p", "a"), int(2))]);

    let result = t.run(vec![
        Operation::insert(key("p", "b"), int(1)),
        Operation::replace(key("p", "a"), int(3)).with_etag(first),
    ]);
    assert_eq!(result.error_code(), Some(ErrorCode::ETagMismatch));
    assert!(t.get("p", "b").is_none());
    assert_eq!(t.get("p", "a").unwrap().get("v"), Some(&PropertyValue::Int32(2)));
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn outcomes_follow_submission_order() {
    let t = TestEngine::new();
    t.seed("p", "m", int(0));
    t.seed("p", "d", int(0));

    let rows = ["z", "m", "a", "d", "q"];
    let result = t.run(vec![
        Operation::insert(key("p", "z"), int(1)),
        Operation::merge(key("p", "m"), int(2)),
        Operation::insert_or_replace(key("p", "a"), int(3)),
        Operation::delete(key("p", "d")),
        Operation::insert_or_merge(key("p", "q"), int(5)).echo(true),
    ]);

    let outcomes = result.outcomes().unwrap();
    let seen: Vec<&str> = outcomes.iter().map(|o| o.key.row_key.as_str()).collect();
    assert_eq!(seen, rows);
    let indices: Vec<usize> = outcomes.iter().map(|o| o.index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    let statuses: Vec<OutcomeStatus> = outcomes.iter().map(|o| o.status).collect();
    assert_eq!(
        statuses,
        vec![
            OutcomeStatus::Created,
            OutcomeStatus::Updated,
            OutcomeStatus::Created,
            OutcomeStatus::Deleted,
            OutcomeStatus::Created,
        ]
    );
}

#[test]
fn every_mutation_mints_a_new_etag() {
    let t = TestEngine::new();
    let mut seen = vec![t.seed("p", "a", int(0))];
    for i in 1..20 {
        let result = t.run(vec![Operation::merge(key("p", "a"), int(i))]);
        let etag = result.outcomes().unwrap()[0].etag().cloned().unwrap();
        assert!(!seen.contains(&etag), "ETag reused at update {i}");
        seen.push(etag);
    }
}

// ============================================================================
// Structural rules
// ============================================================================

#[test]
fn two_partitions_rejected() {
    let t = TestEngine::new();
    let result = t.run(vec![
        Operation::insert(key("p1", "a"), int(1)),
        Operation::insert(key("p2", "a"), int(1)),
    ]);
    let rejection = result.rejection().unwrap();
    assert_eq!(rejection.code, ErrorCode::PartitionKeyMismatch);
    assert_eq!(rejection.index, Some(1));
    assert_eq!(rejection.tier(), ErrorTier::Structural);
    assert_eq!(t.count(), 0);
}

#[test]
fn retrieve_with_insert_rejected() {
    let t = TestEngine::new();
    let batch = RawBatch::new()
        .with_changeset(vec![Operation::insert(key("p", "a"), int(1))])
        .with_operation(Operation::retrieve(key("p", "a")));
    let result = t.engine.run_batch(TABLE, batch);
    assert_eq!(result.error_code(), Some(ErrorCode::RetrieveNotAllowedWithMutations));
    assert_eq!(t.count(), 0);
}

#[test]
fn multiple_changesets_take_precedence() {
    let t = TestEngine::new();
    let too_many: Vec<_> = (0..150)
        .map(|i| Operation::insert(key("p", &format!("r{i}")), int(i)))
        .collect();
    let batch = RawBatch::new()
        .with_changeset(too_many)
        .with_operation(Operation::retrieve(key("p", "x")))
        .with_changeset(vec![Operation::insert(key("q", "a"), int(1))]);
    let result = t.engine.run_batch(TABLE, batch);
    assert_eq!(result.error_code(), Some(ErrorCode::MultipleChangesetsNotAllowed));
}

#[test]
fn invalid_entity_reported_at_its_index() {
    let t = TestEngine::new();
    let result = t.run(vec![
        Operation::insert(key("p", "a"), int(1)),
        Operation::insert(key("p", "b"), properties([("Timestamp", PropertyValue::from(1i32))])),
    ]);
    let rejection = result.rejection().unwrap();
    assert_eq!(rejection.code, ErrorCode::InvalidEntity);
    assert_eq!(rejection.index, Some(1));
    assert!(rejection.message.contains("reserved"));
}

#[test]
fn unknown_table_rejected_before_locking() {
    let t = TestEngine::new();
    let result = t
        .engine
        .run_batch("nope", RawBatch::changeset(vec![Operation::insert(key("p", "a"), int(1))]));
    assert_eq!(result.error_code(), Some(ErrorCode::TableNotFound));
    assert_eq!(t.engine.locks().tracked_partitions(), 0);
}

#[test]
fn sub_tick_datetime_rejected_as_invalid_entity() {
    use chrono::{TimeZone, Utc};
    let t = TestEngine::new();
    let raw = Utc.timestamp_nanos(1_700_000_000_123_456_789);

    let result = t.run(vec![Operation::insert(
        key("p", "a"),
        properties([("at", PropertyValue::DateTime(raw))]),
    )]);
    let rejection = result.rejection().unwrap();
    assert_eq!(rejection.code, ErrorCode::InvalidEntity);
    assert_eq!(rejection.index, Some(0));
    assert!(rejection.message.contains("sub_tick_datetime"));

    // The converted value is stored and read back unchanged
    let at = PropertyValue::from(raw);
    t.seed("p", "b", properties([("at", at.clone())]));
    assert_eq!(t.get("p", "b").unwrap().get("at"), Some(&at));
}
