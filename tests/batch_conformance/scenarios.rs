//! Reference Scenarios
//!
//! The Table service's documented batch behaviors, run end to end through
//! the coordinator.

use crate::common::*;

// ============================================================================
// Scenario A: three inserts on one partition
// ============================================================================

#[test]
fn three_inserts_then_retrieve_each() {
    let t = TestEngine::new();
    let ops = (1..=3)
        .map(|i| {
            Operation::insert(
                key("part1", &format!("row{i}")),
                properties([("myValue", PropertyValue::from("value1"))]),
            )
        })
        .collect();

    let result = t.run(ops);
    let outcomes = result.outcomes().expect("batch should succeed");
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.iter().all(|o| o.status == OutcomeStatus::Created));

    for i in 1..=3 {
        let retrieved = t.retrieve("part1", &format!("row{i}"));
        let entity = retrieved.outcomes().unwrap()[0].entity.clone().unwrap();
        assert_eq!(entity.get("myValue").and_then(PropertyValue::as_str), Some("value1"));
    }
}

// ============================================================================
// Scenario B: standalone retrieve of a missing entity
// ============================================================================

#[test]
fn retrieve_missing_entity() {
    let t = TestEngine::new();
    t.seed("part1", "other", int(1));
    let before = t.snapshot();

    let result = t.retrieve("part1", "row1");
    let rejection = result.rejection().expect("retrieve should fail");
    assert_eq!(rejection.code, ErrorCode::EntityNotFound);
    assert_eq!(rejection.index, Some(0));
    assert_eq!(t.snapshot(), before);
}

// ============================================================================
// Scenario C: insert then merge of one entity in one change-set
// ============================================================================

#[test]
fn insert_then_merge_same_entity() {
    let t = TestEngine::lenient();
    let e = key("part1", "E");

    let result = t.run(vec![
        Operation::insert(
            e.clone(),
            properties([
                ("merged", PropertyValue::from("before")),
                ("kept", PropertyValue::from(42i32)),
            ]),
        ),
        Operation::merge(e.clone(), properties([("merged", PropertyValue::from("after"))])),
    ]);

    let outcomes = result.outcomes().expect("batch should succeed");
    assert_eq!(outcomes[0].status, OutcomeStatus::Created);
    assert_eq!(outcomes[1].status, OutcomeStatus::Updated);

    let stored = t.get("part1", "E").unwrap();
    assert_eq!(stored.get("merged").and_then(PropertyValue::as_str), Some("after"));
    assert_eq!(stored.get("kept"), Some(&PropertyValue::Int32(42)));
    assert_eq!(outcomes[1].etag(), Some(&stored.etag));
}

#[test]
fn insert_then_merge_rejected_when_duplicates_disallowed() {
    let t = TestEngine::new();
    let e = key("part1", "E");
    let result = t.run(vec![
        Operation::insert(e.clone(), int(1)),
        Operation::merge(e, int(2)),
    ]);
    let rejection = result.rejection().unwrap();
    assert_eq!(rejection.code, ErrorCode::DuplicateEntityInChangeset);
    assert_eq!(rejection.index, Some(1));
    assert_eq!(t.count(), 0);
}

// ============================================================================
// Scenario D: 101 operations
// ============================================================================

#[test]
fn too_many_operations() {
    let t = TestEngine::new();
    let ops = (0..101)
        .map(|i| Operation::insert(key("part1", &format!("row{i}")), int(i)))
        .collect();

    let result = t.run(ops);
    assert_eq!(result.error_code(), Some(ErrorCode::TooManyOperations));
    assert_eq!(t.count(), 0);
}

#[test]
fn exactly_one_hundred_operations_allowed() {
    let t = TestEngine::new();
    let ops = (0..100)
        .map(|i| Operation::insert(key("part1", &format!("row{i}")), int(i)))
        .collect();
    assert!(t.run(ops).is_success());
    assert_eq!(t.count(), 100);
}

// ============================================================================
// Scenario E: inserting one entity twice
// ============================================================================

#[test]
fn insert_same_entity_twice() {
    let t = TestEngine::lenient();
    let e = key("part1", "E");
    let result = t.run(vec![
        Operation::insert(e.clone(), int(1)),
        Operation::insert(e, int(2)),
    ]);

    let rejection = result.rejection().unwrap();
    assert_eq!(rejection.code, ErrorCode::EntityAlreadyExists);
    assert_eq!(rejection.index, Some(1));
    assert!(t.get("part1", "E").is_none());
    assert_eq!(t.retrieve("part1", "E").error_code(), Some(ErrorCode::EntityNotFound));
}
