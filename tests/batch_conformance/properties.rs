//! Model-Based Property Tests
//!
//! Random change-sets over a handful of rows are checked against a
//! sequential model: the batch fails exactly where the model says it
//! fails, and otherwise the store matches the model afterwards.

use crate::common::*;
use proptest::prelude::*;
use std::collections::BTreeMap;

const ROWS: [&str; 4] = ["r0", "r1", "r2", "r3"];

#[derive(Debug, Clone, Copy)]
enum Kind {
    Insert,
    Replace,
    Merge,
    InsertOrReplace,
    InsertOrMerge,
    Delete,
}

#[derive(Debug, Clone)]
struct Step {
    kind: Kind,
    row: usize,
    slot: usize,
    value: i32,
}

impl Step {
    fn props(&self) -> PropertyMap {
        properties([(format!("p{}", self.slot), PropertyValue::Int32(self.value))])
    }

    fn operation(&self) -> Operation {
        let k = key("p", ROWS[self.row]);
        match self.kind {
            Kind::Insert => Operation::insert(k, self.props()),
            Kind::Replace => Operation::replace(k, self.props()),
            Kind::Merge => Operation::merge(k, self.props()),
            Kind::InsertOrReplace => Operation::insert_or_replace(k, self.props()),
            Kind::InsertOrMerge => Operation::insert_or_merge(k, self.props()),
            Kind::Delete => Operation::delete(k),
        }
    }
}

fn step() -> impl Strategy<Value = Step> {
    let kind = prop_oneof![
        Just(Kind::Insert),
        Just(Kind::Replace),
        Just(Kind::Merge),
        Just(Kind::InsertOrReplace),
        Just(Kind::InsertOrMerge),
        Just(Kind::Delete),
    ];
    (kind, 0..ROWS.len(), 0usize..3, any::<i32>())
        .prop_map(|(kind, row, slot, value)| Step { kind, row, slot, value })
}

type Model = BTreeMap<String, PropertyMap>;

/// Apply steps in order; the first failure yields its index and code
fn predict(mut model: Model, steps: &[Step]) -> Result<Model, (usize, ErrorCode)> {
    for (index, step) in steps.iter().enumerate() {
        let row = ROWS[step.row].to_string();
        let exists = model.contains_key(&row);
        match step.kind {
            Kind::Insert if exists => return Err((index, ErrorCode::EntityAlreadyExists)),
            Kind::Replace | Kind::Merge | Kind::Delete if !exists => {
                return Err((index, ErrorCode::EntityNotFound))
            }
            Kind::Insert | Kind::Replace | Kind::InsertOrReplace => {
                model.insert(row, step.props());
            }
            Kind::Merge | Kind::InsertOrMerge => {
                model.entry(row).or_default().extend(step.props());
            }
            Kind::Delete => {
                model.remove(&row);
            }
        }
    }
    Ok(model)
}

fn stored(t: &TestEngine) -> Model {
    t.snapshot()
        .into_iter()
        .map(|e| (e.key.row_key, e.properties))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn changeset_matches_sequential_model(
        seeded in proptest::collection::vec(any::<bool>(), ROWS.len()),
        steps in proptest::collection::vec(step(), 1..12),
    ) {
        let t = TestEngine::lenient();
        for (row, present) in ROWS.iter().zip(&seeded) {
            if *present {
                t.seed("p", row, properties([("p0", PropertyValue::Int32(-1))]));
            }
        }
        let before = t.snapshot();
        let initial = stored(&t);
        let ops: Vec<Operation> = steps.iter().map(Step::operation).collect();

        let result = t.run(ops);
        match predict(initial, &steps) {
            Ok(expected) => {
                let outcomes = result.outcomes().expect("model predicts success");
                let indices: Vec<usize> = outcomes.iter().map(|o| o.index).collect();
                prop_assert_eq!(indices, (0..steps.len()).collect::<Vec<_>>());
                prop_assert_eq!(stored(&t), expected);
            }
            Err((index, code)) => {
                let rejection = result.rejection().expect("model predicts failure");
                prop_assert_eq!(rejection.index, Some(index));
                prop_assert_eq!(rejection.code, code);
                prop_assert_eq!(t.snapshot(), before);
            }
        }
    }

    #[test]
    fn rejected_batches_never_touch_the_store(
        steps in proptest::collection::vec(step(), 1..12),
    ) {
        let t = TestEngine::lenient();
        t.seed("p", "r0", int(0));
        let before = t.snapshot();

        // Appending a guaranteed failure makes every batch abort
        let mut ops: Vec<Operation> = steps.iter().map(Step::operation).collect();
        ops.push(Operation::merge(key("p", "never-there"), int(1)));

        let result = t.run(ops);
        prop_assert!(!result.is_success());
        prop_assert_eq!(t.snapshot(), before);
    }
}
