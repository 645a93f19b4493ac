#![cfg(test)]

// Property tests for Table kept inside the crate so they can look at
// internal counters without widening the public API.

use crate::descriptor::TypeDescriptor;
use crate::iter::Cursor;
use crate::table::{Table, TableOptions};
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};

// Pool-indexed operations to improve shrinking: indices shrink to earlier
// keys, pool length shrinks, and op lists shrink in length.
#[derive(Clone, Debug)]
enum OpI {
    Put(usize, i32),
    PutStr(usize, i32),
    Remove(usize),
    DeleteStr(usize),
    Get(usize),
    GetStr(usize),
    Mutate(usize, i32),
    Iterate,
    StartCursor,
    StepCursor(u8),
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, Vec<OpI>)> {
    proptest::collection::hash_set("[a-z]{0,6}|[a-z]{32,40}", 1..=64).prop_flat_map(|pool| {
        let pool: Vec<String> = pool.into_iter().collect();
        let idx = 0..pool.len();
        let op = prop_oneof![
            4 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::Put(i, v)),
            2 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::PutStr(i, v)),
            2 => idx.clone().prop_map(OpI::Remove),
            1 => idx.clone().prop_map(OpI::DeleteStr),
            2 => idx.clone().prop_map(OpI::Get),
            1 => idx.clone().prop_map(OpI::GetStr),
            1 => (idx.clone(), any::<i32>()).prop_map(|(i, d)| OpI::Mutate(i, d)),
            1 => Just(OpI::Iterate),
            1 => Just(OpI::StartCursor),
            2 => (1u8..16).prop_map(OpI::StepCursor),
        ];
        proptest::collection::vec(op, 1..300).prop_map(move |ops| (pool.clone(), ops))
    })
}

// A cursor walking the table while the test keeps writing.
struct Walk {
    cursor: Cursor<String, i32>,
    // Keys present at the start that have not been removed since.
    stable: HashSet<String>,
    seen: HashMap<String, usize>,
}

impl Walk {
    fn start(sut: &Table<String, i32>, model: &HashMap<String, i32>) -> Self {
        Walk {
            cursor: sut.cursor(),
            stable: model.keys().cloned().collect(),
            seen: HashMap::new(),
        }
    }
}

fn check_walk_done(walk: &Walk) -> Result<(), TestCaseError> {
    for k in &walk.stable {
        prop_assert_eq!(walk.seen.get(k).copied(), Some(1), "stable key {:?}", k);
    }
    Ok(())
}

// Property: State-machine equivalence against std::collections::HashMap,
// with cursors advanced between writes.
// Invariants exercised across random operation sequences:
// - `put`/`put_str` insert or overwrite; `remove`/`delete_str` return the
//   model's value; `get` and `get_str` agree with the model.
// - `iter` yields each live entry exactly once with its current value.
// - A cursor advanced across writes (and the growth they cause) yields
//   only live entries with their current values, and every key present for
//   the whole walk exactly once.
// - `len`/`is_empty` parity with the model after each op.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario()) {
        let mut sut: Table<String, i32> =
            Table::with_options(&TypeDescriptor::hashed(), TableOptions::new().seed(0xfeed)).unwrap();
        let mut model: HashMap<String, i32> = HashMap::new();
        let mut walk: Option<Walk> = None;

        for op in ops {
            match op {
                OpI::Put(i, v) | OpI::PutStr(i, v) => {
                    let k = pool[i].clone();
                    if matches!(op, OpI::Put(..)) {
                        *sut.put(k.clone(), 0) = v;
                    } else {
                        sut.put_str(&k, v);
                    }
                    model.insert(k, v);
                }
                OpI::Remove(i) | OpI::DeleteStr(i) => {
                    let k = &pool[i];
                    let got = if matches!(op, OpI::Remove(_)) {
                        sut.remove(k)
                    } else {
                        sut.delete_str(k)
                    };
                    prop_assert_eq!(got, model.remove(k));
                    if let Some(w) = walk.as_mut() {
                        w.stable.remove(k);
                    }
                }
                OpI::Get(i) => {
                    let k = &pool[i];
                    prop_assert_eq!(sut.get(k), model.get(k));
                    prop_assert_eq!(sut.contains_key(k), model.contains_key(k));
                }
                OpI::GetStr(i) => {
                    let k = &pool[i];
                    prop_assert_eq!(sut.get_str(k), model.get(k));
                }
                OpI::Mutate(i, d) => {
                    let k = &pool[i];
                    if let Some(v) = sut.get_mut(k) {
                        *v = v.wrapping_add(d);
                    }
                    if let Some(v) = model.get_mut(k) {
                        *v = v.wrapping_add(d);
                    }
                }
                OpI::Iterate => {
                    let mut seen = HashMap::new();
                    for (k, v) in &sut {
                        prop_assert!(seen.insert(k.clone(), *v).is_none(), "duplicate {:?}", k);
                    }
                    prop_assert_eq!(&seen, &model);
                }
                OpI::StartCursor => {
                    // Replaces (and abandons) any walk in progress.
                    walk = Some(Walk::start(&sut, &model));
                }
                OpI::StepCursor(n) => {
                    let mut done = false;
                    if let Some(w) = walk.as_mut() {
                        for _ in 0..n {
                            match w.cursor.next(&sut) {
                                Some((k, v)) => {
                                    prop_assert_eq!(model.get(k), Some(v), "stale entry {:?}", k);
                                    *w.seen.entry(k.clone()).or_insert(0) += 1;
                                }
                                None => {
                                    check_walk_done(w)?;
                                    done = true;
                                    break;
                                }
                            }
                        }
                    }
                    if done {
                        walk = None;
                    }
                }
            }
            prop_assert_eq!(sut.len(), model.len());
            prop_assert_eq!(sut.is_empty(), model.is_empty());
        }

        // Finish any walk still open.
        if let Some(mut w) = walk.take() {
            while let Some((k, v)) = w.cursor.next(&sut) {
                prop_assert_eq!(model.get(k), Some(v));
                *w.seen.entry(k.clone()).or_insert(0) += 1;
            }
            check_walk_done(&w)?;
        }
        // With every cursor gone, the next write drops retired generations.
        sut.put(String::from("__final__"), 0);
        prop_assert_eq!(sut.stats().pinned_generations, 0);
    }
}

fn constant_hash(_: &u32, _: u64) -> u64 {
    0x8000_0000_0000_0000
}

// Collision variant: every key shares one hash, so all entries sit in a
// single chain and overflow pressure drives same-size regrowth.
proptest! {
    #![proptest_config(ProptestConfig { cases: 32, .. ProptestConfig::default() })]
    #[test]
    fn prop_collisions(ops in proptest::collection::vec((0u32..48, any::<bool>()), 1..400)) {
        let d = TypeDescriptor::<u32, u32>::new()
            .with_hash(constant_hash)
            .with_equal(|a, b| a == b)
            .reflexive_key(true);
        let mut sut = Table::create(&d, 0).unwrap();
        let mut model: HashMap<u32, u32> = HashMap::new();
        for (k, insert) in ops {
            if insert {
                sut.put(k, k + 1);
                model.insert(k, k + 1);
            } else {
                prop_assert_eq!(sut.remove(&k), model.remove(&k));
            }
            prop_assert_eq!(sut.len(), model.len());
        }
        for k in 0..48 {
            prop_assert_eq!(sut.get(&k), model.get(&k));
        }
        let seen: HashSet<u32> = sut.iter().map(|(k, _)| *k).collect();
        prop_assert_eq!(seen.len(), model.len());
    }
}
