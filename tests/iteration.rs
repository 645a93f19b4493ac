// Iteration suite.
//
// Invariants exercised:
// - A full walk yields every entry exactly once.
// - Start points are randomized: two walks over the same table do not
//   always produce the same order.
// - A cursor advanced across writes that grow the table yields nothing
//   deleted before it got there, and every entry present for the whole
//   walk exactly once.
// - Non-reflexive keys survive growth under a live cursor.
use incremental_hashmap::{Table, TableOptions, TypeDescriptor};
use std::collections::{HashMap, HashSet};

fn seeded(seed: u64) -> Table<u64, u64> {
    Table::with_options(&TypeDescriptor::hashed(), TableOptions::new().seed(seed)).unwrap()
}

#[test]
fn full_walk_is_exact() {
    let mut t = seeded(1);
    for k in 0..1_000 {
        t.put(k, k * 3);
    }
    let mut seen = HashMap::new();
    for (k, v) in &t {
        assert!(seen.insert(*k, *v).is_none(), "duplicate {k}");
    }
    assert_eq!(seen.len(), 1_000);
    assert!(seen.iter().all(|(k, v)| *v == k * 3));
}

#[test]
fn order_is_randomized() {
    let mut t = seeded(2);
    for k in 0..64 {
        t.put(k, k);
    }
    let first: Vec<u64> = t.iter().map(|(k, _)| *k).collect();
    let differs = (0..50).any(|_| t.iter().map(|(k, _)| *k).collect::<Vec<_>>() != first);
    assert!(differs, "fifty walks all started at the same place");
}

// Test: iteration safety under growth.
// Assumes: writes happen between cursor steps, never during one.
// Verifies: each step yields a live entry with its current value; keys
// present throughout are yielded exactly once.
#[test]
fn cursor_survives_growth_and_deletes() {
    let mut t = seeded(3);
    for k in 0..200 {
        t.put(k, k);
    }
    let mut c = t.cursor();
    let mut seen: HashMap<u64, usize> = HashMap::new();
    let mut deleted = HashSet::new();
    let mut next_key = 10_000u64;
    let grows_before = t.stats().grows;

    loop {
        let Some((k, v)) = c.next(&t) else { break };
        assert!(!deleted.contains(k), "yielded {k} after it was deleted");
        assert_eq!(t.get(k), Some(v));
        *seen.entry(*k).or_default() += 1;

        // Between steps: grow the table and delete a little.
        for _ in 0..20 {
            t.put(next_key, next_key);
            next_key += 1;
        }
        let victim = 100 + (next_key % 100);
        if t.remove(&victim).is_some() {
            deleted.insert(victim);
        }
        // Overwrites must show through.
        t.put(50, 5_000);
    }

    assert!(t.stats().grows > grows_before, "walk should span growth");
    for k in 0..200u64 {
        if deleted.contains(&k) {
            continue;
        }
        assert_eq!(seen.get(&k), Some(&1), "key {k}");
    }
    // The cursor is exhausted and has let go of old generations.
    t.put(1, 1);
    assert_eq!(t.stats().pinned_generations, 0);
}

#[test]
fn abandoned_cursor_releases_on_drop() {
    let mut t = seeded(4);
    for k in 0..100 {
        t.put(k, k);
    }
    let mut c = t.cursor();
    c.next(&t);
    for k in 100..2_000 {
        t.put(k, k);
    }
    assert!(t.stats().pinned_generations > 0);
    drop(c);
    t.put(5_000, 0);
    assert_eq!(t.stats().pinned_generations, 0);
    assert_eq!(t.len(), 2_001);
}

fn nan_hash(k: &f64, seed: u64) -> u64 {
    if k.is_nan() {
        rand::random()
    } else {
        incremental_hashmap::seeded_hash(&k.to_bits(), seed)
    }
}

// Test: keys unequal to themselves cannot be looked up again; a cursor
// must still see each of them once across growth.
#[test]
fn nan_keys_under_cursor() {
    let d = TypeDescriptor::<f64, u32>::new()
        .with_hash(nan_hash)
        .with_equal(|a, b| a == b);
    let mut t = Table::create(&d, 0).unwrap();
    for i in 0..40 {
        t.put(f64::NAN, i);
    }
    let mut c = t.cursor();
    let mut seen = Vec::new();
    let mut filler = 0.0f64;
    while let Some((k, v)) = c.next(&t) {
        if k.is_nan() {
            seen.push(*v);
        }
        for _ in 0..10 {
            filler += 1.0;
            t.put(filler, 0);
        }
    }
    assert!(t.stats().grows >= 2);
    seen.sort_unstable();
    assert_eq!(seen, (0..40).collect::<Vec<_>>());
}
