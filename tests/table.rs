// Table integration suite.
//
// Each test documents what behavior is being verified. The core
// invariants exercised:
// - Read-your-writes: get after put returns the value just written; get
//   after delete misses.
// - Idempotence: deleting an absent key and re-putting an identical pair
//   leave the count unchanged.
// - Growth transparency: every key stays retrievable with its latest
//   value before, during and after growth.
// - Indirect storage and descriptor validation behave as configured.
use incremental_hashmap::{
    CreateError, DescriptorError, Store, Table, TableOptions, TypeDescriptor,
};

// Test: the int32 -> string walkthrough.
// Verifies: put/get/delete on a hint-0 table, miss after delete.
#[test]
fn int32_to_string_scenario() {
    let d = TypeDescriptor::<i32, String>::hashed();
    let mut t = Table::create(&d, 0).expect("valid descriptor");
    t.put(1, "a".to_string());
    t.put(2, "b".to_string());
    assert_eq!(t.get(&1).map(String::as_str), Some("a"));
    t.delete(&1);
    assert_eq!(t.get(&1), None);
    assert_eq!(t.get(&2).map(String::as_str), Some("b"));

    // Same walk through the store layer, where a miss is an error.
    let s = Store::from_table(t);
    assert_eq!(
        s.get(&1).unwrap_err().to_string(),
        "key not found"
    );
    assert_eq!(s.get(&2).as_deref(), Ok("b"));
}

// Test: 10,000 sequential keys inserted one at a time.
// Verifies: at least one grow, exact count, every key retrievable.
#[test]
fn ten_thousand_sequential_keys() {
    let mut t: Table<i64, i64> = Table::hashed(0).unwrap();
    for k in 0..10_000 {
        t.put(k, -k);
    }
    let stats = t.stats();
    assert!(stats.grows >= 1, "expected growth, got {stats:?}");
    assert_eq!(t.len(), 10_000);
    for k in 0..10_000 {
        assert_eq!(t.get(&k), Some(&-k), "key {k}");
    }
}

// Test: idempotent delete and overwrite.
#[test]
fn idempotent_delete_and_put() {
    let mut t: Table<u32, u32> = Table::hashed(4).unwrap();
    t.delete(&7);
    t.delete(&7);
    assert!(t.is_empty());
    t.put(7, 70);
    t.put(7, 70);
    assert_eq!(t.len(), 1);
    t.delete(&7);
    t.delete(&7);
    assert_eq!(t.len(), 0);
    assert_eq!(t.get(&7), None);
}

// Test: growth transparency with overwrites interleaved.
// Assumes: a fixed seed, so the growth points are reproducible.
// Verifies: every key readable with its latest value while growth is in
// progress, and after it finishes.
#[test]
fn values_survive_growth_in_progress() {
    let mut t: Table<u64, u64> =
        Table::with_options(&TypeDescriptor::hashed(), TableOptions::new().seed(42)).unwrap();
    let mut checked_mid_growth = false;
    for k in 0..3_000u64 {
        t.put(k, k);
        if k % 3 == 0 {
            t.put(k / 2, k * 10);
        }
        if t.stats().growing {
            checked_mid_growth = true;
            for j in (0..=k).step_by(37) {
                assert!(t.contains_key(&j), "key {j} lost mid-growth");
            }
        }
    }
    assert!(checked_mid_growth);
    let mut expected: Vec<u64> = (0..3_000).collect();
    for k in (0..3_000u64).step_by(3) {
        expected[(k / 2) as usize] = k * 10;
    }
    for (k, v) in expected.iter().enumerate() {
        assert_eq!(t.get(&(k as u64)), Some(v));
    }
}

// Test: deletes interleaved with growth leave no ghosts.
#[test]
fn deletes_during_growth() {
    let mut t: Table<u32, u32> = Table::hashed(0).unwrap();
    for k in 0..2_000 {
        t.put(k, k);
        if k % 2 == 1 {
            assert_eq!(t.remove(&(k - 1)), Some(k - 1));
        }
    }
    assert_eq!(t.len(), 1_000);
    for k in 0..2_000 {
        assert_eq!(t.get(&k).is_some(), k % 2 == 1);
    }
}

// Test: a size hint avoids growth up to the hinted count.
#[test]
fn hint_presizes() {
    let mut t: Table<u32, ()> = Table::hashed(1_000).unwrap();
    let b = t.stats().b;
    for k in 0..1_000 {
        t.put(k, ());
    }
    assert_eq!(t.stats().grows, 0);
    assert_eq!(t.stats().b, b);
}

// Test: large keys and values are boxed and still round-trip.
#[test]
fn oversized_entries_are_indirect() {
    let d = TypeDescriptor::<[u8; 200], [u64; 32]>::hashed();
    assert!(d.is_key_indirect() && d.is_value_indirect());
    let mut t = Table::create(&d, 0).unwrap();
    for i in 0..20u8 {
        t.put([i; 200], [u64::from(i); 32]);
    }
    for i in 0..20u8 {
        assert_eq!(t.get(&[i; 200]).map(|v| v[31]), Some(u64::from(i)));
    }
}

// Test: creation failures produce no table.
#[test]
fn create_reports_errors() {
    let missing = TypeDescriptor::<u8, u8>::new().with_hash(|k, _| u64::from(*k));
    assert!(matches!(
        Table::create(&missing, 0),
        Err(CreateError::Descriptor(DescriptorError::MissingEqual))
    ));
    let inline_big = TypeDescriptor::<[u8; 129], u8>::hashed().key_indirect(false);
    assert!(matches!(
        Table::create(&inline_big, 0),
        Err(CreateError::Descriptor(DescriptorError::KeyMustBeIndirect { size: 129 }))
    ));
    let d = TypeDescriptor::<u8, u8>::hashed();
    assert!(matches!(
        Table::create(&d, usize::MAX),
        Err(CreateError::HintOutOfRange(usize::MAX))
    ));
}

// Test: collisions force overflow chains, and overflow pressure with low
// load regrows at the same size.
#[test]
fn overflow_churn_regrows_same_size() {
    fn low_bits(k: &u64, _: u64) -> u64 {
        // Keys are stored shifted up a byte; rotating back yields the bucket.
        k.rotate_right(8)
    }
    let d = TypeDescriptor::<u64, u64>::new()
        .with_hash(low_bits)
        .with_equal(|a, b| a == b)
        .reflexive_key(true);
    let mut t = Table::create(&d, 100).unwrap();
    assert_eq!(t.stats().b, 4);
    // 9 keys per bucket (one overflow each), then delete 8 of them.
    for bucket in 0..16u64 {
        let keys: Vec<u64> = (0..9).map(|j| (bucket + 16 * j) << 8).collect();
        for &k in &keys {
            t.put(k, k);
        }
        for k in &keys[1..] {
            t.delete(k);
        }
    }
    assert_eq!(t.stats().overflow_buckets, 16);
    assert_eq!(t.stats().grows, 0);
    t.put(1 << 40, 0);
    let s = t.stats();
    assert_eq!((s.grows, s.same_size_grows, s.b), (1, 1, 4));
    for bucket in 0..16u64 {
        let k = bucket << 8;
        assert_eq!(t.get(&k), Some(&k));
    }
}
