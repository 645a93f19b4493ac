// Fast-path / generic-path equivalence.
//
// Two tables receive the same operation sequence, one through the
// specialized entry points and one through the generic ones. Every
// observable result must match, for 4-byte, 8-byte and string keys.
use incremental_hashmap::{Table, TableOptions, TypeDescriptor};
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum Op<K> {
    Put(K, u16),
    Delete(K),
    Get(K),
}

fn arb_ops<K: Clone + std::fmt::Debug>(
    keys: impl Strategy<Value = K> + Clone,
) -> impl Strategy<Value = Vec<Op<K>>> {
    let op = prop_oneof![
        3 => (keys.clone(), any::<u16>()).prop_map(|(k, v)| Op::Put(k, v)),
        1 => keys.clone().prop_map(Op::Delete),
        2 => keys.prop_map(Op::Get),
    ];
    proptest::collection::vec(op, 1..400)
}

fn pair<K: std::hash::Hash + Eq>() -> (Table<K, u16>, Table<K, u16>) {
    let opts = TableOptions::new().seed(0xabc);
    (
        Table::with_options(&TypeDescriptor::hashed(), opts).unwrap(),
        Table::with_options(&TypeDescriptor::hashed(), opts).unwrap(),
    )
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 48, .. ProptestConfig::default() })]

    #[test]
    fn u32_keys(ops in arb_ops(0u32..200)) {
        let (mut fast, mut slow) = pair::<u32>();
        for op in ops {
            match op {
                Op::Put(k, v) => {
                    prop_assert_eq!(*fast.put_fixed(k, v), *slow.put(k, v));
                }
                Op::Delete(k) => prop_assert_eq!(fast.delete_fixed(k), slow.remove(&k)),
                Op::Get(k) => prop_assert_eq!(fast.get_fixed(k), slow.get(&k)),
            }
            prop_assert_eq!(fast.len(), slow.len());
        }
    }

    #[test]
    fn i64_keys(ops in arb_ops(-100i64..100)) {
        let (mut fast, mut slow) = pair::<i64>();
        for op in ops {
            match op {
                Op::Put(k, v) => {
                    fast.put_fixed(k, v);
                    slow.put(k, v);
                }
                Op::Delete(k) => prop_assert_eq!(fast.delete_fixed(k), slow.remove(&k)),
                Op::Get(k) => prop_assert_eq!(fast.get_fixed(k), slow.get(&k)),
            }
            prop_assert_eq!(fast.len(), slow.len());
        }
    }

    #[test]
    fn string_keys(ops in arb_ops("[ab]{0,3}|[ab]{30,34}")) {
        let (mut fast, mut slow) = pair::<String>();
        for op in ops {
            match op {
                Op::Put(k, v) => {
                    fast.put_str(&k, v);
                    slow.put(k, v);
                }
                Op::Delete(k) => prop_assert_eq!(fast.delete_str(&k), slow.remove(&k)),
                Op::Get(k) => prop_assert_eq!(fast.get_str(&k), slow.get(&k)),
            }
            prop_assert_eq!(fast.len(), slow.len());
        }
    }
}
