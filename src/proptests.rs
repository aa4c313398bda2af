use std::collections::BTreeMap;

use proptest::prelude::*;

use crate::AvlTreeMap;

#[derive(Clone, Debug)]
enum Op {
    Insert(u16, u32),
    Remove(u16),
    Get(u16),
}

// Keys are drawn from a small domain so that inserts, removals and lookups
// collide often enough to exercise every rebalancing case.
fn op_strategy() -> impl Strategy<Value = Op> {
    let key = 0u16..512;
    prop_oneof![
        3 => (key.clone(), any::<u32>()).prop_map(|(k, v)| Op::Insert(k, v)),
        2 => key.clone().prop_map(Op::Remove),
        1 => key.prop_map(Op::Get),
    ]
}

proptest! {
    #[test]
    fn matches_btree_map(ops in prop::collection::vec(op_strategy(), 0..2_000)) {
        let mut map = AvlTreeMap::new();
        let mut oracle = BTreeMap::new();

        for op in ops {
            match op {
                Op::Insert(key, value) => {
                    prop_assert_eq!(map.insert(key, value), oracle.insert(key, value));
                }
                Op::Remove(key) => {
                    prop_assert_eq!(map.remove(&key), oracle.remove(&key));
                }
                Op::Get(key) => {
                    prop_assert_eq!(map.get(&key), oracle.get(&key));
                }
            }
            prop_assert_eq!(map.len(), oracle.len());
        }

        map.check_consistency();
        prop_assert!(map.iter().eq(oracle.iter()));
    }

    #[test]
    fn height_stays_within_avl_bound(keys in prop::collection::btree_set(any::<u64>(), 0..1_000)) {
        let mut map = AvlTreeMap::new();
        for key in &keys {
            map.insert(*key, ());
        }

        let bound = (1.44 * ((keys.len() + 2) as f64).log2()).ceil() as usize;
        prop_assert!(map.check().unwrap() <= bound);
    }
}
