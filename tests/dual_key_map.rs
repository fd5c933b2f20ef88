// DualKeyMap unit test suite.
//
// Core invariants exercised:
// - Dispatch: object keys by identity, scalar keys by typed value; the two
//   keyspaces never collide.
// - Absence: missing keys return None, distinct from a stored Null.
// - Iteration: every entry exactly once; deleting the entry just yielded
//   never skips or repeats another entry.
// - Ownership: an entry keeps its key object alive.
use dualkey_hashmap::{DualKeyMap, Key, Scalar, Value};
use std::collections::HashMap;
use std::rc::Rc;

type Map = DualKeyMap<String, i32>;

fn obj(s: &str) -> Key<String> {
    Key::object(Rc::new(s.to_string()))
}

// Test: structurally equal but distinct objects are distinct keys.
#[test]
fn structurally_equal_objects_do_not_collide() {
    let m = Map::new();
    let k1 = obj("same");
    let k2 = obj("same");
    assert_eq!(m.set(k1.clone(), 1), None);
    assert_eq!(m.set(k2.clone(), 2), None);
    assert_eq!(m.get(&k1), Some(1));
    assert_eq!(m.get(&k2), Some(2));
    assert_eq!(m.len(), 2);
}

// Test: set then get returns the value for identity and scalar keys alike.
#[test]
fn set_then_get_for_every_key_kind() {
    let m = Map::new();
    let keys = vec![
        obj("a"),
        Key::from(1i64),
        Key::from("s"),
        Key::from(true),
        Key::Scalar(Scalar::Null),
    ];
    for (i, k) in keys.iter().enumerate() {
        m.set(k.clone(), i as i32);
    }
    for (i, k) in keys.iter().enumerate() {
        assert_eq!(m.get(k), Some(i as i32));
        assert!(m.contains(k));
    }
    assert_eq!(m.len(), keys.len());
}

// Test: set returns the replaced value and keeps a single entry.
#[test]
fn set_returns_previous_value() {
    let m = Map::new();
    let k = obj("k");
    assert_eq!(m.set(k.clone(), 1), None);
    assert_eq!(m.set(k.clone(), 2), Some(1));
    assert_eq!(m.set("s", 3), None);
    assert_eq!(m.set("s", 4), Some(3));
    assert_eq!(m.len(), 2);
}

// Test: delete removes; contains/get report absence afterwards.
#[test]
fn delete_then_absent() {
    let m = Map::new();
    let k = obj("k");
    m.set(k.clone(), 1);
    m.set(5i64, 5);
    assert_eq!(m.delete(&k), Some(1));
    assert_eq!(m.delete(&Key::from(5i64)), Some(5));
    assert!(!m.contains(&k));
    assert_eq!(m.get(&k), None);
    assert_eq!(m.delete(&k), None);
    assert!(m.is_empty());
}

// Test: scalar equality is typed; an object whose content equals a scalar
// never matches that scalar.
#[test]
fn keyspaces_and_scalar_types_are_separate() {
    let m = Map::new();
    m.set(1i64, 1);
    m.set("1", 2);
    m.set(obj("1"), 3);
    assert_eq!(m.len(), 3);
    assert_eq!(m.get(&Key::from(1i64)), Some(1));
    assert_eq!(m.get(&Key::from("1")), Some(2));
}

// Test: None is distinct from a stored "no value".
#[test]
fn absence_is_distinct_from_stored_null() {
    let m: DualKeyMap<String, Value<String>> = DualKeyMap::new();
    let k = obj("k");
    m.set(k.clone(), Value::Null);
    m.set(Scalar::Null, Value::Null);
    assert!(matches!(m.get(&k), Some(Value::Null)));
    assert!(matches!(m.get(&Key::Scalar(Scalar::Null)), Some(Value::Null)));
    assert!(m.get(&obj("k")).is_none());
}

// Test: the entry owns its key; the key dies with the entry.
#[test]
fn entry_keeps_key_object_alive() {
    let m = Map::new();
    let rc = Rc::new("k".to_string());
    let weak = Rc::downgrade(&rc);
    m.set(rc, 1);
    assert!(weak.upgrade().is_some());

    let key = Key::object(weak.upgrade().unwrap());
    assert_eq!(m.delete(&key), Some(1));
    drop(key);
    assert!(weak.upgrade().is_none());
}

// Test: clear empties both stores and releases the keys.
#[test]
fn clear_empties_both_stores() {
    let m = Map::new();
    let rc = Rc::new("k".to_string());
    let weak = Rc::downgrade(&rc);
    m.set(rc, 1);
    m.set(1i64, 2);
    m.clear();
    assert!(m.is_empty());
    assert!(weak.upgrade().is_none());
    assert_eq!(m.iter().count(), 0);
}

// Test: iteration yields exactly the stored pairs, once each, with the real
// key objects rather than tokens.
#[test]
fn iteration_yields_each_pair_once() {
    let m = Map::new();
    let a = obj("a");
    let b = obj("b");
    let c = obj("c");
    m.set(a.clone(), 1);
    m.set(b.clone(), 2);
    m.set(c.clone(), 3);

    let seen: HashMap<Key<String>, i32> = m.iter().collect();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[&a], 1);
    assert_eq!(seen[&b], 2);
    assert_eq!(seen[&c], 3);
    assert_eq!(m.iter().count(), 3);
}

// Test: deleting the key just yielded, mid-iteration, neither skips nor
// repeats any other entry (both stores).
#[test]
fn deleting_current_entry_mid_iteration_is_safe() {
    let m = Map::new();
    let objects: Vec<_> = (0..20).map(|i| obj(&format!("o{i}"))).collect();
    for (i, k) in objects.iter().enumerate() {
        m.set(k.clone(), i as i32);
    }
    for i in 0..20i64 {
        m.set(i, 100 + i as i32);
    }

    let mut seen: Vec<i32> = Vec::new();
    for (k, v) in m.iter() {
        assert_eq!(m.delete(&k), Some(v));
        seen.push(v);
    }
    seen.sort_unstable();
    let mut expected: Vec<i32> = (0..20).chain(100..120).collect();
    expected.sort_unstable();
    assert_eq!(seen, expected);
    assert!(m.is_empty());
}

// Test: iteration restarts from scratch and is stable across reads.
#[test]
fn iteration_is_restartable_and_stable() {
    let m = Map::new();
    for i in 0..10i64 {
        m.set(i, i as i32);
    }
    m.set(obj("x"), -1);
    let first: Vec<i32> = m.iter().map(|(_, v)| v).collect();
    let second: Vec<i32> = m.iter().map(|(_, v)| v).collect();
    assert_eq!(first, second);
}

// Test: Create with initial pairs, FromIterator and Extend.
#[test]
fn construction_from_pairs() {
    let a = obj("a");
    let m = Map::from_pairs(vec![(a.clone(), 1), (Key::from(2i64), 2)]);
    assert_eq!(m.get(&a), Some(1));

    let mut n: Map = vec![(Key::from("x"), 10)].into_iter().collect();
    n.extend(vec![(a.clone(), 11)]);
    assert_eq!(n.len(), 2);
    assert_eq!(n.get(&a), Some(11));
}

// Test: keys/values snapshots and with_value cover every entry.
#[test]
fn keys_values_and_with_value() {
    let m = Map::new();
    let a = obj("a");
    m.set(a.clone(), 1);
    m.set("b", 2);
    assert_eq!(m.keys().len(), 2);
    let mut values = m.values();
    values.sort_unstable();
    assert_eq!(values, vec![1, 2]);
    assert_eq!(m.with_value(&a, |v| v * 10), Some(10));
    assert_eq!(m.with_value(&obj("a"), |v| v * 10), None);
}

// Test: clones of a handle mutate the same container; Debug lists entries.
#[test]
fn handles_share_state_and_debug_prints() {
    let m = Map::new();
    let alias = m.clone();
    alias.set(7i64, 7);
    assert_eq!(m.get(&Key::from(7i64)), Some(7));
    let dbg = format!("{m:?}");
    assert_eq!(dbg, "{Int(7): 7}");
}

// Test: values holding handles to the same map can be removed without
// tripping the container borrow during their drop.
#[test]
fn dropping_removed_value_may_touch_container() {
    struct Touch(DualKeyMap<String, Touchy>);
    impl Drop for Touch {
        fn drop(&mut self) {
            self.0.set("dropped", Touchy(None));
        }
    }
    #[derive(Clone)]
    struct Touchy(Option<Rc<Touch>>);

    let m: DualKeyMap<String, Touchy> = DualKeyMap::new();
    let k = obj("k");
    m.set(k.clone(), Touchy(Some(Rc::new(Touch(m.clone())))));
    drop(m.delete(&k));
    assert!(m.contains(&Key::from("dropped")));
    assert_eq!(m.len(), 1);
}
