//! Wrap strategies and the nestable value type.
//!
//! A container runs its strategy `W` on every value it is about to store.
//! `Flat` leaves values alone. `Nest` turns a plain `Value::Mapping` into a
//! `NestedMap` holding the same entries, so identity keys work at every
//! level of a nested structure.

use crate::coordinator::RegistryLink;
use crate::key::Key;
use crate::map::DualKeyMap;
use core::fmt;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// Where a wrap runs: new containers created while wrapping join the same
/// coordinator as the container doing the storing.
pub struct WrapScope {
    link: Option<RegistryLink>,
}

impl WrapScope {
    pub(crate) fn new(link: Option<RegistryLink>) -> Self {
        Self { link }
    }

    /// A fresh, empty container in this scope.
    pub fn new_map<O, V, W>(&self) -> DualKeyMap<O, V, W>
    where
        O: 'static,
        V: 'static,
        W: WrapValue<O, V>,
    {
        DualKeyMap::with_link(self.link.as_ref())
    }
}

/// Rewrites a value in place before it is stored.
pub trait WrapValue<O, V>: 'static {
    fn wrap(value: &mut V, scope: &WrapScope);
}

/// Store values as given.
#[derive(Copy, Clone, Debug, Default)]
pub struct Flat;

impl<O, V> WrapValue<O, V> for Flat {
    #[inline]
    fn wrap(_value: &mut V, _scope: &WrapScope) {}
}

/// Upgrade plain mappings into nested containers.
#[derive(Copy, Clone, Debug, Default)]
pub struct Nest;

pub type NestedMap<O> = DualKeyMap<O, Value<O>, Nest>;

impl<O: 'static> WrapValue<O, Value<O>> for Nest {
    fn wrap(value: &mut Value<O>, scope: &WrapScope) {
        if let Value::Mapping(pairs) = value {
            let pairs = core::mem::take(pairs);
            let map: NestedMap<O> = scope.new_map();
            for (k, v) in pairs {
                map.set(k, v);
            }
            *value = Value::Map(map);
        }
    }
}

/// A dynamically typed value, as stored in a `NestedMap`.
#[derive(Serialize, Deserialize)]
#[serde(bound(
    serialize = "O: Serialize + 'static",
    deserialize = "O: Deserialize<'de> + 'static"
))]
pub enum Value<O> {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value<O>>),
    Object(Rc<O>),
    /// A plain mapping, not yet upgraded to a container.
    Mapping(Vec<(Key<O>, Value<O>)>),
    Map(NestedMap<O>),
}

impl<O> Value<O> {
    pub fn mapping() -> Self {
        Value::Mapping(Vec::new())
    }

    pub fn as_map(&self) -> Option<&NestedMap<O>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

// Manual so that cloning a value never requires `O: Clone`; objects and
// containers are shared, not copied.
impl<O> Clone for Value<O> {
    fn clone(&self) -> Self {
        match self {
            Value::Null => Value::Null,
            Value::Bool(b) => Value::Bool(*b),
            Value::Int(n) => Value::Int(*n),
            Value::Float(x) => Value::Float(*x),
            Value::Str(s) => Value::Str(s.clone()),
            Value::List(items) => Value::List(items.clone()),
            Value::Object(o) => Value::Object(Rc::clone(o)),
            Value::Mapping(pairs) => Value::Mapping(pairs.clone()),
            Value::Map(m) => Value::Map(m.clone()),
        }
    }
}

impl<O: fmt::Debug + 'static> fmt::Debug for Value<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(n) => write!(f, "Int({n})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::List(items) => f.debug_tuple("List").field(items).finish(),
            Value::Object(o) => f.debug_tuple("Object").field(&**o).finish(),
            Value::Mapping(pairs) => f.debug_tuple("Mapping").field(pairs).finish(),
            Value::Map(m) => f.debug_tuple("Map").field(m).finish(),
        }
    }
}

impl<O> From<i64> for Value<O> {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl<O> From<bool> for Value<O> {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<O> From<f64> for Value<O> {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl<O> From<&str> for Value<O> {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl<O> From<String> for Value<O> {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl<O> From<Rc<O>> for Value<O> {
    fn from(o: Rc<O>) -> Self {
        Value::Object(o)
    }
}

impl<O> From<NestedMap<O>> for Value<O> {
    fn from(m: NestedMap<O>) -> Self {
        Value::Map(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_leaves_mappings_alone() {
        let m: DualKeyMap<String, Value<String>> = DualKeyMap::new();
        m.set("plain", Value::mapping());
        assert!(matches!(m.get(&Key::from("plain")), Some(Value::Mapping(_))));
    }

    #[test]
    fn nest_upgrades_mapping_in_place() {
        let outer: NestedMap<String> = DualKeyMap::new();
        let mut v: Value<String> = Value::Mapping(vec![(Key::from("a"), Value::Int(1))]);
        outer.wrap_in_place(&mut v);
        let inner = v.as_map().expect("upgraded");
        assert_eq!(inner.get(&Key::from("a")).and_then(|v| v.as_int()), Some(1));
        // Already wrapped: no further conversion, same container.
        let before = inner.clone();
        outer.wrap_in_place(&mut v);
        assert!(v.as_map().unwrap().ptr_eq(&before));
    }
}
