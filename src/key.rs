//! Keys: identity-bearing objects or plain scalars.
//!
//! Scalar keys compare by typed value. `Int(1)` and `Str("1")` are two
//! different keys, and `Null` is an ordinary storable key. Object keys
//! compare by allocation identity only; two structurally equal objects in
//! different allocations are different keys.

use core::fmt;
use core::hash::{Hash, Hasher};
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// A key compared by value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Scalar::Int(n)
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Str(s.to_owned())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Str(s)
    }
}

/// A map key: either an object located by identity or a scalar located by value.
#[derive(Serialize, Deserialize)]
pub enum Key<O> {
    Object(Rc<O>),
    Scalar(Scalar),
}

impl<O> Key<O> {
    pub fn object(obj: Rc<O>) -> Self {
        Key::Object(obj)
    }

    pub fn scalar(s: impl Into<Scalar>) -> Self {
        Key::Scalar(s.into())
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Key::Object(_))
    }

    pub fn as_object(&self) -> Option<&Rc<O>> {
        match self {
            Key::Object(o) => Some(o),
            Key::Scalar(_) => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Key::Object(_) => None,
            Key::Scalar(s) => Some(s),
        }
    }
}

impl<O> Clone for Key<O> {
    fn clone(&self) -> Self {
        match self {
            Key::Object(o) => Key::Object(Rc::clone(o)),
            Key::Scalar(s) => Key::Scalar(s.clone()),
        }
    }
}

impl<O> PartialEq for Key<O> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Key::Object(a), Key::Object(b)) => Rc::ptr_eq(a, b),
            (Key::Scalar(a), Key::Scalar(b)) => a == b,
            _ => false,
        }
    }
}

impl<O> Eq for Key<O> {}

impl<O> Hash for Key<O> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Key::Object(o) => {
                state.write_u8(0);
                crate::identity::resolve(o).hash(state);
            }
            Key::Scalar(s) => {
                state.write_u8(1);
                s.hash(state);
            }
        }
    }
}

impl<O: fmt::Debug> fmt::Debug for Key<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Object(o) => f
                .debug_tuple("Object")
                .field(&Rc::as_ptr(o))
                .field(&**o)
                .finish(),
            Key::Scalar(s) => fmt::Debug::fmt(s, f),
        }
    }
}

impl<O> From<Rc<O>> for Key<O> {
    fn from(o: Rc<O>) -> Self {
        Key::Object(o)
    }
}

impl<O> From<&Rc<O>> for Key<O> {
    fn from(o: &Rc<O>) -> Self {
        Key::Object(Rc::clone(o))
    }
}

impl<O> From<Scalar> for Key<O> {
    fn from(s: Scalar) -> Self {
        Key::Scalar(s)
    }
}

impl<O> From<bool> for Key<O> {
    fn from(b: bool) -> Self {
        Key::Scalar(b.into())
    }
}

impl<O> From<i64> for Key<O> {
    fn from(n: i64) -> Self {
        Key::Scalar(n.into())
    }
}

impl<O> From<&str> for Key<O> {
    fn from(s: &str) -> Self {
        Key::Scalar(s.into())
    }
}

impl<O> From<String> for Key<O> {
    fn from(s: String) -> Self {
        Key::Scalar(s.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn objects_compare_by_allocation() {
        let a = Rc::new("same".to_string());
        let b = Rc::new("same".to_string());
        let ka: Key<String> = Key::from(&a);
        assert_eq!(ka, Key::from(&a));
        assert_ne!(ka, Key::from(&b));
    }

    #[test]
    fn scalars_compare_by_typed_value() {
        let one: Key<String> = Key::from(1i64);
        assert_eq!(one, Key::scalar(1i64));
        assert_ne!(one, Key::from("1"));
        assert_ne!(Key::<String>::Scalar(Scalar::Null), Key::from(""));
    }

    #[test]
    fn hash_agrees_with_eq() {
        let a = Rc::new(7u32);
        let mut set: HashSet<Key<u32>> = HashSet::new();
        set.insert(Key::from(&a));
        set.insert(Key::from(&a));
        set.insert(Key::from(Rc::new(7u32)));
        set.insert(Key::from(7i64));
        assert_eq!(set.len(), 3);
    }
}
