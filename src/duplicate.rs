//! World duplication.
//!
//! A `WorldFork` copies a graph of values into a new world. Every `Rc` is
//! carried exactly once: all references to one old allocation end up
//! pointing at one new allocation, so a key shared by several containers
//! (or held by the caller) stays a single identity on the other side.
//!
//! Duplicated containers are a plain memory copy: their identity index
//! still describes the old world. They join the fork's target coordinator,
//! and calling `DuplicationCoordinator::world_duplicated` on it rehashes
//! them all.

use crate::coordinator::{DuplicationCoordinator, RegistryLink};
use crate::key::{Key, Scalar};
use crate::map::{DualKeyMap, Shared};
use crate::nest::{Value, WrapValue};
use core::any::Any;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::debug;

/// Deep copy into another world.
pub trait Duplicate {
    fn duplicate(&self, fork: &mut WorldFork) -> Self;
}

pub struct WorldFork {
    target: Option<RegistryLink>,
    // Old allocation address -> (old, new). Holding `old` keeps its
    // address from being reused while the fork is in progress.
    carried: HashMap<usize, (Rc<dyn Any>, Rc<dyn Any>)>,
}

fn address<T>(rc: &Rc<T>) -> usize {
    Rc::as_ptr(rc) as *const () as usize
}

impl WorldFork {
    /// Fork into the world owned by `target`.
    pub fn new(target: &DuplicationCoordinator) -> Self {
        Self {
            target: Some(target.link()),
            carried: HashMap::new(),
        }
    }

    /// Fork without registering the copies anywhere.
    pub fn detached() -> Self {
        Self {
            target: None,
            carried: HashMap::new(),
        }
    }

    pub(crate) fn target(&self) -> Option<&RegistryLink> {
        self.target.as_ref()
    }

    /// The new-world counterpart of `old`, duplicating it on first sight.
    pub fn carry<T: Duplicate + 'static>(&mut self, old: &Rc<T>) -> Rc<T> {
        if let Some(new) = self.recall(old) {
            return new;
        }
        let new = Rc::new((**old).duplicate(self));
        self.remember(old, &new);
        new
    }

    pub(crate) fn recall<T: 'static>(&self, old: &Rc<T>) -> Option<Rc<T>> {
        let (_, new) = self.carried.get(&address(old))?;
        Rc::clone(new).downcast::<T>().ok()
    }

    pub(crate) fn remember<T: 'static>(&mut self, old: &Rc<T>, new: &Rc<T>) {
        let old_any: Rc<dyn Any> = old.clone();
        let new_any: Rc<dyn Any> = new.clone();
        self.carried.insert(address(old), (old_any, new_any));
    }

    /// Allocations carried so far.
    pub fn carried(&self) -> usize {
        self.carried.len()
    }
}

impl Drop for WorldFork {
    fn drop(&mut self) {
        if !self.carried.is_empty() {
            debug!(carried = self.carried.len(), "world fork finished");
        }
    }
}

macro_rules! duplicate_by_clone {
    ($($t:ty),* $(,)?) => {
        $(impl Duplicate for $t {
            #[inline]
            fn duplicate(&self, _fork: &mut WorldFork) -> Self {
                self.clone()
            }
        })*
    };
}

duplicate_by_clone!(
    (), bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64,
    String, Scalar,
);

impl<T: Duplicate + 'static> Duplicate for Rc<T> {
    fn duplicate(&self, fork: &mut WorldFork) -> Self {
        fork.carry(self)
    }
}

impl<T: Duplicate> Duplicate for Box<T> {
    fn duplicate(&self, fork: &mut WorldFork) -> Self {
        Box::new((**self).duplicate(fork))
    }
}

impl<T: Duplicate> Duplicate for Option<T> {
    fn duplicate(&self, fork: &mut WorldFork) -> Self {
        self.as_ref().map(|v| v.duplicate(fork))
    }
}

impl<T: Duplicate> Duplicate for Vec<T> {
    fn duplicate(&self, fork: &mut WorldFork) -> Self {
        self.iter().map(|v| v.duplicate(fork)).collect()
    }
}

impl<A: Duplicate, B: Duplicate> Duplicate for (A, B) {
    fn duplicate(&self, fork: &mut WorldFork) -> Self {
        (self.0.duplicate(fork), self.1.duplicate(fork))
    }
}

impl<O: Duplicate + 'static> Duplicate for Key<O> {
    fn duplicate(&self, fork: &mut WorldFork) -> Self {
        match self {
            Key::Object(o) => Key::Object(fork.carry(o)),
            Key::Scalar(s) => Key::Scalar(s.clone()),
        }
    }
}

impl<O: Duplicate + 'static> Duplicate for Value<O> {
    fn duplicate(&self, fork: &mut WorldFork) -> Self {
        match self {
            Value::Null => Value::Null,
            Value::Bool(b) => Value::Bool(*b),
            Value::Int(n) => Value::Int(*n),
            Value::Float(x) => Value::Float(*x),
            Value::Str(s) => Value::Str(s.clone()),
            Value::List(items) => Value::List(items.duplicate(fork)),
            Value::Object(o) => Value::Object(fork.carry(o)),
            Value::Mapping(pairs) => Value::Mapping(pairs.duplicate(fork)),
            Value::Map(m) => Value::Map(m.duplicate(fork)),
        }
    }
}

impl<O, V, W> Duplicate for DualKeyMap<O, V, W>
where
    O: Duplicate + 'static,
    V: Duplicate + 'static,
    W: WrapValue<O, V>,
{
    fn duplicate(&self, fork: &mut WorldFork) -> Self {
        if let Some(shared) = fork.recall::<Shared<O, V>>(&self.shared) {
            return Self::from_shared(shared);
        }
        // Remember the twin before copying entries so cycles back to this
        // container resolve to it.
        let twin = Self::with_link(fork.target());
        fork.remember(&self.shared, &twin.shared);

        let (identity, scalars) = {
            let stores = self.shared.stores.borrow();
            let identity = stores
                .identity
                .fork(|k, v| (fork.carry(k), v.duplicate(fork)));
            let scalars = stores
                .scalars
                .iter()
                .map(|(s, v)| (s.clone(), v.duplicate(fork)))
                .collect();
            (identity, scalars)
        };

        {
            let mut stores = twin.shared.stores.borrow_mut();
            stores.identity = identity;
            stores.scalars = scalars;
            stores.stale = true;
        }
        twin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carry_is_memoized_per_allocation() {
        let mut fork = WorldFork::detached();
        let a = Rc::new("a".to_string());
        let a1 = fork.carry(&a);
        let a2 = fork.carry(&a.clone());
        assert!(Rc::ptr_eq(&a1, &a2));
        assert!(!Rc::ptr_eq(&a, &a1));
        assert_eq!(*a1, "a");
        assert_eq!(fork.carried(), 1);
    }

    #[test]
    fn nested_rcs_are_carried_once() {
        let shared = Rc::new(5u32);
        let pair = (shared.clone(), vec![shared.clone(), Rc::new(6u32)]);
        let mut fork = WorldFork::detached();
        let (x, ys) = pair.duplicate(&mut fork);
        assert!(Rc::ptr_eq(&x, &ys[0]));
        assert!(!Rc::ptr_eq(&x, &ys[1]));
        assert_eq!(fork.carried(), 2);
    }
}
