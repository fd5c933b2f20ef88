//! DualKeyMap: the public container.
//!
//! A `DualKeyMap` is a cheap, cloneable handle; every clone sees and
//! mutates the same container, which is destroyed with its last handle.
//! Object keys go to the identity store, scalar keys to the scalar store,
//! and the two keyspaces never collide.

use crate::coordinator::{DuplicationCoordinator, InstanceId, Membership, Rehash, RegistryLink};
use crate::identity::IdentityToken;
use crate::identity_store::IdentityStore;
use crate::key::{Key, Scalar};
use crate::nest::{Flat, WrapScope, WrapValue};
use crate::reentrancy::WalkGuard;
use core::cell::RefCell;
use core::fmt;
use core::marker::PhantomData;
use hashbrown::HashMap;
use std::rc::Rc;
use tracing::trace;

pub(crate) struct Stores<O, V> {
    pub(crate) identity: IdentityStore<O, V>,
    pub(crate) scalars: HashMap<Scalar, V>,
    /// Set on a duplicated copy until its identities are recomputed.
    pub(crate) stale: bool,
}

impl<O, V> Stores<O, V> {
    fn new() -> Self {
        Self {
            identity: IdentityStore::new(),
            scalars: HashMap::new(),
            stale: false,
        }
    }
}

impl<O, V> Rehash for RefCell<Stores<O, V>> {
    fn rehash(&self) {
        let mut stores = self.borrow_mut();
        stores.identity.rehash();
        stores.stale = false;
        trace!(entries = stores.identity.len(), "identity store rehashed");
    }
}

pub(crate) struct Shared<O, V> {
    pub(crate) stores: Rc<RefCell<Stores<O, V>>>,
    membership: Option<Membership>,
}

pub struct DualKeyMap<O, V, W = Flat> {
    pub(crate) shared: Rc<Shared<O, V>>,
    _wrap: PhantomData<fn() -> W>,
}

impl<O, V, W> Clone for DualKeyMap<O, V, W> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
            _wrap: PhantomData,
        }
    }
}

impl<O, V, W> DualKeyMap<O, V, W>
where
    O: 'static,
    V: 'static,
    W: WrapValue<O, V>,
{
    /// An empty container not tracked by any coordinator.
    pub fn new() -> Self {
        Self::with_link(None)
    }

    pub fn from_pairs<K, I>(pairs: I) -> Self
    where
        K: Into<Key<O>>,
        I: IntoIterator<Item = (K, V)>,
    {
        let map = Self::new();
        map.extend_from(pairs);
        map
    }

    /// An empty container registered with `coordinator`, so it is rehashed
    /// on every world duplication the coordinator handles.
    pub fn registered(coordinator: &DuplicationCoordinator) -> Self {
        Self::with_link(Some(&coordinator.link()))
    }

    pub fn registered_from_pairs<K, I>(coordinator: &DuplicationCoordinator, pairs: I) -> Self
    where
        K: Into<Key<O>>,
        I: IntoIterator<Item = (K, V)>,
    {
        let map = Self::registered(coordinator);
        map.extend_from(pairs);
        map
    }

    pub(crate) fn with_link(link: Option<&RegistryLink>) -> Self {
        let stores = Rc::new(RefCell::new(Stores::new()));
        let membership = link.and_then(|link| {
            let member: Rc<dyn Rehash> = stores.clone();
            Membership::join(link, &member)
        });
        Self::from_shared(Rc::new(Shared { stores, membership }))
    }

    pub(crate) fn from_shared(shared: Rc<Shared<O, V>>) -> Self {
        Self {
            shared,
            _wrap: PhantomData,
        }
    }

    fn extend_from<K, I>(&self, pairs: I)
    where
        K: Into<Key<O>>,
        I: IntoIterator<Item = (K, V)>,
    {
        for (k, v) in pairs {
            self.set(k, v);
        }
    }

    /// Registry id, when the container is tracked by a live coordinator.
    pub fn instance_id(&self) -> Option<InstanceId> {
        self.shared.membership.as_ref().map(Membership::id)
    }

    /// True when both handles point at the same container.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }

    pub fn len(&self) -> usize {
        let stores = self.shared.stores.borrow();
        stores.identity.len() + stores.scalars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &Key<O>) -> Option<V>
    where
        V: Clone,
    {
        self.with_value(key, V::clone)
    }

    /// Run `f` on the stored value without cloning it.
    pub fn with_value<R>(&self, key: &Key<O>, f: impl FnOnce(&V) -> R) -> Option<R> {
        self.settle(key);
        let stores = self.shared.stores.borrow();
        let value = match key {
            Key::Object(obj) => stores.identity.get(obj),
            Key::Scalar(s) => stores.scalars.get(s),
        };
        value.map(f)
    }

    pub fn contains(&self, key: &Key<O>) -> bool {
        self.settle(key);
        let stores = self.shared.stores.borrow();
        match key {
            Key::Object(obj) => stores.identity.contains(obj),
            Key::Scalar(s) => stores.scalars.contains_key(s),
        }
    }

    /// Store `value` under `key`, returning the value it replaced.
    ///
    /// The wrap strategy `W` sees the value first and may rewrite it.
    pub fn set(&self, key: impl Into<Key<O>>, mut value: V) -> Option<V> {
        let key = key.into();
        self.wrap_in_place(&mut value);
        self.settle(&key);
        let mut stores = self.shared.stores.borrow_mut();
        match key {
            Key::Object(obj) => stores.identity.upsert(obj, value).1,
            Key::Scalar(s) => stores.scalars.insert(s, value),
        }
    }

    /// Remove `key`, returning its value. The owned key object is released
    /// after the store is consistent again.
    pub fn delete(&self, key: &Key<O>) -> Option<V> {
        self.settle(key);
        match key {
            Key::Object(obj) => {
                let removed = self.shared.stores.borrow_mut().identity.remove(obj);
                removed.map(|(_key, value)| value)
            }
            Key::Scalar(s) => {
                let removed = self.shared.stores.borrow_mut().scalars.remove(s);
                removed
            }
        }
    }

    pub fn clear(&self) {
        let (objects, scalars) = {
            let mut stores = self.shared.stores.borrow_mut();
            let objects = stores.identity.drain();
            let scalars = core::mem::take(&mut stores.scalars);
            (objects, scalars)
        };
        drop(objects);
        drop(scalars);
    }

    /// Lazy pass over every entry: identity store first, then scalars.
    pub fn iter(&self) -> Iter<O, V> {
        let tokens = self.shared.stores.borrow().identity.tokens();
        Iter {
            stores: Rc::clone(&self.shared.stores),
            cursor: Cursor::InIdentityStore(tokens.into_iter()),
        }
    }

    pub fn keys(&self) -> Vec<Key<O>> {
        let stores = self.shared.stores.borrow();
        let objects = stores.identity.iter().map(|(_, k, _)| Key::Object(Rc::clone(k)));
        let scalars = stores.scalars.keys().cloned().map(Key::Scalar);
        objects.chain(scalars).collect()
    }

    pub fn values(&self) -> Vec<V>
    where
        V: Clone,
    {
        let stores = self.shared.stores.borrow();
        let objects = stores.identity.iter().map(|(_, _, v)| v.clone());
        let scalars = stores.scalars.values().cloned();
        objects.chain(scalars).collect()
    }

    /// Recompute every identity in this container. A duplicated container
    /// is rehashed here, through its coordinator, or on its first
    /// identity-key operation, whichever comes first.
    pub fn rehash(&self) {
        Rehash::rehash(&*self.shared.stores);
    }

    // A stale index must never answer an identity lookup: it would miss
    // carried keys and could match a reused old-world address.
    fn settle(&self, key: &Key<O>) {
        if key.is_object() && self.needs_rehash() {
            self.rehash();
        }
    }

    pub(crate) fn address(&self) -> usize {
        Rc::as_ptr(&self.shared) as *const () as usize
    }

    pub fn needs_rehash(&self) -> bool {
        self.shared.stores.borrow().stale
    }

    /// Apply this container's wrap strategy to `value`.
    pub fn wrap_in_place(&self, value: &mut V) {
        W::wrap(value, &self.scope());
    }

    fn scope(&self) -> WrapScope {
        WrapScope::new(
            self.shared
                .membership
                .as_ref()
                .map(|m| m.link().clone()),
        )
    }
}

impl<O, V, W> Default for DualKeyMap<O, V, W>
where
    O: 'static,
    V: 'static,
    W: WrapValue<O, V>,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<O, V, W, K> FromIterator<(K, V)> for DualKeyMap<O, V, W>
where
    O: 'static,
    V: 'static,
    W: WrapValue<O, V>,
    K: Into<Key<O>>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}

impl<O, V, W, K> Extend<(K, V)> for DualKeyMap<O, V, W>
where
    O: 'static,
    V: 'static,
    W: WrapValue<O, V>,
    K: Into<Key<O>>,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.extend_from(iter);
    }
}

impl<O, V, W> fmt::Debug for DualKeyMap<O, V, W>
where
    O: fmt::Debug + 'static,
    V: fmt::Debug + Clone + 'static,
    W: WrapValue<O, V>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(_walk) = WalkGuard::enter(self.address()) else {
            return f.write_str("<cycle>");
        };
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<'a, O, V, W> IntoIterator for &'a DualKeyMap<O, V, W>
where
    O: 'static,
    V: Clone + 'static,
    W: WrapValue<O, V>,
{
    type Item = (Key<O>, V);
    type IntoIter = Iter<O, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

enum Cursor {
    InIdentityStore(std::vec::IntoIter<IdentityToken>),
    InScalarStore(std::vec::IntoIter<Scalar>),
    Done,
}

/// Iterator over `(key, value)` pairs.
///
/// Each store is snapshotted when the cursor enters it and read entry by
/// entry, so the container is not borrowed between steps. Deleting the
/// entry just yielded is safe; entries deleted before they are reached are
/// skipped; entries inserted during the pass may or may not be seen.
pub struct Iter<O, V> {
    stores: Rc<RefCell<Stores<O, V>>>,
    cursor: Cursor,
}

impl<O, V: Clone> Iterator for Iter<O, V> {
    type Item = (Key<O>, V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match &mut self.cursor {
                Cursor::InIdentityStore(tokens) => match tokens.next() {
                    Some(token) => {
                        let stores = self.stores.borrow();
                        if let Some((k, v)) = stores.identity.entry(token) {
                            return Some((Key::Object(Rc::clone(k)), v.clone()));
                        }
                    }
                    None => {
                        let keys: Vec<Scalar> = self.stores.borrow().scalars.keys().cloned().collect();
                        self.cursor = Cursor::InScalarStore(keys.into_iter());
                    }
                },
                Cursor::InScalarStore(keys) => match keys.next() {
                    Some(s) => {
                        let stores = self.stores.borrow();
                        if let Some(v) = stores.scalars.get(&s) {
                            let v = v.clone();
                            return Some((Key::Scalar(s), v));
                        }
                    }
                    None => self.cursor = Cursor::Done,
                },
                Cursor::Done => return None,
            }
        }
    }
}
