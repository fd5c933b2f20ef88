//! IdentityStore: identity-keyed entries behind stable tokens.
//!
//! Entries live in a `SlotMap`; the slot key is the entry's
//! `IdentityToken`. A `HashTable` index maps the hash of each entry's
//! stored `Identity` to its slot. Every entry owns its key `Rc`, so the key
//! cannot be freed (and its address reused) while the entry exists.
//!
//! The stored identity and hash are only refreshed by `rehash`. Index
//! maintenance always uses the stored hash, so removal keeps working even
//! when the identities are stale after a world duplication; lookups by
//! identity do not.

use crate::identity::{resolve, Identity, IdentityToken};
use crate::reentrancy::CriticalSection;
use core::hash::BuildHasher;
use hashbrown::hash_table;
use hashbrown::HashTable;
use slotmap::{DefaultKey, SlotMap};
use std::collections::hash_map::RandomState;
use std::rc::Rc;

#[derive(Debug)]
struct Entry<O, V> {
    key: Rc<O>,
    value: V,
    identity: Identity,
    hash: u64,
}

pub struct IdentityStore<O, V, S = RandomState> {
    hasher: S,
    index: HashTable<DefaultKey>,
    slots: SlotMap<DefaultKey, Entry<O, V>>,
    section: CriticalSection,
}

impl<O, V> IdentityStore<O, V> {
    pub fn new() -> Self {
        Self::with_hasher(Default::default())
    }
}

impl<O, V> Default for IdentityStore<O, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O, V, S> IdentityStore<O, V, S>
where
    S: BuildHasher,
{
    pub fn with_hasher(hasher: S) -> Self {
        Self {
            hasher,
            index: HashTable::new(),
            slots: SlotMap::with_key(),
            section: CriticalSection::new(),
        }
    }

    fn make_hash(&self, identity: Identity) -> u64 {
        self.hasher.hash_one(identity)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn find(&self, key: &Rc<O>) -> Option<IdentityToken> {
        let _g = self.section.enter("find");
        let identity = resolve(key);
        let hash = self.make_hash(identity);
        self.index
            .find(hash, |&k| {
                self.slots
                    .get(k)
                    .is_some_and(|e| e.identity == identity)
            })
            .map(|&k| IdentityToken::new(k))
    }

    pub fn contains(&self, key: &Rc<O>) -> bool {
        self.find(key).is_some()
    }

    pub fn get(&self, key: &Rc<O>) -> Option<&V> {
        let token = self.find(key)?;
        self.slots.get(token.raw()).map(|e| &e.value)
    }

    /// Insert `value` under `key`, or replace the value of the existing
    /// entry for the same identity. Returns the entry's token and the
    /// replaced value, if any.
    pub fn upsert(&mut self, key: Rc<O>, value: V) -> (IdentityToken, Option<V>) {
        let _g = self.section.enter("upsert");
        let identity = resolve(&key);
        let hash = self.make_hash(identity);
        match self.index.entry(
            hash,
            |&k| {
                self.slots
                    .get(k)
                    .is_some_and(|e| e.identity == identity)
            },
            |&k| self.slots.get(k).map_or(0, |e| e.hash),
        ) {
            hash_table::Entry::Occupied(o) => {
                let k = *o.get();
                let entry = self
                    .slots
                    .get_mut(k)
                    .expect("indexed slot must hold an entry");
                let prev = core::mem::replace(&mut entry.value, value);
                (IdentityToken::new(k), Some(prev))
            }
            hash_table::Entry::Vacant(v) => {
                let k = self.slots.insert(Entry {
                    key,
                    value,
                    identity,
                    hash,
                });
                let _ = v.insert(k);
                (IdentityToken::new(k), None)
            }
        }
    }

    /// Remove the entry for `key`, returning the owned key and value.
    pub fn remove(&mut self, key: &Rc<O>) -> Option<(Rc<O>, V)> {
        let _g = self.section.enter("remove");
        let identity = resolve(key);
        let hash = self.make_hash(identity);
        let slots = &self.slots;
        let occupied = self
            .index
            .find_entry(hash, |&k| slots.get(k).is_some_and(|e| e.identity == identity))
            .ok()?;
        let (k, _) = occupied.remove();
        self.slots.remove(k).map(|e| (e.key, e.value))
    }

    /// Remove by token. Works whether or not the identities are current.
    pub fn remove_token(&mut self, token: IdentityToken) -> Option<(Rc<O>, V)> {
        let _g = self.section.enter("remove_token");
        let k = token.raw();
        let entry = self.slots.remove(k)?;
        self.index
            .find_entry(entry.hash, |&kk| kk == k)
            .expect("live slot must be indexed under its stored hash")
            .remove();
        Some((entry.key, entry.value))
    }

    pub fn entry(&self, token: IdentityToken) -> Option<(&Rc<O>, &V)> {
        let _g = self.section.enter("entry");
        self.slots.get(token.raw()).map(|e| (&e.key, &e.value))
    }

    pub fn value_mut(&mut self, token: IdentityToken) -> Option<&mut V> {
        let _g = self.section.enter("value_mut");
        self.slots.get_mut(token.raw()).map(|e| &mut e.value)
    }

    /// Snapshot of every live token, in slot order.
    pub fn tokens(&self) -> Vec<IdentityToken> {
        self.slots.keys().map(IdentityToken::new).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (IdentityToken, &Rc<O>, &V)> {
        self.slots
            .iter()
            .map(|(k, e)| (IdentityToken::new(k), &e.key, &e.value))
    }

    /// Remove every entry and hand back the owned pairs.
    pub fn drain(&mut self) -> Vec<(Rc<O>, V)> {
        let _g = self.section.enter("drain");
        self.index.clear();
        self.slots.drain().map(|(_, e)| (e.key, e.value)).collect()
    }

    /// Recompute every entry's identity from the key it owns and rebuild the
    /// index from scratch. Tokens are kept; only the derived identity moves.
    pub fn rehash(&mut self) {
        let _g = self.section.enter("rehash");
        for (_, e) in self.slots.iter_mut() {
            e.identity = resolve(&e.key);
            e.hash = self.hasher.hash_one(e.identity);
        }
        let slots = &self.slots;
        let mut index = HashTable::with_capacity(slots.len());
        for (k, e) in slots.iter() {
            index.insert_unique(e.hash, k, |&kk| slots.get(kk).map_or(0, |e| e.hash));
        }
        self.index = index;
    }

    /// Copy the store entry by entry through `carry`, keeping the stored
    /// identities and hashes exactly as they are. The copy indexes its
    /// entries under the old identities until it is rehashed.
    pub(crate) fn fork<O2, V2, F>(&self, mut carry: F) -> IdentityStore<O2, V2, S>
    where
        S: Clone,
        F: FnMut(&Rc<O>, &V) -> (Rc<O2>, V2),
    {
        let _g = self.section.enter("fork");
        let mut slots = SlotMap::with_capacity_and_key(self.slots.len());
        for (_, e) in self.slots.iter() {
            let (key, value) = carry(&e.key, &e.value);
            slots.insert(Entry {
                key,
                value,
                identity: e.identity,
                hash: e.hash,
            });
        }
        let mut index = HashTable::with_capacity(slots.len());
        for (k, e) in slots.iter() {
            index.insert_unique(e.hash, k, |&kk: &DefaultKey| {
                slots.get(kk).map_or(0, |e: &Entry<O2, V2>| e.hash)
            });
        }
        IdentityStore {
            hasher: self.hasher.clone(),
            index,
            slots,
            section: CriticalSection::new(),
        }
    }
}
