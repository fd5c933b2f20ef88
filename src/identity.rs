//! Identity resolution.
//!
//! `Identity` is derived from where a key object lives right now. It is
//! only meaningful while the key is alive and only inside the current
//! world; a world duplication moves every object and so invalidates every
//! `Identity` at once. `IdentityToken` is assigned when an entry is created
//! and never changes for that entry.

use slotmap::DefaultKey;
use std::rc::Rc;

/// Address-derived identity of a live key object.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Identity(usize);

/// Compute the identity of `key` in the current world.
///
/// Two simultaneously alive allocations never share an address, so distinct
/// live keys never share an identity.
#[inline]
pub fn resolve<O: ?Sized>(key: &Rc<O>) -> Identity {
    Identity(Rc::as_ptr(key) as *const () as usize)
}

/// Stable per-entry token, assigned at insertion time.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct IdentityToken(DefaultKey);

impl IdentityToken {
    pub(crate) fn new(k: DefaultKey) -> Self {
        IdentityToken(k)
    }

    pub(crate) fn raw(&self) -> DefaultKey {
        self.0
    }
}
