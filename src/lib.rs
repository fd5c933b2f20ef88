//! dualkey-hashmap: a single-threaded map keyed either by object identity
//! (`Rc<O>`) or by scalar value, that survives world duplication and
//! serializes without leaking process-local identity.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: one container with two physically separate keyspaces, where
//!   identity keys stay valid for the life of their entry and can be
//!   re-derived wholesale after the world is duplicated.
//! - Layers:
//!   - `identity::resolve`: address-derived `Identity` of a live key.
//!   - IdentityStore<O, V, S>: slot storage plus a `HashTable` index on the
//!     stored identity hash; the slot key is the entry's `IdentityToken`.
//!   - DualKeyMap<O, V, W>: public handle over the identity store and a
//!     scalar `HashMap`, with a merged iteration cursor and a wrap strategy
//!     `W` run on every stored value.
//!   - DuplicationCoordinator: per-world registry of live containers;
//!     `world_duplicated` rehashes all of them.
//!   - WorldFork / Duplicate: copy values and containers into a new world,
//!     carrying each `Rc` exactly once.
//!   - freeze / thaw: tagged, identity-free snapshot; serde goes through it.
//!
//! Constraints
//! - Single-threaded: `!Send`/`!Sync` (built on `Rc` and `RefCell`).
//! - Entries own their key `Rc`, so a key's address cannot be reused while
//!   its entry exists.
//! - Object keys compare by allocation; scalar keys by typed value
//!   (`Int(1)` and `Str("1")` are different keys).
//! - Absence is `None`; a stored `Null` is `Some(Null)`.
//!
//! Identity and duplication
//! - Each identity entry stores its `Identity` and hash. Index maintenance
//!   always uses the stored hash, so removal by token works even while the
//!   identities are stale.
//! - A duplicated container keeps the old world's identities until it is
//!   rehashed, through its coordinator or explicitly. Otherwise the first
//!   identity-key operation rehashes it, so a stale index never answers a
//!   lookup or admits a second entry for a carried key.
//! - Recursive walks (`Debug`, serialization) track the containers they are
//!   inside of; a self-referencing container prints `<cycle>` and fails to
//!   serialize instead of overflowing the stack.
//! - The registry holds members weakly and compacts dead ones every
//!   `prune_interval` registrations. With weak references disabled it pins
//!   members instead and warns once that it cannot self-prune.
//!
//! Reentrancy
//! - The identity store never calls user code while its index is being
//!   edited (identities are plain integers). A debug-only critical section
//!   still guards every entry point.
//! - Removed keys and values are dropped after the container borrow is
//!   released, so their `Drop` may use the container again.
//!
//! Notes and non-goals
//! - No thread-safe variant and no iteration-order guarantee.
//! - Thawed containers are unregistered unless `thaw_in` is used.

mod coordinator;
mod duplicate;
mod error;
mod freeze;
pub mod identity;
pub mod identity_store;
mod key;
mod map;
mod nest;
mod reentrancy;

// Public surface
pub use coordinator::{DuplicationCoordinator, InstanceId, Rehash, RegistryConfig};
pub use duplicate::{Duplicate, WorldFork};
pub use error::{Error, Result};
pub use freeze::{format_tag, Frozen, FORMAT_NAME, FORMAT_VERSION};
pub use identity::{Identity, IdentityToken};
pub use key::{Key, Scalar};
pub use map::{DualKeyMap, Iter};
pub use nest::{Flat, Nest, NestedMap, Value, WrapScope, WrapValue};
