//! Debug-only critical-section marker.
//!
//! The identity store is briefly inconsistent while it relinks its index
//! (most visibly during `rehash`). Each public entry point opens a section;
//! opening a second one while the first is live panics in debug builds and
//! names both operations. Release builds compile this away.
//!
//! `WalkGuard` covers the other kind of reentrancy: a recursive walk
//! (`Debug`, serialization) arriving back at a container it is already
//! inside of, which a self-referencing nested map makes possible.

use core::cell::{Cell, RefCell};
use core::marker::PhantomData;
use hashbrown::HashSet;

#[derive(Debug)]
pub struct CriticalSection {
    #[cfg(debug_assertions)]
    active: Cell<Option<&'static str>>,
    // !Send + !Sync, like the stores it guards.
    _nosend: PhantomData<*mut ()>,
}

impl CriticalSection {
    pub const fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            active: Cell::new(None),
            _nosend: PhantomData,
        }
    }

    /// Open the section for `op`. Panics in debug builds if already open.
    #[inline]
    pub fn enter(&self, op: &'static str) -> SectionGuard<'_> {
        #[cfg(debug_assertions)]
        {
            if let Some(outer) = self.active.replace(Some(op)) {
                self.active.set(Some(outer));
                panic!("nested `{op}` while `{outer}` is in progress on the same store");
            }
            SectionGuard { owner: self }
        }

        #[cfg(not(debug_assertions))]
        {
            let _ = op;
            SectionGuard { _lt: PhantomData }
        }
    }

    /// Name of the operation currently holding the section, if any.
    #[cfg(debug_assertions)]
    pub fn holder(&self) -> Option<&'static str> {
        self.active.get()
    }
}

impl Default for CriticalSection {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SectionGuard<'a> {
    #[cfg(debug_assertions)]
    owner: &'a CriticalSection,
    #[cfg(not(debug_assertions))]
    _lt: PhantomData<&'a ()>,
}

impl Drop for SectionGuard<'_> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        {
            let prev = self.owner.active.take();
            debug_assert!(prev.is_some());
        }
    }
}

thread_local! {
    static WALKING: RefCell<HashSet<usize>> = RefCell::new(HashSet::new());
}

/// Marks one container as being walked on this thread.
pub(crate) struct WalkGuard {
    addr: usize,
}

impl WalkGuard {
    /// `None` when `addr` is already being walked further up the stack.
    pub(crate) fn enter(addr: usize) -> Option<Self> {
        WALKING
            .with(|w| w.borrow_mut().insert(addr))
            .then_some(Self { addr })
    }
}

impl Drop for WalkGuard {
    fn drop(&mut self) {
        WALKING.with(|w| {
            w.borrow_mut().remove(&self.addr);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::{CriticalSection, WalkGuard};

    #[test]
    fn walk_guard_refuses_reentry_until_released() {
        let outer = WalkGuard::enter(0x10).expect("first visit");
        assert!(WalkGuard::enter(0x10).is_none());
        let other = WalkGuard::enter(0x20).expect("different container");
        drop(other);
        drop(outer);
        assert!(WalkGuard::enter(0x10).is_some());
    }

    #[test]
    fn sequential_sections_are_fine() {
        let s = CriticalSection::new();
        drop(s.enter("find"));
        drop(s.enter("upsert"));
    }

    #[cfg(debug_assertions)]
    #[test]
    fn guard_releases_on_drop() {
        let s = CriticalSection::new();
        {
            let _g = s.enter("rehash");
            assert_eq!(s.holder(), Some("rehash"));
        }
        assert_eq!(s.holder(), None);
    }

    #[cfg(debug_assertions)]
    #[test]
    fn nested_entry_panics_and_keeps_outer_holder() {
        let s = CriticalSection::new();
        let _outer = s.enter("rehash");
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _inner = s.enter("find");
        }));
        assert!(res.is_err(), "expected nested entry to panic in debug builds");
        assert_eq!(s.holder(), Some("rehash"));
    }
}
