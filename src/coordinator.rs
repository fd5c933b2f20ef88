//! Duplication coordinator: the registry of live containers that must be
//! rehashed when the world is duplicated.
//!
//! Containers join on construction and leave when their last handle is
//! dropped. The registry keeps only `Weak` members by default, so it never
//! extends a container's life; members whose container is already gone are
//! skipped during a duplication and compacted every `prune_interval`
//! registrations. With `weak_refs` disabled the registry pins its members
//! instead and cannot compact itself, which is reported once as a warning.

use core::cell::RefCell;
use slotmap::{new_key_type, SlotMap};
use std::rc::{Rc, Weak};
use tracing::{debug, trace, warn};

new_key_type! {
    /// Side-table id of a registered container.
    pub struct InstanceId;
}

/// Anything whose derived identities must be recomputed after a duplication.
pub trait Rehash {
    fn rehash(&self);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Registrations between two compaction passes over dead members.
    pub prune_interval: usize,
    /// Hold members weakly. When false, members are pinned and never pruned.
    pub weak_refs: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            prune_interval: 1000,
            weak_refs: true,
        }
    }
}

enum Member {
    Weak(Weak<dyn Rehash>),
    Pinned(Rc<dyn Rehash>),
}

impl Member {
    fn live(&self) -> Option<Rc<dyn Rehash>> {
        match self {
            Member::Weak(w) => w.upgrade(),
            Member::Pinned(rc) => Some(Rc::clone(rc)),
        }
    }
}

pub(crate) struct Registry {
    members: SlotMap<InstanceId, Member>,
    config: RegistryConfig,
    since_prune: usize,
    warned_degraded: bool,
}

pub(crate) type RegistryLink = Weak<RefCell<Registry>>;

impl Registry {
    fn register(&mut self, member: &Rc<dyn Rehash>) -> InstanceId {
        self.since_prune += 1;
        let member = if self.config.weak_refs {
            if self.since_prune >= self.config.prune_interval.max(1) {
                self.prune();
            }
            Member::Weak(Rc::downgrade(member))
        } else {
            if !self.warned_degraded {
                self.warned_degraded = true;
                warn!(
                    "duplication registry holds containers strongly; it cannot self-prune and may grow without bound"
                );
            }
            Member::Pinned(Rc::clone(member))
        };
        let id = self.members.insert(member);
        trace!(?id, members = self.members.len(), "container registered");
        id
    }

    fn prune(&mut self) -> usize {
        self.since_prune = 0;
        let before = self.members.len();
        self.members.retain(|_, m| match m {
            Member::Weak(w) => w.strong_count() > 0,
            Member::Pinned(_) => true,
        });
        let pruned = before - self.members.len();
        debug!(pruned, remaining = self.members.len(), "pruned duplication registry");
        pruned
    }
}

/// Membership of one container in a coordinator; leaves on drop.
pub(crate) struct Membership {
    link: RegistryLink,
    id: InstanceId,
}

impl Membership {
    pub(crate) fn join(link: &RegistryLink, member: &Rc<dyn Rehash>) -> Option<Self> {
        let registry = link.upgrade()?;
        let id = registry.borrow_mut().register(member);
        Some(Self {
            link: link.clone(),
            id,
        })
    }

    pub(crate) fn id(&self) -> InstanceId {
        self.id
    }

    pub(crate) fn link(&self) -> &RegistryLink {
        &self.link
    }
}

impl Drop for Membership {
    fn drop(&mut self) {
        // A busy registry is left alone; the dead member is pruned later.
        if let Some(registry) = self.link.upgrade() {
            let removed = match registry.try_borrow_mut() {
                Ok(mut reg) => reg.members.remove(self.id),
                Err(_) => None,
            };
            // A pinned member may own the last reference to its stores;
            // release it only after the registry borrow is gone.
            if removed.is_some() {
                trace!(id = ?self.id, "container deregistered");
            }
            drop(removed);
        }
    }
}

/// Owner of one world's container registry.
pub struct DuplicationCoordinator {
    registry: Rc<RefCell<Registry>>,
}

impl DuplicationCoordinator {
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            registry: Rc::new(RefCell::new(Registry {
                members: SlotMap::with_key(),
                config,
                since_prune: 0,
                warned_degraded: false,
            })),
        }
    }

    pub(crate) fn link(&self) -> RegistryLink {
        Rc::downgrade(&self.registry)
    }

    pub fn config(&self) -> RegistryConfig {
        self.registry.borrow().config.clone()
    }

    /// True when members are pinned because weak references are disabled.
    pub fn is_degraded(&self) -> bool {
        !self.registry.borrow().config.weak_refs
    }

    /// Registry entries, including dead ones not yet pruned.
    pub fn len(&self) -> usize {
        self.registry.borrow().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered containers that are still alive.
    pub fn live(&self) -> usize {
        self.registry
            .borrow()
            .members
            .values()
            .filter(|m| m.live().is_some())
            .count()
    }

    /// Drop every dead member now. Returns how many were removed.
    pub fn prune(&self) -> usize {
        self.registry.borrow_mut().prune()
    }

    /// Handle a world duplication: rehash every live registered container.
    ///
    /// Containers not rehashed here rehash themselves on their first
    /// identity-key operation. Returns the number of containers rehashed.
    pub fn world_duplicated(&self) -> usize {
        // Collect first so rehashing never runs under the registry borrow.
        let live: Vec<Rc<dyn Rehash>> = self
            .registry
            .borrow()
            .members
            .values()
            .filter_map(Member::live)
            .collect();
        for member in &live {
            member.rehash();
        }
        debug!(rehashed = live.len(), "world duplication handled");
        live.len()
    }

    /// Tear the registry down. Containers outlive it and simply stop being
    /// tracked; pinned members are released.
    pub fn teardown(self) {
        let members = core::mem::take(&mut self.registry.borrow_mut().members);
        debug!(released = members.len(), "duplication coordinator torn down");
        drop(members);
    }
}

impl Default for DuplicationCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
