//! Identity registry - at most one live proxy per object per direction
//!
//! Design:
//! - Slot arena with a generation counter; a token names one occupancy
//! - Entries observe both the underlying object and the proxy weakly
//! - A dead entry found on lookup is evicted and counted as a miss
//! - One registry per thread, created by `init` and reached only via `with`

use super::types::Direction;
use crate::errors::IdentityRegistryError;
use crate::frontend::config::RegistryConfig;
use serde::Serialize;
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use tracing::{debug, error, info, trace, warn};

thread_local! {
    static REGISTRY: RefCell<Option<IdentityRegistry>> = const { RefCell::new(None) };
}

/// Create the registry for this thread. Later calls keep the existing one,
/// so a differing config passed after the first call has no effect.
pub fn init(config: &RegistryConfig) {
    REGISTRY.with(|cell| {
        if let Ok(mut slot) = cell.try_borrow_mut() {
            match slot.as_ref() {
                None => {
                    info!(
                        sweep_threshold = config.sweep_threshold,
                        capacity = config.initial_capacity,
                        "identity registry initialized"
                    );
                    *slot = Some(IdentityRegistry::new(config));
                }
                Some(existing) if existing.config != *config => {
                    warn!(
                        kept_sweep_threshold = existing.config.sweep_threshold,
                        ignored_sweep_threshold = config.sweep_threshold,
                        "identity registry already initialized on this thread; new registry config ignored"
                    );
                }
                Some(_) => {}
            }
        }
    });
}


/// Run `f` against this thread's registry
pub fn with<R>(f: impl FnOnce(&mut IdentityRegistry) -> R) -> Result<R, IdentityRegistryError> {
    REGISTRY.with(|cell| {
        let mut guard = cell.try_borrow_mut().map_err(|_| {
            error!("identity registry accessed reentrantly");
            IdentityRegistryError::Reentrant
        })?;
        let registry = guard.as_mut().ok_or_else(|| {
            error!("identity registry used before initialization");
            IdentityRegistryError::Uninitialized
        })?;
        Ok(f(registry))
    })
}

/// Release from a destructor: a busy or torn-down registry is skipped and
/// the dead entry is swept later.
pub(crate) fn release_quietly(token: ProxyToken) {
    let _ = REGISTRY.try_with(|cell| {
        if let Ok(mut guard) = cell.try_borrow_mut() {
            if let Some(registry) = guard.as_mut() {
                let _ = registry.release(token);
            }
        }
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistryKey {
    pub direction: Direction,
    /// Runtime-native identity (allocation address) of the underlying object
    pub identity: usize,
}

impl RegistryKey {
    pub fn new(direction: Direction, identity: usize) -> Self {
        Self { direction, identity }
    }
}

/// Names one occupancy of one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyToken {
    pub slot: usize,
    pub generation: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub live: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub created: u64,
}

struct Entry {
    key: RegistryKey,
    underlying_alive: Box<dyn Fn() -> bool>,
    proxy: Weak<dyn Any>,
}

impl Entry {
    fn is_alive(&self) -> bool {
        self.proxy.strong_count() > 0 && (self.underlying_alive)()
    }
}

struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

pub struct IdentityRegistry {
    slots: Vec<Slot>,
    free: Vec<usize>,
    index: HashMap<RegistryKey, usize>,
    sweep_threshold: usize,
    inserts_since_sweep: usize,
    stats: RegistryStats,
    config: RegistryConfig,
}

impl IdentityRegistry {
    pub fn new(config: &RegistryConfig) -> Self {
        Self {
            slots: Vec::with_capacity(config.initial_capacity),
            free: Vec::new(),
            index: HashMap::with_capacity(config.initial_capacity),
            sweep_threshold: config.sweep_threshold.max(1),
            inserts_since_sweep: 0,
            stats: RegistryStats::default(),
            config: config.clone(),
        }
    }

    /// Return the live proxy registered for `key`, or build one with `make`
    /// and register it.
    ///
    /// `underlying_alive` reports whether the wrapped object still exists.
    /// An entry whose object or proxy is gone, or whose proxy is of another
    /// type, is evicted and the lookup is a miss.
    pub fn get_or_create<P: Any>(
        &mut self,
        key: RegistryKey,
        underlying_alive: Box<dyn Fn() -> bool>,
        make: impl FnOnce(ProxyToken) -> Rc<P>,
    ) -> Rc<P> {
        if let Some(&slot) = self.index.get(&key) {
            if let Some(proxy) = self.live_proxy::<P>(slot) {
                self.stats.hits += 1;
                trace!(identity = key.identity, direction = ?key.direction, "registry hit");
                return proxy;
            }
            self.evict(slot);
        }

        self.stats.misses += 1;
        let slot = self.allocate();
        let token = ProxyToken { slot, generation: self.slots[slot].generation };
        let proxy = make(token);
        let erased: Rc<dyn Any> = proxy.clone();
        self.slots[slot].entry = Some(Entry {
            key,
            underlying_alive,
            proxy: Rc::downgrade(&erased),
        });
        self.index.insert(key, slot);
        self.stats.created += 1;
        self.stats.live += 1;
        trace!(identity = key.identity, direction = ?key.direction, slot, "registry miss");

        self.inserts_since_sweep += 1;
        if self.inserts_since_sweep >= self.sweep_threshold {
            self.sweep();
        }
        proxy
    }

    fn live_proxy<P: Any>(&self, slot: usize) -> Option<Rc<P>> {
        let entry = self.slots.get(slot)?.entry.as_ref()?;
        if !entry.is_alive() {
            return None;
        }
        entry.proxy.upgrade()?.downcast::<P>().ok()
    }

    fn allocate(&mut self) -> usize {
        match self.free.pop() {
            Some(slot) => slot,
            None => {
                self.slots.push(Slot { generation: 0, entry: None });
                self.slots.len() - 1
            }
        }
    }

    fn vacate(&mut self, slot: usize) -> Option<Entry> {
        let s = self.slots.get_mut(slot)?;
        let entry = s.entry.take()?;
        s.generation = s.generation.wrapping_add(1);
        if self.index.get(&entry.key) == Some(&slot) {
            self.index.remove(&entry.key);
        }
        self.free.push(slot);
        self.stats.live -= 1;
        Some(entry)
    }

    fn evict(&mut self, slot: usize) {
        if let Some(entry) = self.vacate(slot) {
            self.stats.evictions += 1;
            debug!(identity = entry.key.identity, direction = ?entry.key.direction, slot, "registry evict");
        }
    }

    /// Free the slot a dropped proxy occupied
    pub fn release(&mut self, token: ProxyToken) -> Result<(), IdentityRegistryError> {
        let current = self.slots.get(token.slot).map(|s| (s.generation, s.entry.is_some()));
        match current {
            Some((generation, true)) if generation == token.generation => {
                self.vacate(token.slot);
                Ok(())
            }
            _ => Err(IdentityRegistryError::StaleToken {
                slot: token.slot,
                generation: token.generation,
            }),
        }
    }

    /// Evict every entry whose object or proxy is gone
    pub fn sweep(&mut self) -> usize {
        self.inserts_since_sweep = 0;
        let dead: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.entry.as_ref().is_some_and(|e| !e.is_alive()))
            .map(|(i, _)| i)
            .collect();
        for &slot in &dead {
            self.evict(slot);
        }
        if !dead.is_empty() {
            debug!(evicted = dead.len(), live = self.stats.live, "registry sweep");
        }
        dead.len()
    }

    pub fn contains(&self, key: &RegistryKey) -> bool {
        self.index
            .get(key)
            .and_then(|&slot| self.slots[slot].entry.as_ref())
            .is_some_and(Entry::is_alive)
    }

    pub fn len(&self) -> usize {
        self.stats.live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> RegistryStats {
        self.stats
    }
}

#[cfg(test)]
mod tests;
