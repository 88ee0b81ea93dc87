//! ID-keyed registries of live subscriptions.
//!
//! A session owns one registry per [`WatcherKind`]. IDs are assigned by
//! the client; the registry only enforces that each ID maps to at most one
//! live subscription and that every subscription is disposed exactly once.

use std::collections::HashMap;
use std::fmt;

use crate::protocol::{WatcherId, WatcherKind};

use super::engine::{Subscription, SubscriptionKey};
use super::pattern::WatchPattern;

/// One live registration.
pub struct RegistryEntry {
    token: u64,
    pattern: WatchPattern,
    subscription: Box<dyn Subscription>,
}

impl RegistryEntry {
    pub fn new(token: u64, pattern: WatchPattern, subscription: Box<dyn Subscription>) -> Self {
        Self {
            token,
            pattern,
            subscription,
        }
    }

    pub fn token(&self) -> u64 {
        self.token
    }

    /// Release the underlying subscription.
    pub fn dispose(self) {
        self.subscription.dispose();
    }
}

impl fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("token", &self.token)
            .field("pattern", &self.pattern.glob())
            .finish_non_exhaustive()
    }
}

/// Registry for a single watcher kind.
#[derive(Debug, Default)]
pub struct WatcherRegistry {
    entries: HashMap<WatcherId, RegistryEntry>,
}

impl WatcherRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an entry under `id`.
    ///
    /// A live entry already stored under `id` is disposed first. Returns
    /// `true` when such a replacement happened.
    pub fn insert(&mut self, id: WatcherId, entry: RegistryEntry) -> bool {
        match self.entries.insert(id, entry) {
            Some(previous) => {
                previous.dispose();
                true
            }
            None => false,
        }
    }

    /// Remove and dispose the entry for `id`. Unknown IDs are a no-op.
    pub fn close(&mut self, id: WatcherId) -> bool {
        match self.entries.remove(&id) {
            Some(entry) => {
                entry.dispose();
                true
            }
            None => false,
        }
    }

    /// Token of the live entry for `id`.
    pub fn token(&self, id: WatcherId) -> Option<u64> {
        self.entries.get(&id).map(RegistryEntry::token)
    }

    pub fn contains(&self, id: WatcherId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dispose every entry and clear the registry.
    pub fn dispose_all(&mut self) -> usize {
        let count = self.entries.len();
        for (_, entry) in self.entries.drain() {
            entry.dispose();
        }
        count
    }
}

/// The three per-session registries.
#[derive(Debug, Default)]
pub struct Registries {
    dir: WatcherRegistry,
    dir_recursive: WatcherRegistry,
    file: WatcherRegistry,
}

impl Registries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: WatcherKind) -> &WatcherRegistry {
        match kind {
            WatcherKind::Dir => &self.dir,
            WatcherKind::DirRecursive => &self.dir_recursive,
            WatcherKind::File => &self.file,
        }
    }

    pub fn get_mut(&mut self, kind: WatcherKind) -> &mut WatcherRegistry {
        match kind {
            WatcherKind::Dir => &mut self.dir,
            WatcherKind::DirRecursive => &mut self.dir_recursive,
            WatcherKind::File => &mut self.file,
        }
    }

    /// Whether `key` still names a live registration.
    pub fn is_live(&self, key: &SubscriptionKey) -> bool {
        self.get(key.kind).token(key.id) == Some(key.token)
    }

    /// Total live entries across all kinds.
    pub fn len(&self) -> usize {
        WatcherKind::ALL.iter().map(|k| self.get(*k).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dispose everything in all three registries.
    pub fn dispose_all(&mut self) -> usize {
        WatcherKind::ALL
            .iter()
            .map(|k| self.get_mut(*k).dispose_all())
            .sum()
    }
}
