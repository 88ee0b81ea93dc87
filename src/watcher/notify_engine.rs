//! Watch engine backed by the platform watcher from `notify`.
//!
//! One `RecommendedWatcher` serves every subscription. A subscription adds
//! a route (pattern plus sink) keyed by its resolved watch root, and the
//! watcher callback offers each reported path to every route. Platform
//! watches are reconciled against the live routes after every change: a
//! root below a recursively watched ancestor gets no watch of its own, and
//! a root is unwatched once its last route is gone.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;

use crate::protocol::ChangeKind;

use super::engine::{EventSink, Subscription, WatchEngine};
use super::error::WatchError;
use super::pattern::WatchPattern;

/// Engine sharing a single `notify::RecommendedWatcher` across subscriptions.
#[derive(Clone)]
pub struct NotifyEngine {
    shared: Arc<Shared>,
}

struct Shared {
    /// Locked by the watcher callback; never held while calling the watcher.
    routes: Arc<Mutex<RouteTable>>,
    kernel: Mutex<Kernel>,
}

impl NotifyEngine {
    /// Start the platform watcher.
    pub fn new() -> Result<Self, WatchError> {
        let routes = Arc::new(Mutex::new(RouteTable::default()));

        let table = Arc::clone(&routes);
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => table.lock().dispatch(&event),
            Err(e) => {
                let err = WatchError::EventError {
                    details: e.to_string(),
                };
                tracing::warn!("[notify] {err}");
            }
        })?;

        Ok(Self {
            shared: Arc::new(Shared {
                routes,
                kernel: Mutex::new(Kernel {
                    watcher,
                    armed: HashMap::new(),
                }),
            }),
        })
    }

    /// Number of live subscriptions.
    pub fn routes(&self) -> usize {
        self.shared.routes.lock().routes.len()
    }

    /// Number of platform watches currently held.
    pub fn platform_watches(&self) -> usize {
        self.shared.kernel.lock().armed.len()
    }
}

impl WatchEngine for NotifyEngine {
    fn name(&self) -> &str {
        "notify"
    }

    fn watch(
        &self,
        pattern: &WatchPattern,
        sink: EventSink,
    ) -> Result<Box<dyn Subscription>, WatchError> {
        let watch_root = pattern.watch_root();
        let canonical = watch_root
            .canonicalize()
            .map_err(|e| WatchError::PathWatchFailed {
                path: watch_root.to_path_buf(),
                reason: e.to_string(),
            })?;

        let route = Route {
            pattern: pattern.clone(),
            base: pattern.base().to_path_buf(),
            canonical,
            recursive: pattern.is_recursive(),
            sink,
        };
        let id = self.shared.attach(route)?;

        crate::debug_event!("notify", "watching", "{pattern} (route {id})");

        Ok(Box::new(NotifySubscription {
            id,
            shared: Arc::clone(&self.shared),
        }))
    }
}

impl Shared {
    fn attach(&self, route: Route) -> Result<u64, WatchError> {
        let mut kernel = self.kernel.lock();
        let (id, wanted) = {
            let mut table = self.routes.lock();
            let id = table.insert(route);
            (id, table.wanted())
        };

        if let Err(e) = kernel.reconcile(&wanted) {
            let wanted = {
                let mut table = self.routes.lock();
                table.routes.remove(&id);
                table.wanted()
            };
            if let Err(rollback) = kernel.reconcile(&wanted) {
                tracing::warn!("[notify] restoring watches failed: {rollback}");
            }
            return Err(e);
        }

        Ok(id)
    }

    fn detach(&self, id: u64) {
        let mut kernel = self.kernel.lock();
        let wanted = {
            let mut table = self.routes.lock();
            if table.routes.remove(&id).is_none() {
                return;
            }
            table.wanted()
        };

        if let Err(e) = kernel.reconcile(&wanted) {
            tracing::warn!("[notify] releasing route {id}: {e}");
        }
    }
}

/// Removes its route from the shared watcher.
struct NotifySubscription {
    id: u64,
    shared: Arc<Shared>,
}

impl Subscription for NotifySubscription {
    fn dispose(self: Box<Self>) {
        self.shared.detach(self.id);
    }
}

/// One subscription's view of the shared watcher.
struct Route {
    pattern: WatchPattern,
    /// Directory as the client spelled it; emitted paths are rebuilt on it.
    base: PathBuf,
    /// Resolved directory the platform reports paths under.
    canonical: PathBuf,
    recursive: bool,
    sink: EventSink,
}

impl Route {
    /// Rewrite a reported path into the client's spelling if the pattern wants it.
    fn translate(&self, reported: &Path) -> Option<PathBuf> {
        let relative = reported.strip_prefix(&self.canonical).ok()?;
        let path = if relative.as_os_str().is_empty() {
            self.base.clone()
        } else {
            self.base.join(relative)
        };
        self.pattern.matches(&path).then_some(path)
    }
}

#[derive(Default)]
struct RouteTable {
    next_id: u64,
    routes: HashMap<u64, Route>,
}

impl RouteTable {
    fn insert(&mut self, route: Route) -> u64 {
        self.next_id += 1;
        self.routes.insert(self.next_id, route);
        self.next_id
    }

    fn dispatch(&self, event: &Event) {
        for (change, reported) in changes_for(event) {
            for route in self.routes.values() {
                if route.sink.is_closed() {
                    continue;
                }
                if let Some(path) = route.translate(&reported) {
                    route.sink.emit(change, path);
                }
            }
        }
    }

    /// Platform watches needed to serve every live route.
    fn wanted(&self) -> HashMap<PathBuf, RecursiveMode> {
        let mut roots: HashMap<&Path, bool> = HashMap::new();
        for route in self.routes.values() {
            *roots.entry(route.canonical.as_path()).or_default() |= route.recursive;
        }

        roots
            .iter()
            .filter(|(root, _)| {
                !roots.iter().any(|(other, recursive)| {
                    *recursive && other != *root && root.starts_with(other)
                })
            })
            .map(|(root, recursive)| {
                let mode = if *recursive {
                    RecursiveMode::Recursive
                } else {
                    RecursiveMode::NonRecursive
                };
                (root.to_path_buf(), mode)
            })
            .collect()
    }
}

/// The shared platform watcher and the watches it currently holds.
struct Kernel {
    watcher: RecommendedWatcher,
    armed: HashMap<PathBuf, RecursiveMode>,
}

impl Kernel {
    /// Bring the held watches in line with `wanted`.
    fn reconcile(&mut self, wanted: &HashMap<PathBuf, RecursiveMode>) -> Result<(), WatchError> {
        let stale: Vec<(PathBuf, RecursiveMode)> = self
            .armed
            .iter()
            .filter(|(root, mode)| wanted.get(*root) != Some(*mode))
            .map(|(root, mode)| (root.clone(), *mode))
            .collect();

        for (root, mode) in stale {
            if self.armed.remove(&root).is_none() {
                continue;
            }
            if let Err(e) = self.watcher.unwatch(&root) {
                crate::debug_event!("notify", "unwatch failed", "{}: {e}", root.display());
            }
            // Removing a recursive watch drops everything below it too
            if mode == RecursiveMode::Recursive {
                self.armed.retain(|armed, _| !armed.starts_with(&root));
            }
        }

        let mut missing: Vec<(&PathBuf, &RecursiveMode)> = wanted
            .iter()
            .filter(|(root, _)| !self.armed.contains_key(*root))
            .collect();
        missing.sort_by_key(|(root, _)| root.components().count());

        for (root, mode) in missing {
            self.watcher
                .watch(root, *mode)
                .map_err(|e| WatchError::PathWatchFailed {
                    path: root.clone(),
                    reason: e.to_string(),
                })?;
            self.armed.insert(root.clone(), *mode);
        }

        Ok(())
    }
}

/// Translate a raw `notify` event into protocol changes.
///
/// Renames become a delete of the old path and a create of the new one.
/// Access and unclassified events are dropped.
pub(crate) fn changes_for(event: &Event) -> Vec<(ChangeKind, PathBuf)> {
    let all = |change: ChangeKind| {
        event
            .paths
            .iter()
            .map(|p| (change, p.clone()))
            .collect::<Vec<_>>()
    };

    match event.kind {
        EventKind::Create(_) => all(ChangeKind::Create),
        EventKind::Remove(_) => all(ChangeKind::Delete),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => all(ChangeKind::Create),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => all(ChangeKind::Delete),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut changes = Vec::with_capacity(2);
            if let Some(from) = event.paths.first() {
                changes.push((ChangeKind::Delete, from.clone()));
            }
            if let Some(to) = event.paths.get(1) {
                changes.push((ChangeKind::Create, to.clone()));
            }
            changes
        }
        // Direction unknown (FSEvents reports renames this way); decide by existence.
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .map(|p| {
                let change = if p.exists() {
                    ChangeKind::Create
                } else {
                    ChangeKind::Delete
                };
                (change, p.clone())
            })
            .collect(),
        EventKind::Modify(_) => all(ChangeKind::Update),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}
