//! Engine and subscription traits plus the callback sink shared by engines.

use std::path::PathBuf;

use tokio::sync::mpsc;

use crate::protocol::{ChangeKind, WatcherId, WatcherKind};

use super::{WatchError, WatchPattern};

/// Identifies one registration inside a session.
///
/// The token is a per-session generation number, so two registrations
/// that reuse the same `(kind, id)` pair remain distinguishable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    pub kind: WatcherKind,
    pub id: WatcherId,
    pub token: u64,
}

/// A change reported by an engine, addressed to one registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub key: SubscriptionKey,
    pub change: ChangeKind,
    pub path: PathBuf,
}

/// Callback target handed to an engine for one subscription.
///
/// Engines may call [`EventSink::emit`] from any thread. Once the owning
/// session is gone every emit is a no-op.
#[derive(Debug, Clone)]
pub struct EventSink {
    key: SubscriptionKey,
    tx: mpsc::UnboundedSender<Notice>,
}

impl EventSink {
    pub fn new(key: SubscriptionKey, tx: mpsc::UnboundedSender<Notice>) -> Self {
        Self { key, tx }
    }

    pub fn key(&self) -> SubscriptionKey {
        self.key
    }

    /// Forward a change. Returns `false` when the session no longer listens.
    pub fn emit(&self, change: ChangeKind, path: PathBuf) -> bool {
        self.tx
            .send(Notice {
                key: self.key,
                change,
                path,
            })
            .is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A live watch. Disposing consumes the handle, so it happens at most once.
pub trait Subscription: Send {
    fn dispose(self: Box<Self>);
}

/// Native filesystem watching capability.
pub trait WatchEngine: Send + Sync {
    /// Engine name for logging.
    fn name(&self) -> &str;

    /// Start watching `pattern`, delivering changes to `sink`.
    fn watch(
        &self,
        pattern: &WatchPattern,
        sink: EventSink,
    ) -> Result<Box<dyn Subscription>, WatchError>;
}
