//! Watch engine abstraction and per-session watcher bookkeeping.
//!
//! # Architecture
//!
//! ```text
//! Session
//!   - Registries (dir / dirRecursive / file, keyed by WatcherId)
//!   - Arc<dyn WatchEngine>
//!         |
//!   engine.watch(pattern, EventSink) -> Box<dyn Subscription>
//!         |
//!   engine threads --EventSink::emit--> mpsc --> session task
//! ```
//!
//! Every registration carries a per-session token. Notices whose token no
//! longer matches the registry entry are stale and get dropped.

mod engine;
mod error;
mod notify_engine;
mod pattern;
mod registry;

pub use engine::{EventSink, Notice, Subscription, SubscriptionKey, WatchEngine};
pub use error::WatchError;
pub use notify_engine::NotifyEngine;
pub use pattern::{PatternScope, WatchPattern};
pub use registry::{Registries, RegistryEntry, WatcherRegistry};
