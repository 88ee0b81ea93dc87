pub mod bridge;
pub mod cli;
pub mod config;
pub mod logging;
pub mod protocol;
pub mod watcher;

pub use bridge::{AddressPublisher, PublishedAddress, SessionSummary, WatchServer, run_session};
pub use config::Settings;
pub use protocol::{ChangeKind, Request, WatchEvent, WatcherId, WatcherKind};
pub use watcher::{EventSink, NotifyEngine, Subscription, WatchEngine, WatchError, WatchPattern};
