//! Socket bridge between the host's watch engine and the plugin client.
//!
//! ```text
//! WatchServer (loopback, ephemeral port)
//!   - publishes its address through an AddressPublisher
//!   - accept loop, one task per connection
//!         |
//!   run_session
//!     - requests  : line -> Request -> Registries
//!     - callbacks : Notice -> WatchEvent -> CRLF line
//!     - teardown  : dispose everything on close
//! ```

mod error;
pub mod publish;
mod server;
mod session;

pub use error::{PublishError, ServerError, SessionError};
pub use publish::{
    AddressPublisher, FilePublisher, NoopPublisher, PublishedAddress, StdoutPublisher,
    publisher_for,
};
pub use server::WatchServer;
pub use session::{SessionState, SessionSummary, run_session};
