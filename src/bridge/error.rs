//! Error types for the socket server, sessions and address publishing.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that stop the server from accepting connections.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to resolve local address: {0}")]
    LocalAddr(#[source] std::io::Error),

    #[error("Watch engine unavailable: {0}")]
    Engine(#[from] crate::watcher::WatchError),
}

/// Errors that end a session.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to read request: {0}")]
    Read(#[source] std::io::Error),

    #[error("Failed to write event: {0}")]
    Write(#[source] std::io::Error),
}

/// Errors publishing the listening address to the host.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Failed to encode address: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to write address to {path}: {reason}")]
    WriteFailed { path: PathBuf, reason: String },

    #[error("Failed to write address to stdout: {0}")]
    Stdout(#[source] std::io::Error),
}
