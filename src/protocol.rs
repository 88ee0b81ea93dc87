//! Line-delimited JSON protocol spoken with the language server plugin.
//!
//! Requests arrive one JSON object per `\n`-terminated line and are
//! discriminated by their `eventName` field. Events are written back one
//! JSON object per CRLF-terminated line.
//!
//! ```text
//! -> {"eventName":"createFileWatcher","id":1,"path":"/tmp/a.txt"}
//! <- {"id":1,"path":"/tmp/a.txt","eventType":"update"}
//! -> {"eventName":"closeWatcher","id":1,"type":"file"}
//! ```

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Line terminator appended to every outbound event.
pub const EVENT_TERMINATOR: &str = "\r\n";

/// Client-assigned watcher key, unique per [`WatcherKind`] while live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatcherId(pub i64);

impl fmt::Display for WatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Which registry a watcher lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WatcherKind {
    #[serde(rename = "dir")]
    Dir,
    #[serde(rename = "dirRecursive")]
    DirRecursive,
    #[serde(rename = "file")]
    File,
}

impl WatcherKind {
    pub const ALL: [WatcherKind; 3] = [WatcherKind::Dir, WatcherKind::DirRecursive, WatcherKind::File];

    pub fn as_str(self) -> &'static str {
        match self {
            WatcherKind::Dir => "dir",
            WatcherKind::DirRecursive => "dirRecursive",
            WatcherKind::File => "file",
        }
    }

    /// Registry for a `createDirectoryWatcher` request.
    pub fn directory(recursive: bool) -> Self {
        if recursive {
            WatcherKind::DirRecursive
        } else {
            WatcherKind::Dir
        }
    }
}

impl fmt::Display for WatcherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of change reported for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Create => "create",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inbound request from the plugin.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "eventName", rename_all = "camelCase")]
pub enum Request {
    CreateDirectoryWatcher {
        id: WatcherId,
        path: PathBuf,
        #[serde(default)]
        recursive: bool,
    },
    CreateFileWatcher {
        id: WatcherId,
        path: PathBuf,
    },
    CloseWatcher {
        id: WatcherId,
        #[serde(rename = "type")]
        kind: WatcherKind,
    },
    /// Any other `eventName`; ignored by the session.
    #[serde(other)]
    Unknown,
}

impl Request {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Request::CreateDirectoryWatcher { .. } => "createDirectoryWatcher",
            Request::CreateFileWatcher { .. } => "createFileWatcher",
            Request::CloseWatcher { .. } => "closeWatcher",
            Request::Unknown => "unknown",
        }
    }
}

/// Outbound change notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchEvent {
    pub id: WatcherId,
    pub path: String,
    pub event_type: ChangeKind,
}

impl WatchEvent {
    pub fn new(id: WatcherId, path: &std::path::Path, event_type: ChangeKind) -> Self {
        Self {
            id,
            path: path.to_string_lossy().into_owned(),
            event_type,
        }
    }
}

/// Errors decoding requests or encoding events.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed request line: {reason}")]
    MalformedRequest { reason: String },

    #[error("Failed to encode event for watcher {id}: {reason}")]
    EncodeFailed { id: WatcherId, reason: String },
}

/// Decode a single request line (without its terminator).
pub fn decode_request(line: &str) -> Result<Request, ProtocolError> {
    serde_json::from_str(line).map_err(|e| ProtocolError::MalformedRequest {
        reason: e.to_string(),
    })
}

/// Encode an event as a CRLF-terminated JSON line.
pub fn encode_event(event: &WatchEvent) -> Result<String, ProtocolError> {
    let mut line = serde_json::to_string(event).map_err(|e| ProtocolError::EncodeFailed {
        id: event.id,
        reason: e.to_string(),
    })?;
    line.push_str(EVENT_TERMINATOR);
    Ok(line)
}
