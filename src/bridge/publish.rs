//! Publishing the listening address to the launching host.
//!
//! The host learns where to point the plugin from a small JSON record
//! shaped like a Node `server.address()` result plus the plugin name:
//!
//! ```json
//! {"plugin":"watchbridge-plugin","address":"127.0.0.1","family":"IPv4","port":49152}
//! ```

use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::config::{PublishConfig, PublishMode};

use super::error::PublishError;

/// Address record handed to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedAddress {
    pub plugin: String,
    pub address: String,
    pub family: String,
    pub port: u16,
}

impl PublishedAddress {
    pub fn new(plugin: impl Into<String>, addr: SocketAddr) -> Self {
        let family = if addr.is_ipv4() { "IPv4" } else { "IPv6" };
        Self {
            plugin: plugin.into(),
            address: addr.ip().to_string(),
            family: family.to_string(),
            port: addr.port(),
        }
    }
}

/// Side channel through which the host is told the bridge address.
pub trait AddressPublisher: Send + Sync {
    /// Publisher name for logging.
    fn name(&self) -> &str;

    fn publish(&self, address: &PublishedAddress) -> Result<(), PublishError>;
}

/// Writes the record as one JSON line on stdout.
#[derive(Debug, Default)]
pub struct StdoutPublisher;

impl AddressPublisher for StdoutPublisher {
    fn name(&self) -> &str {
        "stdout"
    }

    fn publish(&self, address: &PublishedAddress) -> Result<(), PublishError> {
        let line = serde_json::to_string(address)?;
        let mut out = std::io::stdout().lock();
        writeln!(out, "{line}").map_err(PublishError::Stdout)?;
        out.flush().map_err(PublishError::Stdout)
    }
}

/// Writes the record to a file, replacing it atomically.
#[derive(Debug)]
pub struct FilePublisher {
    path: PathBuf,
}

impl FilePublisher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn write_failed(&self, e: impl std::fmt::Display) -> PublishError {
        PublishError::WriteFailed {
            path: self.path.clone(),
            reason: e.to_string(),
        }
    }
}

impl AddressPublisher for FilePublisher {
    fn name(&self) -> &str {
        "file"
    }

    fn publish(&self, address: &PublishedAddress) -> Result<(), PublishError> {
        let json = serde_json::to_string_pretty(address)?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(|e| self.write_failed(e))?;

        // Readers never observe a half-written file.
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| self.write_failed(e))?;
        tmp.write_all(json.as_bytes())
            .map_err(|e| self.write_failed(e))?;
        tmp.persist(&self.path).map_err(|e| self.write_failed(e.error))?;

        Ok(())
    }
}

/// Publishes nothing; the address only appears in the log.
#[derive(Debug, Default)]
pub struct NoopPublisher;

impl AddressPublisher for NoopPublisher {
    fn name(&self) -> &str {
        "none"
    }

    fn publish(&self, address: &PublishedAddress) -> Result<(), PublishError> {
        crate::debug_event!("publish", "skipped", "{}:{}", address.address, address.port);
        Ok(())
    }
}

/// Build the publisher selected by configuration.
pub fn publisher_for(config: &PublishConfig) -> Box<dyn AddressPublisher> {
    match config.mode {
        PublishMode::Stdout => Box::new(StdoutPublisher),
        PublishMode::File => Box::new(FilePublisher::new(config.path.clone())),
        PublishMode::None => Box::new(NoopPublisher),
    }
}
