//! Per-connection session: request dispatch, event forwarding, teardown.
//!
//! A session is driven by a single task. Requests are read line by line
//! and applied to the session's registries in order; engine callbacks
//! arrive through a channel and are written back as they come. Because
//! both happen on the same task, the registries need no locking.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::protocol::{self, Request, WatchEvent, WatcherId, WatcherKind};
use crate::watcher::{
    EventSink, Notice, Registries, RegistryEntry, SubscriptionKey, WatchEngine, WatchPattern,
};

use super::error::SessionError;

/// Counters reported when a session ends.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    /// Requests decoded successfully, unknown kinds included.
    pub requests: u64,
    /// Lines that failed to decode.
    pub malformed: u64,
    /// Events written to the client.
    pub events: u64,
    /// Notices dropped because their registration was gone.
    pub stale: u64,
    /// Subscriptions disposed at teardown.
    pub disposed: usize,
}

/// Registry state and dispatch logic of one session, without any I/O.
pub struct SessionState {
    peer: String,
    engine: Arc<dyn WatchEngine>,
    registries: Registries,
    notice_tx: mpsc::UnboundedSender<Notice>,
    next_token: u64,
    summary: SessionSummary,
}

impl SessionState {
    /// Create session state and the receiver its engine callbacks feed.
    pub fn new(
        peer: impl Into<String>,
        engine: Arc<dyn WatchEngine>,
    ) -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let state = Self {
            peer: peer.into(),
            engine,
            registries: Registries::new(),
            notice_tx,
            next_token: 0,
            summary: SessionSummary::default(),
        };
        (state, notice_rx)
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn registries(&self) -> &Registries {
        &self.registries
    }

    pub fn summary(&self) -> SessionSummary {
        self.summary
    }

    /// Apply one raw request line. Lines that are not UTF-8 are malformed.
    pub fn handle_bytes(&mut self, raw: &[u8]) {
        match std::str::from_utf8(raw) {
            Ok(line) => self.handle_line(line),
            Err(e) => {
                self.summary.malformed += 1;
                let err = protocol::ProtocolError::MalformedRequest {
                    reason: e.to_string(),
                };
                tracing::warn!("[session] {}: skipping line: {err}", self.peer);
            }
        }
    }

    /// Decode and apply one request line. Bad lines are logged and skipped.
    pub fn handle_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        match protocol::decode_request(line) {
            Ok(request) => self.handle_request(request),
            Err(e) => {
                self.summary.malformed += 1;
                tracing::warn!("[session] {}: skipping line: {e}", self.peer);
            }
        }
    }

    /// Apply one decoded request.
    pub fn handle_request(&mut self, request: Request) {
        self.summary.requests += 1;
        crate::debug_event!("session", "request", "{} from {}", request.name(), self.peer);

        match request {
            Request::CreateDirectoryWatcher {
                id,
                path,
                recursive,
            } => {
                let pattern = if recursive {
                    WatchPattern::recursive(path)
                } else {
                    WatchPattern::shallow(path)
                };
                match pattern {
                    Ok(pattern) => self.register(WatcherKind::directory(recursive), id, pattern),
                    Err(e) => tracing::warn!("[session] {}: watcher {id}: {e}", self.peer),
                }
            }
            Request::CreateFileWatcher { id, path } => {
                self.register(WatcherKind::File, id, WatchPattern::file(path));
            }
            Request::CloseWatcher { id, kind } => self.close(kind, id),
            Request::Unknown => {}
        }
    }

    /// Register a subscription, replacing any live one under the same ID.
    fn register(&mut self, kind: WatcherKind, id: WatcherId, pattern: WatchPattern) {
        if self.registries.get_mut(kind).close(id) {
            tracing::warn!(
                "[session] {}: {kind} watcher {id} re-registered, previous subscription disposed",
                self.peer
            );
        }

        self.next_token += 1;
        let key = SubscriptionKey {
            kind,
            id,
            token: self.next_token,
        };
        let sink = EventSink::new(key, self.notice_tx.clone());

        match self.engine.watch(&pattern, sink) {
            Ok(subscription) => {
                crate::debug_event!("session", "watch", "{kind} {id} {pattern}");
                let entry = RegistryEntry::new(key.token, pattern, subscription);
                self.registries.get_mut(kind).insert(id, entry);
            }
            Err(e) => {
                tracing::warn!(
                    "[session] {}: {} failed to watch {pattern}: {e}",
                    self.peer,
                    self.engine.name()
                );
            }
        }
    }

    /// Dispose and forget a watcher. Unknown IDs are a no-op.
    fn close(&mut self, kind: WatcherKind, id: WatcherId) {
        if self.registries.get_mut(kind).close(id) {
            crate::debug_event!("session", "close", "{kind} {id}");
        } else {
            crate::debug_event!("session", "close", "{kind} {id} not registered");
        }
    }

    /// Turn a notice into an outbound event if its registration is still live.
    pub fn accept(&mut self, notice: Notice) -> Option<WatchEvent> {
        if !self.registries.is_live(&notice.key) {
            self.summary.stale += 1;
            return None;
        }

        let Notice { key, change, path } = notice;
        Some(WatchEvent::new(key.id, &path, change))
    }

    /// Dispose every subscription this session created.
    pub fn teardown(&mut self) -> SessionSummary {
        self.summary.disposed += self.registries.dispose_all();
        self.summary
    }
}

impl Drop for SessionState {
    fn drop(&mut self) {
        if !self.registries.is_empty() {
            self.registries.dispose_all();
        }
    }
}

/// Serve one client connection until it closes, fails, or `shutdown` fires.
pub async fn run_session<S>(
    stream: S,
    peer: String,
    engine: Arc<dyn WatchEngine>,
    shutdown: CancellationToken,
) -> SessionSummary
where
    S: AsyncRead + AsyncWrite,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    // Survives cancelled reads so a partial line is resumed, not lost
    let mut line = Vec::new();
    let (mut state, mut notices) = SessionState::new(peer, engine);

    crate::log_event!("session", "connected", "{}", state.peer());

    let outcome: Result<(), SessionError> = loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => break Ok(()),

            read = reader.read_until(b'\n', &mut line) => match read {
                Ok(0) => {
                    state.handle_bytes(&line);
                    break Ok(());
                }
                Ok(_) => {
                    state.handle_bytes(&line);
                    line.clear();
                }
                Err(e) => break Err(SessionError::Read(e)),
            },

            Some(notice) = notices.recv() => {
                let Some(event) = state.accept(notice) else {
                    continue;
                };
                if let Err(e) = write_event(&mut writer, &event).await {
                    break Err(e);
                }
                state.summary.events += 1;
            }
        }
    };

    let summary = state.teardown();
    // Late callbacks fail to send once the receiver is gone.
    drop(notices);
    let _ = writer.shutdown().await;

    match outcome {
        Ok(()) => crate::log_event!(
            "session",
            "closed",
            "{} ({} requests, {} events, {} disposed)",
            state.peer(),
            summary.requests,
            summary.events,
            summary.disposed
        ),
        Err(e) => tracing::warn!("[session] {}: closed on error: {e}", state.peer()),
    }

    summary
}

async fn write_event<W>(writer: &mut W, event: &WatchEvent) -> Result<(), SessionError>
where
    W: AsyncWrite + Unpin,
{
    let line = match protocol::encode_event(event) {
        Ok(line) => line,
        Err(e) => {
            tracing::warn!("[session] {e}");
            return Ok(());
        }
    };

    writer
        .write_all(line.as_bytes())
        .await
        .map_err(SessionError::Write)?;
    writer.flush().await.map_err(SessionError::Write)
}
