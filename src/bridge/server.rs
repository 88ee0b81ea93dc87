//! Loopback socket server accepting plugin connections.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::watcher::WatchEngine;

use super::error::ServerError;
use super::publish::{AddressPublisher, PublishedAddress};
use super::session::{SessionSummary, run_session};

/// Socket server that gives every accepted connection its own session.
pub struct WatchServer {
    listener: TcpListener,
    engine: Arc<dyn WatchEngine>,
    max_sessions: usize,
    shutdown: CancellationToken,
}

impl WatchServer {
    /// Bind the configured address. Port `0` lets the OS choose.
    pub async fn bind(
        config: &ServerConfig,
        engine: Arc<dyn WatchEngine>,
    ) -> Result<Self, ServerError> {
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        Ok(Self {
            listener,
            engine,
            max_sessions: config.max_sessions,
            shutdown: CancellationToken::new(),
        })
    }

    /// Use an externally owned shutdown token.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// The address the OS actually bound.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener.local_addr().map_err(ServerError::LocalAddr)
    }

    /// Tell the host where to connect. Failures are logged, never retried.
    pub fn publish(&self, plugin: &str, publisher: &dyn AddressPublisher) -> bool {
        let addr = match self.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                tracing::error!("[server] cannot publish address: {e}");
                return false;
            }
        };

        match publisher.publish(&PublishedAddress::new(plugin, addr)) {
            Ok(()) => {
                crate::log_event!("server", "published", "{addr} via {}", publisher.name());
                true
            }
            Err(e) => {
                tracing::error!("[server] publishing {addr} via {} failed: {e}", publisher.name());
                false
            }
        }
    }

    /// Accept connections until shutdown, then wait for open sessions to end.
    pub async fn serve(self) {
        let mut sessions: JoinSet<SessionSummary> = JoinSet::new();

        if let Ok(addr) = self.local_addr() {
            crate::log_event!("server", "listening", "{addr}");
        }

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_session(&mut sessions, stream, peer),
                    Err(e) => tracing::error!("[server] accept failed: {e}"),
                },

                Some(joined) = sessions.join_next() => {
                    if let Err(e) = joined {
                        tracing::error!("[server] session task failed: {e}");
                    }
                }
            }
        }

        crate::log_event!("server", "stopping", "{} open sessions", sessions.len());
        while let Some(joined) = sessions.join_next().await {
            if let Err(e) = joined {
                tracing::error!("[server] session task failed: {e}");
            }
        }
    }

    fn spawn_session(
        &self,
        sessions: &mut JoinSet<SessionSummary>,
        stream: TcpStream,
        peer: SocketAddr,
    ) {
        // Finished sessions must not count against the limit
        while let Some(joined) = sessions.try_join_next() {
            if let Err(e) = joined {
                tracing::error!("[server] session task failed: {e}");
            }
        }

        if self.max_sessions > 0 && sessions.len() >= self.max_sessions {
            tracing::warn!(
                "[server] rejecting {peer}: {} sessions already open",
                sessions.len()
            );
            drop(stream);
            return;
        }

        if let Err(e) = stream.set_nodelay(true) {
            crate::debug_event!("server", "nodelay", "{peer}: {e}");
        }

        sessions.spawn(run_session(
            stream,
            peer.to_string(),
            self.engine.clone(),
            self.shutdown.child_token(),
        ));
    }
}
