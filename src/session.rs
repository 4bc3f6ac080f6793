//! Listener sessions.
//!
//! A [`ListenerSession`] is one bound loopback listener with a strategy
//! serving it in a background task. It lives for exactly one harness
//! invocation: [`ListenerSession::shutdown`] cancels the strategy and waits
//! for it to close the listener, and dropping a session that was never shut
//! down (a panicking probe) cancels and aborts the task instead.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::HarnessError;
use crate::mode::ServerMode;
use crate::observability::metrics;
use crate::strategy::{ResponseContext, ServeSummary, Strategy};

/// Base URL probes are pointed at.
#[must_use]
pub fn base_url(port: u16) -> String {
    format!("http://localhost:{port}/")
}

/// A bound listener plus the background task serving it.
pub struct ListenerSession {
    port: u16,
    mode: ServerMode,
    cancel: CancellationToken,
    task: Option<JoinHandle<ServeSummary>>,
}

impl ListenerSession {
    /// Binds `127.0.0.1:<port>` and starts `strategy` on it.
    ///
    /// The listener is bound and accepting when this returns.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Bind`] if the port cannot be bound.
    pub async fn start(
        port: u16,
        mode: ServerMode,
        strategy: Arc<dyn Strategy>,
        content: Arc<str>,
        cancel: CancellationToken,
    ) -> Result<Self, HarnessError> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port))
            .await
            .map_err(|source| HarnessError::Bind { port, source })?;

        let ctx = ResponseContext {
            mode,
            content,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(async move { strategy.serve(listener, ctx).await });

        metrics::record_session(mode.as_str());
        info!(port, %mode, "test server listening");

        Ok(Self {
            port,
            mode,
            cancel,
            task: Some(task),
        })
    }

    /// The bound port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// The mode being served.
    #[must_use]
    pub const fn mode(&self) -> ServerMode {
        self.mode
    }

    /// `http://localhost:<port>/`.
    #[must_use]
    pub fn base_url(&self) -> String {
        base_url(self.port)
    }

    /// Stops the strategy and waits for it to close the listener.
    ///
    /// A connection being served when this is called may finish its response.
    /// If it is still running after `grace`, the task is aborted. Either way
    /// the listener is closed when this returns.
    ///
    /// Returns the loop's summary, or `None` if it had to be aborted or
    /// panicked.
    pub async fn shutdown(mut self, grace: Duration) -> Option<ServeSummary> {
        self.cancel.cancel();
        let mut task = self.task.take()?;

        match tokio::time::timeout(grace, &mut task).await {
            Ok(Ok(summary)) => {
                info!(
                    port = self.port,
                    mode = %self.mode,
                    connections = summary.connections,
                    "test server stopped"
                );
                Some(summary)
            }
            Ok(Err(e)) => {
                warn!(port = self.port, error = %e, "strategy task failed");
                None
            }
            Err(_) => {
                warn!(
                    port = self.port,
                    ?grace,
                    "connection still in flight after grace period, aborting"
                );
                task.abort();
                // Wait for the abort to land so the listener is really gone.
                let _ = task.await;
                None
            }
        }
    }
}

impl std::fmt::Debug for ListenerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSession")
            .field("port", &self.port)
            .field("mode", &self.mode)
            .field("running", &self.task.is_some())
            .finish()
    }
}

impl Drop for ListenerSession {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            self.cancel.cancel();
            task.abort();
            debug!(port = self.port, "session dropped without shutdown, task aborted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::PortReserver;
    use crate::strategy::ProtocolViolation;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn start_on_fresh_port(reserver: &PortReserver) -> (crate::port::PortLease, ListenerSession) {
        let lease = reserver.acquire().unwrap();
        let session = ListenerSession::start(
            lease.port(),
            ServerMode::ProtocolViolation,
            Arc::new(ProtocolViolation),
            Arc::from("{}"),
            CancellationToken::new(),
        )
        .await
        .unwrap();
        (lease, session)
    }

    #[test]
    fn base_url_format() {
        assert_eq!(base_url(50231), "http://localhost:50231/");
    }

    #[tokio::test]
    async fn accepts_before_start_returns_and_closes_on_shutdown() {
        let reserver = PortReserver::new();
        let (_lease, session) = start_on_fresh_port(&reserver).await;
        let port = session.port();
        assert_eq!(session.base_url(), base_url(port));

        let mut stream = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).await.unwrap();
        stream.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();
        assert!(raw.starts_with("HTTP/1.1 BAD SERVER\r\n"));

        let summary = session.shutdown(Duration::from_secs(5)).await.unwrap();
        assert_eq!(summary.connections, 1);
        assert!(TcpStream::connect((Ipv4Addr::LOCALHOST, port)).await.is_err());
    }

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let reserver = PortReserver::new();
        let (_lease, session) = start_on_fresh_port(&reserver).await;

        let err = ListenerSession::start(
            session.port(),
            ServerMode::ProtocolViolation,
            Arc::new(ProtocolViolation),
            Arc::from("{}"),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, HarnessError::Bind { port, .. } if port == session.port()));

        session.shutdown(Duration::from_secs(5)).await;
    }

    #[tokio::test]
    async fn stuck_connection_is_aborted_after_grace() {
        let reserver = PortReserver::new();
        let (_lease, session) = start_on_fresh_port(&reserver).await;
        let port = session.port();

        // Send a request head that never terminates so the strategy blocks
        // reading it.
        let mut stream = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).await.unwrap();
        stream.write_all(b"GET / HTTP/1.1\r\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let summary = session.shutdown(Duration::from_millis(100)).await;
        assert!(summary.is_none());
        assert!(TcpStream::connect((Ipv4Addr::LOCALHOST, port)).await.is_err());
    }

    #[tokio::test]
    async fn drop_cancels_token() {
        let reserver = PortReserver::new();
        let (_lease, session) = start_on_fresh_port(&reserver).await;
        let cancel = session.cancel.clone();
        drop(session);
        assert!(cancel.is_cancelled());
    }
}
