//! The test-server harness.
//!
//! [`TestServer`] spins up a misbehaving server on a freshly reserved port,
//! runs a caller-supplied probe against it and tears it down again:
//!
//! ```rust,ignore
//! use roguewire::{HarnessError, ServerMode, TestServer};
//!
//! let server = TestServer::new().with_mode(ServerMode::ProtocolViolation);
//! let outcome = server
//!     .execute(|base_url| async move {
//!         Ok::<_, HarnessError>(my_client.get(&base_url).await.is_err())
//!     })
//!     .await?;
//! ```
//!
//! The mode is checked before a port is reserved. The listener is bound and
//! accepting before the probe runs, and it stays up for the probe's whole
//! duration. Teardown happens whether the probe succeeds, fails or panics,
//! and the port is only released after the listener has closed. A panicking
//! probe is re-raised once teardown is done.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tracing::debug;

use crate::config::{DEFAULT_CONTENT, DEFAULT_SHUTDOWN_GRACE_MS, HarnessConfig};
use crate::error::HarnessError;
use crate::mode::ServerMode;
use crate::observability::metrics;
use crate::port::PortReserver;
use crate::session::ListenerSession;
use crate::strategy::StrategyRegistry;

/// A reusable misbehaving test server.
///
/// Configure it with the `with_*` builders or setters, then call
/// [`execute`](Self::execute) as often as needed. Each invocation gets its
/// own port and listener, so invocations may also run concurrently.
#[derive(Debug, Clone)]
pub struct TestServer {
    mode: ServerMode,
    content: Arc<str>,
    registry: StrategyRegistry,
    reserver: PortReserver,
    shutdown_grace: Duration,
}

impl TestServer {
    /// Creates a protocol-violation server with the built-in strategies and
    /// the process-wide port reserver.
    #[must_use]
    pub fn new() -> Self {
        Self {
            mode: ServerMode::default(),
            content: Arc::from(DEFAULT_CONTENT),
            registry: StrategyRegistry::builtin(),
            reserver: PortReserver::global(),
            shutdown_grace: Duration::from_millis(DEFAULT_SHUTDOWN_GRACE_MS),
        }
    }

    /// Creates a server from a configuration.
    ///
    /// A custom port range gets its own reserver; the default range shares the
    /// process-wide one.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` does not validate.
    pub fn from_config(config: &HarnessConfig) -> crate::error::Result<Self> {
        config.validate()?;
        let reserver = if config.port_range.is_default() {
            PortReserver::global()
        } else {
            PortReserver::with_range(config.port_range.range())?
        };
        Ok(Self {
            mode: config.mode,
            content: Arc::from(config.content.as_str()),
            registry: StrategyRegistry::from_config(config),
            reserver,
            shutdown_grace: config.shutdown_grace(),
        })
    }

    /// The active mode.
    #[must_use]
    pub const fn mode(&self) -> ServerMode {
        self.mode
    }

    /// Selects the misbehavior for subsequent invocations.
    pub fn set_mode(&mut self, mode: ServerMode) {
        self.mode = mode;
    }

    /// Builder form of [`set_mode`](Self::set_mode).
    #[must_use]
    pub fn with_mode(mut self, mode: ServerMode) -> Self {
        self.set_mode(mode);
        self
    }

    /// The response content handed to strategies that send a body.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Replaces the response content.
    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = Arc::from(content.into());
    }

    /// Builder form of [`set_content`](Self::set_content).
    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.set_content(content);
        self
    }

    /// The strategies this server can run.
    #[must_use]
    pub const fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    /// Mutable access to the strategies, for registering custom ones.
    pub fn registry_mut(&mut self) -> &mut StrategyRegistry {
        &mut self.registry
    }

    /// Replaces the strategy registry.
    #[must_use]
    pub fn with_registry(mut self, registry: StrategyRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// The reserver ports are drawn from.
    #[must_use]
    pub const fn reserver(&self) -> &PortReserver {
        &self.reserver
    }

    /// Draws ports from `reserver` instead of the process-wide one.
    #[must_use]
    pub fn with_reserver(mut self, reserver: PortReserver) -> Self {
        self.reserver = reserver;
        self
    }

    /// How long teardown waits for an in-flight connection.
    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        self.shutdown_grace
    }

    /// Sets how long teardown waits for an in-flight connection.
    #[must_use]
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Runs `probe` against a freshly started server and tears it down.
    ///
    /// `probe` receives the server's base URL, `http://localhost:<port>/`.
    /// Its result, success or error, is returned unchanged once the server
    /// has stopped.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::UnsupportedMode`](crate::error::ConfigError::UnsupportedMode)
    ///   if the mode has no strategy; nothing is reserved or bound.
    /// - [`HarnessError::Port`] if no port could be reserved, including after
    ///   [`PortReserver::shutdown`]; the probe is not run.
    /// - [`HarnessError::Bind`] if the reserved port could not be bound.
    /// - Whatever error `probe` returns.
    ///
    /// # Panics
    ///
    /// Re-raises a panic from `probe` once the server has been torn down and
    /// the port released.
    pub async fn execute<F, Fut, T, E>(&self, probe: F) -> Result<T, E>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<HarnessError>,
    {
        let mode = self.mode;
        let strategy = self
            .registry
            .resolve(mode)
            .map_err(HarnessError::from)?;
        let content = Arc::clone(&self.content);
        let grace = self.shutdown_grace;

        let outcome = self
            .reserver
            .execute(|port, cancel| async move {
                let session = ListenerSession::start(port, mode, strategy, content, cancel).await?;
                let base_url = session.base_url();

                let started = Instant::now();
                let result = AssertUnwindSafe(async move { probe(base_url).await })
                    .catch_unwind()
                    .await;
                metrics::record_probe_duration(mode.as_str(), started.elapsed());
                debug!(
                    port,
                    %mode,
                    ok = matches!(result, Ok(Ok(_))),
                    panicked = result.is_err(),
                    "probe finished"
                );

                // The listener must be closed before the lease is dropped,
                // including when the panic is carried on.
                session.shutdown(grace).await;
                match result {
                    Ok(result) => Ok::<_, HarnessError>(result),
                    Err(panic) => panic::resume_unwind(panic),
                }
            })
            .await;

        outcome.map_err(E::from)?
    }
}

impl Default for TestServer {
    fn default() -> Self {
        Self::new()
    }
}
