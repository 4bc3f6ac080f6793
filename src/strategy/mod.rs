//! Misbehavior strategies.
//!
//! A [`Strategy`] turns a bound listener into a server that misbehaves in one
//! specific, reproducible way. Most strategies only decide what to do with a
//! single accepted connection ([`Strategy::respond`]) and inherit the shared
//! accept loop ([`Strategy::serve`]), which stops as soon as the session's
//! cancellation token fires. A connection that is already being served when
//! cancellation fires is allowed to finish.
//!
//! The [`StrategyRegistry`] maps each [`ServerMode`] to its strategy. Adding a
//! new misbehavior means adding a mode and registering one strategy.

pub mod responses;
pub mod wire;

pub use responses::{ConnectionReset, MissingBody, ProtocolViolation, SlowBody};

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::HarnessConfig;
use crate::error::ConfigError;
use crate::mode::ServerMode;
use crate::observability::metrics;

/// Pause after a failed `accept` before trying again.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(10);

// ============================================================================
// ResponseContext
// ============================================================================

/// Everything a strategy needs besides the socket.
#[derive(Debug, Clone)]
pub struct ResponseContext {
    /// Mode being served, for logs and metric labels.
    pub mode: ServerMode,
    /// Payload for strategies that send a body.
    pub content: Arc<str>,
    /// Fires when the owning session shuts down.
    pub cancel: CancellationToken,
}

// ============================================================================
// ServeSummary
// ============================================================================

/// What an accept loop did before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeSummary {
    /// Connections accepted.
    pub connections: u64,
    /// Connections that ended with an I/O error.
    pub connection_errors: u64,
}

// ============================================================================
// Strategy trait
// ============================================================================

/// One misbehavior, expressed as what happens on an accepted connection.
#[async_trait::async_trait]
pub trait Strategy: Send + Sync {
    /// Serves a single accepted connection, then closes it.
    ///
    /// An error ends this connection only; the accept loop carries on.
    async fn respond(&self, stream: TcpStream, ctx: &ResponseContext) -> io::Result<()>;

    /// Runs the accept loop until `ctx.cancel` fires, then closes the
    /// listener.
    async fn serve(&self, listener: TcpListener, ctx: ResponseContext) -> ServeSummary {
        accept_loop(self, listener, &ctx).await
    }

    /// Human-readable name for logging.
    fn name(&self) -> &'static str;
}

/// Accepts connections one at a time and hands each to `strategy`.
///
/// Cancellation is checked before every accept and raced against the accept
/// itself, with cancellation winning ties, so no connection is accepted once
/// the token has fired. The listener is dropped before this returns.
pub async fn accept_loop<S>(
    strategy: &S,
    listener: TcpListener,
    ctx: &ResponseContext,
) -> ServeSummary
where
    S: Strategy + ?Sized,
{
    let mode = ctx.mode.as_str();
    let mut summary = ServeSummary::default();

    loop {
        let accepted = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                summary.connections += 1;
                metrics::record_connection(mode);
                serve_connection(strategy, stream, peer, ctx, &mut summary).await;
            }
            Err(e) => {
                warn!(mode, error = %e, "accept failed");
                tokio::select! {
                    biased;
                    () = ctx.cancel.cancelled() => break,
                    () = tokio::time::sleep(ACCEPT_RETRY_DELAY) => {}
                }
            }
        }
    }

    drop(listener);
    debug!(
        mode,
        connections = summary.connections,
        errors = summary.connection_errors,
        "accept loop stopped"
    );
    summary
}

async fn serve_connection<S>(
    strategy: &S,
    stream: TcpStream,
    peer: SocketAddr,
    ctx: &ResponseContext,
    summary: &mut ServeSummary,
) where
    S: Strategy + ?Sized,
{
    debug!(mode = ctx.mode.as_str(), %peer, strategy = strategy.name(), "connection accepted");
    if let Err(e) = strategy.respond(stream, ctx).await {
        summary.connection_errors += 1;
        metrics::record_connection_error(ctx.mode.as_str());
        debug!(mode = ctx.mode.as_str(), %peer, error = %e, "connection ended early");
    }
}

// ============================================================================
// StrategyRegistry
// ============================================================================

/// Maps modes to the strategies that implement them.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    strategies: HashMap<ServerMode, Arc<dyn Strategy>>,
}

impl StrategyRegistry {
    /// A registry with no strategies; every mode is unsupported.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A registry with every built-in strategy, using default settings.
    #[must_use]
    pub fn builtin() -> Self {
        Self::from_config(&HarnessConfig::default())
    }

    /// A registry with every built-in strategy, tuned by `config`.
    #[must_use]
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::empty()
            .with(ServerMode::ProtocolViolation, ProtocolViolation)
            .with(ServerMode::MissingBody, MissingBody)
            .with(
                ServerMode::SlowBody,
                SlowBody::new(config.slow_body.chunk_delay(), config.slow_body.chunk_size),
            )
            .with(ServerMode::ConnectionReset, ConnectionReset)
    }

    /// Registers `strategy` for `mode`, replacing any previous entry.
    pub fn register(&mut self, mode: ServerMode, strategy: impl Strategy + 'static) -> &mut Self {
        self.strategies.insert(mode, Arc::new(strategy));
        self
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, mode: ServerMode, strategy: impl Strategy + 'static) -> Self {
        self.register(mode, strategy);
        self
    }

    /// Removes the strategy for `mode`, making the mode unsupported.
    pub fn remove(&mut self, mode: ServerMode) -> Option<Arc<dyn Strategy>> {
        self.strategies.remove(&mode)
    }

    /// Whether `mode` has a strategy.
    #[must_use]
    pub fn supports(&self, mode: ServerMode) -> bool {
        self.strategies.contains_key(&mode)
    }

    /// Looks up the strategy for `mode`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnsupportedMode`] if nothing is registered.
    pub fn resolve(&self, mode: ServerMode) -> Result<Arc<dyn Strategy>, ConfigError> {
        self.strategies
            .get(&mode)
            .cloned()
            .ok_or(ConfigError::UnsupportedMode { mode })
    }

    /// Registered modes in declaration order.
    #[must_use]
    pub fn modes(&self) -> Vec<ServerMode> {
        ServerMode::ALL
            .into_iter()
            .filter(|mode| self.supports(*mode))
            .collect()
    }
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("modes", &self.modes())
            .finish()
    }
}
