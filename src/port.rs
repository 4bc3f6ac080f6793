//! Ephemeral port reservation.
//!
//! [`PortReserver`] hands out loopback ports from a fixed range so that no two
//! concurrent callers in the same process ever receive the same port. A port
//! is only handed out if the OS lets us bind it at that moment, which keeps
//! separate test binaries mostly out of each other's way. Leases are released
//! on drop, so a callback that errors or panics still gives its port back.

use std::collections::HashSet;
use std::future::Future;
use std::net::{Ipv4Addr, TcpListener as StdTcpListener};
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::PortError;

/// Default range ports are reserved from.
pub const DEFAULT_PORT_RANGE: RangeInclusive<u16> = 50231..=60230;

const INSTANCE_STRIDE: u32 = 1009;

/// Ports currently leased plus where the next scan starts.
struct LeaseTable {
    cursor: u32,
    leased: HashSet<u16>,
}

struct ReserverState {
    start: u16,
    end: u16,
    table: Mutex<LeaseTable>,
    issued: AtomicU64,
    root: CancellationToken,
}

impl ReserverState {
    // Poisoning is ignored: every update is a single insert or remove.
    fn table(&self) -> MutexGuard<'_, LeaseTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn span(&self) -> u32 {
        u32::from(self.end) - u32::from(self.start) + 1
    }
}

/// Allocates unused local TCP ports and runs callbacks while holding them.
///
/// Cloning is cheap and clones share the same lease table.
#[derive(Clone)]
pub struct PortReserver {
    inner: Arc<ReserverState>,
}

impl PortReserver {
    /// Creates a reserver over [`DEFAULT_PORT_RANGE`].
    #[must_use]
    pub fn new() -> Self {
        Self::build(*DEFAULT_PORT_RANGE.start(), *DEFAULT_PORT_RANGE.end())
    }

    /// Creates a reserver over a custom range.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::EmptyRange`] if the range is empty or starts at
    /// port 0.
    pub fn with_range(range: RangeInclusive<u16>) -> Result<Self, PortError> {
        let (start, end) = range.into_inner();
        if start == 0 || start > end {
            return Err(PortError::EmptyRange { start, end });
        }
        Ok(Self::build(start, end))
    }

    fn build(start: u16, end: u16) -> Self {
        // Spread the starting point per process and per reserver so that
        // independent reservers rarely probe the same ports.
        static INSTANCES: AtomicU32 = AtomicU32::new(0);
        let span = u32::from(end) - u32::from(start) + 1;
        let instance = INSTANCES.fetch_add(1, Ordering::Relaxed);
        let cursor = std::process::id()
            .wrapping_add(instance.wrapping_mul(INSTANCE_STRIDE))
            % span;
        Self {
            inner: Arc::new(ReserverState {
                start,
                end,
                table: Mutex::new(LeaseTable {
                    cursor,
                    leased: HashSet::new(),
                }),
                issued: AtomicU64::new(0),
                root: CancellationToken::new(),
            }),
        }
    }

    /// Returns the process-wide reserver.
    ///
    /// Every harness built with defaults arbitrates through this instance,
    /// which is what keeps parallel tests in one binary collision-free.
    #[must_use]
    pub fn global() -> Self {
        static GLOBAL: OnceLock<PortReserver> = OnceLock::new();
        GLOBAL.get_or_init(Self::new).clone()
    }

    /// The range ports are drawn from.
    #[must_use]
    pub fn range(&self) -> RangeInclusive<u16> {
        self.inner.start..=self.inner.end
    }

    /// Leases a free port.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::ShutDown`] after [`shutdown`](Self::shutdown),
    /// or [`PortError::Exhausted`] when every port in the range is either
    /// leased or refused by the OS.
    pub fn acquire(&self) -> Result<PortLease, PortError> {
        let state = &self.inner;
        if state.root.is_cancelled() {
            return Err(PortError::ShutDown {
                start: state.start,
                end: state.end,
            });
        }
        let span = state.span();
        let mut table = state.table();

        for step in 0..span {
            let offset = (table.cursor + step) % span;
            let Ok(port) = u16::try_from(u32::from(state.start) + offset) else {
                continue;
            };
            if table.leased.contains(&port) {
                continue;
            }
            if !is_bindable(port) {
                trace!(port, "port refused by the OS, skipping");
                continue;
            }

            table.leased.insert(port);
            table.cursor = (offset + 1) % span;
            drop(table);

            state.issued.fetch_add(1, Ordering::Relaxed);
            debug!(port, "port reserved");
            return Ok(PortLease {
                port,
                state: Arc::clone(&self.inner),
            });
        }

        Err(PortError::Exhausted {
            start: state.start,
            end: state.end,
        })
    }

    /// Reserves a port, runs `callback(port, cancel)` and releases the port
    /// once the callback's future resolves, fails or unwinds.
    ///
    /// `cancel` is a child of this reserver's root token and fires when
    /// [`shutdown`](Self::shutdown) is called.
    ///
    /// # Errors
    ///
    /// Returns the reservation failure converted into `E`, or whatever error
    /// the callback returns.
    pub async fn execute<F, Fut, T, E>(&self, callback: F) -> Result<T, E>
    where
        F: FnOnce(u16, CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<PortError>,
    {
        let lease = self.acquire()?;
        let cancel = self.inner.root.child_token();
        let result = callback(lease.port(), cancel).await;
        drop(lease);
        result
    }

    /// Number of ports currently leased.
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.inner.table().leased.len()
    }

    /// Whether `port` is currently leased by this reserver.
    #[must_use]
    pub fn is_leased(&self, port: u16) -> bool {
        self.inner.table().leased.contains(&port)
    }

    /// Total number of leases ever issued.
    #[must_use]
    pub fn leases_issued(&self) -> u64 {
        self.inner.issued.load(Ordering::Relaxed)
    }

    /// Cancels the token handed to every running callback.
    ///
    /// The reserver stays shut down: later [`acquire`](Self::acquire) and
    /// [`execute`](Self::execute) calls fail with [`PortError::ShutDown`].
    pub fn shutdown(&self) {
        self.inner.root.cancel();
    }
}

impl Default for PortReserver {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PortReserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortReserver")
            .field("range", &self.range())
            .field("in_use", &self.in_use())
            .finish_non_exhaustive()
    }
}

/// A leased port. The port goes back to the reserver when this is dropped.
#[must_use = "the port is released as soon as the lease is dropped"]
pub struct PortLease {
    port: u16,
    state: Arc<ReserverState>,
}

impl PortLease {
    /// The leased port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }
}

impl std::fmt::Debug for PortLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortLease").field("port", &self.port).finish()
    }
}

impl Drop for PortLease {
    fn drop(&mut self) {
        self.state.table().leased.remove(&self.port);
        debug!(port = self.port, "port released");
    }
}

fn is_bindable(port: u16) -> bool {
    StdTcpListener::bind((Ipv4Addr::LOCALHOST, port)).is_ok()
}
