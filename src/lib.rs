//! `roguewire` - misbehaving test servers for client resilience testing
//!
//! A [`TestServer`] reserves a loopback port, starts a server that violates
//! the protocol in one chosen way ([`ServerMode`]), runs a caller-supplied
//! probe against `http://localhost:<port>/` and tears the server down again,
//! whether the probe succeeded or not.

pub mod cli;
pub mod config;
pub mod error;
pub mod harness;
pub mod mode;
pub mod observability;
pub mod port;
pub mod session;
pub mod strategy;

pub use config::HarnessConfig;
pub use error::{ConfigError, HarnessError, PortError};
pub use harness::TestServer;
pub use mode::ServerMode;
pub use port::{PortLease, PortReserver};
pub use session::ListenerSession;
pub use strategy::{Strategy, StrategyRegistry};
