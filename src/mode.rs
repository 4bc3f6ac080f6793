//! Server modes.
//!
//! A [`ServerMode`] names one misbehavior. Which modes a harness can actually
//! run is decided by its [`StrategyRegistry`](crate::strategy::StrategyRegistry);
//! a mode without a registered strategy is rejected before any port is
//! reserved.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Misbehavior a test server exhibits towards its clients.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case", try_from = "String")]
pub enum ServerMode {
    /// Replies with a status line that is not valid HTTP, a `Date` header and
    /// nothing else.
    #[default]
    ProtocolViolation,
    /// Replies with valid headers announcing a body, then closes without
    /// sending it.
    MissingBody,
    /// Replies with a valid response whose body trickles out in small chunks.
    SlowBody,
    /// Accepts the connection and resets it without replying.
    ConnectionReset,
}

impl ServerMode {
    /// Every mode, in declaration order.
    pub const ALL: [Self; 4] = [
        Self::ProtocolViolation,
        Self::MissingBody,
        Self::SlowBody,
        Self::ConnectionReset,
    ];

    /// Stable kebab-case name, used in config files, CLI flags, logs and
    /// metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ProtocolViolation => "protocol-violation",
            Self::MissingBody => "missing-body",
            Self::SlowBody => "slow-body",
            Self::ConnectionReset => "connection-reset",
        }
    }

    /// One-line description for `roguewire modes`.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::ProtocolViolation => "invalid status line, Date header, no body",
            Self::MissingBody => "valid headers with Content-Length, body never sent",
            Self::SlowBody => "valid response, body dripped in delayed chunks",
            Self::ConnectionReset => "connection accepted then reset without a reply",
        }
    }
}

impl fmt::Display for ServerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mode names are matched case-insensitively, ignoring surrounding
/// whitespace.
impl FromStr for ServerMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ConfigError::UnknownMode {
                name: s.to_string(),
            })
    }
}

impl TryFrom<String> for ServerMode {
    type Error = ConfigError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        name.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_is_protocol_violation() {
        assert_eq!(ServerMode::default(), ServerMode::ProtocolViolation);
    }

    #[test]
    fn parse_known_names() {
        assert_eq!(
            "protocol-violation".parse::<ServerMode>().ok(),
            Some(ServerMode::ProtocolViolation)
        );
        assert_eq!(
            " Slow-Body ".parse::<ServerMode>().ok(),
            Some(ServerMode::SlowBody)
        );
    }

    #[test]
    fn parse_unknown_name_is_config_error() {
        let err = "teapot".parse::<ServerMode>().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownMode { ref name } if name == "teapot"));
    }

    #[test]
    fn display_matches_serde_name() {
        for mode in ServerMode::ALL {
            let yaml = serde_yaml::to_string(&mode).unwrap();
            assert_eq!(yaml.trim(), mode.to_string());
        }
    }

    #[test]
    fn serde_rejects_unknown_mode() {
        let err = serde_yaml::from_str::<ServerMode>("half-open").unwrap_err();
        assert!(err.to_string().contains("unknown server mode 'half-open'"), "{err}");
    }

    #[test]
    fn serde_accepts_any_case() {
        let mode: ServerMode = serde_yaml::from_str("Connection-Reset").unwrap();
        assert_eq!(mode, ServerMode::ConnectionReset);
    }

    proptest! {
        #[test]
        fn parse_accepts_only_declared_names(name in "[a-z-]{1,24}") {
            let declared = ServerMode::ALL.iter().any(|m| m.as_str() == name);
            prop_assert_eq!(name.parse::<ServerMode>().is_ok(), declared);
        }
    }
}
