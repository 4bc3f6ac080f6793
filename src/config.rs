//! Harness configuration.
//!
//! Everything a [`TestServer`](crate::harness::TestServer) can be tuned with,
//! loadable from YAML. Every field is optional:
//!
//! ```yaml
//! mode: protocol-violation
//! content: '{"foo": "bar"}'
//! port_range: { start: 50231, end: 60230 }
//! shutdown_grace_ms: 5000
//! slow_body: { chunk_delay_ms: 10, chunk_size: 1 }
//! ```

use std::ops::RangeInclusive;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::mode::ServerMode;
use crate::port::DEFAULT_PORT_RANGE;

/// Response content used when none is configured.
pub const DEFAULT_CONTENT: &str = r#"{"foo": "bar"}"#;

/// How long teardown waits for an in-flight connection before aborting it.
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 5_000;

/// Top-level harness configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// Misbehavior to run.
    pub mode: ServerMode,
    /// Payload for strategies that send a body.
    pub content: String,
    /// Ports the harness may reserve.
    pub port_range: PortRangeConfig,
    /// Teardown grace period in milliseconds.
    pub shutdown_grace_ms: u64,
    /// Tuning for [`ServerMode::SlowBody`].
    pub slow_body: SlowBodyConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            mode: ServerMode::default(),
            content: DEFAULT_CONTENT.to_string(),
            port_range: PortRangeConfig::default(),
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
            slow_body: SlowBodyConfig::default(),
        }
    }
}

/// Inclusive port range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PortRangeConfig {
    /// First port.
    pub start: u16,
    /// Last port.
    pub end: u16,
}

impl Default for PortRangeConfig {
    fn default() -> Self {
        Self {
            start: *DEFAULT_PORT_RANGE.start(),
            end: *DEFAULT_PORT_RANGE.end(),
        }
    }
}

impl PortRangeConfig {
    /// The range as a `RangeInclusive`.
    #[must_use]
    pub const fn range(self) -> RangeInclusive<u16> {
        self.start..=self.end
    }

    /// Whether this is the built-in default range.
    #[must_use]
    pub fn is_default(self) -> bool {
        self == Self::default()
    }
}

/// Slow-body pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SlowBodyConfig {
    /// Pause between chunks in milliseconds.
    pub chunk_delay_ms: u64,
    /// Bytes per chunk.
    pub chunk_size: usize,
}

impl Default for SlowBodyConfig {
    fn default() -> Self {
        Self {
            chunk_delay_ms: 10,
            chunk_size: 1,
        }
    }
}

impl SlowBodyConfig {
    /// Pause between chunks.
    #[must_use]
    pub const fn chunk_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_delay_ms)
    }
}

impl HarnessConfig {
    /// Parses and validates a YAML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ParseError`] for malformed YAML or unknown
    /// fields and modes, or a validation error from [`validate`](Self::validate).
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Self::parse(yaml, Path::new("<inline>"))
    }

    /// Reads, parses and validates a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise the
    /// same errors as [`from_yaml_str`](Self::from_yaml_str).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    fn parse(yaml: &str, path: &Path) -> Result<Self, ConfigError> {
        // An empty document means "all defaults".
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks values serde cannot.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let PortRangeConfig { start, end } = self.port_range;
        if start == 0 || start > end {
            return Err(ConfigError::InvalidValue {
                field: "port_range".to_string(),
                value: format!("{start}..={end}"),
                expected: "a non-empty range starting above 0".to_string(),
            });
        }
        if self.shutdown_grace_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "shutdown_grace_ms".to_string(),
                value: "0".to_string(),
                expected: "a positive number of milliseconds".to_string(),
            });
        }
        if self.slow_body.chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "slow_body.chunk_size".to_string(),
                value: "0".to_string(),
                expected: "a positive integer".to_string(),
            });
        }
        Ok(())
    }

    /// Teardown grace period.
    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.mode, ServerMode::ProtocolViolation);
        assert_eq!(config.content, r#"{"foo": "bar"}"#);
        assert!(config.port_range.is_default());
        assert_eq!(config.shutdown_grace(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_document_is_default() {
        assert_eq!(
            HarnessConfig::from_yaml_str("  \n").unwrap(),
            HarnessConfig::default()
        );
    }

    #[test]
    fn partial_document_keeps_other_defaults() {
        let config = HarnessConfig::from_yaml_str(
            "mode: slow-body\nslow_body:\n  chunk_delay_ms: 25\n",
        )
        .unwrap();
        assert_eq!(config.mode, ServerMode::SlowBody);
        assert_eq!(config.slow_body.chunk_delay(), Duration::from_millis(25));
        assert_eq!(config.slow_body.chunk_size, 1);
        assert_eq!(config.content, DEFAULT_CONTENT);
    }

    #[test]
    fn unknown_mode_is_parse_error() {
        let err = HarnessConfig::from_yaml_str("mode: half-open\n").unwrap_err();
        assert!(
            matches!(err, ConfigError::ParseError { ref message, .. }
                if message.contains("unknown server mode 'half-open'")),
            "{err}"
        );
    }

    #[test]
    fn mode_name_is_case_insensitive() {
        let config = HarnessConfig::from_yaml_str("mode: Missing-Body\n").unwrap();
        assert_eq!(config.mode, ServerMode::MissingBody);
    }

    #[test]
    fn unknown_field_is_parse_error() {
        let err = HarnessConfig::from_yaml_str("moed: slow-body\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }), "{err}");
    }

    #[test]
    fn inverted_port_range_is_invalid() {
        let err =
            HarnessConfig::from_yaml_str("port_range: { start: 6000, end: 5000 }\n").unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "port_range")
        );
    }

    #[test]
    fn zero_chunk_size_is_invalid() {
        let err = HarnessConfig::from_yaml_str("slow_body: { chunk_size: 0 }\n").unwrap_err();
        assert!(err.to_string().contains("slow_body.chunk_size"));
    }

    #[test]
    fn zero_grace_is_invalid() {
        let err = HarnessConfig::from_yaml_str("shutdown_grace_ms: 0\n").unwrap_err();
        assert!(err.to_string().contains("shutdown_grace_ms"));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "mode: missing-body\ncontent: hello").unwrap();
        let config = HarnessConfig::load(file.path()).unwrap();
        assert_eq!(config.mode, ServerMode::MissingBody);
        assert_eq!(config.content, "hello");
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = HarnessConfig::load(&dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
