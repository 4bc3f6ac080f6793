//! Logging setup.
//!
//! The library only emits `tracing` events; nothing is printed unless a
//! subscriber is installed. The binary installs one on stderr with
//! [`init_logging`]. Test suites call [`init_test_logging`] so session and
//! connection events show up next to the failing test's output.
//!
//! `ROGUEWIRE_LOG_LEVEL` takes an `EnvFilter` directive and wins over any
//! verbosity-derived default.

use std::io::IsTerminal;

use tracing::Subscriber;
use tracing_subscriber::fmt::{MakeWriter, TestWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::cli::args::ColorChoice;

/// Environment variable holding an `EnvFilter` directive.
pub const LOG_LEVEL_ENV: &str = "ROGUEWIRE_LOG_LEVEL";

/// Directive used by [`init_test_logging`] when the environment sets none.
pub const TEST_DIRECTIVE: &str = "roguewire=debug";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable format with optional ANSI colors.
    #[default]
    Human,
    /// Newline-delimited JSON for machine consumption.
    Json,
}

/// Default directive for a `-v` count.
///
/// Extra verbosity is granted to this crate first; dependencies only get
/// chatty at `-vvv`.
#[must_use]
pub const fn verbosity_to_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "roguewire=info,warn",
        2 => "roguewire=debug,info",
        _ => "trace",
    }
}

/// `ROGUEWIRE_LOG_LEVEL` if set and valid, otherwise `fallback`.
#[must_use]
pub fn env_filter_or(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_LEVEL_ENV).unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Builds a subscriber that writes formatted events to `writer`.
///
/// Nothing is installed; pass the result to `tracing::subscriber::set_default`
/// for a scoped subscriber or call `try_init` on it.
pub fn subscriber<W>(
    format: LogFormat,
    filter: EnvFilter,
    ansi: bool,
    writer: W,
) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let output: Box<dyn Layer<Registry> + Send + Sync> = match format {
        LogFormat::Human => tracing_subscriber::fmt::layer()
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(false)
            .with_writer(writer)
            .boxed(),
    };
    Box::new(tracing_subscriber::registry().with(output).with(filter))
}

/// Installs the global subscriber for the `roguewire` binary, on stderr.
///
/// A second call is a no-op.
pub fn init_logging(format: LogFormat, verbosity: u8, color: ColorChoice) {
    let ansi = match color {
        ColorChoice::Auto => {
            std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none()
        }
        ColorChoice::Always => true,
        ColorChoice::Never => false,
    };
    let filter = env_filter_or(verbosity_to_directive(verbosity));
    let _ = subscriber(format, filter, ansi, std::io::stderr).try_init();
}

/// Installs a global subscriber that writes through the test harness's
/// captured output, at [`TEST_DIRECTIVE`] unless `ROGUEWIRE_LOG_LEVEL` says
/// otherwise.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_logging() {
    let filter = env_filter_or(TEST_DIRECTIVE);
    let _ = subscriber(LogFormat::Human, filter, false, TestWriter::new()).try_init();
}

#[cfg(test)]
pub(crate) mod capture {
    //! In-memory writer for asserting on emitted events.

    use std::io;
    use std::sync::{Arc, Mutex, PoisonError};

    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    pub struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        pub fn contents(&self) -> String {
            let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
            String::from_utf8_lossy(&bytes).into_owned()
        }
    }

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'w> MakeWriter<'w> for Captured {
        type Writer = Self;

        fn make_writer(&'w self) -> Self::Writer {
            self.clone()
        }
    }
}
