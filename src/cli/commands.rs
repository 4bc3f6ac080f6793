//! CLI command handlers.

use std::fmt::Write as _;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::cli::args::{Cli, Commands, ServeArgs};
use crate::config::HarnessConfig;
use crate::error::{ExitCode, HarnessError, Result};
use crate::mode::ServerMode;
use crate::observability::init_metrics;
use crate::port::PortReserver;
use crate::session::ListenerSession;
use crate::strategy::{Strategy, StrategyRegistry};

/// Dispatches a parsed CLI invocation and returns the process exit code.
///
/// # Errors
///
/// Returns an error if the dispatched command fails.
pub async fn dispatch(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Serve(args) => serve(&args).await,
        Commands::Modes => {
            print!("{}", format_modes(&StrategyRegistry::builtin()));
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Runs the selected strategy until SIGINT or SIGTERM.
///
/// The base URL is printed to stdout once the listener is up. Returns
/// [`ExitCode::INTERRUPTED`] or [`ExitCode::TERMINATED`] depending on the
/// signal that stopped it.
///
/// # Errors
///
/// Returns configuration, reservation and bind errors.
pub async fn serve(args: &ServeArgs) -> Result<i32> {
    let config = resolve_config(args)?;
    if let Some(port) = args.metrics_port {
        init_metrics(Some(port))?;
    }

    let strategy = StrategyRegistry::from_config(&config).resolve(config.mode)?;

    match args.port {
        Some(port) => run_until_signal(port, &config, strategy, CancellationToken::new()).await,
        None => {
            let reserver = PortReserver::with_range(config.port_range.range())?;
            reserver
                .execute(|port, cancel| run_until_signal(port, &config, strategy, cancel))
                .await
        }
    }
}

/// Loads the config file if given, then applies flag overrides.
fn resolve_config(args: &ServeArgs) -> Result<HarnessConfig> {
    let mut config = match &args.config {
        Some(path) => HarnessConfig::load(path)?,
        None => HarnessConfig::default(),
    };
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if let Some(content) = &args.content {
        config.content.clone_from(content);
    }
    config.validate()?;
    Ok(config)
}

async fn run_until_signal(
    port: u16,
    config: &HarnessConfig,
    strategy: Arc<dyn Strategy>,
    cancel: CancellationToken,
) -> Result<i32> {
    let session = ListenerSession::start(
        port,
        config.mode,
        strategy,
        Arc::from(config.content.as_str()),
        cancel,
    )
    .await?;
    println!("{}", session.base_url());

    let signalled = shutdown_signal().await;
    session.shutdown(config.shutdown_grace()).await;
    signalled.map_err(HarnessError::from)
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<i32> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|()| ExitCode::INTERRUPTED),
        _ = sigterm.recv() => Ok(ExitCode::TERMINATED),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<i32> {
    tokio::signal::ctrl_c().await?;
    Ok(ExitCode::INTERRUPTED)
}

/// Renders the mode table printed by `roguewire modes`.
#[must_use]
pub fn format_modes(registry: &StrategyRegistry) -> String {
    let width = ServerMode::ALL
        .iter()
        .map(|mode| mode.as_str().len())
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    for mode in registry.modes() {
        let _ = writeln!(out, "{:<width$}  {}", mode.as_str(), mode.description());
    }
    out
}
