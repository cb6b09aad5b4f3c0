//! Headless host binary for the resident service.
//!
//! Reads trigger envelopes as newline-delimited JSON from stdin, feeds them
//! to the service, and writes responses and hook events to stdout. Exits on
//! stdin EOF or once the service stops itself.
//!
//! All tracing output goes to stderr (and optionally a rolling log file) so
//! that stdout remains a clean JSON protocol channel.
//!
//! The config file defaults to `<config dir>/config.toml`; set
//! `RESIDENT_CONFIG` to use another path.

use std::path::PathBuf;
use std::sync::Arc;

use resident::config::{LoggingConfig, ServiceConfig};
use resident::foreground::create_platform;
use resident::host::stdio::run_stdio_bridge;
use resident::lifecycle::ResidentService;
use resident::settings::{FileFlagStore, Settings};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var_os("RESIDENT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(ServiceConfig::default_config_path);
    let config = ServiceConfig::load_or_default(&config_path)
        .map_err(|e| anyhow::anyhow!("cannot load config {}: {e}", config_path.display()))?;

    let log_guard = init_logging(&config.logging);

    let store = FileFlagStore::open(config.storage.effective_settings_path());
    tracing::info!(
        config = %config_path.display(),
        settings = %store.path().display(),
        "resident-host starting"
    );
    let settings = Settings::new(Arc::new(store));

    let (service, worker) = ResidentService::spawn(create_platform(), settings, &config);

    run_stdio_bridge(service).await.map_err(|e| {
        tracing::error!(error = %e, "resident-host exited with error");
        anyhow::anyhow!("resident-host failed: {e}")
    })?;

    // The bridge held the last client; the worker drains and exits.
    if let Err(e) = worker.await {
        tracing::warn!(error = %e, "service worker did not exit cleanly");
    }

    tracing::info!("resident-host shut down cleanly");
    drop(log_guard);
    // A pending blocking stdin read would otherwise keep the runtime alive.
    std::process::exit(0);
}

/// Install stderr logging plus an optional daily rolling file.
///
/// The returned guard must live until exit so buffered file output is flushed.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter.as_str()));

    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    let (file_layer, guard) = if config.file_logging {
        let appender =
            tracing_appender::rolling::daily(config.effective_log_dir(), "resident-host.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        (
            Some(fmt::layer().with_ansi(false).with_writer(writer)),
            Some(guard),
        )
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    guard
}
