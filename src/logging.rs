// src/logging.rs

//! Logging setup for `assetpipe` using `tracing` + `tracing-subscriber`.
//!
//! Filter selection, first match wins:
//! 1. `--log-level` CLI flag, applied to `assetpipe` itself
//! 2. `ASSETPIPE_LOG`, either a bare level ("debug") or full `EnvFilter`
//!    directives ("assetpipe=debug,axum=info")
//! 3. `info`
//!
//! Dependencies that log per request or per filesystem event (`hyper`,
//! `axum`, `notify`) are capped at `warn` unless a directive names them.
//! Logs are sent to STDERR.

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

pub const LOG_ENV: &str = "ASSETPIPE_LOG";

const QUIET_DEPENDENCIES: &[&str] = &["hyper", "axum", "notify"];

/// Initialise the global subscriber. Call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env = std::env::var(LOG_ENV).ok();
    let directives = filter_directives(cli_level, env.as_deref());
    let filter = EnvFilter::try_new(&directives)
        .with_context(|| format!("invalid log filter '{directives}'"))?;

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("installing log subscriber: {e}"))?;

    Ok(())
}

/// Build the `EnvFilter` directive string for the given inputs.
fn filter_directives(cli_level: Option<LogLevel>, env: Option<&str>) -> String {
    let base = match (cli_level, env.map(str::trim).filter(|s| !s.is_empty())) {
        (Some(level), _) => format!("{}={}", env!("CARGO_CRATE_NAME"), level_name(level)),
        (None, Some(raw)) => raw.to_string(),
        (None, None) => "info".to_string(),
    };

    let mut directives = vec![base.clone()];
    for dep in QUIET_DEPENDENCIES {
        if !base.contains(dep) {
            directives.push(format!("{dep}=warn"));
        }
    }
    directives.join(",")
}

fn level_name(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}
