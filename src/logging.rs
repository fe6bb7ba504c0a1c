//! Tracing subscriber setup.
//!
//! Logs go to stderr so `hrctl` stdout stays clean for piping. Precedence,
//! highest first: `--verbose`, then `RUST_LOG`, then `[logging] level`.

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};

/// Filter directives to install. `verbose` wins over `RUST_LOG`.
fn filter_directives(config: &LoggingConfig, verbose: bool, rust_log: Option<&str>) -> String {
    if verbose {
        return "debug".to_string();
    }
    match rust_log.map(str::trim) {
        Some(env) if !env.is_empty() => env.to_string(),
        _ => config.level.as_str().to_string(),
    }
}

/// Install the global subscriber.
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<()> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let directives = filter_directives(config, verbose, rust_log.as_deref());
    let filter = EnvFilter::try_new(&directives)
        .or_else(|_| EnvFilter::try_new(config.level.as_str()))
        .map_err(|e| anyhow!("invalid log filter {directives:?}: {e}"))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    let result = match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))
}
