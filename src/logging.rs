//! Diagnostic logging
//!
//! User-facing output is printed directly; tracing carries the diagnostic
//! stream (spawned commands, config layers) to stderr.

use anyhow::{Result, anyhow};
use tracing::Level;

/// Map `-v` occurrences to a level: 0=WARN, 1=DEBUG, 2+=TRACE
pub fn level_for(verbose: u8) -> Level {
    match verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Install the stderr fmt subscriber
pub fn init_logging(verbose: u8) -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(level_for(verbose))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}
