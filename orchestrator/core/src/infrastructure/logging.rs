// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Tracing subscriber bootstrap.
//!
//! The mesh core only emits `tracing` events; the hosting process calls
//! [`init_logging`] once at startup to decide where they go.

use crate::domain::node_config::ObservabilityConfig;
use anyhow::{Context, Result};

/// Initialize tracing subscriber for logging.
///
/// `RUST_LOG` takes precedence over `level`. `format` is `"json"` or
/// anything else for compact text output.
pub fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let result = if format.eq_ignore_ascii_case("json") {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };

    result.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
}

pub fn init_logging_from_config(config: &ObservabilityConfig) -> Result<()> {
    init_logging(&config.log_level, &config.log_format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscriber_installs_once() {
        let _ = init_logging("info", "compact");
        assert!(init_logging("debug", "json").is_err());
    }
}
