//! Validate an engine configuration file.

use anyhow::{Context, Result};
use std::path::Path;
use wristlink_client::EngineConfig;

/// Run the check-config command.
pub fn run(path: &Path) -> Result<()> {
    let config = EngineConfig::from_file(path)
        .with_context(|| format!("Invalid configuration: {}", path.display()))?;

    println!("=== {} ===", path.display());
    println!();
    println!("Aggregator:");
    println!("  Max batch size: {}", config.aggregator.max_batch_size);
    println!("  Tick interval:  {}s", config.aggregator.tick_interval_secs);
    println!("Router:");
    println!("  Immediate timeout: {}ms", config.router.immediate_timeout_ms);
    println!("Endpoint:");
    println!("  Inbound capacity: {}", config.endpoint.inbound_capacity);
    println!();
    println!("OK");

    Ok(())
}
