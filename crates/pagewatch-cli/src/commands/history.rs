//! Print the recorded executions for a URL.

use anyhow::{Context, Result};
use pagewatch_core::{Config, FsStorage};

use crate::output::{OutputFormat, render_history};

/// Show the stored history for `url` without touching the network.
pub fn execute(url: &str, config: &Config, format: OutputFormat) -> Result<()> {
    let storage = FsStorage::with_root(config.paths.root.clone()).with_context(|| {
        format!(
            "Failed to prepare storage at {}",
            config.paths.root.display()
        )
    })?;
    let records = storage
        .load_history(url)
        .with_context(|| format!("Failed to read history for {url}"))?;

    println!("{}", render_history(url, &records, format)?.trim_end());
    Ok(())
}
