//! Run one change-detection execution for a URL.

use anyhow::{Context, Result};
use pagewatch_core::{ChangeDetector, Config, FsStorage, HttpTransport};

use crate::output::{OutputFormat, render_record};

/// Execute a check and print the resulting record.
///
/// Setup problems (storage root, HTTP client) are errors. Once the detector
/// runs, every outcome including a failed execution is reported on stdout
/// and the command succeeds.
pub async fn execute(url: &str, config: &Config, format: OutputFormat) -> Result<()> {
    let storage = FsStorage::with_root(config.paths.root.clone()).with_context(|| {
        format!(
            "Failed to prepare storage at {}",
            config.paths.root.display()
        )
    })?;
    let transport = HttpTransport::from_config(&config.http, config.retry)
        .context("Failed to build HTTP client")?;

    let detector = ChangeDetector::new(transport, storage, config.detection);
    let record = detector.execute(url).await;

    println!("{}", render_record(&record, format)?.trim_end());
    Ok(())
}
