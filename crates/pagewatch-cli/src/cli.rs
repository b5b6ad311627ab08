//! # CLI Structure and Argument Parsing
//!
//! `pagewatch` takes a single URL and runs one change-detection execution for
//! it, or prints the stored history for it with `--history`.
//!
//! ## Usage Patterns
//!
//! ```bash
//! # Check a page, skipping the download when its ETag is unchanged
//! pagewatch https://example.com/news
//!
//! # Always download and compare, store under a custom directory
//! pagewatch https://example.com/news --force --output-dir ./watch
//!
//! # Machine-readable result
//! pagewatch https://example.com/news --format json | jq .change_detected
//!
//! # Audit what has been recorded so far
//! pagewatch https://example.com/news --history
//! ```
//!
//! ## Precedence
//!
//! Flags override environment variables, which override the config file.
//! Flags can only turn checks off; a check disabled in the config file
//! cannot be re-enabled from the command line.

use crate::output::OutputFormat;
use clap::Parser;
use pagewatch_core::Config;
use std::path::PathBuf;

/// Detect meaningful changes in a web page.
#[derive(Parser, Clone, Debug)]
#[command(name = "pagewatch", version, about, long_about = None)]
pub struct Cli {
    /// URL of the page to check
    pub url: String,

    /// Directory holding execution history and downloaded content
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Do not skip the download when the ETag is unchanged
    #[arg(long)]
    pub no_etag_check: bool,

    /// Disable raw and normalized content hash comparison
    #[arg(long)]
    pub no_hash_check: bool,

    /// Always download and classify, ignoring every skip rule
    #[arg(long)]
    pub force: bool,

    /// Print the recorded history instead of running a check
    #[arg(long, conflicts_with_all = ["force", "no_etag_check", "no_hash_check"])]
    pub history: bool,

    /// Output format
    #[arg(short = 'f', long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Path to a TOML config file (defaults to $PAGEWATCH_CONFIG or the platform config dir)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

impl Cli {
    /// Apply command-line overrides on top of file and environment settings.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(dir) = &self.output_dir {
            config.paths.root.clone_from(dir);
        }
        if self.no_etag_check {
            config.detection.etag_check_enabled = false;
        }
        if self.no_hash_check {
            config.detection.content_hash_check_enabled = false;
            config.detection.normalized_hash_check_enabled = false;
        }
        if self.force {
            config.detection.force_download = true;
        }
    }
}
