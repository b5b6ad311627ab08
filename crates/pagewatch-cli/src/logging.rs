//! Logging initialization and color control.

use anyhow::Result;
use colored::control as color_control;
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::cli::Cli;
use crate::output::OutputFormat;

/// Environment variable consulted when neither `--verbose` nor `--quiet` is set.
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

/// Resolve the log level from flags, then `LOG_LEVEL`, then the default.
///
/// JSON output drops the default to `WARN` so stderr stays quiet for scripts.
pub fn resolve_level(cli: &Cli, env_level: Option<&str>) -> Level {
    if cli.verbose {
        return Level::DEBUG;
    }
    if cli.quiet {
        return Level::ERROR;
    }
    if let Some(level) = env_level.and_then(|raw| Level::from_str(raw.trim()).ok()) {
        return level;
    }
    match cli.format {
        OutputFormat::Json => Level::WARN,
        OutputFormat::Text => Level::INFO,
    }
}

/// Install the global tracing subscriber. Logs always go to stderr.
///
/// # Errors
///
/// Returns an error if a global subscriber was already set.
pub fn initialize_logging(cli: &Cli) -> Result<()> {
    let env_level = std::env::var(LOG_LEVEL_ENV).ok();
    let level = resolve_level(cli, env_level.as_deref());

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let env_no_color = std::env::var("NO_COLOR").ok().is_some();
    if cli.no_color || env_no_color || matches!(cli.format, OutputFormat::Json) {
        color_control::set_override(false);
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(args: &[&str]) -> Cli {
        let mut full = vec!["pagewatch", "https://example.com"];
        full.extend_from_slice(args);
        Cli::try_parse_from(full).unwrap()
    }

    #[test]
    fn test_flags_win_over_environment() {
        assert_eq!(resolve_level(&parse(&["--verbose"]), Some("error")), Level::DEBUG);
        assert_eq!(resolve_level(&parse(&["--quiet"]), Some("debug")), Level::ERROR);
    }

    #[test]
    fn test_environment_level() {
        assert_eq!(resolve_level(&parse(&[]), Some("debug")), Level::DEBUG);
        assert_eq!(resolve_level(&parse(&[]), Some(" WARN ")), Level::WARN);
        assert_eq!(resolve_level(&parse(&[]), Some("nonsense")), Level::INFO);
    }

    #[test]
    fn test_json_output_defaults_to_warn() {
        assert_eq!(resolve_level(&parse(&["--format", "json"]), None), Level::WARN);
        assert_eq!(resolve_level(&parse(&[]), None), Level::INFO);
    }
}
