#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[allow(dead_code)]
pub const CMD_TIMEOUT: Duration = Duration::from_secs(30);

/// Config used by every test run: no backoff, one retry, short timeout.
const TEST_CONFIG: &str = "\
[http]
timeout_secs = 5

[retry]
max_retries = 1
base_delay_ms = 0
";

/// Write the test config into `dir` and return its path.
#[allow(dead_code)]
pub fn write_config(dir: &Path) -> PathBuf {
    let path = dir.join("config.toml");
    std::fs::write(&path, TEST_CONFIG).expect("failed to write test config");
    path
}

/// Create a `pagewatch` command isolated from the user's environment.
///
/// Storage goes to `<dir>/data` and configuration is read from
/// `<dir>/config.toml`.
#[allow(dead_code)]
pub fn pagewatch_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("pagewatch"));
    cmd.timeout(CMD_TIMEOUT);
    cmd.env("PAGEWATCH_CONFIG", write_config(dir));
    cmd.env("PAGEWATCH_DATA_DIR", dir.join("data"));
    cmd.env("NO_COLOR", "1");
    for key in [
        "ENABLE_ETAG_CHECK",
        "ENABLE_CONTENT_HASH_CHECK",
        "ENABLE_NORMALIZED_HASH_CHECK",
        "LOG_LEVEL",
    ] {
        cmd.env_remove(key);
    }
    cmd
}

/// Parse the JSON record printed by `--format json`.
#[allow(dead_code)]
pub fn parse_record(stdout: &[u8]) -> serde_json::Value {
    serde_json::from_slice(stdout).expect("stdout should be a JSON record")
}
