//! Execution records: one row of history per fetch attempt.
//!
//! Records are written as JSON Lines. Enum values use their lowercase names
//! (`completed`, `new_content`, ...) and optional fields are written as
//! `null`, which keeps the log readable by earlier tooling that produced the
//! same shape.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Lifecycle state of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Declared for queued executions; never produced by the detector.
    Pending,
    /// Declared for in-flight executions; never produced by the detector.
    Downloading,
    /// Content was downloaded, classified and persisted.
    Completed,
    /// The previous download is still valid; nothing was persisted.
    Skipped,
    /// Something went wrong; see `error_message`.
    Failed,
}

impl ExecutionStatus {
    /// Persisted name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }

    /// Whether an execution in this state has finished.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Skipped | Self::Failed)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the detector believes content changed (or the label it uses when it did not).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// The validator token differs from the previous one. Also the label for
    /// "nothing changed" when `change_detected` is `false`.
    EtagChanged,
    /// Only raw bytes differ; normalized content is identical.
    ContentHashChanged,
    /// Normalized content differs.
    NormalizedHashChanged,
    /// No previous record existed.
    NewContent,
}

impl ChangeType {
    /// Persisted name of the change type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EtagChanged => "etag_changed",
            Self::ContentHashChanged => "content_hash_changed",
            Self::NormalizedHashChanged => "normalized_hash_changed",
            Self::NewContent => "new_content",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw and normalized digests of one downloaded body.
///
/// Both digests are computed in the same pass, so a record either carries
/// both or neither.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    /// Digest of the raw body.
    pub content_hash: String,
    /// Digest of the normalized body.
    pub normalized_hash: String,
}

/// Outcome of classifying a download against the previous record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeVerdict {
    /// Classification label.
    pub change_type: ChangeType,
    /// Whether a change was detected.
    pub change_detected: bool,
}

impl ChangeVerdict {
    pub(crate) const fn new(change_type: ChangeType, change_detected: bool) -> Self {
        Self {
            change_type,
            change_detected,
        }
    }
}

/// Details of a completed download used to build a [`ExecutionRecord`].
#[derive(Debug, Clone)]
pub struct CompletedDownload {
    /// Digests of the body.
    pub fingerprint: Fingerprint,
    /// Validator token reported for the body, if any.
    pub etag: Option<String>,
    /// Byte length of the raw body.
    pub content_size: u64,
    /// Wall-clock time spent downloading.
    pub download_duration_ms: u64,
}

/// One fetch attempt for one URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Resource identity; the only key used for history lookups.
    pub url: String,
    /// Traceability label. Not unique and never used as a lookup key.
    pub execution_id: String,
    /// When the record was created.
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Terminal state of the execution.
    pub status: ExecutionStatus,
    /// Digest of the raw body.
    #[serde(default)]
    pub content_hash: Option<String>,
    /// Digest of the normalized body.
    #[serde(default)]
    pub normalized_hash: Option<String>,
    /// Validator token from the most recent response.
    #[serde(default)]
    pub etag: Option<String>,
    /// Byte length of the raw body, `0` when nothing was downloaded.
    #[serde(default)]
    pub content_size: u64,
    /// Download time in milliseconds.
    #[serde(default)]
    pub download_duration_ms: Option<u64>,
    /// Verdict of the change detector.
    #[serde(default)]
    pub change_detected: bool,
    /// Classification of the change.
    #[serde(default)]
    pub change_type: Option<ChangeType>,
    /// Human-readable failure cause, present only on failed records.
    #[serde(default)]
    pub error_message: Option<String>,
}

impl ExecutionRecord {
    fn bare(url: &str, execution_id: &str, status: ExecutionStatus) -> Self {
        Self {
            url: url.to_string(),
            execution_id: execution_id.to_string(),
            timestamp: Utc::now(),
            status,
            content_hash: None,
            normalized_hash: None,
            etag: None,
            content_size: 0,
            download_duration_ms: None,
            change_detected: false,
            change_type: None,
            error_message: None,
        }
    }

    /// A record for an execution that found the previous download still valid.
    #[must_use]
    pub fn skipped(url: &str, execution_id: &str) -> Self {
        Self::bare(url, execution_id, ExecutionStatus::Skipped)
    }

    /// A record for an execution that could not finish.
    #[must_use]
    pub fn failed(url: &str, execution_id: &str, error_message: impl Into<String>) -> Self {
        Self {
            error_message: Some(error_message.into()),
            ..Self::bare(url, execution_id, ExecutionStatus::Failed)
        }
    }

    /// A record for a downloaded and classified body.
    #[must_use]
    pub fn completed(
        url: &str,
        execution_id: &str,
        download: CompletedDownload,
        verdict: ChangeVerdict,
    ) -> Self {
        Self {
            content_hash: Some(download.fingerprint.content_hash),
            normalized_hash: Some(download.fingerprint.normalized_hash),
            etag: download.etag,
            content_size: download.content_size,
            download_duration_ms: Some(download.download_duration_ms),
            change_detected: verdict.change_detected,
            change_type: Some(verdict.change_type),
            ..Self::bare(url, execution_id, ExecutionStatus::Completed)
        }
    }

    /// Whether the record represents a finished execution.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Parse a persisted timestamp.
///
/// Accepts RFC 3339 as well as timezone-less ISO-8601 values, which are
/// interpreted as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map(|ts| ts.and_utc()))
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_download() -> CompletedDownload {
        CompletedDownload {
            fingerprint: Fingerprint {
                content_hash: "a".repeat(64),
                normalized_hash: "b".repeat(64),
            },
            etag: Some("\"v1\"".to_string()),
            content_size: 42,
            download_duration_ms: 17,
        }
    }

    #[test]
    fn test_completed_record_populates_hashes_together() {
        let record = ExecutionRecord::completed(
            "https://example.com",
            "exec-1",
            sample_download(),
            ChangeVerdict::new(ChangeType::NewContent, true),
        );

        assert_eq!(record.status, ExecutionStatus::Completed);
        assert!(record.content_hash.is_some());
        assert!(record.normalized_hash.is_some());
        assert_eq!(record.content_size, 42);
        assert_eq!(record.download_duration_ms, Some(17));
        assert_eq!(record.change_type, Some(ChangeType::NewContent));
        assert!(record.error_message.is_none());
    }

    #[test]
    fn test_skipped_and_failed_records_carry_no_hashes() {
        let skipped = ExecutionRecord::skipped("https://example.com", "exec-2");
        let failed = ExecutionRecord::failed("https://example.com", "exec-3", "network failure");

        for record in [&skipped, &failed] {
            assert!(record.content_hash.is_none());
            assert!(record.normalized_hash.is_none());
            assert_eq!(record.content_size, 0);
            assert!(!record.change_detected);
            assert!(record.change_type.is_none());
            assert!(record.is_terminal());
        }
        assert_eq!(failed.error_message.as_deref(), Some("network failure"));
        assert!(skipped.error_message.is_none());
    }

    #[test]
    fn test_json_uses_lowercase_enum_names_and_nulls() {
        let record = ExecutionRecord::failed("https://example.com", "exec-4", "boom");
        let value: serde_json::Value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["status"], "failed");
        assert!(value["content_hash"].is_null());
        assert!(value["change_type"].is_null());
        assert_eq!(value["content_size"], 0);

        let completed = ExecutionRecord::completed(
            "https://example.com",
            "exec-5",
            sample_download(),
            ChangeVerdict::new(ChangeType::NormalizedHashChanged, true),
        );
        let value = serde_json::to_value(&completed).unwrap();
        assert_eq!(value["status"], "completed");
        assert_eq!(value["change_type"], "normalized_hash_changed");
    }

    #[test]
    fn test_reads_legacy_line_with_naive_timestamp() {
        let line = r#"{"url": "https://example.com", "execution_id": "prev-id", "timestamp": "2025-01-01T00:00:00", "status": "completed", "content_hash": "hash1", "normalized_hash": "norm1", "etag": "etag-123", "content_size": 0, "download_duration_ms": null, "change_detected": false, "change_type": null, "error_message": null}"#;

        let record: ExecutionRecord = serde_json::from_str(line).unwrap();
        assert_eq!(
            record.timestamp,
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(record.etag.as_deref(), Some("etag-123"));
        assert_eq!(record.normalized_hash.as_deref(), Some("norm1"));
    }

    #[test]
    fn test_missing_optional_keys_default() {
        let line = r#"{"url":"u","execution_id":"e","timestamp":"2025-03-04T05:06:07.5+00:00","status":"skipped"}"#;
        let record: ExecutionRecord = serde_json::from_str(line).unwrap();
        assert_eq!(record.status, ExecutionStatus::Skipped);
        assert_eq!(record.content_size, 0);
        assert!(!record.change_detected);
    }

    #[test]
    fn test_parse_timestamp_accepts_fractional_naive() {
        let ts = parse_timestamp("2024-06-30T23:59:59.123456").unwrap();
        assert_eq!(ts.timestamp_subsec_micros(), 123_456);
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_pending_and_downloading_are_not_terminal() {
        assert!(!ExecutionStatus::Pending.is_terminal());
        assert!(!ExecutionStatus::Downloading.is_terminal());
        assert_eq!(ExecutionStatus::Downloading.to_string(), "downloading");
        assert_eq!(ChangeType::ContentHashChanged.to_string(), "content_hash_changed");
    }
}
