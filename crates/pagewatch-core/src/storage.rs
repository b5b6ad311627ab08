use crate::{Error, ExecutionRecord, Result, digest};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const HISTORY_FILENAME: &str = "executions.jsonl";
const LOCK_FILENAME: &str = "executions.lock";
const EXECUTION_LOCK_FILENAME: &str = "execution.lock";
const RAW_FILENAME: &str = "raw.html";
const NORMALIZED_FILENAME: &str = "normalized.html";

/// Exclusive hold on one URL's history, released on drop.
///
/// Spans the window between reading the last record and appending the next
/// one, across every process sharing the same storage root.
#[derive(Debug, Default)]
#[must_use = "the history is unlocked as soon as the guard is dropped"]
pub struct HistoryLock {
    _file: Option<File>,
}

/// Per-URL execution history.
///
/// Only the most recent record is ever consulted for decisions; the full log
/// is kept for auditing.
pub trait HistoryStore: Send + Sync {
    /// Last record written for `url`, or `None` when the URL was never seen.
    fn load_last(&self, url: &str) -> Result<Option<ExecutionRecord>>;

    /// Append `record` to its URL's history.
    fn append(&self, record: &ExecutionRecord) -> Result<()>;

    /// Take the exclusive execution lock for `url` without waiting.
    ///
    /// Returns `None` while someone else holds it. Stores without shared
    /// on-disk state hand out an empty guard.
    fn try_lock(&self, _url: &str) -> Result<Option<HistoryLock>> {
        Ok(Some(HistoryLock::default()))
    }
}

/// Storage for downloaded bodies, keyed by execution id.
pub trait ContentStore: Send + Sync {
    /// Persist the raw body and, when given, its normalized form.
    ///
    /// Returns the directory the files were written to.
    fn save_content(&self, execution_id: &str, raw: &str, normalized: Option<&str>)
    -> Result<PathBuf>;

    /// Remove everything saved for `execution_id`. Missing content is not an error.
    fn discard(&self, execution_id: &str) -> Result<()>;
}

/// Filesystem storage rooted at a single directory.
///
/// ```text
/// <root>/metadata/<h[0..2]>/<h[2..4]>/executions.jsonl   h = digest(url)
/// <root>/content/<execution_id>/raw.html
/// <root>/content/<execution_id>/normalized.html
/// ```
#[derive(Debug, Clone)]
pub struct FsStorage {
    root_dir: PathBuf,
}

impl FsStorage {
    /// Creates a storage instance, creating `metadata/` and `content/` under `root_dir`.
    pub fn with_root(root_dir: PathBuf) -> Result<Self> {
        for dir in [root_dir.join("metadata"), root_dir.join("content")] {
            fs::create_dir_all(&dir).map_err(|e| {
                Error::Storage(format!("Failed to create {}: {e}", dir.display()))
            })?;
        }
        Ok(Self { root_dir })
    }

    /// Returns the root directory path.
    #[must_use]
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Directory holding the history of `url`.
    #[must_use]
    pub fn history_dir(&self, url: &str) -> PathBuf {
        let hash = digest(url);
        self.root_dir
            .join("metadata")
            .join(&hash[0..2])
            .join(&hash[2..4])
    }

    /// Path of the JSON Lines history file for `url`.
    #[must_use]
    pub fn history_path(&self, url: &str) -> PathBuf {
        self.history_dir(url).join(HISTORY_FILENAME)
    }

    /// Directory holding the bodies saved by one execution.
    pub fn content_dir(&self, execution_id: &str) -> Result<PathBuf> {
        Self::validate_execution_id(execution_id)?;
        Ok(self.root_dir.join("content").join(execution_id))
    }

    /// Every record stored for `url`, oldest first.
    ///
    /// Lines that cannot be parsed are skipped with a warning. Several URLs
    /// can share one history file, so records are filtered by URL.
    pub fn load_history(&self, url: &str) -> Result<Vec<ExecutionRecord>> {
        Ok(self.scan_history(url)?.records)
    }

    fn scan_history(&self, url: &str) -> Result<HistoryScan> {
        let path = self.history_path(url);
        let mut scan = HistoryScan::default();
        let file = match OpenOptions::new().read(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(scan),
            Err(err) => {
                return Err(Error::Storage(format!(
                    "Failed to read history {}: {err}",
                    path.display()
                )));
            },
        };

        for (index, line) in BufReader::new(file).lines().enumerate() {
            let raw = line?;
            if raw.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ExecutionRecord>(&raw) {
                Ok(record) => {
                    scan.corrupt_tail = None;
                    if record.url == url {
                        scan.records.push(record);
                    }
                },
                Err(err) => {
                    warn!(
                        "skipping unparseable history line {} in {}: {err}",
                        index + 1,
                        path.display()
                    );
                    scan.corrupt_tail = Some(index + 1);
                },
            }
        }
        Ok(scan)
    }

    fn open_lock_file(path: &Path) -> Result<File> {
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| Error::Storage(format!("Failed to open {}: {e}", path.display())))
    }

    fn validate_execution_id(execution_id: &str) -> Result<()> {
        if execution_id.is_empty() {
            return Err(Error::Storage("Execution id cannot be empty".into()));
        }
        if execution_id.starts_with('.') || execution_id.contains("..") {
            return Err(Error::Storage(format!(
                "Invalid execution id '{execution_id}': contains path traversal characters"
            )));
        }
        if !execution_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(Error::Storage(format!(
                "Invalid execution id '{execution_id}': only ASCII letters, digits, '-' and '_' are allowed"
            )));
        }
        Ok(())
    }

    fn write_atomic(path: &Path, content: &str) -> Result<()> {
        let tmp_path = path.with_extension("html.tmp");
        fs::write(&tmp_path, content).map_err(|e| {
            Error::Storage(format!("Failed to write {}: {e}", tmp_path.display()))
        })?;

        #[cfg(target_os = "windows")]
        if path.exists() {
            fs::remove_file(path).map_err(|e| {
                Error::Storage(format!("Failed to remove existing {}: {e}", path.display()))
            })?;
        }

        fs::rename(&tmp_path, path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            Error::Storage(format!("Failed to commit {}: {e}", path.display()))
        })
    }
}

#[derive(Default)]
struct HistoryScan {
    records: Vec<ExecutionRecord>,
    /// 1-based number of the final non-empty line, when it failed to parse.
    corrupt_tail: Option<usize>,
}

impl HistoryStore for FsStorage {
    /// The newest record for `url`.
    ///
    /// Corrupt lines earlier in the log are skipped, but a corrupt final line
    /// is an error: it may be the record the next decision depends on.
    fn load_last(&self, url: &str) -> Result<Option<ExecutionRecord>> {
        let mut scan = self.scan_history(url)?;
        if let Some(line) = scan.corrupt_tail {
            return Err(Error::Storage(format!(
                "Last history line {line} in {} is corrupt",
                self.history_path(url).display()
            )));
        }
        Ok(scan.records.pop())
    }

    fn append(&self, record: &ExecutionRecord) -> Result<()> {
        let dir = self.history_dir(&record.url);
        fs::create_dir_all(&dir)
            .map_err(|e| Error::Storage(format!("Failed to create history directory: {e}")))?;

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        // Held until the end of the function so other processes never
        // interleave partial lines.
        let lock = Self::open_lock_file(&dir.join(LOCK_FILENAME))?;
        lock.lock_exclusive()
            .map_err(|e| Error::Storage(format!("Failed to lock history: {e}")))?;

        let path = dir.join(HISTORY_FILENAME);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::Storage(format!("Failed to open {}: {e}", path.display())))?;
        file.write_all(line.as_bytes())
            .and_then(|()| file.flush())
            .and_then(|()| file.sync_all())
            .map_err(|e| Error::Storage(format!("Failed to append to {}: {e}", path.display())))?;

        debug!(
            execution_id = %record.execution_id,
            status = %record.status,
            "appended record to {}",
            path.display()
        );
        Ok(())
    }

    fn try_lock(&self, url: &str) -> Result<Option<HistoryLock>> {
        let dir = self.history_dir(url);
        fs::create_dir_all(&dir)
            .map_err(|e| Error::Storage(format!("Failed to create history directory: {e}")))?;

        let file = Self::open_lock_file(&dir.join(EXECUTION_LOCK_FILENAME))?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(HistoryLock { _file: Some(file) })),
            Err(err) if err.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(err) => Err(Error::Storage(format!("Failed to lock history: {err}"))),
        }
    }
}

impl ContentStore for FsStorage {
    fn save_content(
        &self,
        execution_id: &str,
        raw: &str,
        normalized: Option<&str>,
    ) -> Result<PathBuf> {
        let dir = self.content_dir(execution_id)?;
        fs::create_dir_all(&dir)
            .map_err(|e| Error::Storage(format!("Failed to create content directory: {e}")))?;

        let written = Self::write_atomic(&dir.join(RAW_FILENAME), raw).and_then(|()| {
            normalized.map_or(Ok(()), |normalized| {
                Self::write_atomic(&dir.join(NORMALIZED_FILENAME), normalized)
            })
        });
        if let Err(err) = written {
            if let Err(cleanup) = self.discard(execution_id) {
                warn!("Failed to remove partial content for {execution_id}: {cleanup}");
            }
            return Err(err);
        }

        debug!("Saved content for execution {}", execution_id);
        Ok(dir)
    }

    fn discard(&self, execution_id: &str) -> Result<()> {
        let dir = self.content_dir(execution_id)?;
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                debug!("Discarded content for execution {}", execution_id);
                Ok(())
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::Storage(format!(
                "Failed to remove {}: {err}",
                dir.display()
            ))),
        }
    }
}
