//! Three-tier change detection.
//!
//! [`ChangeDetector::execute`] walks a fixed decision procedure for one URL:
//!
//! ```text
//! lock history ──► load last record ──► HEAD ──► Tier 1: tokens equal? ──► Skipped
//!                                  │ no
//!                                  ▼
//!                      Tier 2: no token, history exists
//!                        download + normalize + hash
//!                        legacy or equal hash? ─────────────────────► Skipped
//!                                  │ changed / download failed / not run
//!                                  ▼
//!                      Tier 3: download (unless Tier 2 did)
//!                        classify against the HEAD token,
//!                        save bodies, append ───────────────────────► Completed
//! ```
//!
//! Any error on the way produces a [`ExecutionStatus::Failed`] record and
//! leaves both stores untouched: bodies saved for an execution whose history
//! append fails are discarded again. Skipped records are returned to the caller
//! but not appended, so the last stored record always describes the last
//! download that was actually kept.
//!
//! [`ExecutionStatus::Failed`]: crate::ExecutionStatus::Failed

use crate::{
    ChangeType, ChangeVerdict, CompletedDownload, ContentStore, DetectionConfig, Error,
    ExecutionRecord, FetchResponse, Fingerprint, HistoryLock, HistoryStore, Result, Transport,
    digest, is_digest, normalize,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, instrument, warn};

/// Interval between attempts to take a history lock held elsewhere.
const HISTORY_LOCK_POLL: Duration = Duration::from_millis(25);
/// Give up on a history lock held elsewhere after this long.
const HISTORY_LOCK_WAIT: Duration = Duration::from_secs(300);

/// Keyed lock map serializing executions for the same URL within a process.
///
/// Executions for different URLs never wait on each other. Other processes
/// are kept out by the store's history lock.
#[derive(Debug, Clone, Default)]
pub struct UrlLocks {
    inner: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl UrlLocks {
    /// Creates an empty lock map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `url`.
    ///
    /// The returned guard releases the lock when dropped.
    pub async fn acquire(&self, url: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            map.retain(|key, lock| key == url || Arc::strong_count(lock) > 1);
            Arc::clone(map.entry(url.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Number of URLs with a live lock entry.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no URL currently has a lock entry.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decides, records and stores whether tracked pages changed.
pub struct ChangeDetector<T, S> {
    transport: T,
    store: S,
    config: DetectionConfig,
    locks: UrlLocks,
}

/// Body downloaded by Tier 2 and handed to Tier 3.
struct Download {
    response: FetchResponse,
    fingerprint: Fingerprint,
    normalized: String,
    duration_ms: u64,
}

impl<T, S> ChangeDetector<T, S>
where
    T: Transport,
    S: HistoryStore + ContentStore,
{
    /// Creates a detector with its own lock map.
    pub fn new(transport: T, store: S, config: DetectionConfig) -> Self {
        Self {
            transport,
            store,
            config,
            locks: UrlLocks::new(),
        }
    }

    /// Active detection settings.
    pub const fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// The underlying transport.
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// The underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Run one execution for `url`.
    ///
    /// Never fails: problems are reported through a record with status
    /// `failed` and an `error_message`.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn execute(&self, url: &str) -> ExecutionRecord {
        let execution_id = digest(&format!("{url}-{}", Utc::now().to_rfc3339()));
        let _guard = self.locks.acquire(url).await;

        match self.run(url, &execution_id).await {
            Ok(record) => {
                info!(
                    status = %record.status,
                    change_detected = record.change_detected,
                    change_type = record.change_type.map(ChangeType::as_str),
                    "execution finished"
                );
                record
            },
            Err(err) => {
                warn!(category = err.category(), "execution failed: {err}");
                ExecutionRecord::failed(url, &execution_id, err.to_string())
            },
        }
    }

    async fn run(&self, url: &str, execution_id: &str) -> Result<ExecutionRecord> {
        // Held until the record is appended or the execution ends.
        let _history = self.lock_history(url).await?;
        let previous = self.store.load_last(url)?;
        let head = self.transport.probe(url).await?;
        let force = self.config.force_download;

        // Tier 1
        if self.config.etag_check_enabled && !force {
            let previous_etag = previous.as_ref().and_then(|p| p.etag.as_deref());
            if let (Some(before), Some(now)) = (previous_etag, head.etag.as_deref()) {
                if before == now {
                    debug!(etag = now, "validator unchanged, skipping download");
                    return Ok(ExecutionRecord::skipped(url, execution_id));
                }
                debug!(before, now, "validator changed");
            }
        }

        // Tier 2
        let mut early = None;
        if let Some(prev) = previous.as_ref().filter(|_| {
            head.etag.is_none() && self.config.normalized_hash_check_enabled && !force
        }) {
            match self.download(url).await {
                Ok(download) => {
                    let Some(stored) = prev.normalized_hash.as_deref().filter(|h| is_digest(h))
                    else {
                        debug!("previous normalized hash missing or not a digest, skipping");
                        return Ok(ExecutionRecord::skipped(url, execution_id));
                    };
                    if stored == download.fingerprint.normalized_hash {
                        debug!("normalized hash unchanged, skipping");
                        return Ok(ExecutionRecord::skipped(url, execution_id));
                    }
                    debug!("normalized hash changed");
                    early = Some(download);
                },
                Err(err) => {
                    warn!(
                        category = err.category(),
                        "early hash check failed, falling back to full download: {err}"
                    );
                },
            }
        }

        // Tier 3
        let download = match early {
            Some(download) => download,
            None => self.download(url).await?,
        };
        let verdict = classify_change(
            previous.as_ref(),
            head.etag.as_deref(),
            &download.fingerprint,
            &self.config,
        );
        debug!(
            change_type = verdict.change_type.as_str(),
            change_detected = verdict.change_detected,
            "classified download"
        );

        let record = ExecutionRecord::completed(
            url,
            execution_id,
            CompletedDownload {
                fingerprint: download.fingerprint,
                etag: head.etag.or_else(|| download.response.etag.clone()),
                content_size: download.response.body.len() as u64,
                download_duration_ms: download.duration_ms,
            },
            verdict,
        );

        // The history append is the commit point: content first.
        self.store.save_content(
            execution_id,
            &download.response.body,
            Some(&download.normalized),
        )?;
        if let Err(err) = self.store.append(&record) {
            if let Err(cleanup) = self.store.discard(execution_id) {
                warn!("failed to discard content of uncommitted execution: {cleanup}");
            }
            return Err(err);
        }
        Ok(record)
    }

    async fn lock_history(&self, url: &str) -> Result<HistoryLock> {
        let started = Instant::now();
        loop {
            if let Some(lock) = self.store.try_lock(url)? {
                return Ok(lock);
            }
            if started.elapsed() >= HISTORY_LOCK_WAIT {
                return Err(Error::Timeout(format!(
                    "history of '{url}' stayed locked for {}s",
                    HISTORY_LOCK_WAIT.as_secs()
                )));
            }
            debug!("history locked by another process, waiting");
            tokio::time::sleep(HISTORY_LOCK_POLL).await;
        }
    }

    async fn download(&self, url: &str) -> Result<Download> {
        let started = Instant::now();
        let response = self.transport.fetch(url).await?;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let normalized = normalize(&response.body);
        let fingerprint = Fingerprint {
            content_hash: digest(&response.body),
            normalized_hash: digest(&normalized),
        };
        Ok(Download {
            response,
            fingerprint,
            normalized,
            duration_ms,
        })
    }
}

/// Label a download relative to the previous record.
///
/// Rules are checked in order and the first match wins:
///
/// 1. no previous record: [`ChangeType::NewContent`], changed
/// 2. both validator tokens present and different: [`ChangeType::EtagChanged`], changed
/// 3. both validator tokens present and equal: [`ChangeType::EtagChanged`], unchanged
/// 4. previous normalized hash present and different:
///    [`ChangeType::NormalizedHashChanged`], changed
/// 5. previous raw hash present and different: [`ChangeType::ContentHashChanged`], changed
/// 6. otherwise: [`ChangeType::EtagChanged`], unchanged
///
/// `current_etag` is the token returned by the HEAD request. Rules 4 and 5
/// only apply while the matching hash check is enabled.
pub fn classify_change(
    previous: Option<&ExecutionRecord>,
    current_etag: Option<&str>,
    fingerprint: &Fingerprint,
    config: &DetectionConfig,
) -> ChangeVerdict {
    let Some(previous) = previous else {
        return ChangeVerdict::new(ChangeType::NewContent, true);
    };

    if let (Some(before), Some(now)) = (previous.etag.as_deref(), current_etag) {
        return ChangeVerdict::new(ChangeType::EtagChanged, before != now);
    }

    if config.normalized_hash_check_enabled
        && previous
            .normalized_hash
            .as_deref()
            .is_some_and(|h| h != fingerprint.normalized_hash)
    {
        return ChangeVerdict::new(ChangeType::NormalizedHashChanged, true);
    }

    if config.content_hash_check_enabled
        && previous
            .content_hash
            .as_deref()
            .is_some_and(|h| h != fingerprint.content_hash)
    {
        return ChangeVerdict::new(ChangeType::ContentHashChanged, true);
    }

    ChangeVerdict::new(ChangeType::EtagChanged, false)
}
