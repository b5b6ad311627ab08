//! # pagewatch-core
//!
//! Core functionality for pagewatch - a change detector for tracked HTML pages.
//!
//! Each call to [`ChangeDetector::execute`] decides whether a page changed
//! since the last recorded execution, spending as little network traffic as
//! possible to find out:
//!
//! 1. **Validator tier**: a cheap probe compares the origin's `ETag` with the
//!    last recorded one. Equal tokens end the execution without a download.
//! 2. **Normalized hash tier**: when the origin sends no token, the body is
//!    downloaded, [normalized](normalize()) and hashed. An unchanged hash ends
//!    the execution without persisting content.
//! 3. **Full classification**: the body is stored and labelled with a
//!    [`ChangeType`] by [`classify_change`].
//!
//! ## Architecture
//!
//! - **Detection**: [`ChangeDetector`] orchestrates the tiers and never fails;
//!   every problem becomes an [`ExecutionStatus::Failed`] record
//! - **Normalization**: [`normalize()`] removes volatile markup before hashing
//! - **Transport**: the [`Transport`] trait with an HTTP implementation
//! - **Storage**: [`HistoryStore`] and [`ContentStore`] with a filesystem
//!   implementation that keeps one JSON Lines log per URL
//! - **Configuration**: layered TOML and environment settings
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pagewatch_core::{ChangeDetector, Config, FsStorage, HttpTransport};
//!
//! # async fn run() -> pagewatch_core::Result<()> {
//! let config = Config::load()?;
//! let transport = HttpTransport::from_config(&config.http, config.retry)?;
//! let storage = FsStorage::with_root(config.paths.root.clone())?;
//! let detector = ChangeDetector::new(transport, storage, config.detection);
//!
//! let record = detector.execute("https://example.com/").await;
//! println!("{} ({:?})", record.status, record.change_type);
//! # Ok(())
//! # }
//! ```

/// Layered configuration
pub mod config;
/// Change detection orchestration
pub mod detector;
/// Error types and result aliases
pub mod error;
/// Content fingerprints
pub mod hash;
/// HTML normalization
pub mod normalize;
/// Execution records and classification labels
pub mod record;
/// Retry with exponential backoff
pub mod retry;
/// History and content persistence
pub mod storage;
/// Probing and downloading pages
pub mod transport;

// Re-export commonly used types
pub use config::{Config, DetectionConfig, HttpConfig, PathsConfig};
pub use detector::{ChangeDetector, UrlLocks, classify_change};
pub use error::{Error, Result};
pub use hash::{digest, is_digest};
pub use normalize::normalize;
pub use record::{
    ChangeType, ChangeVerdict, CompletedDownload, ExecutionRecord, ExecutionStatus, Fingerprint,
};
pub use retry::RetryPolicy;
pub use storage::{ContentStore, FsStorage, HistoryLock, HistoryStore};
pub use transport::{FetchResponse, HttpTransport, ProbeResponse, Transport};
