//! Ledger record types and status definitions.

use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Status of a download record.
///
/// Transitions only move forward within one attempt
/// (`queued` → `downloading` → `done`/`failed`); a `failed` record
/// may re-enter `downloading` on retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    /// Recorded but not yet transferring.
    Queued,
    /// Transfer in progress.
    Downloading,
    /// All bytes written; `bytes_done == bytes_total`.
    Done,
    /// Transfer aborted with an error; may be retried.
    Failed,
}

impl DownloadStatus {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Downloading => "downloading",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DownloadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "downloading" => Ok(Self::Downloading),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid download status: {s}")),
        }
    }
}

/// One persisted download, keyed by `(item_id, path)`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DownloadRecord {
    /// Surrogate id assigned by the store.
    pub id: i64,
    /// Opaque catalog item identifier.
    pub item_id: String,
    /// Item display name at the time of the download.
    pub item_name: String,
    /// Catalog item type ("Movie", "Episode", ...).
    pub item_type: String,
    /// Parent series identifier for episodes.
    pub series_id: Option<String>,
    /// Season number for episodes.
    pub season_number: Option<i64>,
    /// Episode number for episodes.
    pub episode_number: Option<i64>,
    /// Current lifecycle status (stored as text, parsed via `status()`).
    #[sqlx(rename = "status")]
    pub status_str: String,
    /// Expected total bytes when known.
    pub bytes_total: Option<i64>,
    /// Bytes written so far.
    pub bytes_done: Option<i64>,
    /// Destination file path.
    pub path: String,
    /// Last error message when failed.
    pub error: Option<String>,
    /// When the record was first created (immutable).
    pub created_at: String,
    /// When the record was last mutated.
    pub updated_at: String,
}

impl DownloadRecord {
    /// Returns the parsed status enum.
    ///
    /// Falls back to `Queued` if the stored string is unrecognized.
    #[must_use]
    pub fn status(&self) -> DownloadStatus {
        self.status_str.parse().unwrap_or(DownloadStatus::Queued)
    }
}

/// Mutable fields written by an upsert; identity is `(item_id, path)`.
#[derive(Debug, Clone)]
pub struct NewDownload {
    /// Opaque catalog item identifier.
    pub item_id: String,
    /// Item display name.
    pub item_name: String,
    /// Catalog item type.
    pub item_type: String,
    /// Parent series identifier for episodes.
    pub series_id: Option<String>,
    /// Season number for episodes.
    pub season_number: Option<i64>,
    /// Episode number for episodes.
    pub episode_number: Option<i64>,
    /// Status to record; new records default to `Queued`.
    pub status: DownloadStatus,
    /// Expected total bytes when already known.
    pub bytes_total: Option<i64>,
    /// Bytes already on disk at upsert time.
    pub bytes_done: Option<i64>,
    /// Error text carried over from a previous attempt, if any.
    pub error: Option<String>,
    /// Destination file path.
    pub path: String,
}

impl NewDownload {
    /// Creates a queued record for a catalog item at `path`.
    #[must_use]
    pub fn queued(item_id: &str, item_name: &str, item_type: &str, path: &str) -> Self {
        Self {
            item_id: item_id.to_string(),
            item_name: item_name.to_string(),
            item_type: item_type.to_string(),
            series_id: None,
            season_number: None,
            episode_number: None,
            status: DownloadStatus::Queued,
            bytes_total: None,
            bytes_done: None,
            error: None,
            path: path.to_string(),
        }
    }
}
