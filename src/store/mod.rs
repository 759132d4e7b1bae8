//! Download ledger persistence.
//!
//! The ledger is the single owner of on-disk download state: one
//! [`DownloadRecord`] per `(item_id, path)` pair plus a per-series
//! watermark of the highest completed (season, episode).
//!
//! # Example
//!
//! ```ignore
//! use jellydl::store::{Ledger, NewDownload, DownloadStatus};
//! use jellydl::Database;
//!
//! let db = Database::open(store_dir).await?;
//! let ledger = Ledger::new(db);
//!
//! let id = ledger.upsert_record(&NewDownload::queued("item", "Name", "Movie", "/d/x.mkv")).await?;
//! ledger.set_status(id, DownloadStatus::Downloading, None).await?;
//! ```

mod error;
mod record;

pub use error::StoreError;
pub use record::{DownloadRecord, DownloadStatus, NewDownload};

use sqlx::Row;
use tracing::instrument;

use crate::db::Database;

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Returns `Ok(())` if at least one row was affected; otherwise [`StoreError::RecordNotFound`].
fn check_affected(id: i64, rows_affected: u64) -> Result<()> {
    if rows_affected == 0 {
        Err(StoreError::RecordNotFound(id))
    } else {
        Ok(())
    }
}

/// Persistent store of download records and series watermarks.
///
/// All mutations stamp `updated_at`; `created_at` is written once on
/// first insert and never touched again.
#[derive(Debug, Clone)]
pub struct Ledger {
    db: Database,
}

impl Ledger {
    /// Creates a ledger over the given database connection.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Inserts or updates a download record keyed by `(item_id, path)`.
    ///
    /// On conflict the mutable fields (name, type, series linkage,
    /// season/episode, status, byte counters, error) are overwritten and
    /// `updated_at` refreshed; the surrogate id and `created_at` are
    /// preserved.
    ///
    /// # Returns
    ///
    /// The record's surrogate id (existing id if updated, new id if inserted).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the upsert fails.
    #[instrument(skip(self, record), fields(item_id = %record.item_id, path = %record.path))]
    pub async fn upsert_record(&self, record: &NewDownload) -> Result<i64> {
        let row = sqlx::query(
            r"INSERT INTO downloads (
                  item_id, item_name, item_type, series_id,
                  season_number, episode_number, status,
                  bytes_total, bytes_done, error, path
              )
              VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
              ON CONFLICT(item_id, path) DO UPDATE SET
                  item_name = excluded.item_name,
                  item_type = excluded.item_type,
                  series_id = excluded.series_id,
                  season_number = excluded.season_number,
                  episode_number = excluded.episode_number,
                  status = excluded.status,
                  bytes_total = excluded.bytes_total,
                  bytes_done = excluded.bytes_done,
                  error = excluded.error,
                  updated_at = datetime('now')
              RETURNING id",
        )
        .bind(&record.item_id)
        .bind(&record.item_name)
        .bind(&record.item_type)
        .bind(record.series_id.as_deref())
        .bind(record.season_number)
        .bind(record.episode_number)
        .bind(record.status.as_str())
        .bind(record.bytes_total)
        .bind(record.bytes_done)
        .bind(record.error.as_deref())
        .bind(&record.path)
        .fetch_one(self.db.pool())
        .await?;

        Ok(row.get("id"))
    }

    /// Overwrites the byte counters and refreshes `updated_at`.
    ///
    /// Does not change the record status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::RecordNotFound`] if no record exists with the id.
    /// Returns [`StoreError::Database`] if the update fails.
    #[instrument(skip(self))]
    pub async fn update_progress(&self, id: i64, bytes_done: i64, bytes_total: i64) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE downloads
              SET bytes_done = ?, bytes_total = ?, updated_at = datetime('now')
              WHERE id = ?",
        )
        .bind(bytes_done)
        .bind(bytes_total)
        .bind(id)
        .execute(self.db.pool())
        .await?;

        check_affected(id, result.rows_affected())
    }

    /// Overwrites the status and error text and refreshes `updated_at`.
    ///
    /// An empty error message is stored as NULL.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::RecordNotFound`] if no record exists with the id.
    /// Returns [`StoreError::Database`] if the update fails.
    #[instrument(skip(self, error), fields(status = %status))]
    pub async fn set_status(
        &self,
        id: i64,
        status: DownloadStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let error = error.map(str::trim).filter(|e| !e.is_empty());
        let result = sqlx::query(
            r"UPDATE downloads
              SET status = ?, error = ?, updated_at = datetime('now')
              WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(error)
        .bind(id)
        .execute(self.db.pool())
        .await?;

        check_affected(id, result.rows_affected())
    }

    /// Returns all records, optionally filtered to one status,
    /// most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn list_records(
        &self,
        status: Option<DownloadStatus>,
    ) -> Result<Vec<DownloadRecord>> {
        let records = if let Some(status) = status {
            sqlx::query_as::<_, DownloadRecord>(
                r"SELECT * FROM downloads WHERE status = ? ORDER BY updated_at DESC, id DESC",
            )
            .bind(status.as_str())
            .fetch_all(self.db.pool())
            .await?
        } else {
            sqlx::query_as::<_, DownloadRecord>(
                r"SELECT * FROM downloads ORDER BY updated_at DESC, id DESC",
            )
            .fetch_all(self.db.pool())
            .await?
        };

        Ok(records)
    }

    /// Returns one record, or `None` when the id does not exist.
    ///
    /// A missing id is an answer, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn get_record(&self, id: i64) -> Result<Option<DownloadRecord>> {
        let record = sqlx::query_as::<_, DownloadRecord>(r"SELECT * FROM downloads WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(record)
    }

    /// Upserts the watermark row for a series.
    ///
    /// No-op when `series_id` is empty. The watermark is informational
    /// only and never gates future downloads.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the upsert fails.
    #[instrument(skip(self))]
    pub async fn upsert_series_progress(
        &self,
        series_id: &str,
        season: i64,
        episode: i64,
    ) -> Result<()> {
        if series_id.is_empty() {
            return Ok(());
        }

        sqlx::query(
            r"INSERT INTO series_progress (series_id, last_season, last_episode, updated_at)
              VALUES (?, ?, ?, datetime('now'))
              ON CONFLICT(series_id) DO UPDATE SET
                  last_season = excluded.last_season,
                  last_episode = excluded.last_episode,
                  updated_at = excluded.updated_at",
        )
        .bind(series_id)
        .bind(season)
        .bind(episode)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }
}
