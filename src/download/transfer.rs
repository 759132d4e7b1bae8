//! Transfer orchestration.
//!
//! [`TransferEngine`] drives one download end to end: resolve the
//! destination name, record it in the ledger, open the byte stream with a
//! resume offset, copy with throttling and progress, and land the record
//! in `done` or `failed`. Batches run episodes strictly in
//! (season, episode) order and keep going past per-item failures.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::TryStreamExt;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_RANGE};
use tokio::fs::OpenOptions;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::api::{ApiClient, Item};
use crate::store::{DownloadStatus, Ledger, NewDownload};

use super::copier::copy_with_progress;
use super::error::TransferError;
use super::filename::{build_item_filename, destination_path, filename_from_disposition};
use super::rate_limit::RateLimiter;

/// How often in-flight progress is flushed to the ledger.
const LEDGER_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Per-invocation transfer settings.
#[derive(Debug, Clone, Default)]
pub struct TransferOptions {
    /// Directory downloads land in.
    pub output_dir: PathBuf,
    /// Rate limit spec (`500K`, `2M`); empty means unlimited.
    pub rate: String,
    /// Resolve and report without transferring or touching the ledger.
    pub dry_run: bool,
    /// Exact destination path, bypassing name resolution (resume).
    pub override_path: Option<PathBuf>,
}

/// Receives human-facing transfer progress.
///
/// The engine reports byte counts as absolute offsets into the file, so a
/// resumed transfer begins where the previous attempt stopped.
pub trait ProgressSink: Sync {
    /// A transfer is starting. `total` is `None` when the server did not
    /// report a size.
    fn begin(&self, label: &str, total: Option<u64>, offset: u64);
    /// Bytes written so far, including the resume offset.
    fn update(&self, bytes_done: u64);
    /// The transfer finished with `bytes_done` bytes on disk.
    fn finish(&self, label: &str, bytes_done: u64);
    /// A one-line informational message.
    fn note(&self, text: &str);
}

/// Sink that discards all progress, for quiet mode and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn begin(&self, _label: &str, _total: Option<u64>, _offset: u64) {}
    fn update(&self, _bytes_done: u64) {}
    fn finish(&self, _label: &str, _bytes_done: u64) {}
    fn note(&self, _text: &str) {}
}

/// Outcome of a batch download.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Items that landed in `done`.
    pub completed: usize,
    /// Items that failed, as (label, error message) pairs.
    pub failed: Vec<(String, String)>,
    /// True when the batch stopped early on cancellation.
    pub cancelled: bool,
}

impl BatchReport {
    /// True when every item completed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && !self.cancelled
    }
}

/// Drives downloads against one server and one ledger.
pub struct TransferEngine {
    api: ApiClient,
    ledger: Ledger,
    cancel: CancellationToken,
}

impl TransferEngine {
    /// Creates an engine over an authenticated client and a ledger.
    #[must_use]
    pub fn new(api: ApiClient, ledger: Ledger, cancel: CancellationToken) -> Self {
        Self { api, ledger, cancel }
    }

    /// Downloads one item, resuming from any partial file at the
    /// destination.
    ///
    /// Returns the final destination path. The ledger record moves
    /// `queued` → `downloading` → `done`, or lands in `failed` with the
    /// error message.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError`] for API, ledger or filesystem failures,
    /// or [`TransferError::Cancelled`] when interrupted.
    #[instrument(skip(self, options, sink), fields(item_id = %item.id))]
    pub async fn run_item(
        &self,
        item: &Item,
        options: &TransferOptions,
        sink: &dyn ProgressSink,
    ) -> Result<PathBuf, TransferError> {
        let label = display_label(item);
        let mut path = match &options.override_path {
            Some(path) => path.clone(),
            None => destination_path(&options.output_dir, &build_item_filename(item)),
        };
        let mut offset = existing_file_size(&path).await;

        let mut record_id = self
            .ledger
            .upsert_record(&new_record(item, &path))
            .await?;

        if options.dry_run {
            sink.note(&format!(
                "would download {label} to {} (resume from {offset} bytes)",
                path.display()
            ));
            return Ok(path);
        }

        let result = async {
            // Record creation is the only fatal ledger write; every status
            // and progress update after it is logged on failure and the
            // attempt carries on.
            self.mark_downloading(record_id).await;

            let response = self.api.open_download(&item.id, offset).await?;

            // Server ignored the range request: start over from zero.
            if offset > 0 && response.status() == StatusCode::OK {
                debug!(path = %path.display(), "range ignored by server, restarting");
                offset = 0;
            }

            // A server-supplied filename replaces the planned one, but a
            // resumed attempt keeps its path: the partial bytes on disk
            // belong to it.
            if options.override_path.is_none() && offset == 0 {
                if let Some(renamed) = disposition_name(&response) {
                    let new_path = destination_path(&options.output_dir, &renamed);
                    if new_path != path {
                        debug!(from = %path.display(), to = %new_path.display(), "server renamed download");
                        path = new_path;
                        record_id = self
                            .ledger
                            .upsert_record(&new_record(item, &path))
                            .await?;
                        // The re-upsert lands as queued; restore the
                        // in-flight status on the renamed record.
                        self.mark_downloading(record_id).await;
                    }
                }
            }

            let total = response_total(&response, offset);
            if let Some(total) = total {
                let total_i64 = i64::try_from(total).unwrap_or(i64::MAX);
                let done_i64 = i64::try_from(offset).unwrap_or(i64::MAX);
                if let Err(error) = self
                    .ledger
                    .update_progress(record_id, done_i64, total_i64)
                    .await
                {
                    warn!(record_id, %error, "initial progress write failed");
                }
            }
            sink.begin(&label, total, offset);

            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| TransferError::io(parent, e))?;
            }

            let mut file_options = OpenOptions::new();
            if offset > 0 {
                file_options.append(true);
            } else {
                file_options.write(true).truncate(true);
            }
            let file = file_options
                .create(true)
                .open(&path)
                .await
                .map_err(|e| TransferError::io(&path, e))?;

            let mut limiter = RateLimiter::from_spec(&options.rate)?;
            let stream = response.bytes_stream().map_err(std::io::Error::other);
            let reader = StreamReader::new(stream);

            let flush_done = Arc::new(AtomicU64::new(offset));
            let flusher = self.spawn_ledger_flusher(record_id, total, Arc::clone(&flush_done));

            let copied = copy_with_progress(
                reader,
                file,
                &path,
                limiter.as_mut(),
                &self.cancel,
                |written| {
                    let done = offset + written;
                    flush_done.store(done, Ordering::Relaxed);
                    sink.update(done);
                },
            )
            .await;

            flusher.stop().await;
            let copied = copied?;

            let done = offset + copied;
            let done_i64 = i64::try_from(done).unwrap_or(i64::MAX);
            let total_i64 = total
                .and_then(|t| i64::try_from(t).ok())
                .unwrap_or(done_i64);
            if let Err(error) = self
                .ledger
                .update_progress(record_id, done_i64, total_i64)
                .await
            {
                warn!(record_id, %error, "final progress write failed");
            }
            if let Err(error) = self
                .ledger
                .set_status(record_id, DownloadStatus::Done, None)
                .await
            {
                warn!(record_id, %error, "could not mark record done");
            }

            if item.is_episode()
                && let Some(series_id) = item.series_id.as_deref()
                && let Err(error) = self
                    .ledger
                    .upsert_series_progress(
                        series_id,
                        item.parent_index_number.unwrap_or(0),
                        item.index_number.unwrap_or(0),
                    )
                    .await
            {
                warn!(series_id, %error, "series watermark write failed");
            }

            info!(path = %path.display(), bytes = done, "download complete");
            sink.finish(&label, done);
            Ok(())
        }
        .await;

        match result {
            Ok(()) => Ok(path),
            Err(error) => {
                self.mark_failed(record_id, &error).await;
                Err(error)
            }
        }
    }

    /// Downloads a batch of episodes in (season, episode) order.
    ///
    /// A failed item is reported and skipped; the batch never aborts on a
    /// per-item error, only on cancellation.
    #[instrument(skip_all, fields(count = items.len()))]
    pub async fn run_batch(
        &self,
        mut items: Vec<Item>,
        options: &TransferOptions,
        sink: &dyn ProgressSink,
    ) -> BatchReport {
        items.sort_by_key(|item| {
            (
                item.parent_index_number.unwrap_or(i64::MAX),
                item.index_number.unwrap_or(i64::MAX),
            )
        });

        let mut report = BatchReport::default();
        for item in &items {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            match self.run_item(item, options, sink).await {
                Ok(_) => report.completed += 1,
                Err(TransferError::Cancelled) => {
                    report.cancelled = true;
                    break;
                }
                Err(error) => {
                    let label = display_label(item);
                    warn!(item_id = %item.id, %error, "item failed, continuing batch");
                    sink.note(&format!("failed: {label}: {error}"));
                    report.failed.push((label, error.to_string()));
                }
            }
        }
        report
    }

    /// Flushes the latest byte count to the ledger once per second.
    ///
    /// A flush failure mid-transfer is logged and swallowed; the bytes on
    /// disk are the source of truth and the final update surfaces errors.
    fn spawn_ledger_flusher(
        &self,
        record_id: i64,
        total: Option<u64>,
        bytes_done: Arc<AtomicU64>,
    ) -> LedgerFlusher {
        let ledger = self.ledger.clone();
        let stop = CancellationToken::new();
        let task_stop = stop.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(LEDGER_FLUSH_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = task_stop.cancelled() => break,
                    _ = interval.tick() => {}
                }
                let done = bytes_done.load(Ordering::Relaxed);
                let done_i64 = i64::try_from(done).unwrap_or(i64::MAX);
                let total_i64 = total
                    .and_then(|t| i64::try_from(t).ok())
                    .unwrap_or(done_i64);
                if let Err(error) = ledger.update_progress(record_id, done_i64, total_i64).await {
                    warn!(record_id, %error, "progress flush failed");
                }
            }
        });

        LedgerFlusher { stop, handle }
    }

    async fn mark_downloading(&self, record_id: i64) {
        if let Err(error) = self
            .ledger
            .set_status(record_id, DownloadStatus::Downloading, None)
            .await
        {
            warn!(record_id, %error, "could not mark record downloading");
        }
    }

    async fn mark_failed(&self, record_id: i64, error: &TransferError) {
        let message = error.to_string();
        if let Err(store_error) = self
            .ledger
            .set_status(record_id, DownloadStatus::Failed, Some(&message))
            .await
        {
            warn!(record_id, %store_error, "could not record failure");
        }
    }
}

struct LedgerFlusher {
    stop: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

impl LedgerFlusher {
    async fn stop(self) {
        self.stop.cancel();
        let _ = self.handle.await;
    }
}

/// Parses a selection like `1,3-5` into a sorted set `{1, 3, 4, 5}`.
///
/// # Errors
///
/// Returns [`TransferError::InvalidSelection`] for empty parts, reversed
/// ranges or non-numeric input.
pub fn parse_number_list(spec: &str) -> Result<BTreeSet<i64>, TransferError> {
    let invalid = || TransferError::InvalidSelection {
        spec: spec.to_string(),
    };

    let mut out = BTreeSet::new();
    for part in spec.split(',') {
        let part = part.trim();
        if let Some((start, end)) = part.split_once('-') {
            let start: i64 = start.trim().parse().map_err(|_| invalid())?;
            let end: i64 = end.trim().parse().map_err(|_| invalid())?;
            if start > end {
                return Err(invalid());
            }
            out.extend(start..=end);
        } else {
            out.insert(part.parse().map_err(|_| invalid())?);
        }
    }
    if out.is_empty() {
        return Err(invalid());
    }
    Ok(out)
}

/// Keeps episodes matching the season and episode selections.
///
/// `None` means no filter on that axis. Episodes with no season number
/// only match when no season filter is set.
#[must_use]
pub fn filter_episodes(
    items: Vec<Item>,
    seasons: Option<&BTreeSet<i64>>,
    episodes: Option<&BTreeSet<i64>>,
) -> Vec<Item> {
    items
        .into_iter()
        .filter(|item| {
            let season_ok = match (seasons, item.parent_index_number) {
                (None, _) => true,
                (Some(set), Some(season)) => set.contains(&season),
                (Some(_), None) => false,
            };
            let episode_ok = match (episodes, item.index_number) {
                (None, _) => true,
                (Some(set), Some(episode)) => set.contains(&episode),
                (Some(_), None) => false,
            };
            season_ok && episode_ok
        })
        .collect()
}

fn new_record(item: &Item, path: &Path) -> NewDownload {
    let mut record = NewDownload::queued(
        &item.id,
        &item.name,
        &item.item_type,
        &path.to_string_lossy(),
    );
    if item.is_episode() {
        record.series_id = item.series_id.clone();
        record.season_number = item.parent_index_number;
        record.episode_number = item.index_number;
    }
    record
}

fn display_label(item: &Item) -> String {
    if item.is_episode() {
        format!(
            "{} S{:02}E{:02} {}",
            item.series_name.as_deref().unwrap_or("?"),
            item.parent_index_number.unwrap_or(0),
            item.index_number.unwrap_or(0),
            item.name
        )
    } else {
        item.name.clone()
    }
}

async fn existing_file_size(path: &Path) -> u64 {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => meta.len(),
        _ => 0,
    }
}

fn disposition_name(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(filename_from_disposition)
}

/// Total size of the file, from `Content-Range` on partial responses or
/// `Content-Length` plus the offset otherwise.
fn response_total(response: &reqwest::Response, offset: u64) -> Option<u64> {
    if response.status() == StatusCode::PARTIAL_CONTENT {
        if let Some(total) = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total)
        {
            return Some(total);
        }
        // Fall back to length of the remaining window.
        return content_length(response).map(|len| offset + len);
    }
    content_length(response)
}

fn content_length(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Parses the total out of `bytes <start>-<end>/<total>`.
///
/// Returns `None` for the unknown-length form `bytes start-end/*`.
fn parse_content_range_total(header: &str) -> Option<u64> {
    let rest = header.trim().strip_prefix("bytes")?.trim_start();
    let (_, total) = rest.rsplit_once('/')?;
    total.trim().parse().ok()
}
