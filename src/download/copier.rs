//! Chunked stream-to-file copy with throttling and progress.

use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, trace};

use super::error::TransferError;
use super::rate_limit::RateLimiter;

/// Fixed read size per chunk.
pub const CHUNK_SIZE: usize = 256 * 1024;

/// Minimum interval between intermediate progress callbacks.
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(750);

/// Copies `src` into `dst` in [`CHUNK_SIZE`] chunks.
///
/// The limiter, when present, is consulted before each chunk is written.
/// `on_progress` receives the running byte count for this call, at most
/// once per [`PROGRESS_INTERVAL`] plus one unconditional final call.
/// Cancellation is observed between chunks; a cancelled copy flushes
/// nothing further and returns [`TransferError::Cancelled`], leaving the
/// bytes already written on disk for a later resume.
///
/// # Errors
///
/// Returns [`TransferError::Io`] for read or write failures, tagged with
/// `dst_path` for context.
#[instrument(skip_all, fields(path = %dst_path.display()))]
pub async fn copy_with_progress<R, W, F>(
    mut src: R,
    mut dst: W,
    dst_path: &Path,
    mut limiter: Option<&mut RateLimiter>,
    cancel: &CancellationToken,
    mut on_progress: F,
) -> Result<u64, TransferError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    F: FnMut(u64),
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut written: u64 = 0;
    let mut last_report = Instant::now();

    loop {
        if cancel.is_cancelled() {
            dst.flush()
                .await
                .map_err(|e| TransferError::io(dst_path, e))?;
            return Err(TransferError::Cancelled);
        }

        let n = tokio::select! {
            () = cancel.cancelled() => {
                dst.flush().await.map_err(|e| TransferError::io(dst_path, e))?;
                return Err(TransferError::Cancelled);
            }
            read = src.read(&mut buf) => read.map_err(|e| TransferError::io(dst_path, e))?,
        };
        if n == 0 {
            break;
        }

        if let Some(limiter) = limiter.as_deref_mut() {
            tokio::select! {
                () = cancel.cancelled() => {
                    dst.flush().await.map_err(|e| TransferError::io(dst_path, e))?;
                    return Err(TransferError::Cancelled);
                }
                () = limiter.acquire(n) => {}
            }
        }

        dst.write_all(&buf[..n])
            .await
            .map_err(|e| TransferError::io(dst_path, e))?;
        written += n as u64;

        let now = Instant::now();
        if now.duration_since(last_report) >= PROGRESS_INTERVAL {
            trace!(written, "progress");
            on_progress(written);
            last_report = now;
        }
    }

    dst.flush()
        .await
        .map_err(|e| TransferError::io(dst_path, e))?;
    on_progress(written);
    Ok(written)
}
