//! Byte-rate throttling for download streams.
//!
//! A token bucket refills at the configured bytes/sec with a burst of one
//! second's worth of bytes. The balance may go negative: a chunk larger
//! than the burst is admitted immediately and the debt is paid off by
//! sleeping before later chunks, so sustained throughput converges on the
//! configured rate regardless of chunk size.

use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use super::error::TransferError;

/// Token bucket limiter over a byte stream.
#[derive(Debug)]
pub struct RateLimiter {
    /// Refill rate in bytes per second.
    rate: f64,
    /// Maximum positive balance, one second of bytes.
    burst: f64,
    /// Current token balance; negative means accumulated debt.
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Builds a limiter from a spec like `500K` or `2M`.
    ///
    /// Returns `Ok(None)` for an empty spec (unlimited). Units are binary
    /// and case-insensitive: `K`/`KB`/`KiB` = 1024, `M`/`MB`/`MiB` = 1024²,
    /// `G`/`GB`/`GiB` = 1024³; a bare number or `B` suffix is bytes/sec.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::InvalidRate`] for malformed specs or a
    /// resolved rate of zero.
    pub fn from_spec(spec: &str) -> Result<Option<Self>, TransferError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Ok(None);
        }
        let bytes_per_sec = parse_rate(spec)?;
        Ok(Some(Self::new(bytes_per_sec)))
    }

    /// Builds a limiter for an exact bytes/sec rate.
    #[must_use]
    pub fn new(bytes_per_sec: u64) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let rate = bytes_per_sec as f64;
        Self {
            rate,
            burst: rate,
            // Start full so the first chunk goes out immediately.
            tokens: rate,
            last_refill: Instant::now(),
        }
    }

    /// Admits `n` bytes, sleeping first if the bucket is in debt.
    pub async fn acquire(&mut self, n: usize) {
        self.refill();

        if self.tokens < 0.0 {
            let wait = Duration::from_secs_f64(-self.tokens / self.rate);
            trace!(?wait, debt = -self.tokens, "rate limit sleep");
            tokio::time::sleep(wait).await;
            self.refill();
        }

        #[allow(clippy::cast_precision_loss)]
        {
            self.tokens -= n as f64;
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;
        self.tokens = (self.tokens + elapsed * self.rate).min(self.burst);
    }
}

/// Parses `<number><unit>` into bytes per second.
fn parse_rate(spec: &str) -> Result<u64, TransferError> {
    let invalid = || TransferError::InvalidRate {
        spec: spec.to_string(),
    };

    let (digits, unit) = match spec.find(|c: char| !c.is_ascii_digit()) {
        Some(0) | None if spec.is_empty() => return Err(invalid()),
        Some(0) => return Err(invalid()),
        Some(i) => spec.split_at(i),
        None => (spec, ""),
    };

    let value: u64 = digits.parse().map_err(|_| invalid())?;
    let multiplier: u64 = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" | "KIB" => 1024,
        "M" | "MB" | "MIB" => 1024 * 1024,
        "G" | "GB" | "GIB" => 1024 * 1024 * 1024,
        _ => return Err(invalid()),
    };

    let bytes = value.checked_mul(multiplier).ok_or_else(invalid)?;
    if bytes == 0 {
        return Err(invalid());
    }
    Ok(bytes)
}
