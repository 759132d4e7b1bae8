//! Resumable, rate-limited media downloads.
//!
//! The pieces compose bottom-up: [`RateLimiter`] throttles bytes,
//! [`copy_with_progress`] moves chunks from stream to file, the
//! `filename` helpers pick safe destination names, and
//! [`TransferEngine`] orchestrates the whole lifecycle against the
//! [`Ledger`](crate::store::Ledger).

mod copier;
mod error;
pub mod filename;
mod rate_limit;
mod transfer;

pub use copier::{CHUNK_SIZE, PROGRESS_INTERVAL, copy_with_progress};
pub use error::TransferError;
pub use rate_limit::RateLimiter;
pub use transfer::{
    BatchReport, NullSink, ProgressSink, TransferEngine, TransferOptions, filter_episodes,
    parse_number_list,
};
