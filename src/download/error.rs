use std::path::PathBuf;

use thiserror::Error;

use crate::api::ApiError;
use crate::store::StoreError;

/// Errors from a transfer or batch of transfers.
#[derive(Debug, Error)]
pub enum TransferError {
    /// A rate spec that does not parse as `<number><unit>`.
    #[error("invalid rate limit {spec:?}: expected <number>[K|M|G], e.g. 500K or 2M")]
    InvalidRate {
        /// The rejected spec string.
        spec: String,
    },

    /// The remote API or byte stream failed.
    #[error(transparent)]
    Remote(#[from] ApiError),

    /// The download ledger failed.
    #[error("download ledger: {0}")]
    Store(#[from] StoreError),

    /// Local filesystem failure on the destination file.
    #[error("local file {path}: {source}")]
    Io {
        /// The destination path involved.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The transfer was cancelled before completion.
    #[error("transfer cancelled")]
    Cancelled,

    /// The requested item does not exist or is not downloadable.
    #[error("item {item_id}: {reason}")]
    BadItem {
        /// The item id.
        item_id: String,
        /// Why it cannot be downloaded.
        reason: String,
    },

    /// A season/episode selection that does not parse.
    #[error("invalid selection {spec:?}: expected numbers and ranges like 1,3-5")]
    InvalidSelection {
        /// The rejected selection string.
        spec: String,
    },
}

impl TransferError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the failure came from authentication being rejected.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Remote(ApiError::Http { status: 401 | 403, .. }))
    }
}
