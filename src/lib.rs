//! jellydl core library
//!
//! This library implements a command-line client for a Jellyfin-compatible
//! media server: catalog search, authentication, and resumable, rate-limited
//! downloads backed by a persistent `SQLite` ledger.
//!
//! # Architecture
//!
//! - [`api`] - HTTP client for the media-server API
//! - [`config`] - persisted configuration and store directory resolution
//! - [`db`] - database connection and schema management
//! - [`download`] - rate limiter, stream copier, and transfer orchestrator
//! - [`store`] - download ledger persistence (records + series watermarks)

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod config;
pub mod db;
pub mod download;
pub mod store;

// Re-export commonly used types
pub use api::{ApiClient, ApiError, Item};
pub use config::Config;
pub use db::Database;
pub use download::{
    BatchReport, ProgressSink, RateLimiter, TransferEngine, TransferError, TransferOptions,
};
pub use store::{DownloadRecord, DownloadStatus, Ledger, NewDownload, StoreError};
