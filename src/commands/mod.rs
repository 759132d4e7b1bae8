//! Command implementations and exit-code mapping.

mod download;
mod downloads;
mod login;
mod progress;
mod search;

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use jellydl::api::{ApiClient, ApiError};
use jellydl::config::{Config, ConfigError, normalize_server_url, resolve_store_dir};
use jellydl::db::DbError;
use jellydl::download::TransferError;
use jellydl::store::StoreError;

use crate::cli::{Cli, Command};

/// Exit code for usage and configuration errors.
pub const EXIT_USAGE: u8 = 2;
/// Exit code for authentication failures.
pub const EXIT_AUTH: u8 = 3;
/// Exit code for server-side and network failures.
pub const EXIT_REMOTE: u8 = 4;
/// Exit code for local filesystem and database failures.
pub const EXIT_LOCAL: u8 = 5;

/// Top-level command failure, mapped onto process exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("download ledger: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Usage(String),

    #[error("{failed} of {total} downloads failed")]
    BatchFailed { failed: usize, total: usize },

    #[error("cancelled")]
    Cancelled,

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl CliError {
    /// Maps the failure category onto the documented exit codes.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Usage(_)
            | Self::Config(
                ConfigError::NoStoreDir | ConfigError::InvalidServerUrl { .. },
            )
            | Self::Transfer(
                TransferError::InvalidRate { .. } | TransferError::InvalidSelection { .. },
            ) => EXIT_USAGE,

            Self::Config(ConfigError::NotAuthenticated) => EXIT_AUTH,
            Self::Api(error) => api_exit_code(error),
            Self::Transfer(TransferError::Remote(error)) => api_exit_code(error),
            Self::Transfer(TransferError::BadItem { .. }) | Self::BatchFailed { .. } => EXIT_REMOTE,

            Self::Config(ConfigError::Io { .. } | ConfigError::Parse { .. })
            | Self::Db(_)
            | Self::Store(_)
            | Self::Transfer(TransferError::Store(_) | TransferError::Io { .. })
            | Self::Io { .. } => EXIT_LOCAL,

            Self::Transfer(TransferError::Cancelled) | Self::Cancelled => 1,
        }
    }
}

fn api_exit_code(error: &ApiError) -> u8 {
    match error {
        ApiError::Http {
            status: 401 | 403, ..
        } => EXIT_AUTH,
        _ => EXIT_REMOTE,
    }
}

/// Shared state resolved once per invocation.
pub struct Context {
    pub store_dir: PathBuf,
    pub config: Config,
    pub timeout: Duration,
    pub json: bool,
    pub quiet: bool,
    pub cancel: CancellationToken,
}

impl Context {
    /// Builds an API client from the stored credentials.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Config`] when not logged in.
    pub fn api_client(&self) -> Result<ApiClient, CliError> {
        self.config.require_auth()?;
        self.client_for(&self.config.server)
    }

    /// Builds an unauthenticated API client for `server` (login).
    pub fn client_for(&self, server: &str) -> Result<ApiClient, CliError> {
        ApiClient::new(
            server,
            &self.config.token,
            &self.config.user_id,
            &self.config.device_id,
            &self.config.device_name,
            self.timeout,
        )
        .map_err(|e| CliError::Api(ApiError::Network {
            endpoint: "client".to_string(),
            source: e,
        }))
    }
}

/// Renders a value as pretty-printed JSON on stdout.
pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value).map_err(|source| CliError::Io {
        context: "rendering JSON".to_string(),
        source: std::io::Error::other(source),
    })?;
    println!("{rendered}");
    Ok(())
}

/// Resolves the context and dispatches the parsed command.
///
/// # Errors
///
/// Returns [`CliError`] for the caller to map onto an exit code.
pub async fn run(cli: Cli, cancel: CancellationToken) -> Result<(), CliError> {
    let store_dir = resolve_store_dir(cli.store.as_deref())?;
    let mut config = Config::load(&store_dir)?;
    if let Some(server) = cli.server.as_deref() {
        config.server = normalize_server_url(server)?;
    }

    let ctx = Context {
        store_dir,
        config,
        timeout: Duration::from_secs(cli.timeout),
        json: cli.json,
        quiet: cli.quiet,
        cancel,
    };

    match cli.command {
        Command::Login {
            user,
            password_stdin,
        } => login::login(ctx, user, password_stdin).await,
        Command::Logout => login::logout(&ctx),
        Command::Search {
            term,
            movies,
            series,
            limit,
        } => search::search(&ctx, &term, movies, series, limit).await,
        Command::Series { id } => search::series_episodes(&ctx, &id).await,
        Command::Download(command) => download::run(&ctx, command).await,
        Command::Downloads(command) => downloads::run(&ctx, command).await,
    }
}
