//! Command-line interface definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use jellydl::store::DownloadStatus;

/// Download movies and episodes from a Jellyfin media server.
#[derive(Debug, Parser)]
#[command(name = "jellydl", version, about, long_about = None)]
pub struct Cli {
    /// Store directory for config and the download ledger
    /// [default: ~/.jellydl, env: JELLYDL_STORE]
    #[arg(long, global = true, value_name = "DIR")]
    pub store: Option<PathBuf>,

    /// Server URL, overriding the configured one for this invocation
    #[arg(long, global = true, value_name = "URL")]
    pub server: Option<String>,

    /// HTTP timeout in seconds for API calls (not download bodies)
    #[arg(long, global = true, default_value_t = 30, value_name = "SECS")]
    pub timeout: u64,

    /// Emit machine-readable JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress progress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Authenticate against the server and store the token
    Login {
        /// Username; prompted for when omitted
        #[arg(short, long)]
        user: Option<String>,

        /// Read the password from stdin instead of prompting
        #[arg(long)]
        password_stdin: bool,
    },

    /// Discard the stored token and user id
    Logout,

    /// Search the catalog for movies and series
    Search {
        /// Search term
        term: String,

        /// Only movies
        #[arg(long, conflicts_with = "series")]
        movies: bool,

        /// Only series
        #[arg(long)]
        series: bool,

        /// Maximum results
        #[arg(long, default_value_t = 25)]
        limit: i64,
    },

    /// List the episodes of a series, grouped by season
    Series {
        /// Series item id
        id: String,
    },

    /// Download media to disk
    #[command(subcommand)]
    Download(DownloadCommand),

    /// Inspect and retry entries in the download ledger
    #[command(subcommand)]
    Downloads(DownloadsCommand),
}

#[derive(Debug, Subcommand)]
pub enum DownloadCommand {
    /// Download one movie
    Movie {
        /// Movie item id
        id: String,

        #[command(flatten)]
        options: DownloadArgs,
    },

    /// Download one episode
    Episode {
        /// Episode item id
        id: String,

        #[command(flatten)]
        options: DownloadArgs,
    },

    /// Download episodes of a series
    Series {
        /// Series item id
        id: String,

        /// Seasons to include, e.g. `1` or `1,3-4`
        #[arg(long, value_name = "SPEC")]
        season: Option<String>,

        /// Episodes to include within the selected seasons, e.g. `1-8`
        #[arg(long, value_name = "SPEC")]
        episode: Option<String>,

        /// Download every episode
        #[arg(long, conflicts_with_all = ["season", "episode"])]
        all: bool,

        #[command(flatten)]
        options: DownloadArgs,
    },
}

/// Flags shared by all download subcommands.
#[derive(Debug, Args, Clone)]
pub struct DownloadArgs {
    /// Rate limit, e.g. `500K` or `2M` (bytes/sec; K/M/G are binary units)
    #[arg(long, value_name = "RATE")]
    pub rate: Option<String>,

    /// Output directory [default: downloads/ inside the store]
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Resolve and report without transferring anything
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Subcommand)]
pub enum DownloadsCommand {
    /// List ledger records, most recently updated first
    List {
        /// Only records with this status
        #[arg(long, value_parser = parse_status)]
        status: Option<DownloadStatus>,
    },

    /// Show one ledger record in full
    Show {
        /// Record id from `downloads list`
        id: i64,
    },

    /// Re-run a failed or interrupted download at its recorded path
    Resume {
        /// Record id from `downloads list`
        id: i64,

        #[command(flatten)]
        options: DownloadArgs,
    },
}

fn parse_status(s: &str) -> Result<DownloadStatus, String> {
    s.parse()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_download_series_with_selection() {
        let cli = Cli::parse_from([
            "jellydl", "download", "series", "abc", "--season", "1,3-4", "--rate", "2M",
        ]);
        match cli.command {
            Command::Download(DownloadCommand::Series {
                id,
                season,
                all,
                options,
                ..
            }) => {
                assert_eq!(id, "abc");
                assert_eq!(season.as_deref(), Some("1,3-4"));
                assert!(!all);
                assert_eq!(options.rate.as_deref(), Some("2M"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_all_conflicts_with_season() {
        let result = Cli::try_parse_from([
            "jellydl", "download", "series", "abc", "--all", "--season", "1",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_downloads_list_status_filter() {
        let cli = Cli::parse_from(["jellydl", "downloads", "list", "--status", "failed"]);
        match cli.command {
            Command::Downloads(DownloadsCommand::List { status }) => {
                assert_eq!(status, Some(DownloadStatus::Failed));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["jellydl", "search", "matrix", "--store", "/tmp/s", "-q"]);
        assert_eq!(cli.store, Some(PathBuf::from("/tmp/s")));
        assert!(cli.quiet);
    }
}
