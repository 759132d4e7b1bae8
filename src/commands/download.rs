//! `download movie|episode|series` commands.

use std::path::PathBuf;

use tracing::info;

use jellydl::Database;
use jellydl::download::{
    NullSink, ProgressSink, RateLimiter, TransferEngine, TransferOptions, filter_episodes,
    parse_number_list,
};
use jellydl::store::Ledger;

use super::progress::BarSink;
use super::{CliError, Context};
use crate::cli::{DownloadArgs, DownloadCommand};

pub async fn run(ctx: &Context, command: DownloadCommand) -> Result<(), CliError> {
    let client = ctx.api_client()?;
    let db = Database::open(&ctx.store_dir).await?;
    let ledger = Ledger::new(db.clone());
    let engine = TransferEngine::new(client.clone(), ledger, ctx.cancel.clone());

    let sink: Box<dyn ProgressSink> = if ctx.quiet || ctx.json {
        Box::new(NullSink)
    } else {
        Box::new(BarSink::new())
    };

    let result = match command {
        DownloadCommand::Movie { id, options } | DownloadCommand::Episode { id, options } => {
            single(&engine, &client, ctx, &id, &options, sink.as_ref()).await
        }
        DownloadCommand::Series {
            id,
            season,
            episode,
            all,
            options,
        } => {
            batch(
                &engine,
                &client,
                ctx,
                &id,
                season.as_deref(),
                episode.as_deref(),
                all,
                &options,
                sink.as_ref(),
            )
            .await
        }
    };

    db.close().await;
    result
}

async fn single(
    engine: &TransferEngine,
    client: &jellydl::ApiClient,
    ctx: &Context,
    item_id: &str,
    args: &DownloadArgs,
    sink: &dyn ProgressSink,
) -> Result<(), CliError> {
    let options = transfer_options(ctx, args, None);
    RateLimiter::from_spec(&options.rate)?;

    let item = client.get_item(item_id).await?;
    let path = engine.run_item(&item, &options, sink).await?;
    info!(path = %path.display(), "download finished");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn batch(
    engine: &TransferEngine,
    client: &jellydl::ApiClient,
    ctx: &Context,
    series_id: &str,
    season: Option<&str>,
    episode: Option<&str>,
    all: bool,
    args: &DownloadArgs,
    sink: &dyn ProgressSink,
) -> Result<(), CliError> {
    if !all && season.is_none() && episode.is_none() {
        return Err(CliError::Usage(
            "select episodes with --season/--episode, or pass --all for the whole series"
                .to_string(),
        ));
    }

    let options = transfer_options(ctx, args, None);
    RateLimiter::from_spec(&options.rate)?;
    let seasons = season.map(parse_number_list).transpose()?;
    let episodes_sel = episode.map(parse_number_list).transpose()?;

    let episodes = client.series_episodes(series_id).await?;
    let selected = filter_episodes(episodes, seasons.as_ref(), episodes_sel.as_ref());
    if selected.is_empty() {
        return Err(CliError::Usage(format!(
            "no episodes of series {series_id} match the selection"
        )));
    }

    let total = selected.len();
    sink.note(&format!("downloading {total} episode(s)"));

    let report = engine.run_batch(selected, &options, sink).await;

    for (label, error) in &report.failed {
        eprintln!("failed: {label}: {error}");
    }
    info!(
        completed = report.completed,
        failed = report.failed.len(),
        cancelled = report.cancelled,
        "batch finished"
    );

    if report.cancelled {
        return Err(CliError::Cancelled);
    }
    if !report.failed.is_empty() {
        return Err(CliError::BatchFailed {
            failed: report.failed.len(),
            total,
        });
    }
    println!("completed {}/{total} episodes", report.completed);
    Ok(())
}

/// Downloads land next to the ledger by default, under `<store>/downloads`.
pub(super) fn transfer_options(
    ctx: &Context,
    args: &DownloadArgs,
    override_path: Option<PathBuf>,
) -> TransferOptions {
    TransferOptions {
        output_dir: args
            .output
            .clone()
            .unwrap_or_else(|| ctx.store_dir.join("downloads")),
        rate: args
            .rate
            .clone()
            .unwrap_or_else(|| ctx.config.default_rate.clone()),
        dry_run: args.dry_run,
        override_path,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use jellydl::config::Config;

    use super::*;

    fn test_context() -> Context {
        Context {
            store_dir: PathBuf::from("/var/lib/jellydl"),
            config: Config {
                default_rate: "2M".to_string(),
                ..Config::default()
            },
            timeout: Duration::from_secs(5),
            json: false,
            quiet: true,
            cancel: CancellationToken::new(),
        }
    }

    #[test]
    fn test_transfer_options_default_to_store_downloads() {
        let ctx = test_context();
        let args = DownloadArgs {
            rate: None,
            output: None,
            dry_run: false,
        };

        let options = transfer_options(&ctx, &args, None);
        assert_eq!(
            options.output_dir,
            PathBuf::from("/var/lib/jellydl/downloads")
        );
        assert_eq!(options.rate, "2M");
    }

    #[test]
    fn test_transfer_options_flags_override_defaults() {
        let ctx = test_context();
        let args = DownloadArgs {
            rate: Some("500K".to_string()),
            output: Some(PathBuf::from("/tmp/out")),
            dry_run: true,
        };

        let options = transfer_options(&ctx, &args, None);
        assert_eq!(options.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(options.rate, "500K");
        assert!(options.dry_run);
    }
}
