//! `downloads list|show|resume` commands over the ledger.

use std::path::PathBuf;

use jellydl::Database;
use jellydl::download::{NullSink, ProgressSink, TransferEngine};
use jellydl::store::{DownloadRecord, Ledger};

use super::progress::BarSink;
use super::{CliError, Context, print_json};
use crate::cli::DownloadsCommand;

pub async fn run(ctx: &Context, command: DownloadsCommand) -> Result<(), CliError> {
    let db = Database::open(&ctx.store_dir).await?;
    let ledger = Ledger::new(db.clone());

    let result = match command {
        DownloadsCommand::List { status } => list(ctx, &ledger, status).await,
        DownloadsCommand::Show { id } => show(ctx, &ledger, id).await,
        DownloadsCommand::Resume { id, options } => {
            resume(ctx, &ledger, id, &options).await
        }
    };

    db.close().await;
    result
}

async fn list(
    ctx: &Context,
    ledger: &Ledger,
    status: Option<jellydl::DownloadStatus>,
) -> Result<(), CliError> {
    let records = ledger.list_records(status).await?;
    if ctx.json {
        return print_json(&records);
    }
    if records.is_empty() {
        println!("No downloads recorded");
        return Ok(());
    }

    println!(
        "{:>5} {:<12} {:>16} {:<28} PATH",
        "ID", "STATUS", "PROGRESS", "NAME"
    );
    for record in &records {
        println!(
            "{:>5} {:<12} {:>16} {:<28} {}",
            record.id,
            record.status_str,
            progress_cell(record),
            truncate(&record.item_name, 28),
            record.path
        );
    }
    Ok(())
}

async fn show(ctx: &Context, ledger: &Ledger, id: i64) -> Result<(), CliError> {
    let record = ledger
        .get_record(id)
        .await?
        .ok_or_else(|| CliError::Usage(format!("no download record with id {id}")))?;

    if ctx.json {
        return print_json(&record);
    }

    println!("id:        {}", record.id);
    println!("item:      {} ({})", record.item_name, record.item_type);
    println!("item id:   {}", record.item_id);
    if let Some(series_id) = &record.series_id {
        println!(
            "series:    {series_id} S{:02}E{:02}",
            record.season_number.unwrap_or(0),
            record.episode_number.unwrap_or(0)
        );
    }
    println!("status:    {}", record.status_str);
    println!("progress:  {}", progress_cell(&record));
    println!("path:      {}", record.path);
    if let Some(error) = &record.error {
        println!("error:     {error}");
    }
    println!("created:   {}", record.created_at);
    println!("updated:   {}", record.updated_at);
    Ok(())
}

/// Re-runs a download at its recorded path, resuming partial bytes.
async fn resume(
    ctx: &Context,
    ledger: &Ledger,
    id: i64,
    args: &crate::cli::DownloadArgs,
) -> Result<(), CliError> {
    let record = ledger
        .get_record(id)
        .await?
        .ok_or_else(|| CliError::Usage(format!("no download record with id {id}")))?;
    if record.status() == jellydl::DownloadStatus::Done {
        println!("record {id} is already done: {}", record.path);
        return Ok(());
    }

    let client = ctx.api_client()?;
    let item = client.get_item(&record.item_id).await?;
    let engine = TransferEngine::new(client, ledger.clone(), ctx.cancel.clone());

    let sink: Box<dyn ProgressSink> = if ctx.quiet || ctx.json {
        Box::new(NullSink)
    } else {
        Box::new(BarSink::new())
    };

    let options =
        super::download::transfer_options(ctx, args, Some(PathBuf::from(&record.path)));
    let path = engine.run_item(&item, &options, sink.as_ref()).await?;
    println!("resumed {} -> {}", record.item_name, path.display());
    Ok(())
}

fn progress_cell(record: &DownloadRecord) -> String {
    match (record.bytes_done, record.bytes_total) {
        (Some(done), Some(total)) if total > 0 => {
            format!("{done}/{total}")
        }
        (Some(done), _) => format!("{done} bytes"),
        _ => "-".to_string(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}\u{2026}")
    }
}
