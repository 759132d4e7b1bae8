//! Ledger lifecycle tests against a real SQLite database.

#![allow(clippy::unwrap_used)]

use jellydl::store::{DownloadStatus, Ledger, NewDownload};
use jellydl::Database;

async fn ledger() -> Ledger {
    Ledger::new(Database::new_in_memory().await.unwrap())
}

fn episode_record(item_id: &str, season: i64, episode: i64, path: &str) -> NewDownload {
    let mut record = NewDownload::queued(item_id, "Ep", "Episode", path);
    record.series_id = Some("series-1".to_string());
    record.season_number = Some(season);
    record.episode_number = Some(episode);
    record
}

#[tokio::test]
async fn test_upsert_same_item_and_path_reuses_record() {
    let ledger = ledger().await;

    let first = ledger
        .upsert_record(&NewDownload::queued("item-1", "A", "Movie", "/d/a.mkv"))
        .await
        .unwrap();
    let second = ledger
        .upsert_record(&NewDownload::queued("item-1", "A (renamed)", "Movie", "/d/a.mkv"))
        .await
        .unwrap();

    assert_eq!(first, second);

    let records = ledger.list_records(None).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].item_name, "A (renamed)");
}

#[tokio::test]
async fn test_same_item_different_path_gets_new_record() {
    let ledger = ledger().await;

    let first = ledger
        .upsert_record(&NewDownload::queued("item-1", "A", "Movie", "/d/a.mkv"))
        .await
        .unwrap();
    let second = ledger
        .upsert_record(&NewDownload::queued("item-1", "A", "Movie", "/elsewhere/a.mkv"))
        .await
        .unwrap();

    assert_ne!(first, second);
    assert_eq!(ledger.list_records(None).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_status_lifecycle_and_progress_readback() {
    let ledger = ledger().await;

    let id = ledger
        .upsert_record(&NewDownload::queued("item-1", "A", "Movie", "/d/a.mkv"))
        .await
        .unwrap();

    let record = ledger.get_record(id).await.unwrap().unwrap();
    assert_eq!(record.status(), DownloadStatus::Queued);
    assert_eq!(record.bytes_done, None);

    ledger
        .set_status(id, DownloadStatus::Downloading, None)
        .await
        .unwrap();
    ledger.update_progress(id, 1024, 4096).await.unwrap();

    let record = ledger.get_record(id).await.unwrap().unwrap();
    assert_eq!(record.status(), DownloadStatus::Downloading);
    assert_eq!(record.bytes_done, Some(1024));
    assert_eq!(record.bytes_total, Some(4096));

    ledger.update_progress(id, 4096, 4096).await.unwrap();
    ledger
        .set_status(id, DownloadStatus::Done, None)
        .await
        .unwrap();

    let record = ledger.get_record(id).await.unwrap().unwrap();
    assert_eq!(record.status(), DownloadStatus::Done);
    assert_eq!(record.bytes_done, record.bytes_total);
    assert_eq!(record.error, None);
}

#[tokio::test]
async fn test_failed_records_keep_error_and_can_retry() {
    let ledger = ledger().await;

    let id = ledger
        .upsert_record(&NewDownload::queued("item-1", "A", "Movie", "/d/a.mkv"))
        .await
        .unwrap();
    ledger
        .set_status(id, DownloadStatus::Failed, Some("connection reset"))
        .await
        .unwrap();

    let failed = ledger
        .list_records(Some(DownloadStatus::Failed))
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].error.as_deref(), Some("connection reset"));

    // Retry re-enters downloading through the same record.
    ledger
        .set_status(id, DownloadStatus::Downloading, None)
        .await
        .unwrap();
    let record = ledger.get_record(id).await.unwrap().unwrap();
    assert_eq!(record.status(), DownloadStatus::Downloading);
}

#[tokio::test]
async fn test_list_filter_by_status() {
    let ledger = ledger().await;

    let done = ledger
        .upsert_record(&NewDownload::queued("item-1", "A", "Movie", "/d/a.mkv"))
        .await
        .unwrap();
    ledger
        .set_status(done, DownloadStatus::Done, None)
        .await
        .unwrap();
    ledger
        .upsert_record(&NewDownload::queued("item-2", "B", "Movie", "/d/b.mkv"))
        .await
        .unwrap();

    assert_eq!(
        ledger
            .list_records(Some(DownloadStatus::Done))
            .await
            .unwrap()
            .len(),
        1
    );
    assert_eq!(
        ledger
            .list_records(Some(DownloadStatus::Queued))
            .await
            .unwrap()
            .len(),
        1
    );
    assert_eq!(ledger.list_records(None).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_series_watermark_moves_forward() {
    let db = Database::new_in_memory().await.unwrap();
    let ledger = Ledger::new(db.clone());

    let id = ledger
        .upsert_record(&episode_record("ep-1", 1, 3, "/d/e1.mkv"))
        .await
        .unwrap();
    let record = ledger.get_record(id).await.unwrap().unwrap();
    assert_eq!(record.series_id.as_deref(), Some("series-1"));
    assert_eq!(record.season_number, Some(1));
    assert_eq!(record.episode_number, Some(3));

    ledger.upsert_series_progress("series-1", 1, 3).await.unwrap();
    ledger.upsert_series_progress("series-1", 2, 1).await.unwrap();

    let row: (i64, i64) = sqlx::query_as(
        "SELECT last_season, last_episode FROM series_progress WHERE series_id = 'series-1'",
    )
    .fetch_one(db.pool())
    .await
    .unwrap();
    assert_eq!(row, (2, 1));
}
