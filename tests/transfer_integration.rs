//! Transfer engine tests against a mock HTTP server.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use jellydl::api::{ApiClient, Item};
use jellydl::download::{NullSink, TransferEngine, TransferError, TransferOptions};
use jellydl::store::{DownloadStatus, Ledger};
use jellydl::Database;

fn client(server: &MockServer) -> ApiClient {
    ApiClient::new(
        &server.uri(),
        "test-token",
        "user-1",
        "device-1",
        "test",
        Duration::from_secs(5),
    )
    .unwrap()
}

async fn engine(server: &MockServer) -> (TransferEngine, Ledger) {
    let db = Database::new_in_memory().await.unwrap();
    let ledger = Ledger::new(db);
    let engine = TransferEngine::new(
        client(server),
        ledger.clone(),
        CancellationToken::new(),
    );
    (engine, ledger)
}

fn movie(id: &str, name: &str) -> Item {
    Item {
        id: id.to_string(),
        name: name.to_string(),
        item_type: "Movie".to_string(),
        ..Item::default()
    }
}

fn episode(id: &str, season: i64, number: i64) -> Item {
    Item {
        id: id.to_string(),
        name: format!("Ep {number}"),
        item_type: "Episode".to_string(),
        series_name: Some("Some Show".to_string()),
        series_id: Some("series-1".to_string()),
        parent_index_number: Some(season),
        index_number: Some(number),
        ..Item::default()
    }
}

fn options(dir: &TempDir) -> TransferOptions {
    TransferOptions {
        output_dir: dir.path().to_path_buf(),
        ..TransferOptions::default()
    }
}

#[tokio::test]
async fn test_full_download_lands_done() {
    let server = MockServer::start().await;
    let body = vec![0xAB; 10_000];
    Mock::given(method("GET"))
        .and(path("/Items/movie-1/Download"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let (engine, ledger) = engine(&server).await;

    let dest = engine
        .run_item(&movie("movie-1", "Big Film"), &options(&dir), &NullSink)
        .await
        .unwrap();

    assert_eq!(std::fs::read(&dest).unwrap(), body);
    assert_eq!(dest.file_name().unwrap(), "Big Film.mkv");

    let records = ledger.list_records(None).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status(), DownloadStatus::Done);
    assert_eq!(records[0].bytes_done, Some(10_000));
    assert_eq!(records[0].bytes_total, Some(10_000));
}

#[tokio::test]
async fn test_resume_appends_to_partial_file() {
    let server = MockServer::start().await;
    let full: Vec<u8> = (0..200u8).cycle().take(10_000).collect();
    let offset = 4_000;

    Mock::given(method("GET"))
        .and(path("/Items/movie-1/Download"))
        .and(header("Range", format!("bytes={offset}-")))
        .respond_with(
            ResponseTemplate::new(206)
                .set_body_bytes(full[offset..].to_vec())
                .insert_header(
                    "Content-Range",
                    format!("bytes {offset}-{}/{}", full.len() - 1, full.len()).as_str(),
                ),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("Big Film.mkv");
    std::fs::write(&dest, &full[..offset]).unwrap();

    let (engine, ledger) = engine(&server).await;
    let result = engine
        .run_item(&movie("movie-1", "Big Film"), &options(&dir), &NullSink)
        .await
        .unwrap();

    assert_eq!(result, dest);
    assert_eq!(std::fs::read(&dest).unwrap(), full);

    let record = &ledger.list_records(None).await.unwrap()[0];
    assert_eq!(record.status(), DownloadStatus::Done);
    assert_eq!(record.bytes_done, Some(10_000));
    assert_eq!(record.bytes_total, Some(10_000));
}

#[tokio::test]
async fn test_range_ignored_restarts_from_zero() {
    let server = MockServer::start().await;
    let full = vec![0x42u8; 6_000];

    // Server replies 200 with the whole file even though a range was asked.
    Mock::given(method("GET"))
        .and(path("/Items/movie-1/Download"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(full.clone()))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("Big Film.mkv");
    std::fs::write(&dest, vec![0xFFu8; 1_000]).unwrap();

    let (engine, _ledger) = engine(&server).await;
    engine
        .run_item(&movie("movie-1", "Big Film"), &options(&dir), &NullSink)
        .await
        .unwrap();

    // Stale partial bytes are gone, not prepended.
    assert_eq!(std::fs::read(&dest).unwrap(), full);
}

#[tokio::test]
async fn test_server_filename_overrides_planned_name() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Items/movie-1/Download"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"abc".to_vec())
                .insert_header(
                    "Content-Disposition",
                    r#"attachment; filename="Server Pick.mp4""#,
                ),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let (engine, ledger) = engine(&server).await;

    let dest = engine
        .run_item(&movie("movie-1", "Planned Name"), &options(&dir), &NullSink)
        .await
        .unwrap();

    assert_eq!(dest.file_name().unwrap(), "Server Pick.mp4");
    assert!(dest.exists());
    assert!(!dir.path().join("Planned Name.mkv").exists());

    // The done record carries the server-picked path.
    let done = ledger
        .list_records(Some(DownloadStatus::Done))
        .await
        .unwrap();
    assert_eq!(done.len(), 1);
    assert!(done[0].path.ends_with("Server Pick.mp4"));
}

#[tokio::test]
async fn test_dry_run_records_queued_but_transfers_nothing() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let (engine, ledger) = engine(&server).await;

    let opts = TransferOptions {
        dry_run: true,
        ..options(&dir)
    };
    let dest = engine
        .run_item(&movie("movie-1", "Big Film"), &opts, &NullSink)
        .await
        .unwrap();

    assert!(!dest.exists());
    assert!(server.received_requests().await.unwrap().is_empty());

    // The planned transfer is on the ledger, untouched past queued.
    let records = ledger.list_records(None).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status(), DownloadStatus::Queued);
    assert!(records[0].path.ends_with("Big Film.mkv"));
}

#[tokio::test]
async fn test_record_is_downloading_during_header_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Items/movie-1/Download"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"abc".to_vec())
                .set_delay(Duration::from_millis(750)),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let (engine, ledger) = engine(&server).await;
    let opts = options(&dir);

    let transfer = tokio::spawn(async move {
        engine
            .run_item(&movie("movie-1", "Big Film"), &opts, &NullSink)
            .await
    });

    // While the request is still in flight the record must already have
    // left queued.
    tokio::time::sleep(Duration::from_millis(250)).await;
    let records = ledger.list_records(None).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status(), DownloadStatus::Downloading);

    transfer.await.unwrap().unwrap();
    let records = ledger.list_records(None).await.unwrap();
    assert_eq!(records[0].status(), DownloadStatus::Done);
}

#[tokio::test]
async fn test_ledger_failure_after_transfer_is_not_fatal() {
    let server = MockServer::start().await;
    let body = vec![0x5Au8; 2_000];
    Mock::given(method("GET"))
        .and(path("/Items/movie-1/Download"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(body.clone())
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let db = Database::new_in_memory().await.unwrap();
    let engine = TransferEngine::new(
        client(&server),
        Ledger::new(db.clone()),
        CancellationToken::new(),
    );
    let opts = options(&dir);

    let transfer = tokio::spawn(async move {
        engine
            .run_item(&movie("movie-1", "Big Film"), &opts, &NullSink)
            .await
    });

    // Break the ledger while the response headers are still pending; the
    // bytes land on disk, so the transfer still counts as a success.
    tokio::time::sleep(Duration::from_millis(250)).await;
    sqlx::query("DROP TABLE downloads")
        .execute(db.pool())
        .await
        .unwrap();

    let dest = transfer.await.unwrap().unwrap();
    assert_eq!(std::fs::read(&dest).unwrap(), body);
}

#[tokio::test]
async fn test_http_error_marks_record_failed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Items/movie-1/Download"))
        .respond_with(ResponseTemplate::new(500).set_body_string("disk melted"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let (engine, ledger) = engine(&server).await;

    let error = engine
        .run_item(&movie("movie-1", "Big Film"), &options(&dir), &NullSink)
        .await
        .unwrap_err();
    assert!(matches!(error, TransferError::Remote(_)));

    let failed = ledger
        .list_records(Some(DownloadStatus::Failed))
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    let message = failed[0].error.as_deref().unwrap();
    assert!(message.contains("500"), "error was: {message}");
    assert!(message.contains("disk melted"), "error was: {message}");
}

#[tokio::test]
async fn test_auth_rejection_is_distinguishable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Items/movie-1/Download"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let (engine, _ledger) = engine(&server).await;

    let error = engine
        .run_item(&movie("movie-1", "Big Film"), &options(&dir), &NullSink)
        .await
        .unwrap_err();
    assert!(error.is_auth());
}

#[tokio::test]
async fn test_batch_continues_past_failures_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Items/ep-1/Download"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"one".to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Items/ep-2/Download"))
        .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Items/ep-3/Download"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"three".to_vec()))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let (engine, ledger) = engine(&server).await;

    // Deliberately out of order; the engine must sort by (season, episode).
    let items = vec![
        episode("ep-3", 1, 3),
        episode("ep-1", 1, 1),
        episode("ep-2", 1, 2),
    ];
    let report = engine.run_batch(items, &options(&dir), &NullSink).await;

    assert_eq!(report.completed, 2);
    assert_eq!(report.failed.len(), 1);
    assert!(!report.is_success());
    assert!(report.failed[0].0.contains("S01E02"));

    let requests = server.received_requests().await.unwrap();
    let order: Vec<_> = requests.iter().map(|r| r.url.path().to_string()).collect();
    assert_eq!(
        order,
        vec![
            "/Items/ep-1/Download",
            "/Items/ep-2/Download",
            "/Items/ep-3/Download",
        ]
    );

    let failed = ledger
        .list_records(Some(DownloadStatus::Failed))
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].item_id, "ep-2");

    // Watermark reflects the last completed episode.
    let done = ledger
        .list_records(Some(DownloadStatus::Done))
        .await
        .unwrap();
    assert_eq!(done.len(), 2);
}

#[tokio::test]
async fn test_cancelled_engine_stops_batch() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let db = Database::new_in_memory().await.unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let engine = TransferEngine::new(client(&server), Ledger::new(db), cancel);

    let report = engine
        .run_batch(vec![episode("ep-1", 1, 1)], &options(&dir), &NullSink)
        .await;
    assert!(report.cancelled);
    assert_eq!(report.completed, 0);
    assert!(server.received_requests().await.unwrap().is_empty());
}
