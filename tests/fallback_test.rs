mod common;

use assert_cmd::cargo_bin;
use std::process::{Command, Output};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn settled_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/check_transaction_by_md5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::settled_body("h1")))
        .mount(&server)
        .await;
    server
}

async fn track(server: &MockServer, extra: &[&str]) -> Output {
    let mut cmd = Command::new(cargo_bin!("khqr-settle"));
    cmd.env("BAKONG_API_URL", server.uri())
        .env("BAKONG_TOKEN", "test-token")
        .env("BAKONG_ACCOUNT_ID", "acc123")
        .env("MERCHANT_NAME", "Shop")
        .env("POLL_INTERVAL_MS", "20")
        .env("RUST_LOG", "warn")
        .args(["track", "--amount", "5000", "--currency", "KHR"])
        .args(extra);
    tokio::task::spawn_blocking(move || cmd.output())
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_track_reports_success() {
    let server = settled_server().await;
    let output = track(&server, &[]).await;

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"status\": \"SUCCESS\""));
    assert!(stdout.contains("\"hash\": \"h1\""));
}

#[cfg(not(feature = "storage-rocksdb"))]
#[tokio::test(flavor = "multi_thread")]
async fn test_rocksdb_fallback_warning() {
    let server = settled_server().await;
    let output = track(&server, &["--db-path", "some_db"]).await;

    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."));
}

#[cfg(feature = "storage-rocksdb")]
#[tokio::test(flavor = "multi_thread")]
async fn test_rocksdb_no_fallback_warning() {
    let server = settled_server().await;
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test_db");
    let output = track(&server, &["--db-path", db_path.to_str().unwrap()]).await;

    assert!(output.status.success());
    assert!(!String::from_utf8_lossy(&output.stderr).contains("WARNING"));
}
