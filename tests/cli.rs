//! Binary-level checks. Every run gets its own empty config location.

mod common;

use assert_cmd::Command;
use axum::http::header;
use axum::routing::get;
use axum::Router;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

use common::{FakeUpstream, UpstreamScript, PENDING_BODY};

fn cmd(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("convert-relay").unwrap();
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env("XDG_CONFIG_HOME", dir)
        .env_remove("HOST")
        .env_remove("PORT")
        .env_remove("CONVERT_RELAY_UPSTREAM")
        .env_remove("CONVERT_RELAY_URL")
        .env_remove("RUST_LOG");
    cmd
}

fn write_config(dir: &Path, base_url: &str, oembed_url: &str) {
    let yaml = format!(
        "upstream:\n  base_url: {}\n  oembed_url: {}\n  request_timeout_secs: 5\npolling:\n  max_attempts: 5\n  delay_ms: 10\n",
        base_url, oembed_url
    );
    std::fs::write(dir.join("config.yaml"), yaml).unwrap();
}

#[test]
fn test_help() {
    let dir = TempDir::new().unwrap();
    cmd(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("convert"));
}

#[test]
fn test_convert_rejects_invalid_url_before_any_request() {
    let dir = TempDir::new().unwrap();
    cmd(dir.path())
        .args(["-q", "convert", "not-a-url"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid conversion request"));
}

#[test]
fn test_convert_rejects_unknown_format() {
    let dir = TempDir::new().unwrap();
    cmd(dir.path())
        .args(["convert", "https://youtu.be/abc12345678", "-f", "flac"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("flac"));
}

#[test]
fn test_config_show_defaults() {
    let dir = TempDir::new().unwrap();
    cmd(dir.path())
        .args(["config", "--show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Current Configuration"))
        .stdout(predicate::str::contains("https://v2.ytmp3.wtf"))
        .stdout(predicate::str::contains("30 attempts, 3000ms apart"));
}

#[test]
fn test_config_show_reads_local_file_and_env() {
    let dir = TempDir::new().unwrap();
    write_config(dir.path(), "http://127.0.0.1:9", "http://127.0.0.1:9/oembed");

    cmd(dir.path())
        .env("PORT", "8088")
        .args(["config", "--show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("http://127.0.0.1:9"))
        .stdout(predicate::str::contains(":8088"))
        .stdout(predicate::str::contains("5 attempts, 10ms apart"));
}

#[test]
fn test_bad_port_override_fails() {
    let dir = TempDir::new().unwrap();
    cmd(dir.path())
        .env("PORT", "eighty")
        .args(["config", "--show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("PORT must be a number"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_convert_against_fake_service_and_download() {
    let files = Router::new().route(
        "/media/song.mp3",
        get(|| async { ([(header::CONTENT_TYPE, "audio/mpeg")], vec![1u8; 2048]) }),
    );
    let file_base = common::serve(files).await;

    let ready = format!(r#"{{"ready":true,"dlurl":"{}/media/song.mp3"}}"#, file_base);
    let fake = FakeUpstream::start(UpstreamScript::default().with_polls(&[PENDING_BODY, &ready])).await;

    let dir = TempDir::new().unwrap();
    let downloads = TempDir::new().unwrap();
    write_config(dir.path(), "http://127.0.0.1:9", &fake.oembed_url());

    let workdir = dir.path().to_path_buf();
    let target = downloads.path().to_path_buf();
    let base_url = fake.base_url.clone();
    let assert = tokio::task::spawn_blocking(move || {
        cmd(&workdir)
            .env("CONVERT_RELAY_UPSTREAM", &base_url)
            .args(["-q", "convert", "https://youtu.be/abc12345678", "-o"])
            .arg(&target)
            .assert()
    })
    .await
    .unwrap();

    assert
        .success()
        .stdout(predicate::str::contains("Ready after 2 status checks"))
        .stdout(predicate::str::contains("Title: Never Gonna Give You Up! (Official Video)"))
        .stdout(predicate::str::contains("Author: Rick Astley"))
        .stdout(predicate::str::contains("/media/song.mp3"))
        .stdout(predicate::str::contains("Saved 2.0 KB"));

    assert_eq!(fake.metadata_requests().len(), 1);
    assert_eq!(fake.polls().len(), 2);
    let saved = std::fs::read(downloads.path().join("Never Gonna Give You Up Official Video.mp3")).unwrap();
    assert_eq!(saved.len(), 2048);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_convert_json_report_and_timeout() {
    let fake = FakeUpstream::start(UpstreamScript::default().with_polls(&[PENDING_BODY])).await;

    let dir = TempDir::new().unwrap();
    write_config(dir.path(), &fake.base_url, &fake.oembed_url());

    let workdir = dir.path().to_path_buf();
    let assert = tokio::task::spawn_blocking(move || {
        cmd(&workdir)
            .args(["-q", "convert", "https://youtu.be/abc12345678", "-r", "json"])
            .assert()
    })
    .await
    .unwrap();

    assert
        .failure()
        .stderr(predicate::str::contains("timed out after 5 status checks"));
    assert_eq!(fake.polls().len(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_convert_stops_when_video_info_is_unavailable() {
    let fake = FakeUpstream::start(UpstreamScript {
        oembed_body: None,
        ..UpstreamScript::default()
    })
    .await;

    let dir = TempDir::new().unwrap();
    write_config(dir.path(), &fake.base_url, &fake.oembed_url());

    let workdir = dir.path().to_path_buf();
    let assert = tokio::task::spawn_blocking(move || {
        cmd(&workdir)
            .args(["-q", "convert", "https://youtu.be/abc12345678"])
            .assert()
    })
    .await
    .unwrap();

    assert
        .failure()
        .stderr(predicate::str::contains("Failed to fetch video info"));
    assert_eq!(fake.metadata_requests().len(), 1);
    assert!(fake.token_requests().is_empty());
}
