use std::fs;
use std::time::Duration;

use signage_player::config::Configuration;
use signage_player::events::{CatalogRefreshed, RescanRequest};
use signage_player::tasks;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

fn names(refreshed: &CatalogRefreshed) -> Vec<String> {
    let mut names: Vec<String> = refreshed
        .0
        .iter()
        .map(|item| item.path.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn startup_scan_reaches_the_viewer() {
    let tmp = tempdir().unwrap();
    for name in ["a.jpg", "b.mp4", "skip.txt"] {
        fs::write(tmp.path().join(name), b"x").unwrap();
    }

    let cfg = Configuration {
        ads_directory: tmp.path().to_path_buf(),
        ..Configuration::default()
    };
    let cancel = CancellationToken::new();
    let (catalog_tx, mut catalog_rx) = tokio::sync::mpsc::channel(4);
    let (_rescan_tx, rescan_rx) = tokio::sync::mpsc::channel::<RescanRequest>(4);

    let task = tokio::spawn(tasks::catalog::run(
        cfg,
        rescan_rx,
        catalog_tx,
        cancel.clone(),
    ));

    let refreshed = tokio::time::timeout(Duration::from_secs(5), catalog_rx.recv())
        .await
        .expect("startup scan should arrive promptly")
        .expect("channel should stay open");
    assert_eq!(names(&refreshed), vec!["a.jpg", "b.mp4"]);

    cancel.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rescan_request_picks_up_new_files() {
    let tmp = tempdir().unwrap();
    fs::write(tmp.path().join("first.png"), b"x").unwrap();

    let cfg = Configuration {
        ads_directory: tmp.path().to_path_buf(),
        ..Configuration::default()
    };
    let cancel = CancellationToken::new();
    let (catalog_tx, mut catalog_rx) = tokio::sync::mpsc::channel(4);
    let (rescan_tx, rescan_rx) = tokio::sync::mpsc::channel(4);

    let task = tokio::spawn(tasks::catalog::run(
        cfg,
        rescan_rx,
        catalog_tx,
        cancel.clone(),
    ));

    let initial = tokio::time::timeout(Duration::from_secs(5), catalog_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(names(&initial), vec!["first.png"]);

    fs::write(tmp.path().join("second.mkv"), b"x").unwrap();
    rescan_tx.send(RescanRequest).await.unwrap();

    let refreshed = tokio::time::timeout(Duration::from_secs(5), catalog_rx.recv())
        .await
        .expect("rescan result should arrive promptly")
        .expect("channel should stay open");
    assert_eq!(names(&refreshed), vec!["first.png", "second.mkv"]);

    cancel.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_directory_yields_an_empty_catalog() {
    let tmp = tempdir().unwrap();
    let cfg = Configuration {
        ads_directory: tmp.path().join("never-created"),
        ..Configuration::default()
    };
    let cancel = CancellationToken::new();
    let (catalog_tx, mut catalog_rx) = tokio::sync::mpsc::channel(4);
    let (_rescan_tx, rescan_rx) = tokio::sync::mpsc::channel::<RescanRequest>(4);

    let task = tokio::spawn(tasks::catalog::run(
        cfg,
        rescan_rx,
        catalog_tx,
        cancel.clone(),
    ));

    let refreshed = tokio::time::timeout(Duration::from_secs(5), catalog_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(refreshed.0.is_empty());

    cancel.cancel();
    task.await.unwrap().unwrap();
}
