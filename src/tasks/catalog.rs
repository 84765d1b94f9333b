//! Catalog task: owns directory scanning for the lifetime of the run.
//!
//! Performs the startup scan, then serves rescan requests (the reload key)
//! until cancelled. Every scan rebuilds the list from scratch; the viewer
//! resets its playback position when the fresh catalog arrives.

use anyhow::Result;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::catalog::{scan_media, shuffle_items};
use crate::config::Configuration;
use crate::events::{CatalogRefreshed, RescanRequest};

#[instrument(
    skip(cfg, rescan_rx, to_viewer, cancel),
    fields(dir = %cfg.ads_directory.display())
)]
pub async fn run(
    cfg: Configuration,
    mut rescan_rx: Receiver<RescanRequest>,
    to_viewer: Sender<CatalogRefreshed>,
    cancel: CancellationToken,
) -> Result<()> {
    publish_scan(&cfg, &to_viewer).await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("cancel received; exiting catalog task");
                break;
            }
            maybe_req = rescan_rx.recv() => match maybe_req {
                Some(RescanRequest) => publish_scan(&cfg, &to_viewer).await,
                None => break,
            }
        }
    }
    Ok(())
}

async fn publish_scan(cfg: &Configuration, to_viewer: &Sender<CatalogRefreshed>) {
    let mut items = scan_media(&cfg.ads_directory);
    if cfg.shuffle_ads {
        let mut rng = rand::rng();
        shuffle_items(&mut items, &mut rng);
    }
    info!(
        discovered = items.len(),
        shuffled = cfg.shuffle_ads,
        "media scan complete"
    );
    let _ = to_viewer.send(CatalogRefreshed(items)).await;
}
