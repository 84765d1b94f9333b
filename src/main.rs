use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use clap::Parser;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use signage_player::config::Configuration;
use signage_player::render::viewer;
use signage_player::tasks;

/// Fullscreen slideshow player for a flat directory of images and videos.
#[derive(Parser, Debug)]
#[command(name = "signage-player", version, about)]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Override the per-item display duration, in seconds.
    #[arg(short, long)]
    duration: Option<f64>,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) {
    let default_directive = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let duration_override = args
        .duration
        .map(|secs| -> Result<Duration> {
            ensure!(
                secs > 0.0 && secs.is_finite(),
                "--duration must be a positive number of seconds"
            );
            Ok(Duration::from_secs_f64(secs))
        })
        .transpose()?;

    let cfg = Configuration::load_or_default(&args.config);
    info!(
        config = %args.config.display(),
        dir = %cfg.ads_directory.display(),
        "starting signage player"
    );

    let cancel = CancellationToken::new();
    let (catalog_tx, catalog_rx) = tokio::sync::mpsc::channel(4);
    let (rescan_tx, rescan_rx) = tokio::sync::mpsc::channel(4);

    let mut tasks_set = JoinSet::new();
    tasks_set.spawn(tasks::catalog::run(
        cfg.clone(),
        rescan_rx,
        catalog_tx,
        cancel.clone(),
    ));

    spawn_signal_handlers(&cancel);

    // The event loop must own the main thread; background tasks run on the
    // tokio workers until the viewer returns.
    let viewer_result = viewer::run_windowed(
        cfg,
        duration_override,
        catalog_rx,
        rescan_tx,
        cancel.clone(),
    );

    cancel.cancel();
    while let Some(joined) = tasks_set.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!("background task failed: {err:#}"),
            Err(err) if err.is_cancelled() => {}
            Err(err) => error!("background task panicked: {err}"),
        }
    }

    viewer_result.context("playback loop failed")
}

fn spawn_signal_handlers(cancel: &CancellationToken) {
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("ctrl-c received; shutting down");
                cancel.cancel();
            }
        });
    }

    #[cfg(unix)]
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    term.recv().await;
                    info!("SIGTERM received; shutting down");
                    cancel.cancel();
                }
                Err(err) => warn!("failed to install SIGTERM handler: {err}"),
            }
        });
    }
}
