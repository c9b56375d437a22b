//! Headless host for the Skiff shell.
//!
//! The renderer process is an external collaborator; this host speaks to its
//! bridge over stdio. Update statuses go out as JSON lines on stdout, and
//! commands come in as lines on stdin: `check`, `install`, `quit`.

mod logging;

use std::sync::Arc;

use log::{error, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};

use skiff_platform::{AppPaths, RuntimeMode};
use skiff_updater::{
    DEFAULT_PROBE_TIMEOUT, FeedUpdater, ManagedUpdater, ReleaseProbe, StatusChannel, StatusDetail,
    UPDATE_REPO_NAME, UPDATE_REPO_OWNER, UpdateCoordinator, UpdateReport, UpdateState,
};

const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    let mode = RuntimeMode::detect();
    logging::init();
    info!(
        "skiff {CURRENT_VERSION} starting (packaged: {}, dev: {})",
        mode.packaged, mode.dev
    );

    let client = match reqwest::Client::builder().user_agent("skiff").build() {
        Ok(client) => client,
        Err(err) => {
            eprintln!("failed to build HTTP client: {err}");
            return;
        }
    };

    let update_cache = match AppPaths::new() {
        Ok(paths) => {
            let _ = paths.ensure_dirs();
            paths.update_cache_dir()
        }
        Err(err) => {
            warn!("falling back to temp dir for update cache: {err}");
            std::env::temp_dir().join("skiff-updates")
        }
    };

    let probe = ReleaseProbe::new(client.clone(), UPDATE_REPO_OWNER, UPDATE_REPO_NAME);
    let feed = Arc::new(FeedUpdater::new(
        client,
        UPDATE_REPO_OWNER,
        UPDATE_REPO_NAME,
        CURRENT_VERSION,
        update_cache,
    ));
    let coordinator = UpdateCoordinator::new(
        mode,
        CURRENT_VERSION,
        probe,
        DEFAULT_PROBE_TIMEOUT,
        feed as Arc<dyn ManagedUpdater>,
        StatusChannel::new(),
    );
    let _bridge = coordinator.start_event_bridge();

    // Statuses cross from the async side to the synchronous stdout writer in
    // emission order.
    let (status_tx, status_rx) = crossbeam_channel::unbounded::<UpdateReport>();
    let subscription = coordinator.subscribe(move |report| {
        let _ = status_tx.send(report.clone());
    });
    let writer = std::thread::spawn(move || {
        for report in status_rx {
            match serde_json::to_string(&report) {
                Ok(line) => println!("{line}"),
                Err(err) => error!("failed to serialize status: {err}"),
            }
        }
    });

    if !mode.packaged {
        coordinator.status_channel().emit(
            UpdateState::Disabled,
            Some(StatusDetail::message(
                "Updates are available in packaged builds only.",
            )),
        );
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match line.trim() {
            "" => {}
            "check" => {
                let report = coordinator.check().await;
                info!("update check resolved: {:?}", report.state);
            }
            "install" => {
                let report = coordinator.install().await;
                if report.state == UpdateState::Installing {
                    info!("installer taking over, shutting down");
                    break;
                }
            }
            "quit" => break,
            other => warn!("ignoring unknown command: {other}"),
        }
    }

    drop(subscription);
    let _ = writer.join();
}
