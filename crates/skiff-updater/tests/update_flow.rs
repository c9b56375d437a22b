//! End-to-end flow: probe + feed updater + coordinator wired together
//! against one mock release feed, the way the host assembles them.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use sha2::{Digest, Sha256};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use skiff_platform::RuntimeMode;
use skiff_updater::feed::expected_asset_name;
use skiff_updater::{
    FeedUpdater, ManagedUpdater, ReleaseProbe, StatusChannel, UpdateCoordinator, UpdateReport,
    UpdateState,
};

const PROBE_TIMEOUT: Duration = Duration::from_millis(2000);

struct Shell {
    coordinator: UpdateCoordinator,
    statuses: Arc<Mutex<Vec<UpdateReport>>>,
    _subscription: skiff_updater::Subscription,
    _cache: tempfile::TempDir,
}

fn assemble(server: &MockServer, current_version: &str) -> Shell {
    let client = reqwest::Client::new();
    let cache = tempfile::tempdir().expect("update cache tempdir should be created");
    let probe = ReleaseProbe::with_base_url(
        client.clone(),
        "skiff-shell",
        "skiff",
        Some(&server.uri()),
    );
    let feed = Arc::new(FeedUpdater::with_base_url(
        client,
        "skiff-shell",
        "skiff",
        current_version,
        cache.path().to_path_buf(),
        Some(&server.uri()),
    ));
    let coordinator = UpdateCoordinator::new(
        RuntimeMode::from_parts(true, false, false),
        current_version,
        probe,
        PROBE_TIMEOUT,
        feed as Arc<dyn ManagedUpdater>,
        StatusChannel::new(),
    );
    coordinator
        .start_event_bridge()
        .expect("packaged builds should start the event bridge");

    let statuses = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&statuses);
    let subscription = coordinator.subscribe(move |report| {
        sink.lock()
            .expect("status sink lock should not be poisoned")
            .push(report.clone());
    });

    Shell {
        coordinator,
        statuses,
        _subscription: subscription,
        _cache: cache,
    }
}

fn states(shell: &Shell) -> Vec<UpdateState> {
    shell
        .statuses
        .lock()
        .expect("status sink lock should not be poisoned")
        .iter()
        .map(|report| report.state)
        .collect()
}

#[tokio::test]
async fn conflicting_sources_resolve_to_a_single_available_notification() {
    let server = MockServer::start().await;

    // The probe sees a newer release; by the time the managed feed re-reads
    // the endpoint the release was yanked back to the running version. Its
    // contradictory not-available must not reach the UI for this cycle.
    Mock::given(method("GET"))
        .and(path("/repos/skiff-shell/skiff/releases/latest"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "tag_name": "3.0.0" })),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/skiff-shell/skiff/releases/latest"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "tag_name": "2.0.0" })),
        )
        .mount(&server)
        .await;

    let shell = assemble(&server, "2.0.0");
    let report = shell.coordinator.check().await;
    assert_eq!(report.state, UpdateState::Available);

    // Let the fire-and-forget managed check and the event bridge drain.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let seen = states(&shell);
    assert_eq!(
        seen.iter()
            .filter(|state| **state == UpdateState::Available)
            .count(),
        1,
        "expected exactly one available notification, got {seen:?}"
    );
    assert!(
        !seen.contains(&UpdateState::NotAvailable),
        "the managed feed's not-available must be suppressed, got {seen:?}"
    );
    assert!(shell.coordinator.last_check().is_newer);
}

#[tokio::test]
async fn agreeing_sources_drive_the_full_download_lifecycle() {
    let Some(asset_name) = expected_asset_name("3.0.0") else {
        return; // no release asset published for this platform
    };
    let server = MockServer::start().await;
    let payload = b"release binary payload".to_vec();
    let digest = format!("sha256:{:x}", Sha256::digest(&payload));

    Mock::given(method("GET"))
        .and(path("/repos/skiff-shell/skiff/releases/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "tag_name": "3.0.0",
            "name": "Skiff 3.0.0",
            "published_at": "2026-06-01T09:00:00Z",
            "assets": [{
                "name": asset_name.clone(),
                "browser_download_url": format!("{}/assets/{asset_name}", server.uri()),
                "size": payload.len(),
                "digest": digest,
            }],
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/assets/{asset_name}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload))
        .mount(&server)
        .await;

    let shell = assemble(&server, "2.0.0");
    let report = shell.coordinator.check().await;
    assert_eq!(report.state, UpdateState::Available);

    tokio::time::sleep(Duration::from_millis(500)).await;

    let seen = states(&shell);
    let expected_tail = [
        UpdateState::Checking,
        UpdateState::Available,
        UpdateState::DownloadProgress,
        UpdateState::Downloaded,
    ];
    let mut cursor = seen.iter();
    for expected in expected_tail {
        assert!(
            cursor.any(|state| *state == expected),
            "missing {expected:?} in bridged lifecycle, got {seen:?}"
        );
    }

    let downloaded = shell
        .statuses
        .lock()
        .expect("status sink lock should not be poisoned")
        .iter()
        .find(|report| report.state == UpdateState::Downloaded)
        .cloned()
        .expect("a downloaded status should have been emitted");
    assert_eq!(
        downloaded.detail.and_then(|d| d.version),
        Some("3.0.0".to_string())
    );
}
