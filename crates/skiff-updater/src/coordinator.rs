//! Dual-source update coordination.
//!
//! Two independent producers — the managed updater's lifecycle stream and
//! the direct release probe — feed one reducer that owns the last check
//! outcome and decides what reaches the status channel. Check cycles carry a
//! monotonic number: a result arriving from a superseded cycle is dropped,
//! and the suppression of a redundant managed "not available" only applies
//! while the record that observed the newer release belongs to the latest
//! started cycle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::debug;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use skiff_platform::RuntimeMode;

use crate::channel::{StatusChannel, Subscription};
use crate::managed::{ManagedEvent, ManagedUpdater, ReleaseInfo};
use crate::probe::ReleaseProbe;
use crate::status::{DebugFlags, StatusDetail, UpdateReport, UpdateState};
use crate::version;

const SOURCE_PROBE: &str = "github";
const SOURCE_MANAGED: &str = "updater";
const CHECK_DISABLED_MESSAGE: &str = "Updates are available in packaged builds only.";
const INSTALL_DISABLED_MESSAGE: &str = "Install is disabled in dev builds.";

/// Last-known outcome of a check cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRecord {
    pub cycle: u64,
    pub is_newer: bool,
    pub version: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl CheckRecord {
    fn reset(cycle: u64) -> Self {
        Self {
            cycle,
            is_newer: false,
            version: None,
            checked_at: Utc::now(),
        }
    }
}

#[derive(Clone)]
pub struct UpdateCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    mode: RuntimeMode,
    current_version: String,
    probe: ReleaseProbe,
    probe_timeout: Duration,
    managed: Arc<dyn ManagedUpdater>,
    status: StatusChannel,
    record: Mutex<CheckRecord>,
    cycles: AtomicU64,
}

impl UpdateCoordinator {
    #[must_use]
    pub fn new(
        mode: RuntimeMode,
        current_version: &str,
        probe: ReleaseProbe,
        probe_timeout: Duration,
        managed: Arc<dyn ManagedUpdater>,
        status: StatusChannel,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                mode,
                current_version: current_version.to_string(),
                probe,
                probe_timeout,
                managed,
                status,
                record: Mutex::new(CheckRecord::reset(0)),
                cycles: AtomicU64::new(0),
            }),
        }
    }

    pub fn subscribe(
        &self,
        callback: impl Fn(&UpdateReport) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.status.subscribe(callback)
    }

    #[must_use]
    pub fn status_channel(&self) -> &StatusChannel {
        &self.inner.status
    }

    #[must_use]
    pub fn last_check(&self) -> CheckRecord {
        self.inner
            .record
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Start forwarding managed-updater lifecycle events onto the status
    /// channel. Only packaged builds run the managed channel, so this is a
    /// no-op elsewhere.
    pub fn start_event_bridge(&self) -> Option<JoinHandle<()>> {
        if !self.inner.mode.packaged {
            return None;
        }
        let inner = Arc::clone(&self.inner);
        let events = inner.managed.subscribe();
        Some(tokio::spawn(bridge_events(inner, events)))
    }

    /// Run one check cycle and return the final status. Intermediate
    /// statuses are emitted on the channel along the way; every fallible
    /// edge degrades internally, so this never fails the caller.
    pub async fn check(&self) -> UpdateReport {
        self.inner.check().await
    }

    /// Apply a downloaded update. Only meaningful after a `downloaded`
    /// status; failures come back as an `error` report, never a panic.
    pub async fn install(&self) -> UpdateReport {
        self.inner.install().await
    }
}

impl Inner {
    fn debug_flags(&self) -> DebugFlags {
        DebugFlags {
            is_dev: self.mode.dev,
            is_packaged: self.mode.packaged,
        }
    }

    async fn check(&self) -> UpdateReport {
        let flags = self.debug_flags();
        self.status.emit(
            UpdateState::Debug,
            Some(StatusDetail {
                debug: Some(flags),
                ..StatusDetail::default()
            }),
        );

        if self.mode.dev {
            return self.check_dev(flags).await;
        }
        if !self.mode.packaged {
            let detail = StatusDetail {
                message: Some(CHECK_DISABLED_MESSAGE.to_string()),
                debug: Some(flags),
                ..StatusDetail::default()
            };
            self.status.emit(UpdateState::Disabled, Some(detail.clone()));
            return UpdateReport::new(UpdateState::Disabled, Some(detail));
        }
        self.check_packaged().await
    }

    /// Dev builds only consult the probe; the managed channel never drives
    /// the primary decision here.
    async fn check_dev(&self, flags: DebugFlags) -> UpdateReport {
        self.status.emit(UpdateState::Checking, None);
        match self.probe.latest_tag(self.probe_timeout).await {
            Some(tag) => {
                let detail = StatusDetail {
                    version: Some(tag),
                    debug: Some(flags),
                    ..StatusDetail::default()
                };
                self.status
                    .emit(UpdateState::AvailableDev, Some(detail.clone()));
                UpdateReport::new(UpdateState::AvailableDev, Some(detail))
            }
            None => {
                let detail = StatusDetail {
                    debug: Some(flags),
                    ..StatusDetail::default()
                };
                self.status
                    .emit(UpdateState::NotAvailable, Some(detail.clone()));
                UpdateReport::new(UpdateState::NotAvailable, Some(detail))
            }
        }
    }

    async fn check_packaged(&self) -> UpdateReport {
        let cycle = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        self.write_record(CheckRecord::reset(cycle));
        self.status.emit(UpdateState::Checking, None);

        let tag = self.probe.latest_tag(self.probe_timeout).await;
        let is_newer = tag
            .as_deref()
            .is_some_and(|t| version::is_newer(t, &self.current_version));
        self.write_record(CheckRecord {
            cycle,
            is_newer,
            version: tag.clone(),
            checked_at: Utc::now(),
        });

        if is_newer {
            let detail = StatusDetail {
                version: tag,
                source: Some(SOURCE_PROBE.to_string()),
                ..StatusDetail::default()
            };
            self.status.emit(UpdateState::Available, Some(detail.clone()));
            self.trigger_managed_check();
            UpdateReport::new(UpdateState::Available, Some(detail))
        } else {
            let detail = StatusDetail {
                version: Some(tag.unwrap_or_default()),
                source: Some(SOURCE_PROBE.to_string()),
                current: Some(self.current_version.clone()),
                ..StatusDetail::default()
            };
            self.status
                .emit(UpdateState::NotAvailable, Some(detail.clone()));
            UpdateReport::new(UpdateState::NotAvailable, Some(detail))
        }
    }

    /// Fire-and-forget: the managed updater reports through its own event
    /// stream, so a failure here is logged and swallowed.
    fn trigger_managed_check(&self) {
        let managed = Arc::clone(&self.managed);
        tokio::spawn(async move {
            if let Err(error) = managed.check_for_updates().await {
                debug!("managed update check failed: {error}");
            }
        });
    }

    /// Record writes are last-cycle-wins: anything arriving from a
    /// superseded cycle is dropped so overlapping checks never merge state.
    fn write_record(&self, next: CheckRecord) {
        let mut record = self.record.lock().unwrap_or_else(PoisonError::into_inner);
        if next.cycle < record.cycle {
            debug!(
                "dropping update-check result from superseded cycle {}",
                next.cycle
            );
            return;
        }
        *record = next;
    }

    async fn install(&self) -> UpdateReport {
        if !self.mode.packaged {
            let detail = StatusDetail::message(INSTALL_DISABLED_MESSAGE);
            self.status.emit(UpdateState::Disabled, Some(detail.clone()));
            return UpdateReport::new(UpdateState::Disabled, Some(detail));
        }
        match self.managed.quit_and_install().await {
            Ok(()) => UpdateReport::new(UpdateState::Installing, None),
            Err(error) => {
                let detail = StatusDetail::message(error.to_string());
                self.status.emit(UpdateState::Error, Some(detail.clone()));
                UpdateReport::new(UpdateState::Error, Some(detail))
            }
        }
    }

    async fn forward_managed_event(&self, event: ManagedEvent) {
        match event {
            ManagedEvent::Checking => {
                let detail = StatusDetail {
                    source: Some(SOURCE_MANAGED.to_string()),
                    ..StatusDetail::default()
                };
                self.status.emit(UpdateState::Checking, Some(detail));
            }
            ManagedEvent::Available(info) => {
                self.status
                    .emit(UpdateState::Available, Some(release_detail(info)));
            }
            ManagedEvent::NotAvailable(info) => self.forward_not_available(info).await,
            ManagedEvent::DownloadProgress {
                percent,
                transferred,
                total,
            } => {
                let detail = StatusDetail {
                    percent: Some(percent),
                    transferred: Some(transferred),
                    total: Some(total),
                    ..StatusDetail::default()
                };
                self.status.emit(UpdateState::DownloadProgress, Some(detail));
            }
            ManagedEvent::Downloaded { version } => {
                self.status
                    .emit(UpdateState::Downloaded, Some(StatusDetail::version(version)));
            }
            ManagedEvent::Error { message } => {
                self.status
                    .emit(UpdateState::Error, Some(StatusDetail::message(message)));
            }
        }
    }

    async fn forward_not_available(&self, info: ReleaseInfo) {
        if self.mode.dev {
            // The cached record is stale by definition here; probe again and
            // report from the fresh result.
            match self.probe.latest_tag(self.probe_timeout).await {
                Some(tag) => {
                    self.status
                        .emit(UpdateState::AvailableDev, Some(StatusDetail::version(tag)));
                }
                None => self.status.emit(UpdateState::NotAvailable, None),
            }
            return;
        }

        if self.should_suppress_not_available() {
            debug!("suppressing managed not-available; probe already found a newer release");
            return;
        }
        self.status
            .emit(UpdateState::NotAvailable, Some(release_detail(info)));
    }

    fn should_suppress_not_available(&self) -> bool {
        let record = self.record.lock().unwrap_or_else(PoisonError::into_inner);
        record.is_newer && record.cycle == self.cycles.load(Ordering::SeqCst)
    }
}

fn release_detail(info: ReleaseInfo) -> StatusDetail {
    StatusDetail {
        version: Some(info.version),
        release_name: info.release_name,
        release_date: info.release_date,
        ..StatusDetail::default()
    }
}

async fn bridge_events(inner: Arc<Inner>, mut events: UnboundedReceiver<ManagedEvent>) {
    while let Some(event) = events.recv().await {
        inner.forward_managed_event(event).await;
    }
}
