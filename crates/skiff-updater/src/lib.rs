//! Update coordination for the Skiff shell.
//!
//! This crate reconciles two independent signals about whether a newer
//! release exists — the managed updater's lifecycle stream and a direct
//! release-metadata probe — into one consistent status stream for the UI:
//! - Tolerant version-tag comparison.
//! - A deadline-bounded probe of the release feed.
//! - The coordinator state machine with its check/install commands.
//! - The status channel the renderer subscribes to.

pub mod channel;
pub mod coordinator;
pub mod feed;
pub mod managed;
pub mod probe;
pub mod status;
pub mod version;

/// Fixed repository the shell updates from.
pub const UPDATE_REPO_OWNER: &str = "skiff-shell";
pub const UPDATE_REPO_NAME: &str = "skiff";

/// Status sink and subscription guard.
pub use channel::{StatusChannel, Subscription};
/// Coordinator state machine and its last-check record.
pub use coordinator::{CheckRecord, UpdateCoordinator};
/// Production managed updater backed by the release feed.
pub use feed::FeedUpdater;
/// Managed updater seam and lifecycle event vocabulary.
pub use managed::{ManagedEvent, ManagedUpdateError, ManagedUpdater, ReleaseInfo};
/// Bounded release-metadata probe.
pub use probe::{DEFAULT_PROBE_TIMEOUT, ReleaseProbe};
/// Status vocabulary shared with the renderer.
pub use status::{DebugFlags, StatusDetail, UpdateReport, UpdateState};
