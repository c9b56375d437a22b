//! Seam for the managed update channel.
//!
//! The coordinator only sees this trait: a lifecycle event stream plus the
//! check and install-and-relaunch primitives. The production implementation
//! is [`crate::feed::FeedUpdater`]; tests substitute their own.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Release metadata attached to availability events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseInfo {
    pub version: String,
    pub release_name: Option<String>,
    pub release_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagedEvent {
    Checking,
    Available(ReleaseInfo),
    NotAvailable(ReleaseInfo),
    DownloadProgress {
        percent: u8,
        transferred: u64,
        total: u64,
    },
    Downloaded {
        version: String,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Error)]
pub enum ManagedUpdateError {
    #[error("{context}: {source}")]
    Http {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{context}: {source}")]
    Zip {
        context: &'static str,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("{0}")]
    Invalid(String),
}

impl ManagedUpdateError {
    pub(crate) fn http(context: &'static str, source: reqwest::Error) -> Self {
        Self::Http { context, source }
    }

    pub(crate) fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub(crate) fn zip(context: &'static str, source: zip::result::ZipError) -> Self {
        Self::Zip { context, source }
    }
}

#[async_trait]
pub trait ManagedUpdater: Send + Sync {
    /// Subscribe to the updater's lifecycle events. Every call returns an
    /// independent stream; events are fanned out to all of them.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<ManagedEvent>;

    /// Run the updater's own check-and-download cycle. Availability,
    /// progress, and failure all also surface on the event stream.
    async fn check_for_updates(&self) -> Result<(), ManagedUpdateError>;

    /// Apply a previously downloaded update and relaunch.
    async fn quit_and_install(&self) -> Result<(), ManagedUpdateError>;
}
