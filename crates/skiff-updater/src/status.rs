//! Status vocabulary shared with the renderer.
//!
//! `UpdateReport` is both the message emitted on the status channel and the
//! return shape of the `check`/`install` commands. Detail fields are all
//! optional and omitted from the wire when absent.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateState {
    Checking,
    Available,
    AvailableDev,
    NotAvailable,
    Disabled,
    DownloadProgress,
    Downloaded,
    Error,
    Debug,
    /// Returned by the install command on a packaged build; never emitted on
    /// the status channel.
    Installing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugFlags {
    #[serde(rename = "isDev")]
    pub is_dev: bool,
    #[serde(rename = "isPackaged")]
    pub is_packaged: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusDetail {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transferred: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// The running version, included for context on `not-available`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugFlags>,
}

impl StatusDetail {
    #[must_use]
    pub fn version(tag: impl Into<String>) -> Self {
        Self {
            version: Some(tag.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            message: Some(text.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateReport {
    pub state: UpdateState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<StatusDetail>,
}

impl UpdateReport {
    #[must_use]
    pub fn new(state: UpdateState, detail: Option<StatusDetail>) -> Self {
        Self { state, detail }
    }
}
