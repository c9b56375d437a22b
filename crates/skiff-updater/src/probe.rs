//! Bounded probe of the release-metadata endpoint.
//!
//! One GET against the latest-release route, with a hard deadline. Every
//! failure mode — transport error, non-2xx status, unparseable body, missing
//! tag — degrades to `None`: the probe reports absence of information, never
//! an error. The deadline wins over a late response: expiry drops the
//! in-flight request future, so the result settles exactly once and a slow
//! success can never surface after the timeout already resolved.

use std::time::Duration;

use serde::Deserialize;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(8000);
const MIN_PROBE_TIMEOUT: Duration = Duration::from_millis(1000);

pub(crate) const DEFAULT_API_BASE: &str = "https://api.github.com";
pub(crate) const USER_AGENT: &str = "skiff";

#[derive(Deserialize)]
struct LatestRelease {
    #[serde(default)]
    tag_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// Read-only client for the fixed release repository.
#[derive(Clone)]
pub struct ReleaseProbe {
    owner: String,
    repo: String,
    http: reqwest::Client,
    base_url: String,
}

impl ReleaseProbe {
    #[must_use]
    pub fn new(http: reqwest::Client, owner: &str, repo: &str) -> Self {
        Self::with_base_url(http, owner, repo, None)
    }

    /// Constructor with an overridable API base, for tests against a local
    /// mock server.
    #[must_use]
    pub fn with_base_url(
        http: reqwest::Client,
        owner: &str,
        repo: &str,
        base_url: Option<&str>,
    ) -> Self {
        Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            http,
            base_url: base_url
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(DEFAULT_API_BASE)
                .trim_end_matches('/')
                .to_string(),
        }
    }

    /// Fetch the latest release tag, or `None` if nothing trustworthy came
    /// back within the deadline. Deadlines below one second are clamped up.
    pub async fn latest_tag(&self, timeout: Duration) -> Option<String> {
        let deadline = timeout.max(MIN_PROBE_TIMEOUT);
        match tokio::time::timeout(deadline, self.request_latest_tag()).await {
            Ok(tag) => tag,
            Err(_elapsed) => {
                log::debug!(
                    "release probe for {}/{} timed out after {}ms",
                    self.owner,
                    self.repo,
                    deadline.as_millis()
                );
                None
            }
        }
    }

    async fn request_latest_tag(&self) -> Option<String> {
        let url = format!(
            "{}/repos/{}/{}/releases/latest",
            self.base_url, self.owner, self.repo
        );

        let response = self
            .http
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            log::debug!("release probe got HTTP {}", response.status());
            return None;
        }

        let release: LatestRelease = response.json().await.ok()?;
        release
            .tag_name
            .or(release.name)
            .filter(|tag| !tag.is_empty())
    }
}
