//! Production managed updater backed by the release feed.
//!
//! Auto-download semantics: a successful check that finds a newer release
//! immediately downloads the platform asset into the update cache, streaming
//! progress events, and only reports `Downloaded` once the asset's published
//! sha256 digest has been verified. Install extracts the archive, replaces
//! the running executable, and relaunches.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use crate::managed::{ManagedEvent, ManagedUpdateError, ManagedUpdater, ReleaseInfo};
use crate::probe::{DEFAULT_API_BASE, USER_AGENT};
use crate::version;

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
    pub size: u64,
    #[serde(default)]
    pub digest: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

struct DownloadedArtifact {
    version: String,
    archive: PathBuf,
}

pub struct FeedUpdater {
    owner: String,
    repo: String,
    base_url: String,
    http: reqwest::Client,
    current_version: String,
    cache_dir: PathBuf,
    listeners: Mutex<Vec<mpsc::UnboundedSender<ManagedEvent>>>,
    downloaded: Mutex<Option<DownloadedArtifact>>,
}

impl FeedUpdater {
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        owner: &str,
        repo: &str,
        current_version: &str,
        cache_dir: PathBuf,
    ) -> Self {
        Self::with_base_url(http, owner, repo, current_version, cache_dir, None)
    }

    #[must_use]
    pub fn with_base_url(
        http: reqwest::Client,
        owner: &str,
        repo: &str,
        current_version: &str,
        cache_dir: PathBuf,
        base_url: Option<&str>,
    ) -> Self {
        Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            base_url: base_url
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(DEFAULT_API_BASE)
                .trim_end_matches('/')
                .to_string(),
            http,
            current_version: current_version.to_string(),
            cache_dir,
            listeners: Mutex::new(Vec::new()),
            downloaded: Mutex::new(None),
        }
    }

    fn emit(&self, event: &ManagedEvent) {
        let mut listeners = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }

    async fn fetch_latest_release(&self) -> Result<Release, ManagedUpdateError> {
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
            .map_err(|error| ManagedUpdateError::http("release feed request failed", error))?;

        if !response.status().is_success() {
            return Err(ManagedUpdateError::Invalid(format!(
                "release feed returned HTTP {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|error| ManagedUpdateError::http("release feed response parse failed", error))
    }

    async fn run_check(&self) -> Result<(), ManagedUpdateError> {
        let release = self.fetch_latest_release().await?;
        let info = ReleaseInfo {
            version: release.tag_name.clone(),
            release_name: release.name.clone(),
            release_date: release.published_at.clone(),
        };

        if !version::is_newer(&release.tag_name, &self.current_version) {
            self.emit(&ManagedEvent::NotAvailable(info));
            return Ok(());
        }

        self.emit(&ManagedEvent::Available(info));
        let artifact = self.download_release(&release).await?;
        let downloaded_version = artifact.version.clone();
        *self
            .downloaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(artifact);
        self.emit(&ManagedEvent::Downloaded {
            version: downloaded_version,
        });
        Ok(())
    }

    async fn download_release(
        &self,
        release: &Release,
    ) -> Result<DownloadedArtifact, ManagedUpdateError> {
        let asset_name = expected_asset_name(&release.tag_name).ok_or_else(|| {
            ManagedUpdateError::Invalid("no update asset published for this platform".to_string())
        })?;
        let asset = release
            .assets
            .iter()
            .find(|a| a.name == asset_name)
            .ok_or_else(|| {
                ManagedUpdateError::Invalid(format!(
                    "release {} has no asset named {asset_name}",
                    release.tag_name
                ))
            })?;

        std::fs::create_dir_all(&self.cache_dir)
            .map_err(|error| ManagedUpdateError::io("failed to create update cache", error))?;
        let dest = self.cache_dir.join(&asset.name);

        log::info!("downloading update asset {} ({} bytes)", asset.name, asset.size);
        self.download_asset(asset, &dest).await?;
        verify_digest(asset, &dest)?;

        Ok(DownloadedArtifact {
            version: release.tag_name.clone(),
            archive: dest,
        })
    }

    async fn download_asset(
        &self,
        asset: &ReleaseAsset,
        dest: &Path,
    ) -> Result<(), ManagedUpdateError> {
        let response = self
            .http
            .get(&asset.browser_download_url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .map_err(|error| ManagedUpdateError::http("asset download request failed", error))?;

        if !response.status().is_success() {
            return Err(ManagedUpdateError::Invalid(format!(
                "asset download failed with HTTP {}",
                response.status()
            )));
        }

        let total = response.content_length().unwrap_or(asset.size);
        let mut transferred: u64 = 0;

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|error| ManagedUpdateError::io("failed to create download file", error))?;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|error| ManagedUpdateError::http("asset download stream error", error))?;
            file.write_all(&chunk)
                .await
                .map_err(|error| ManagedUpdateError::io("failed to write download data", error))?;
            transferred += chunk.len() as u64;
            self.emit(&ManagedEvent::DownloadProgress {
                percent: percent_of(transferred, total),
                transferred,
                total,
            });
        }

        file.flush()
            .await
            .map_err(|error| ManagedUpdateError::io("failed to flush download file", error))?;
        Ok(())
    }
}

#[async_trait]
impl ManagedUpdater for FeedUpdater {
    fn subscribe(&self) -> mpsc::UnboundedReceiver<ManagedEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    async fn check_for_updates(&self) -> Result<(), ManagedUpdateError> {
        self.emit(&ManagedEvent::Checking);
        match self.run_check().await {
            Ok(()) => Ok(()),
            Err(error) => {
                self.emit(&ManagedEvent::Error {
                    message: error.to_string(),
                });
                Err(error)
            }
        }
    }

    async fn quit_and_install(&self) -> Result<(), ManagedUpdateError> {
        let (archive, installed_version) = {
            let downloaded = self
                .downloaded
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let artifact = downloaded.as_ref().ok_or_else(|| {
                ManagedUpdateError::Invalid("no downloaded update to install".to_string())
            })?;
            (artifact.archive.clone(), artifact.version.clone())
        };

        let staging = tempfile::tempdir_in(&self.cache_dir)
            .map_err(|error| ManagedUpdateError::io("failed to create staging directory", error))?;
        let binary = extract_artifact(&archive, staging.path())?;

        self_replace::self_replace(&binary)
            .map_err(|error| ManagedUpdateError::io("failed to replace current executable", error))?;
        relaunch()?;

        self.downloaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        log::info!("update {installed_version} applied, relaunching");
        Ok(())
    }
}

/// Release asset name for the running platform, or `None` when no asset is
/// published for it.
#[must_use]
pub fn expected_asset_name(tag: &str) -> Option<String> {
    let version = tag.strip_prefix(['v', 'V']).unwrap_or(tag);
    let name = if cfg!(target_os = "macos") && cfg!(target_arch = "aarch64") {
        format!("skiff-{version}-macos-arm64.zip")
    } else if cfg!(target_os = "macos") && cfg!(target_arch = "x86_64") {
        format!("skiff-{version}-macos-x64.zip")
    } else if cfg!(target_os = "linux") && cfg!(target_arch = "x86_64") {
        format!("skiff-{version}-linux-x64.zip")
    } else if cfg!(target_os = "linux") && cfg!(target_arch = "aarch64") {
        format!("skiff-{version}-linux-arm64.zip")
    } else if cfg!(target_os = "windows") && cfg!(target_arch = "x86_64") {
        format!("skiff-{version}-windows-x64.zip")
    } else {
        return None;
    };
    Some(name)
}

fn percent_of(transferred: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    u8::try_from(transferred.saturating_mul(100) / total).unwrap_or(100)
}

fn parse_sha256_digest(digest: &str) -> Option<String> {
    let (algorithm, hash) = digest.split_once(':')?;
    if !algorithm.eq_ignore_ascii_case("sha256") {
        return None;
    }
    if hash.len() != 64 || !hash.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return None;
    }
    Some(hash.to_ascii_lowercase())
}

fn verify_digest(asset: &ReleaseAsset, path: &Path) -> Result<(), ManagedUpdateError> {
    let Some(expected) = asset.digest.as_deref().and_then(parse_sha256_digest) else {
        let _ = std::fs::remove_file(path);
        return Err(ManagedUpdateError::Invalid(format!(
            "missing sha256 digest for {}; refusing unverified update",
            asset.name
        )));
    };

    let actual = sha256_file(path)?;
    if actual.eq_ignore_ascii_case(&expected) {
        log::info!("update digest verified for {}", asset.name);
        Ok(())
    } else {
        let _ = std::fs::remove_file(path);
        Err(ManagedUpdateError::Invalid(format!(
            "digest mismatch for {}; download discarded",
            asset.name
        )))
    }
}

fn sha256_file(path: &Path) -> Result<String, ManagedUpdateError> {
    let mut file = std::fs::File::open(path)
        .map_err(|error| ManagedUpdateError::io("failed to open file for checksum", error))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0_u8; 8192];

    loop {
        let read = file
            .read(&mut buffer)
            .map_err(|error| ManagedUpdateError::io("failed to read file for checksum", error))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Extract the downloaded archive and locate the shell binary inside it.
fn extract_artifact(archive: &Path, dest: &Path) -> Result<PathBuf, ManagedUpdateError> {
    let file = std::fs::File::open(archive)
        .map_err(|error| ManagedUpdateError::io("failed to open update archive", error))?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|error| ManagedUpdateError::zip("failed to read update archive", error))?;

    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|error| ManagedUpdateError::zip("failed to read archive entry", error))?;
        let Some(name) = entry.enclosed_name() else {
            log::warn!("skipping archive entry with unsafe path");
            continue;
        };
        let out_path = dest.join(name);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|error| {
                ManagedUpdateError::io("failed to create extraction directory", error)
            })?;
        } else {
            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent).map_err(|error| {
                    ManagedUpdateError::io("failed to create extraction parent", error)
                })?;
            }
            let mut outfile = std::fs::File::create(&out_path).map_err(|error| {
                ManagedUpdateError::io("failed to create extracted file", error)
            })?;
            std::io::copy(&mut entry, &mut outfile).map_err(|error| {
                ManagedUpdateError::io("failed to extract archive entry", error)
            })?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Some(mode) = entry.unix_mode() {
                    let _ =
                        std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode));
                }
            }
        }
    }

    find_binary(dest).ok_or_else(|| {
        ManagedUpdateError::Invalid(format!(
            "no '{BINARY_NAME}' binary found in the update archive"
        ))
    })
}

#[cfg(windows)]
const BINARY_NAME: &str = "skiff.exe";
#[cfg(not(windows))]
const BINARY_NAME: &str = "skiff";

fn find_binary(dir: &Path) -> Option<PathBuf> {
    let direct = dir.join(BINARY_NAME);
    if direct.is_file() {
        return Some(direct);
    }
    for entry in std::fs::read_dir(dir).ok()?.flatten() {
        let path = entry.path();
        if path.is_dir()
            && let Some(found) = find_binary(&path)
        {
            return Some(found);
        }
    }
    None
}

fn relaunch() -> Result<(), ManagedUpdateError> {
    let exe = std::env::current_exe()
        .map_err(|error| ManagedUpdateError::io("failed to resolve current executable", error))?;

    // After self_replace on Linux, /proc/self/exe points at the old deleted
    // inode and current_exe() carries a " (deleted)" suffix.
    #[cfg(target_os = "linux")]
    let exe = {
        let path_str = exe.to_string_lossy();
        if path_str.ends_with(" (deleted)") {
            PathBuf::from(path_str.trim_end_matches(" (deleted)"))
        } else {
            exe
        }
    };

    log::info!("relaunching from {}", exe.display());
    std::process::Command::new(&exe)
        .spawn()
        .map_err(|error| ManagedUpdateError::io("failed to relaunch", error))?;
    Ok(())
}
