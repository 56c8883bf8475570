use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::StatusCode;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use url::Url;

use condprof_domain::{Metadata, ProfileKey};

use super::archive::{extract_archive, file_sha256};

/// Overrides the artifact store root when no explicit URL is configured.
pub const STORE_URL_ENV: &str = "CONDPROF_STORE_URL";

pub(crate) const TRANSFER_ATTEMPTS: usize = 3;
pub(crate) const HTTP_TIMEOUT: Duration = Duration::from_secs(60);
const USER_AGENT: &str = concat!("condprof/", env!("CARGO_PKG_VERSION"));

/// Store failures the orchestrator branches on: only `NotFound` is
/// recoverable (it triggers the fresh-baseline fallback).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no artifact for {key}: never published, or past the retention window")]
    NotFound { key: ProfileKey },
    #[error("transport failure for {key}")]
    Transport {
        key: ProfileKey,
        #[source]
        source: reqwest::Error,
    },
    #[error("archive for {key} is not restorable")]
    Restore {
        key: ProfileKey,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to publish {key}")]
    Publish {
        key: ProfileKey,
        #[source]
        source: anyhow::Error,
    },
}

/// Receipt for one published archive. The previous latest stays resolvable
/// through the changelog, not through the store.
#[derive(Debug, Clone, Serialize)]
pub struct PublishReceipt {
    pub url: String,
    pub size: u64,
    pub sha256: String,
}

/// Client for the remote archive store. Artifacts are keyed by
/// `<platform>/<archive name>`; publishing under an existing key supersedes
/// the previous latest.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    root: Url,
    client: reqwest::Client,
}

impl ProfileStore {
    pub fn new(root: Url) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("failed to build http client")?;
        Ok(Self { root, client })
    }

    /// Build a client from `CONDPROF_STORE_URL` when set, else `None`
    /// (store-less runs archive locally and skip publishing).
    pub fn from_env() -> Result<Option<Self>> {
        match std::env::var(STORE_URL_ENV) {
            Ok(raw) if !raw.trim().is_empty() => {
                let root = Url::parse(raw.trim())
                    .with_context(|| format!("invalid {STORE_URL_ENV}: {raw}"))?;
                Ok(Some(Self::new(root)?))
            }
            _ => Ok(None),
        }
    }

    pub fn root(&self) -> &Url {
        &self.root
    }

    fn artifact_url(&self, key: &ProfileKey) -> Result<Url> {
        let mut url = self.root.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow!("store root {} cannot carry paths", self.root))?
            .pop_if_empty()
            .push(&key.platform)
            .push(&key.archive_name());
        Ok(url)
    }

    /// Fetch the most recently published archive for `key` and extract it
    /// into `dest` as a usable profile directory.
    pub async fn fetch(&self, key: &ProfileKey, dest: &Path) -> Result<(), StoreError> {
        let url = self
            .artifact_url(key)
            .map_err(|source| StoreError::Restore {
                key: key.clone(),
                source,
            })?;
        let bytes = self.download(key, &url).await?;
        info!(%url, size = bytes.len(), "fetched profile archive");

        let restore = |source: anyhow::Error| StoreError::Restore {
            key: key.clone(),
            source,
        };
        fs::create_dir_all(dest)
            .with_context(|| format!("failed to create {}", dest.display()))
            .map_err(restore)?;
        let mut tmp = NamedTempFile::new().map_err(|err| restore(err.into()))?;
        tmp.write_all(&bytes).map_err(|err| restore(err.into()))?;
        extract_archive(tmp.path(), dest).map_err(restore)?;
        // An archive is only valid for restore with its embedded metadata.
        Metadata::read(dest).map_err(restore)?;
        Ok(())
    }

    /// Upload a fully written archive, making it the new latest for `key`.
    pub async fn publish(
        &self,
        key: &ProfileKey,
        archive: &Path,
    ) -> Result<PublishReceipt, StoreError> {
        let publish = |source: anyhow::Error| StoreError::Publish {
            key: key.clone(),
            source,
        };
        let url = self.artifact_url(key).map_err(publish)?;
        let bytes = fs::read(archive)
            .with_context(|| format!("failed to read {}", archive.display()))
            .map_err(publish)?;
        let sha256 = file_sha256(archive).map_err(publish)?;

        let mut last_err = None;
        for attempt in 1..=TRANSFER_ATTEMPTS {
            let response = self
                .client
                .put(url.clone())
                .body(bytes.clone())
                .send()
                .await
                .and_then(reqwest::Response::error_for_status);
            match response {
                Ok(_) => {
                    info!(%url, size = bytes.len(), "published profile archive");
                    return Ok(PublishReceipt {
                        url: url.to_string(),
                        size: bytes.len() as u64,
                        sha256,
                    });
                }
                Err(err) => {
                    warn!(%url, attempt, %err, "publish attempt failed");
                    last_err = Some(err);
                }
            }
        }
        Err(StoreError::Transport {
            key: key.clone(),
            source: last_err.expect("at least one publish attempt"),
        })
    }

    async fn download(&self, key: &ProfileKey, url: &Url) -> Result<Vec<u8>, StoreError> {
        let mut last_err = None;
        for attempt in 1..=TRANSFER_ATTEMPTS {
            match self.download_once(url).await {
                Ok(Some(bytes)) => return Ok(bytes),
                Ok(None) => {
                    debug!(%url, "no artifact at key");
                    return Err(StoreError::NotFound { key: key.clone() });
                }
                Err(err) => {
                    warn!(%url, attempt, %err, "fetch attempt failed");
                    last_err = Some(err);
                }
            }
        }
        Err(StoreError::Transport {
            key: key.clone(),
            source: last_err.expect("at least one fetch attempt"),
        })
    }

    /// One GET. `Ok(None)` marks a definitive miss (absent key or expired
    /// retention); transport and server errors are retried by the caller.
    async fn download_once(&self, url: &Url) -> Result<Option<Vec<u8>>, reqwest::Error> {
        let response = self.client.get(url.clone()).send().await?;
        if matches!(response.status(), StatusCode::NOT_FOUND | StatusCode::GONE) {
            return Ok(None);
        }
        let response = response.error_for_status()?;
        Ok(Some(response.bytes().await?.to_vec()))
    }
}
