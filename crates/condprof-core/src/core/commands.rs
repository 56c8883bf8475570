use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::json;
use url::Url;

use condprof_domain::{Changelog, Metadata, ProfileKey};

use super::archive::create_archive;
use super::outcome::ExecutionOutcome;
use super::store::{ProfileStore, StoreError, STORE_URL_ENV};

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub platform: String,
    pub scenario: String,
    pub customization: String,
    pub dest: PathBuf,
    pub store_url: Option<String>,
}

/// Download and extract the latest conditioned profile for a key. A miss
/// (never published, or expired) is a user-level condition, not a crash.
pub async fn fetch_profile(request: &FetchRequest) -> Result<ExecutionOutcome> {
    let store = match resolve_store(request.store_url.as_deref())? {
        Some(store) => store,
        None => {
            return Ok(ExecutionOutcome::user_error(
                "no artifact store configured",
                json!({ "hint": format!("Pass --store-url or set {STORE_URL_ENV}.") }),
            ))
        }
    };
    let key = ProfileKey::new(
        request.platform.clone(),
        request.scenario.clone(),
        request.customization.clone(),
    );
    match store.fetch(&key, &request.dest).await {
        Ok(()) => {
            let metadata = Metadata::read(&request.dest)?;
            Ok(ExecutionOutcome::success(
                format!("fetched conditioned profile {key}"),
                json!({
                    "dest": request.dest.display().to_string(),
                    "metadata": metadata,
                }),
            ))
        }
        Err(err @ StoreError::NotFound { .. }) => Ok(ExecutionOutcome::user_error(
            err.to_string(),
            json!({
                "key": key,
                "hint": "The first run for a new key starts from a fresh baseline instead.",
            }),
        )),
        Err(err) => Ok(ExecutionOutcome::failure(
            format!("{:#}", anyhow::Error::from(err)),
            json!({ "key": key }),
        )),
    }
}

fn resolve_store(explicit: Option<&str>) -> Result<Option<ProfileStore>> {
    match explicit {
        Some(raw) => {
            let root = Url::parse(raw).with_context(|| format!("invalid store url {raw}"))?;
            Ok(Some(ProfileStore::new(root)?))
        }
        None => ProfileStore::from_env(),
    }
}

#[derive(Debug, Clone)]
pub struct PackRequest {
    pub profile: PathBuf,
    pub archive_dir: PathBuf,
}

/// Package a profile directory into its deterministically named archive,
/// using the metadata embedded in the profile for the key.
pub fn pack_profile(request: &PackRequest) -> Result<ExecutionOutcome> {
    let metadata = match Metadata::read(&request.profile) {
        Ok(metadata) => metadata,
        Err(err) => {
            return Ok(ExecutionOutcome::user_error(
                format!(
                    "profile at {} has no readable metadata",
                    request.profile.display()
                ),
                json!({ "error": format!("{err:#}") }),
            ))
        }
    };
    let key = metadata.key();
    let dest = request.archive_dir.join(key.archive_name());
    let archive = create_archive(&request.profile, &dest)?;
    Ok(ExecutionOutcome::success(
        format!("packed {} ({} bytes)", key, archive.size),
        json!({ "archive": archive, "metadata": metadata }),
    ))
}

#[derive(Debug, Clone)]
pub struct HistoryRequest {
    pub platform: String,
    pub root: PathBuf,
    /// Unix seconds; when set, resolve the latest entry at or before it.
    pub before: Option<i64>,
}

/// Query a platform's changelog.
pub fn changelog_history(request: &HistoryRequest) -> Result<ExecutionOutcome> {
    let changelog = Changelog::new(&request.root, &request.platform);
    if let Some(when) = request.before {
        return Ok(match changelog.entry_at_or_before(when)? {
            Some(entry) => ExecutionOutcome::success(
                format!("profile state for {} as of {when}", request.platform),
                json!({ "entry": entry }),
            ),
            None => ExecutionOutcome::user_error(
                format!(
                    "no changelog entry at or before {when} for {}",
                    request.platform
                ),
                json!({ "platform": request.platform }),
            ),
        });
    }
    let entries = changelog.entries()?;
    Ok(ExecutionOutcome::success(
        format!("{} update(s) recorded for {}", entries.len(), request.platform),
        json!({ "entries": entries }),
    ))
}
