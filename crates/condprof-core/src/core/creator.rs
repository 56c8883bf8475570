use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tracing::{error, info};

use condprof_domain::{
    Changelog, Customization, CustomizationRegistry, Metadata, MetadataBuilder, ProfileKey,
    ScenarioOptions,
};

use super::archive::{create_archive, ArchiveInfo};
use super::env::{DeviceScope, Environment, ScenarioFields, ScenarioFn, ScenarioRegistry};
use super::profile::fresh_profile;
use super::store::{ProfileStore, PublishReceipt, StoreError};

/// Remote automation port the device scope listens on.
pub(crate) const DEVICE_PORT: u16 = 2828;

/// One requested profile update.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub scenario: String,
    pub customization: String,
    /// Destination for the packaged archive and per-run logs. `None` skips
    /// packaging, publishing and the changelog append entirely.
    pub archive_dir: Option<PathBuf>,
    /// Start from an empty baseline even when an artifact exists.
    pub force_new: bool,
    pub headless: bool,
}

/// How the scenario itself ended. A broken scenario is a value, not a
/// propagated error: the pipeline still tears down the browser, collects
/// the profile and packages it for diagnosis.
#[derive(Debug)]
pub enum ScenarioOutcome {
    Completed(ScenarioFields),
    Broke(anyhow::Error),
}

/// What one run produced. `failed` reports scenario failure (broken, or a
/// missing/non-zero `result`) after all side effects were committed.
#[derive(Debug)]
pub struct RunReport {
    pub key: ProfileKey,
    pub metadata: Metadata,
    pub archive: Option<ArchiveInfo>,
    pub receipt: Option<PublishReceipt>,
    pub failed: bool,
}

/// Builds or updates one conditioned profile per `run` call: resolve the
/// latest artifact (or a fresh baseline), replay the scenario in a scoped
/// browser session, then package, publish and log the result.
pub struct ProfileCreator {
    scenarii: ScenarioRegistry,
    customizations: CustomizationRegistry,
    store: Option<ProfileStore>,
}

impl ProfileCreator {
    pub fn new(
        scenarii: ScenarioRegistry,
        customizations: CustomizationRegistry,
        store: Option<ProfileStore>,
    ) -> Self {
        Self {
            scenarii,
            customizations,
            store,
        }
    }

    /// Run one update. Callers serialize runs per
    /// (platform, scenario, customization) key; the per-platform changelog
    /// is safe to share across concurrent runs for other keys.
    pub async fn run(
        &self,
        request: &RunRequest,
        changelog: &Changelog,
        env: &dyn Environment,
    ) -> Result<RunReport> {
        let scenario_fn = self
            .scenarii
            .get(&request.scenario)
            .cloned()
            .ok_or_else(|| anyhow!("unknown scenario {:?}", request.scenario))?;
        let customization = self
            .customizations
            .get(&request.customization)
            .ok_or_else(|| anyhow!("unknown customization {:?}", request.customization))?;

        let key = ProfileKey::new(
            env.target_platform(),
            &request.scenario,
            &customization.name,
        );
        info!(%key, "building conditioned profile");

        let mut options = customization.options_for(&request.scenario);
        options.insert(
            "platform".to_string(),
            serde_json::Value::from(key.platform.as_str()),
        );

        self.resolve_profile(request, &key, customization, env.profile_dir())
            .await?;

        let log_dir = match &request.archive_dir {
            Some(dir) => dir.clone(),
            None => std::env::temp_dir(),
        };
        let outcome = self
            .condition_profile(env, &key, &scenario_fn, options, request.headless, &log_dir)
            .await?;

        let mut builder = MetadataBuilder::new();
        match outcome {
            ScenarioOutcome::Completed(fields) => builder.update(fields),
            ScenarioOutcome::Broke(_) => {}
        }
        let metadata = builder.write(&key, &env.browser_version(), env.profile_dir())?;
        let failed = !metadata.succeeded();

        let Some(archive_dir) = &request.archive_dir else {
            info!(%key, "no archive directory configured, skipping packaging");
            return Ok(RunReport {
                key,
                metadata,
                archive: None,
                receipt: None,
                failed,
            });
        };

        info!(%key, "creating archive");
        let archive_path = archive_dir.join(key.archive_name());
        let archive = create_archive(env.profile_dir(), &archive_path)?;
        info!(path = %archive.path.display(), size = archive.size, "archive created");

        let receipt = match &self.store {
            Some(store) => Some(store.publish(&key, &archive.path).await?),
            None => None,
        };

        changelog
            .append("update", metadata.entry_fields()?)
            .context("failed to append changelog entry")?;

        if failed {
            info!(%key, result = ?metadata.result(), "scenario reported a bad exit code");
        }
        Ok(RunReport {
            key,
            metadata,
            archive: Some(archive),
            receipt,
            failed,
        })
    }

    /// Step 2: latest artifact, or a fresh baseline on a miss. Any store
    /// failure other than `NotFound` is fatal and aborts before browser
    /// work.
    async fn resolve_profile(
        &self,
        request: &RunRequest,
        key: &ProfileKey,
        customization: &Customization,
        profile_dir: &Path,
    ) -> Result<()> {
        if request.force_new {
            return fresh_profile(profile_dir, customization);
        }
        let Some(store) = &self.store else {
            return fresh_profile(profile_dir, customization);
        };
        match store.fetch(key, profile_dir).await {
            Ok(()) => {
                info!(%key, "updating the latest published profile");
                Ok(())
            }
            Err(StoreError::NotFound { .. }) => {
                info!(%key, "no published profile, starting from a fresh baseline");
                fresh_profile(profile_dir, customization)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Steps 3 and 4: scoped device and browser acquisition around the
    /// scenario. Device release and log collection run on every exit path.
    async fn condition_profile(
        &self,
        env: &dyn Environment,
        key: &ProfileKey,
        scenario_fn: &ScenarioFn,
        options: ScenarioOptions,
        headless: bool,
        log_dir: &Path,
    ) -> Result<ScenarioOutcome> {
        env.prepare(&log_dir.join(key.log_name("device"))).await?;
        let mut device = env.get_device(DEVICE_PORT, true).await?;

        let driven = self
            .drive_browser(device.as_mut(), key, scenario_fn, options, headless, log_dir)
            .await;

        let released = device.release().await;
        let dumped = env.dump_logs().await;
        let outcome = driven?;
        released?;
        dumped?;
        Ok(outcome)
    }

    /// The inner browser scope: stop and profile collection run exactly
    /// once whether the scenario completed or broke.
    async fn drive_browser(
        &self,
        device: &mut dyn DeviceScope,
        key: &ProfileKey,
        scenario_fn: &ScenarioFn,
        options: ScenarioOptions,
        headless: bool,
        log_dir: &Path,
    ) -> Result<ScenarioOutcome> {
        let driver_log = log_dir.join(key.log_name("geckodriver"));
        let mut browser = device.get_browser(headless, &driver_log).await?;

        let scenario_result = match browser.check_session() {
            Ok(()) => {
                info!(scenario = %key.scenario, "running scenario");
                scenario_fn.as_ref()(browser.session(), options).await
            }
            Err(err) => Err(err),
        };

        let stopped = browser.stop_browser().await;
        let collected = browser.collect_profile().await;
        stopped?;
        collected?;

        Ok(match scenario_result {
            Ok(fields) => {
                info!(scenario = %key.scenario, "scenario done");
                ScenarioOutcome::Completed(fields)
            }
            Err(err) => {
                error!(scenario = %key.scenario, %err, "scenario broke");
                ScenarioOutcome::Broke(err)
            }
        })
    }
}
