//! Capability traits for the device/browser layer.
//!
//! The browser control stack (process launch, remote automation transport,
//! log collection) lives outside this crate; harnesses implement these
//! traits and the orchestrator only relies on the scoped acquisition
//! contract: device, then browser, released in reverse order on every exit
//! path.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;

use condprof_domain::ScenarioOptions;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Fields a scenario reports back, merged into the run's metadata.
/// `result` (0 = success) is expected by convention.
pub type ScenarioFields = IndexMap<String, Value>;

/// A scripted usage scenario, driven against a live automation session.
pub type ScenarioFn = Arc<
    dyn Fn(Arc<dyn BrowserSession>, ScenarioOptions) -> BoxFuture<'static, Result<ScenarioFields>>
        + Send
        + Sync,
>;

/// Scenario functions keyed by scenario name.
pub type ScenarioRegistry = IndexMap<String, ScenarioFn>;

/// Opaque handle to a live automation session.
pub trait BrowserSession: Send + Sync {
    fn session_id(&self) -> &str;
}

/// Device and browser lifecycle operations for one target platform.
#[async_trait]
pub trait Environment: Send + Sync {
    fn target_platform(&self) -> &str;

    /// Working profile directory the browser reads and writes.
    fn profile_dir(&self) -> &Path;

    fn browser_version(&self) -> String;

    /// Set up device-level logging/state before any browser work.
    async fn prepare(&self, logfile: &Path) -> Result<()>;

    /// Acquire the exclusively-owned device scope.
    async fn get_device(&self, port: u16, verbose: bool) -> Result<Box<dyn DeviceScope>>;

    /// Flush accumulated device and browser logs. Runs on every exit path,
    /// including scenario failure.
    async fn dump_logs(&self) -> Result<()>;
}

/// Scoped device ownership. `release` must be called exactly once.
#[async_trait]
pub trait DeviceScope: Send {
    /// Launch the browser and attach an automation session, writing driver
    /// output to `driver_log`.
    async fn get_browser(
        &mut self,
        headless: bool,
        driver_log: &Path,
    ) -> Result<Box<dyn BrowserScope>>;

    async fn release(&mut self) -> Result<()>;
}

/// Scoped browser ownership. `stop_browser` and `collect_profile` run
/// exactly once each, in that order, regardless of scenario outcome.
#[async_trait]
pub trait BrowserScope: Send {
    fn session(&self) -> Arc<dyn BrowserSession>;

    /// Cheap sanity check that the attached session is alive.
    fn check_session(&self) -> Result<()>;

    async fn stop_browser(&mut self) -> Result<()>;

    /// Flush on-disk profile state so the profile directory reflects what
    /// the browser wrote.
    async fn collect_profile(&mut self) -> Result<()>;
}
