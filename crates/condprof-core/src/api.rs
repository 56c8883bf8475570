// Intended public API surface for `condprof-core`.
//
// This module exists to keep the crate root small and make it explicit which
// types/functions are part of the stable interface used by the CLI and by
// harnesses embedding the orchestrator.

pub use crate::core::archive::{create_archive, extract_archive, ArchiveInfo};
pub use crate::core::commands::{
    changelog_history, fetch_profile, pack_profile, FetchRequest, HistoryRequest, PackRequest,
};
pub use crate::core::creator::{ProfileCreator, RunReport, RunRequest, ScenarioOutcome};
pub use crate::core::env::{
    BoxFuture, BrowserScope, BrowserSession, DeviceScope, Environment, ScenarioFields, ScenarioFn,
    ScenarioRegistry,
};
pub use crate::core::outcome::{CommandStatus, ExecutionOutcome};
pub use crate::core::profile::fresh_profile;
pub use crate::core::store::{ProfileStore, PublishReceipt, StoreError, STORE_URL_ENV};
