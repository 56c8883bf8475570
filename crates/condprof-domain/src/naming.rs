use serde::{Deserialize, Serialize};

/// Extension used for packaged profiles. Other tooling resolves artifacts
/// by filename, so this is part of the wire format.
pub const ARCHIVE_EXTENSION: &str = "tgz";

/// Identifies one conditioned profile: every artifact, changelog entry and
/// scenario run is keyed by this triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProfileKey {
    pub platform: String,
    pub scenario: String,
    pub customization: String,
}

impl ProfileKey {
    pub fn new(
        platform: impl Into<String>,
        scenario: impl Into<String>,
        customization: impl Into<String>,
    ) -> Self {
        Self {
            platform: platform.into(),
            scenario: scenario.into(),
            customization: customization.into(),
        }
    }

    /// Artifact filename for this key. The name doubles as the storage key,
    /// so publishing under the same name supersedes the previous artifact.
    pub fn archive_name(&self) -> String {
        format!(
            "profile-{}-{}-{}.{}",
            self.platform, self.scenario, self.customization, ARCHIVE_EXTENSION
        )
    }

    /// Per-run log file name for a device or driver component.
    pub fn log_name(&self, component: &str) -> String {
        format!("{}-{}-{}.log", component, self.scenario, self.customization)
    }
}

impl std::fmt::Display for ProfileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.platform, self.scenario, self.customization
        )
    }
}
