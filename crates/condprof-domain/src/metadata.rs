use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::naming::ProfileKey;

/// Metadata file embedded in every profile directory and archive. An archive
/// without a readable copy of this file is not restorable.
pub const METADATA_FILENAME: &str = "condprof.json";

/// Collects scenario-contributed fields while a run is in flight.
///
/// `write` consumes the builder: once the identity fields are persisted the
/// record is immutable.
#[derive(Debug, Default)]
pub struct MetadataBuilder {
    scenario_fields: IndexMap<String, Value>,
}

impl MetadataBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge fields returned by a scenario. Later values win.
    pub fn update(&mut self, fields: IndexMap<String, Value>) {
        for (key, value) in fields {
            self.scenario_fields.insert(key, value);
        }
    }

    /// Finalize the identity fields and persist the record into
    /// `profile_dir`. Identity keys the scenario set explicitly are kept.
    pub fn write(
        mut self,
        key: &ProfileKey,
        browser_version: &str,
        profile_dir: &Path,
    ) -> Result<Metadata> {
        let name = self
            .take_string("name")
            .unwrap_or_else(|| key.scenario.clone());
        let customization = self
            .take_string("customization")
            .unwrap_or_else(|| key.customization.clone());
        let platform = self
            .take_string("platform")
            .unwrap_or_else(|| key.platform.clone());
        let browser_version = self
            .take_string("browser_version")
            .unwrap_or_else(|| browser_version.to_string());

        let metadata = Metadata {
            name,
            customization,
            platform,
            browser_version,
            scenario_fields: self.scenario_fields,
        };
        metadata.persist(profile_dir)?;
        Ok(metadata)
    }

    fn take_string(&mut self, key: &str) -> Option<String> {
        match self.scenario_fields.shift_remove(key)? {
            Value::String(value) => Some(value),
            other => Some(other.to_string()),
        }
    }
}

/// Provenance record for one conditioned profile: the identifying fields
/// plus whatever the scenario reported (`result` by convention, 0 = ok).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    pub customization: String,
    pub platform: String,
    pub browser_version: String,
    #[serde(flatten)]
    pub scenario_fields: IndexMap<String, Value>,
}

impl Metadata {
    /// Read the record back from a restored profile directory.
    pub fn read(profile_dir: &Path) -> Result<Self> {
        let path = profile_dir.join(METADATA_FILENAME);
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))
    }

    fn persist(&self, profile_dir: &Path) -> Result<()> {
        let path = profile_dir.join(METADATA_FILENAME);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("failed to write {}", path.display()))
    }

    pub fn key(&self) -> ProfileKey {
        ProfileKey::new(
            self.platform.clone(),
            self.name.clone(),
            self.customization.clone(),
        )
    }

    /// Scenario exit status. `None` when the scenario never reported one.
    pub fn result(&self) -> Option<i64> {
        self.scenario_fields.get("result").and_then(Value::as_i64)
    }

    /// A run only counts as successful when the scenario explicitly
    /// reported `result == 0`; an absent status is a failure.
    pub fn succeeded(&self) -> bool {
        self.result() == Some(0)
    }

    /// All fields flattened into one map, as recorded in the changelog.
    pub fn entry_fields(&self) -> Result<IndexMap<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map.into_iter().collect()),
            other => Err(anyhow!("metadata serialized to non-object: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn sample_key() -> ProfileKey {
        ProfileKey::new("android", "settings", "default")
    }

    #[test]
    fn write_then_read_round_trips() -> Result<()> {
        let temp = tempdir()?;
        let mut builder = MetadataBuilder::new();
        builder.update(IndexMap::from([
            ("result".to_string(), json!(0)),
            ("visited".to_string(), json!(["https://example.com"])),
        ]));
        let written = builder.write(&sample_key(), "123.0", temp.path())?;

        let restored = Metadata::read(temp.path())?;
        assert_eq!(restored, written);
        assert_eq!(restored.name, "settings");
        assert_eq!(restored.customization, "default");
        assert_eq!(restored.platform, "android");
        assert_eq!(restored.browser_version, "123.0");
        assert_eq!(restored.result(), Some(0));
        Ok(())
    }

    #[test]
    fn scenario_fields_win_over_identity_defaults() -> Result<()> {
        let temp = tempdir()?;
        let mut builder = MetadataBuilder::new();
        builder.update(IndexMap::from([(
            "browser_version".to_string(),
            json!("999.0a1"),
        )]));
        let written = builder.write(&sample_key(), "123.0", temp.path())?;
        assert_eq!(written.browser_version, "999.0a1");
        Ok(())
    }

    #[test]
    fn later_updates_overwrite_earlier_fields() {
        let mut builder = MetadataBuilder::new();
        builder.update(IndexMap::from([("result".to_string(), json!(1))]));
        builder.update(IndexMap::from([("result".to_string(), json!(0))]));
        assert_eq!(builder.scenario_fields.get("result"), Some(&json!(0)));
    }

    #[test]
    fn absent_result_is_a_failure() -> Result<()> {
        let temp = tempdir()?;
        let written = MetadataBuilder::new().write(&sample_key(), "123.0", temp.path())?;
        assert_eq!(written.result(), None);
        assert!(!written.succeeded());
        Ok(())
    }

    #[test]
    fn read_rejects_missing_identity_fields() -> Result<()> {
        let temp = tempdir()?;
        fs::write(
            temp.path().join(METADATA_FILENAME),
            r#"{"name": "settings", "result": 0}"#,
        )?;
        assert!(Metadata::read(temp.path()).is_err());
        Ok(())
    }

    #[test]
    fn entry_fields_flatten_identity_and_scenario_fields() -> Result<()> {
        let temp = tempdir()?;
        let mut builder = MetadataBuilder::new();
        builder.update(IndexMap::from([("result".to_string(), json!(0))]));
        let written = builder.write(&sample_key(), "123.0", temp.path())?;

        let fields = written.entry_fields()?;
        assert_eq!(fields.get("name"), Some(&json!("settings")));
        assert_eq!(fields.get("platform"), Some(&json!("android")));
        assert_eq!(fields.get("result"), Some(&json!(0)));
        Ok(())
    }
}
