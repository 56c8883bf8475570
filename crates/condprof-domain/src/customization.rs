use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Option overrides handed to a scenario function.
pub type ScenarioOptions = IndexMap<String, Value>;

/// A named bundle of option overrides: preferences seeded into fresh
/// baseline profiles plus per-scenario options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Customization {
    pub name: String,
    #[serde(default)]
    pub prefs: IndexMap<String, Value>,
    #[serde(default)]
    pub scenario: IndexMap<String, ScenarioOptions>,
}

impl Customization {
    /// Options declared for `scenario`, or an empty mapping when the bundle
    /// has none.
    pub fn options_for(&self, scenario: &str) -> ScenarioOptions {
        self.scenario.get(scenario).cloned().unwrap_or_default()
    }
}

/// Customization bundles keyed by their registry name.
pub type CustomizationRegistry = IndexMap<String, Customization>;

/// Load every `*.json` bundle under `dir`, keyed by file stem.
pub fn load_customizations(dir: &Path) -> Result<CustomizationRegistry> {
    let mut registry = CustomizationRegistry::new();
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
            paths.push(path);
        }
    }
    paths.sort();
    for path in paths {
        let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let customization: Customization = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        registry.insert(stem.to_string(), customization);
    }
    Ok(registry)
}
