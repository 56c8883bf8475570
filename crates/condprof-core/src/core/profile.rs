use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::info;

use condprof_domain::Customization;

/// Prefs every conditioned baseline starts from; customizations may add to
/// or override them.
const BASE_PREFS: &[(&str, &str)] = &[
    ("focusmanager.testmode", "true"),
    ("marionette.enabled", "true"),
    ("marionette.port", "2828"),
    ("browser.shell.checkDefaultBrowser", "false"),
    ("browser.warnOnQuit", "false"),
    ("datareporting.policy.dataSubmissionEnabled", "false"),
    ("toolkit.telemetry.enabled", "false"),
];

/// Initialize an empty baseline profile at `dir`, replacing whatever was
/// there, and seed it with the stock prefs plus the customization's
/// overrides.
pub fn fresh_profile(dir: &Path, customization: &Customization) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)
            .with_context(|| format!("failed to clear stale profile at {}", dir.display()))?;
    }
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create profile dir {}", dir.display()))?;

    let user_js = dir.join("user.js");
    let mut file = fs::File::create(&user_js)
        .with_context(|| format!("failed to create {}", user_js.display()))?;
    for (name, value) in BASE_PREFS {
        if customization.prefs.contains_key(*name) {
            continue;
        }
        writeln!(file, "user_pref({}, {value});", Value::from(*name))?;
    }
    for (name, value) in &customization.prefs {
        writeln!(file, "user_pref({}, {value});", Value::from(name.as_str()))?;
    }
    file.sync_all()?;
    info!(profile = %dir.display(), customization = %customization.name, "fresh baseline profile created");
    Ok(())
}
