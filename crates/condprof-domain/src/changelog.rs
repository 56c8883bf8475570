use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use fs4::FileExt;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use tracing::debug;

pub const CHANGELOG_FILENAME: &str = "changelog.jsonl";

/// One publish event. `when` is unix seconds; the remaining fields are the
/// full metadata of the published profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangelogEntry {
    pub operation: String,
    pub when: i64,
    #[serde(flatten)]
    pub fields: IndexMap<String, Value>,
}

/// Append-only per-platform log of publish events.
///
/// One value exists per platform and is shared by every run targeting that
/// platform; appends serialize through the in-process mutex and an advisory
/// file lock so concurrent writers cannot interleave lines.
#[derive(Debug)]
pub struct Changelog {
    platform: String,
    path: PathBuf,
    append_lock: Mutex<()>,
}

impl Changelog {
    pub fn new(root: &Path, platform: &str) -> Self {
        Self {
            platform: platform.to_string(),
            path: root.join(platform).join(CHANGELOG_FILENAME),
            append_lock: Mutex::new(()),
        }
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Durable, ordered append of one event stamped with the current time.
    pub fn append(&self, operation: &str, fields: IndexMap<String, Value>) -> Result<()> {
        self.append_at(operation, OffsetDateTime::now_utc().unix_timestamp(), fields)
    }

    pub fn append_at(
        &self,
        operation: &str,
        when: i64,
        fields: IndexMap<String, Value>,
    ) -> Result<()> {
        let entry = ChangelogEntry {
            operation: operation.to_string(),
            when,
            fields,
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let guard = self
            .append_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        file.lock_exclusive()?;
        let appended = file
            .write_all(line.as_bytes())
            .and_then(|()| file.sync_all());
        let unlocked = FileExt::unlock(&file);
        drop(guard);
        appended.with_context(|| format!("failed to append to {}", self.path.display()))?;
        unlocked?;
        debug!(platform = %self.platform, operation, "changelog entry appended");
        Ok(())
    }

    /// All entries in file (append) order. A missing file is an empty log.
    pub fn entries(&self) -> Result<Vec<ChangelogEntry>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read {}", self.path.display()))
            }
        };
        let mut entries = Vec::new();
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(
                serde_json::from_str(line)
                    .with_context(|| format!("corrupt entry in {}", self.path.display()))?,
            );
        }
        Ok(entries)
    }

    /// Latest entry recorded at or before `when`, for historical recovery.
    pub fn entry_at_or_before(&self, when: i64) -> Result<Option<ChangelogEntry>> {
        Ok(self
            .entries()?
            .into_iter()
            .filter(|entry| entry.when <= when)
            .next_back())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn fields(result: i64) -> IndexMap<String, Value> {
        IndexMap::from([
            ("name".to_string(), json!("settings")),
            ("result".to_string(), json!(result)),
        ])
    }

    #[test]
    fn appends_are_ordered_and_readable() -> Result<()> {
        let temp = tempdir()?;
        let log = Changelog::new(temp.path(), "android");
        log.append_at("update", 100, fields(0))?;
        log.append_at("update", 200, fields(1))?;

        let entries = log.entries()?;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].when, 100);
        assert_eq!(entries[1].when, 200);
        assert_eq!(entries[1].operation, "update");
        assert_eq!(entries[1].fields.get("result"), Some(&json!(1)));
        Ok(())
    }

    #[test]
    fn missing_log_reads_as_empty() -> Result<()> {
        let temp = tempdir()?;
        let log = Changelog::new(temp.path(), "android");
        assert!(log.entries()?.is_empty());
        assert!(log.entry_at_or_before(i64::MAX)?.is_none());
        Ok(())
    }

    #[test]
    fn resolves_latest_entry_at_or_before_a_time() -> Result<()> {
        let temp = tempdir()?;
        let log = Changelog::new(temp.path(), "android");
        log.append_at("update", 100, fields(0))?;
        log.append_at("update", 200, fields(1))?;
        log.append_at("update", 300, fields(2))?;

        let entry = log.entry_at_or_before(250)?.expect("entry at 200");
        assert_eq!(entry.when, 200);
        assert!(log.entry_at_or_before(99)?.is_none());
        let latest = log.entry_at_or_before(300)?.expect("entry at 300");
        assert_eq!(latest.when, 300);
        Ok(())
    }

    #[test]
    fn logs_for_different_platforms_are_separate_files() -> Result<()> {
        let temp = tempdir()?;
        let android = Changelog::new(temp.path(), "android");
        let linux = Changelog::new(temp.path(), "linux64");
        android.append_at("update", 100, fields(0))?;

        assert_eq!(android.entries()?.len(), 1);
        assert!(linux.entries()?.is_empty());
        assert_ne!(android.path(), linux.path());
        Ok(())
    }

    #[test]
    fn concurrent_appends_do_not_interleave() -> Result<()> {
        let temp = tempdir()?;
        let log = std::sync::Arc::new(Changelog::new(temp.path(), "android"));
        let mut handles = Vec::new();
        for worker in 0..8 {
            let log = log.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..10 {
                    log.append_at("update", worker * 10 + i, fields(0)).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        let entries = log.entries()?;
        assert_eq!(entries.len(), 80, "every append lands as one whole line");
        Ok(())
    }
}
