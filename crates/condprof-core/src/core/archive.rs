use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use flate2::read::GzDecoder;
use flate2::{Compression, GzBuilder};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tar::Header;
use tracing::debug;

use condprof_domain::METADATA_FILENAME;

/// A packaged profile, ready to publish.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveInfo {
    pub path: PathBuf,
    pub size: u64,
    pub sha256: String,
}

/// Package `profile_dir` into a deterministic gzip-compressed tarball at
/// `dest`. The profile must carry its metadata file; an archive without one
/// could never be restored.
pub fn create_archive(profile_dir: &Path, dest: &Path) -> Result<ArchiveInfo> {
    if !profile_dir.join(METADATA_FILENAME).is_file() {
        return Err(anyhow!(
            "refusing to archive {}: no {METADATA_FILENAME} present",
            profile_dir.display()
        ));
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let out = File::create(dest).with_context(|| format!("failed to create {}", dest.display()))?;
    let encoder = GzBuilder::new().mtime(0).write(out, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    for entry in walkdir::WalkDir::new(profile_dir).sort_by(|a, b| a.path().cmp(b.path())) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!(%err, "skipping path during archive walk");
                continue;
            }
        };
        let path = entry.path();
        if path == profile_dir {
            continue;
        }
        let rel = path
            .strip_prefix(profile_dir)
            .context("failed to relativize path")?;
        if let Err(err) = append_entry(&mut builder, rel, path) {
            return Err(err.context(format!("failed to archive {}", path.display())));
        }
    }

    builder.finish()?;
    let encoder = builder.into_inner()?;
    encoder.finish()?.sync_all()?;

    let size = fs::metadata(dest)?.len();
    let sha256 = file_sha256(dest)?;
    Ok(ArchiveInfo {
        path: dest.to_path_buf(),
        size,
        sha256,
    })
}

fn append_entry<W: std::io::Write>(
    builder: &mut tar::Builder<W>,
    rel: &Path,
    path: &Path,
) -> Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == ErrorKind::PermissionDenied => {
            debug!(path = %path.display(), "skipping unreadable path during archive");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };
    let file_type = metadata.file_type();

    let mut header = Header::new_gnu();
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    let _ = header.set_username("");
    let _ = header.set_groupname("");

    if file_type.is_dir() {
        header.set_entry_type(tar::EntryType::Directory);
        header.set_mode(0o755);
        header.set_size(0);
        builder.append_data(&mut header, rel, std::io::empty())?;
    } else if file_type.is_file() {
        header.set_entry_type(tar::EntryType::Regular);
        header.set_mode(if is_executable(&metadata) { 0o755 } else { 0o644 });
        header.set_size(metadata.len());
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::PermissionDenied => {
                debug!(path = %path.display(), "skipping unreadable file during archive");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };
        builder.append_data(&mut header, rel, file)?;
    } else if file_type.is_symlink() {
        let target = fs::read_link(path)?;
        if target.is_absolute() {
            debug!(
                path = %path.display(),
                target = %target.display(),
                "skipping symlink with absolute target during archive"
            );
            return Ok(());
        }
        header.set_entry_type(tar::EntryType::Symlink);
        header.set_mode(0o777);
        header.set_size(0);
        if header.set_link_name(&target).is_err() {
            debug!(
                path = %path.display(),
                target = %target.display(),
                "skipping symlink with oversized target during archive"
            );
            return Ok(());
        }
        builder.append_data(&mut header, rel, std::io::empty())?;
    }
    Ok(())
}

/// Unpack an archive produced by `create_archive` into `dest`. Entries that
/// would escape `dest` are rejected.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest).with_context(|| format!("failed to create {}", dest.display()))?;
    let file =
        File::open(archive).with_context(|| format!("failed to open {}", archive.display()))?;
    let mut tarball = tar::Archive::new(GzDecoder::new(file));
    for entry in tarball.entries()? {
        let mut entry = entry?;
        let rel = entry.path()?.into_owned();
        if !entry.unpack_in(dest)? {
            return Err(anyhow!(
                "archive entry {} escapes the extraction root",
                rel.display()
            ));
        }
    }
    Ok(())
}

pub(crate) fn file_sha256(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
    false
}
