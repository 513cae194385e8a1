//! Local persistence of the sync artifact.
//!
//! The committed artifact is only ever replaced by a rename from a fully
//! written, fsynced sibling temp file, so a reader (or a process killed
//! mid-write) sees either the old bytes or the new bytes, never a mix.
//!
//! ```text
//! data/missing-children.json                 committed
//! data/.missing-children.json.<uuid>.tmp     staged, not yet renamed
//! ```
//!
//! Temp files left behind by a crash are ignored by [`load_previous`] and
//! swept by the next [`write_atomic`].

use anyhow::{bail, Context, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::logging::sanitize;
use crate::models::SyncArtifact;

const RENAME_ATTEMPTS: u32 = 3;
const RENAME_BACKOFF: Duration = Duration::from_millis(200);

/// Read the committed artifact.
///
/// A missing file is a first run. A file that cannot be parsed is logged
/// and treated the same way; it will be replaced by the next successful
/// write.
pub fn load_previous(path: &Path) -> Option<SyncArtifact> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "previous artifact unreadable; starting empty");
            return None;
        }
    };

    match serde_json::from_str::<SyncArtifact>(&content) {
        Ok(artifact) => Some(artifact),
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %sanitize(&e.to_string()),
                "previous artifact is not valid JSON; starting empty"
            );
            None
        }
    }
}

/// Replace `path` with `bytes` via temp file plus rename.
///
/// On any failure the temp file is removed and the committed file is left
/// as it was.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    sweep_stale(path);
    let staged = StagedWrite::stage(path, bytes)?;
    staged.commit()
}

/// A fully written temp file that has not yet been renamed into place.
///
/// Dropping it without calling [`StagedWrite::commit`] deletes the temp file.
#[derive(Debug)]
pub struct StagedWrite {
    temp: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl StagedWrite {
    pub fn stage(target: &Path, bytes: &[u8]) -> Result<Self> {
        let parent = parent_dir(target);
        fs::create_dir_all(&parent)
            .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;

        let temp = temp_path_for(target)?;
        let staged = Self {
            temp,
            target: target.to_path_buf(),
            committed: false,
        };

        // `staged` owns the temp path from here on, so an early return removes it.
        let mut file = File::create(&staged.temp)
            .with_context(|| format!("Failed to create temp file: {}", staged.temp.display()))?;
        file.write_all(bytes)
            .with_context(|| format!("Failed to write temp file: {}", staged.temp.display()))?;
        file.sync_all()
            .with_context(|| format!("Failed to sync temp file: {}", staged.temp.display()))?;

        Ok(staged)
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp
    }

    /// Rename the temp file over the target, retrying transient failures.
    pub fn commit(mut self) -> Result<()> {
        let mut last_err = None;
        for attempt in 1..=RENAME_ATTEMPTS {
            match fs::rename(&self.temp, &self.target) {
                Ok(()) => {
                    self.committed = true;
                    sync_dir(&parent_dir(&self.target));
                    debug!(path = %self.target.display(), "artifact committed");
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        path = %self.target.display(),
                        attempt,
                        error = %e,
                        "rename into place failed"
                    );
                    last_err = Some(e);
                    if attempt < RENAME_ATTEMPTS {
                        std::thread::sleep(RENAME_BACKOFF * attempt);
                    }
                }
            }
        }

        match last_err {
            Some(e) => Err(e).with_context(|| {
                format!(
                    "Failed to rename {} into place after {} attempts",
                    self.target.display(),
                    RENAME_ATTEMPTS
                )
            }),
            None => bail!("rename never attempted"),
        }
    }
}

impl Drop for StagedWrite {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = fs::remove_file(&self.temp) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %self.temp.display(), error = %e, "failed to remove temp file");
                }
            }
        }
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn temp_path_for(target: &Path) -> Result<PathBuf> {
    let Some(name) = target.file_name().and_then(|n| n.to_str()) else {
        bail!("output path has no file name: {}", target.display());
    };
    Ok(parent_dir(target).join(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple())))
}

/// Remove temp files a crashed run left next to `target`.
fn sweep_stale(target: &Path) {
    let Some(name) = target.file_name().and_then(|n| n.to_str()) else {
        return;
    };
    let prefix = format!(".{}.", name);
    let Ok(entries) = fs::read_dir(parent_dir(target)) else {
        return;
    };
    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if file_name.starts_with(&prefix) && file_name.ends_with(".tmp") {
            debug!(file = file_name, "removing stale temp file");
            let _ = fs::remove_file(entry.path());
        }
    }
}

fn sync_dir(dir: &Path) {
    if let Ok(handle) = File::open(dir) {
        let _ = handle.sync_all();
    }
}
