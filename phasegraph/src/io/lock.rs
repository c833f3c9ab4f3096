//! Fail-fast lock files for read-modify-write sections.
//!
//! A lock is a file created with create-new semantics next to the record it
//! guards. Nothing waits: a held lock is reported as busy and the caller
//! decides whether to retry.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{debug, warn};

use super::paths::lock_path_for;

/// Held lock; the file is removed on drop.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
}

impl FileLock {
    /// Acquire the lock guarding `target`.
    pub fn acquire(target: &Path) -> Result<Self> {
        let path = lock_path_for(target);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                // Holder pid helps an operator clear a lock left by a crash.
                writeln!(file, "{}", std::process::id())
                    .with_context(|| format!("write lock {}", path.display()))?;
                debug!(lock = %path.display(), "lock acquired");
                Ok(Self { path })
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                bail!("{} is busy (lock held at {})", target.display(), path.display())
            }
            Err(err) => Err(err).with_context(|| format!("create lock {}", path.display())),
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), error = %err, "failed to release lock");
        }
    }
}
