use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use crate::errors::{Error, Result};

/// Per-target session lock guard that removes the lock file on drop.
#[derive(Debug)]
pub struct SessionLock {
    file: File,
    path: PathBuf,
}

impl SessionLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        // Best-effort unlock; ignore errors
        let _ = self.file.unlock();
        let _ = fs::remove_file(&self.path);
    }
}

/// Acquire a non-blocking exclusive lock at `p` for the session of `target`.
pub fn acquire_lock_at(p: &Path, target: &str) -> Result<SessionLock> {
    if let Some(parent) = p.parent() {
        fs::create_dir_all(parent)?;
    }
    let f = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(true)
        .open(p)?;
    match f.try_lock_exclusive() {
        Ok(()) => {
            tracing::debug!(path = %p.display(), "session lock acquired");
            Ok(SessionLock {
                file: f,
                path: p.to_path_buf(),
            })
        }
        Err(e) if is_contended(&e) => Err(Error::Locked(target.to_string())),
        Err(e) => Err(Error::Io(e)),
    }
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
