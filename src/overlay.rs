/*!
Copy-on-write overlay over the persistent home directory.

- prepare: discard stale upper layer, create the layout (0770), mount the overlay
- teardown: unmount, then reset the upper layer; both are attempted and failures collected
*/
use std::fs;
use std::io;
#[cfg(unix)]
use std::os::unix::fs::DirBuilderExt;
use std::path::Path;

use crate::errors::{Error, Failures, Result};
use crate::target::OverlayPaths;
use crate::util::{Exec, Privilege};

const DIR_MODE: u32 = 0o770;

pub struct OverlayManager<'a> {
    exec: &'a dyn Exec,
    privilege: &'a Privilege,
}

impl<'a> OverlayManager<'a> {
    pub fn new(exec: &'a dyn Exec, privilege: &'a Privilege) -> Self {
        Self { exec, privilege }
    }

    pub fn prepare(&self, paths: &OverlayPaths) -> Result<()> {
        self.discard_upper(paths);
        self.create_dirs(paths)?;
        self.mount(paths)
    }

    pub fn teardown(&self, paths: &OverlayPaths) -> Result<()> {
        let mut failures = Failures::new();
        if let Err(e) = self.unmount(paths) {
            failures.push(e);
        }
        if let Err(e) = self.reset_upper(paths) {
            failures.push(e);
        }
        failures.into_result(Error::Teardown)
    }

    /// Best-effort removal of the previous session's upper layer.
    pub fn discard_upper(&self, paths: &OverlayPaths) {
        match fs::remove_dir_all(&paths.upper) {
            Ok(()) => tracing::debug!(upper = %paths.upper.display(), "stale upper layer discarded"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                upper = %paths.upper.display(),
                error = %e,
                "could not discard stale upper layer"
            ),
        }
    }

    /// Create lower/upper/work/merged; existing directories are left as they are.
    pub fn create_dirs(&self, paths: &OverlayPaths) -> Result<()> {
        for dir in paths.all() {
            make_dir(dir).map_err(|e| {
                Error::Mount(format!("creating {} failed: {e}", dir.display()))
            })?;
        }
        Ok(())
    }

    pub fn mount(&self, paths: &OverlayPaths) -> Result<()> {
        let req = self.privilege.request(
            "mount",
            [
                "-t".to_string(),
                "overlay".to_string(),
                "overlay".to_string(),
                "-o".to_string(),
                paths.mount_options(),
                paths.merged.display().to_string(),
            ],
        );
        let out = self
            .exec
            .run(req)
            .map_err(|e| Error::Mount(format!("{e:#}")))?;
        if !out.success() {
            return Err(Error::Mount(format!(
                "{}: {}",
                paths.merged.display(),
                out.failure_reason()
            )));
        }
        tracing::info!(merged = %paths.merged.display(), "overlay mounted");
        Ok(())
    }

    pub fn unmount(&self, paths: &OverlayPaths) -> Result<()> {
        let req = self
            .privilege
            .request("umount", [paths.merged.as_os_str()]);
        let out = self
            .exec
            .run(req)
            .map_err(|e| Error::Unmount(format!("{e:#}")))?;
        if !out.success() {
            return Err(Error::Unmount(format!(
                "{}: {}",
                paths.merged.display(),
                out.failure_reason()
            )));
        }
        tracing::info!(merged = %paths.merged.display(), "overlay unmounted");
        Ok(())
    }

    /// Delete the upper layer and recreate it empty for the next session.
    pub fn reset_upper(&self, paths: &OverlayPaths) -> Result<()> {
        match fs::remove_dir_all(&paths.upper) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(Error::Cleanup(format!(
                    "removing {} failed: {e}",
                    paths.upper.display()
                )))
            }
        }
        make_dir(&paths.upper).map_err(|e| {
            Error::Cleanup(format!("recreating {} failed: {e}", paths.upper.display()))
        })
    }
}

fn make_dir(dir: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(DIR_MODE);
    builder.create(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_make_dir_uses_owner_group_mode() {
        use std::os::unix::fs::PermissionsExt;
        let td = tempfile::tempdir().unwrap();
        let d = td.path().join("a/b");
        make_dir(&d).unwrap();
        // umask may only clear bits, never add "other" access
        let mode = fs::metadata(&d).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode & 0o007, 0, "mode {mode:o}");
        make_dir(&d).expect("second create is a no-op");
    }
}
