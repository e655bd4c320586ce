/*!
Build tool support: local image builds and OS package installation.

Both validate all of their input before the first side effect.
*/
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::color::Console;
use crate::engine::Engine;
use crate::errors::{Error, Result};
use crate::util::{Exec, Privilege};

static BUILD_SPEC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([-\w]+)=([-\w]+/[-\w]+:[-\w]+)$").expect("valid regex")
});

/// `dir=base/name:tag`: build `dir` (relative to the project dir) and tag the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTarget {
    pub dir: String,
    pub tag: String,
}

impl BuildTarget {
    pub fn parse(spec: &str) -> Result<Self> {
        let caps = BUILD_SPEC_RE.captures(spec.trim()).ok_or_else(|| {
            Error::InputValidation(format!(
                "build target should be in the form foo=base/name:tag, not: {spec}"
            ))
        })?;
        Ok(Self {
            dir: caps[1].to_string(),
            tag: caps[2].to_string(),
        })
    }
}

/// Parse every spec; the first malformed one fails the whole list.
pub fn parse_build_targets(specs: &[String]) -> Result<Vec<BuildTarget>> {
    if specs.is_empty() {
        return Err(Error::InputValidation(
            "build target list is empty".to_string(),
        ));
    }
    specs.iter().map(|s| BuildTarget::parse(s)).collect()
}

/// Check every directory exists, then build each target in order.
pub fn build_images(
    engine: &Engine<'_>,
    project_dir: &Path,
    targets: &[BuildTarget],
    console: &mut Console<'_>,
) -> Result<()> {
    let dirs: Vec<PathBuf> = targets.iter().map(|t| project_dir.join(&t.dir)).collect();
    if let Some(missing) = dirs.iter().find(|d| !d.is_dir()) {
        return Err(Error::InputValidation(format!(
            "build directory doesn't exist: {}",
            missing.display()
        )));
    }
    console.info("building container images");
    for (target, dir) in targets.iter().zip(&dirs) {
        console.info(&format!("building {}", target.tag));
        if let Err(e) = engine.build_image(dir, &target.tag) {
            console.failed(&target.tag);
            return Err(e);
        }
        console.complete(&target.tag);
    }
    Ok(())
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, ValueEnum)]
pub enum PackageManager {
    Dnf,
    Apt,
}

impl PackageManager {
    fn program(self) -> &'static str {
        match self {
            PackageManager::Dnf => "dnf",
            PackageManager::Apt => "apt-get",
        }
    }
}

pub fn install_packages(
    exec: &dyn Exec,
    privilege: &Privilege,
    manager: PackageManager,
    packages: &[String],
    console: &mut Console<'_>,
) -> Result<()> {
    if packages.is_empty() || packages.iter().any(|p| p.trim().is_empty()) {
        return Err(Error::InputValidation(
            "system package list is empty".to_string(),
        ));
    }
    let summary = packages.join(" ");
    console.info(&format!("Installing: {summary}"));
    let mut args = vec!["install".to_string(), "-y".to_string()];
    args.extend(packages.iter().cloned());
    let req = privilege.request(manager.program(), &args).foreground();
    let out = exec
        .run(req)
        .map_err(|e| Error::Engine(format!("{e:#}")))?;
    if !out.success() {
        console.failed(&summary);
        return Err(Error::Engine(format!(
            "{} install failed: {}",
            manager.program(),
            out.failure_reason()
        )));
    }
    console.complete(&summary);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_spec_accepts_dir_equals_tag() {
        let t = BuildTarget::parse("weechat=0b10/weechat:edge").unwrap();
        assert_eq!(t.dir, "weechat");
        assert_eq!(t.tag, "0b10/weechat:edge");
    }

    #[test]
    fn test_build_spec_rejects_swapped_separators() {
        assert!(matches!(
            BuildTarget::parse("weechat:0b10/weechat=edge"),
            Err(Error::InputValidation(_))
        ));
    }

    #[test]
    fn test_build_spec_rejects_missing_repo_and_extra_chars() {
        for bad in ["weechat=weechat:edge", "we chat=a/b:c", "w=a/b:c:d", "=a/b:c", "w=a/b/c:d"] {
            assert!(BuildTarget::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_one_bad_spec_fails_the_list() {
        let specs = vec!["a=b/c:d".to_string(), "oops".to_string()];
        assert!(parse_build_targets(&specs).is_err());
        assert!(parse_build_targets(&[]).is_err());
    }
}
