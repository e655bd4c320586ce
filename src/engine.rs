#![allow(clippy::module_name_repetitions)]
//! Container engine CLI adapter: runtime detection, foreground run, ps/stop and network calls.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use which::which;

use crate::errors::{Error, Result};
use crate::target::NetworkSpec;
use crate::util::{Exec, ExecOutput, ExecRequest};

static HANDLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-f]{12}$").expect("valid regex"));

pub fn container_runtime_path(engine: &str) -> io::Result<PathBuf> {
    if let Ok(p) = which(engine) {
        return Ok(p);
    }
    Err(io::Error::new(
        io::ErrorKind::NotFound,
        format!("{engine} is required but was not found in PATH."),
    ))
}

/// Short container id as printed by `ps --quiet`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle(String);

impl ContainerHandle {
    pub fn parse(s: &str) -> Result<Self> {
        if HANDLE_RE.is_match(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(Error::InvalidHandle(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parse `ps --quiet` output. Empty lines are dropped before validation, so an
/// empty listing yields no handles; any other malformed line rejects the whole list.
pub fn parse_handles(listing: &str) -> Result<Vec<ContainerHandle>> {
    listing
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(ContainerHandle::parse)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NetworkSummary {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
}

pub struct Engine<'a> {
    program: PathBuf,
    daemon_url: Option<String>,
    exec: &'a dyn Exec,
}

impl<'a> Engine<'a> {
    pub fn new(program: impl Into<PathBuf>, daemon_url: Option<&str>, exec: &'a dyn Exec) -> Self {
        Self {
            program: program.into(),
            daemon_url: daemon_url
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            exec,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn request<I, S>(&self, args: I) -> ExecRequest
    where
        I: IntoIterator<Item = S>,
        S: Into<std::ffi::OsString>,
    {
        let req = ExecRequest::new(self.program.as_os_str()).args(args);
        match &self.daemon_url {
            Some(url) => req.env("DOCKER_HOST", url),
            None => req,
        }
    }

    fn call<I, S>(&self, args: I) -> anyhow::Result<ExecOutput>
    where
        I: IntoIterator<Item = S>,
        S: Into<std::ffi::OsString>,
    {
        self.exec.run(self.request(args))
    }

    /// `run <options...> <image>` arguments, without the program.
    pub fn run_args(options: &[String], image: &str) -> Vec<String> {
        let mut args = vec!["run".to_string()];
        args.extend(options.iter().cloned());
        args.push(image.to_string());
        args
    }

    pub fn preview(&self, args: &[String]) -> String {
        self.request(args).command_line()
    }

    /// Foreground run attached to the terminal; returns the exit code (None if signaled).
    pub fn run_foreground(&self, args: &[String]) -> Result<Option<i32>> {
        let out = self
            .exec
            .run(self.request(args).foreground())
            .map_err(|e| Error::Engine(format!("{e:#}")))?;
        Ok(out.code)
    }

    /// `ps --quiet --filter ancestor=<image>` arguments, without the program.
    pub fn list_running_args(image: &str) -> Vec<String> {
        vec![
            "ps".to_string(),
            "--quiet".to_string(),
            "--filter".to_string(),
            format!("ancestor={image}"),
        ]
    }

    /// Raw `ps --quiet --filter ancestor=<image>` listing.
    pub fn list_running(&self, image: &str) -> Result<String> {
        let out = self
            .call(Self::list_running_args(image))
            .map_err(|e| Error::Engine(format!("{e:#}")))?;
        if !out.success() {
            return Err(Error::Engine(format!(
                "listing containers of {image} failed: {}",
                out.failure_reason()
            )));
        }
        Ok(out.stdout)
    }

    pub fn stop(&self, handle: &ContainerHandle) -> Result<()> {
        let out = self
            .call(["stop", handle.as_str()])
            .map_err(|e| Error::Engine(format!("{handle}: {e:#}")))?;
        if out.success() {
            Ok(())
        } else {
            Err(Error::Engine(format!("{handle}: {}", out.failure_reason())))
        }
    }

    /// Networks whose name equals `name` exactly (the engine filter matches substrings).
    pub fn networks_named(&self, name: &str) -> Result<Vec<NetworkSummary>> {
        let filter = format!("name={name}");
        let out = self
            .call([
                "network",
                "ls",
                "--filter",
                filter.as_str(),
                "--format",
                "{{json .}}",
            ])
            .map_err(|e| Error::Network(format!("{e:#}")))?;
        if !out.success() {
            return Err(Error::Network(format!(
                "listing networks named {name} failed: {}",
                out.failure_reason()
            )));
        }
        let mut found = Vec::new();
        for line in out.stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let net: NetworkSummary = serde_json::from_str(line)
                .map_err(|e| Error::Network(format!("unexpected network listing {line:?}: {e}")))?;
            if net.name == name {
                found.push(net);
            }
        }
        Ok(found)
    }

    pub fn create_network(&self, spec: &NetworkSpec) -> Result<()> {
        let args = [
            "network".to_string(),
            "create".to_string(),
            format!("--driver={}", spec.driver),
            format!("--subnet={}", spec.subnet),
            format!("--ip-range={}", spec.ip_range),
            format!("--gateway={}", spec.gateway),
            spec.bridge_name.clone(),
        ];
        let out = self
            .call(args)
            .map_err(|e| Error::Network(format!("{e:#}")))?;
        if out.success() {
            Ok(())
        } else {
            Err(Error::Network(format!(
                "creating {} failed: {}",
                spec.bridge_name,
                out.failure_reason()
            )))
        }
    }

    pub fn remove_network(&self, id: &str) -> Result<()> {
        let out = self
            .call(["network", "rm", id])
            .map_err(|e| Error::Network(format!("{e:#}")))?;
        if out.success() {
            Ok(())
        } else {
            Err(Error::Network(format!(
                "removing {id} failed: {}",
                out.failure_reason()
            )))
        }
    }

    /// `build --network host --tag <tag> <dir>`, streamed to the terminal.
    pub fn build_image(&self, dir: &Path, tag: &str) -> Result<()> {
        let req = self
            .request(["build", "--network", "host", "--tag", tag])
            .arg(dir.as_os_str())
            .foreground();
        let out = self
            .exec
            .run(req)
            .map_err(|e| Error::Engine(format!("{e:#}")))?;
        if out.success() {
            Ok(())
        } else {
            Err(Error::Engine(format!(
                "building {tag} failed: {}",
                out.failure_reason()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_handles_empty_listing_is_zero_handles() {
        assert!(parse_handles("").unwrap().is_empty());
        assert!(parse_handles("\n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_handles_accepts_short_ids() {
        let hs = parse_handles("3f2a9c0b1d4e\n0123456789ab\n").unwrap();
        assert_eq!(hs.len(), 2);
        assert_eq!(hs[1].as_str(), "0123456789ab");
    }

    #[test]
    fn test_parse_handles_rejects_uppercase_and_long_ids() {
        assert!(matches!(
            parse_handles("3F2A9C0B1D4E"),
            Err(Error::InvalidHandle(_))
        ));
        assert!(matches!(
            parse_handles("3f2a9c0b1d4e5"),
            Err(Error::InvalidHandle(_))
        ));
        assert!(matches!(
            parse_handles("3f2a9c0b1d4e\nError: daemon"),
            Err(Error::InvalidHandle(h)) if h == "Error: daemon"
        ));
    }

    #[test]
    fn test_run_args_order() {
        let args = Engine::run_args(&["--rm".to_string(), "--tty".to_string()], "img:tag");
        assert_eq!(args, vec!["run", "--rm", "--tty", "img:tag"]);
    }
}
