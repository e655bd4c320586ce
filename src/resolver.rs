//! Allow-list host resolution via the DNS query tool, plus the hosts file rendering.

use std::fmt::Write as _;
use std::fs;
use std::net::IpAddr;
use std::path::Path;

use crate::errors::{Error, Result};
use crate::util::{Exec, ExecRequest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEntry {
    pub hostname: String,
    pub address: IpAddr,
    pub prefix: u8,
}

impl HostEntry {
    /// Single-host entry: /32 for IPv4, /128 for IPv6.
    pub fn new(hostname: &str, address: IpAddr) -> Result<Self> {
        if hostname.trim().is_empty() {
            return Err(Error::InputValidation(
                "hostname must not be empty".to_string(),
            ));
        }
        let prefix = match address {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        Ok(Self {
            hostname: hostname.trim().to_string(),
            address,
            prefix,
        })
    }

    /// `address/prefix` as accepted by ipset.
    pub fn cidr(&self) -> String {
        format!("{}/{}", self.address, self.prefix)
    }
}

pub struct HostResolver<'a> {
    exec: &'a dyn Exec,
    options: &'a [String],
}

impl<'a> HostResolver<'a> {
    pub fn new(exec: &'a dyn Exec, options: &'a [String]) -> Self {
        Self { exec, options }
    }

    /// Resolve each host once, in order. No retries, no refresh.
    pub fn resolve(&self, hostnames: &[String]) -> Result<Vec<HostEntry>> {
        if hostnames.is_empty() {
            return Err(Error::Resolution {
                host: String::new(),
                reason: "no hostnames to resolve".to_string(),
            });
        }
        hostnames.iter().map(|h| self.resolve_one(h)).collect()
    }

    /// `dig +short <options> <host>`.
    pub fn request(&self, hostname: &str) -> ExecRequest {
        ExecRequest::new("dig")
            .arg("+short")
            .args(self.options)
            .arg(hostname)
    }

    fn resolve_one(&self, hostname: &str) -> Result<HostEntry> {
        let failed = |reason: String| Error::Resolution {
            host: hostname.to_string(),
            reason,
        };
        if hostname.trim().is_empty() {
            return Err(failed("empty hostname".to_string()));
        }
        let out = self
            .exec
            .run(self.request(hostname))
            .map_err(|e| failed(format!("{e:#}")))?;
        if !out.success() {
            return Err(failed(out.failure_reason()));
        }
        let address = first_address(&out.stdout).map_err(failed)?;
        tracing::debug!(host = hostname, %address, "resolved");
        HostEntry::new(hostname, address)
    }
}

/// First answer line that is not a CNAME hop (those end in a dot).
fn first_address(answer: &str) -> std::result::Result<IpAddr, String> {
    let line = answer
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.ends_with('.'))
        .ok_or_else(|| "no address returned".to_string())?;
    line.parse()
        .map_err(|_| format!("invalid IP address returned: {line:?}"))
}

/// One `address<TAB>hostname` line per entry.
pub fn render_hosts_file(entries: &[HostEntry]) -> String {
    let mut out = String::new();
    for e in entries {
        let _ = writeln!(out, "{}\t{}", e.address, e.hostname);
    }
    out
}

pub fn write_hosts_file(path: &Path, entries: &[HostEntry]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, render_hosts_file(entries))?;
    Ok(())
}
