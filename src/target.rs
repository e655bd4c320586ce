/*!
Session descriptors: the immutable `Target` and the validated value types it carries.

- NetworkSpec: bridge name/driver plus a subnet that contains both gateway and IP range
- OverlayPaths: four distinct directories for the lower/upper/work/merged overlay layout
- AllowList: hosts the container may reach and where the resolved mapping is written
*/
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use ipnetwork::IpNetwork;

use crate::errors::{Error, Result};
use crate::hooks::Hook;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSpec {
    pub bridge_name: String,
    pub driver: String,
    pub subnet: IpNetwork,
    pub ip_range: IpNetwork,
    pub gateway: IpAddr,
}

impl NetworkSpec {
    /// Parse and validate; the gateway and the IP range must lie within the subnet.
    pub fn parse(
        bridge_name: &str,
        driver: &str,
        subnet: &str,
        ip_range: &str,
        gateway: &str,
    ) -> Result<Self> {
        if bridge_name.trim().is_empty() {
            return Err(Error::InputValidation(
                "network bridge name must not be empty".to_string(),
            ));
        }
        let subnet: IpNetwork = subnet
            .trim()
            .parse()
            .map_err(|e| Error::InputValidation(format!("subnet {subnet:?}: {e}")))?;
        let ip_range: IpNetwork = ip_range
            .trim()
            .parse()
            .map_err(|e| Error::InputValidation(format!("ip range {ip_range:?}: {e}")))?;
        let gateway: IpAddr = gateway
            .trim()
            .parse()
            .map_err(|e| Error::InputValidation(format!("gateway {gateway:?}: {e}")))?;

        if !subnet.contains(gateway) {
            return Err(Error::InputValidation(format!(
                "gateway {gateway} is outside subnet {subnet}"
            )));
        }
        if ip_range.prefix() < subnet.prefix() || !subnet.contains(ip_range.network()) {
            return Err(Error::InputValidation(format!(
                "ip range {ip_range} is outside subnet {subnet}"
            )));
        }
        Ok(Self {
            bridge_name: bridge_name.trim().to_string(),
            driver: driver.trim().to_string(),
            subnet,
            ip_range,
            gateway,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayPaths {
    pub lower: PathBuf,
    pub upper: PathBuf,
    pub work: PathBuf,
    pub merged: PathBuf,
}

impl OverlayPaths {
    pub fn new(
        lower: impl Into<PathBuf>,
        upper: impl Into<PathBuf>,
        work: impl Into<PathBuf>,
        merged: impl Into<PathBuf>,
    ) -> Result<Self> {
        let paths = Self {
            lower: lower.into(),
            upper: upper.into(),
            work: work.into(),
            merged: merged.into(),
        };
        let all = paths.all();
        for (i, a) in all.iter().enumerate() {
            if a.as_os_str().is_empty() {
                return Err(Error::InputValidation(
                    "overlay paths must not be empty".to_string(),
                ));
            }
            if all[i + 1..].iter().any(|b| b == a) {
                return Err(Error::InputValidation(format!(
                    "overlay path {} is used for more than one layer",
                    a.display()
                )));
            }
        }
        Ok(paths)
    }

    /// Standard layout below a session root: `client/` is the persistent home,
    /// `cow/{upperdir,workdir,merged}` hold the session-local layers.
    pub fn under(root: &Path) -> Result<Self> {
        let cow = root.join("cow");
        Self::new(
            root.join("client"),
            cow.join("upperdir"),
            cow.join("workdir"),
            cow.join("merged"),
        )
    }

    /// lower, upper, work, merged in creation order.
    pub fn all(&self) -> [&Path; 4] {
        [&self.lower, &self.upper, &self.work, &self.merged]
    }

    /// `lowerdir=..,upperdir=..,workdir=..` for the overlay mount.
    pub fn mount_options(&self) -> String {
        format!(
            "lowerdir={},upperdir={},workdir={}",
            self.lower.display(),
            self.upper.display(),
            self.work.display()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowList {
    pub set_name: String,
    pub hosts: Vec<String>,
    pub hosts_file: PathBuf,
    pub resolver_options: Vec<String>,
}

/// Everything one session of a container needs; built from `Config` and never mutated.
#[derive(Debug, Clone)]
pub struct Target {
    pub name: String,
    pub image: String,
    pub run_options: Vec<String>,
    pub network: NetworkSpec,
    pub overlay: OverlayPaths,
    pub session_root: PathBuf,
    pub allowlist: AllowList,
    pub pre_hooks: Vec<Hook>,
    pub post_hooks: Vec<Hook>,
}

impl Target {
    pub fn lock_path(&self) -> PathBuf {
        self.session_root.join(".cowjail.lock")
    }
}

/// Target names are word characters and hyphens.
pub fn validate_target_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(Error::InputValidation(format!(
            "target name {name:?} must be non-empty and contain only word characters or hyphens"
        )))
    }
}
