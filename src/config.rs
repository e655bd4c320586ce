/*!
Configuration: built once at startup and passed into every component.

Lookup order for the file: explicit path (`--config` / `COWJAIL_CONFIG`), then
`$XDG_CONFIG_HOME/cowjail/config.yaml`, then `~/.config/cowjail/config.yaml`.
Without a file the built-in defaults apply.
*/
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::errors::{Error, Result};
use crate::hooks::Hook;
use crate::target::{validate_target_name, AllowList, NetworkSpec, OverlayPaths, Target};

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Container engine executable, looked up on PATH.
    pub engine: String,
    /// Exported as DOCKER_HOST for every engine call.
    pub daemon_url: Option<String>,
    /// Prepended to mount/umount/ipset/iptables; empty disables elevation.
    pub privilege_helper: Option<String>,
    /// Upper bound for captured commands, e.g. "30s".
    pub command_timeout: String,
    pub global_run_options: Vec<String>,
    pub aliases: BTreeMap<String, String>,
    pub targets: BTreeMap<String, TargetConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    pub image: String,
    /// Relative paths are taken from the home directory.
    pub session_root: PathBuf,
    #[serde(default = "default_mount_point")]
    pub mount_point: String,
    #[serde(default)]
    pub run_options: Vec<String>,
    pub network: NetworkConfig,
    pub allowlist: AllowListConfig,
    #[serde(default = "Hook::default_pre")]
    pub pre_hooks: Vec<Hook>,
    #[serde(default = "Hook::default_post")]
    pub post_hooks: Vec<Hook>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkConfig {
    pub bridge_name: String,
    #[serde(default = "default_driver")]
    pub driver: String,
    pub subnet: String,
    pub ip_range: String,
    pub gateway: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AllowListConfig {
    pub set_name: String,
    pub hosts: Vec<String>,
    pub hosts_file: PathBuf,
    #[serde(default)]
    pub resolver_options: Vec<String>,
}

fn default_mount_point() -> String {
    "/weechat".to_string()
}

fn default_driver() -> String {
    "bridge".to_string()
}

impl Default for Config {
    fn default() -> Self {
        let mut aliases = BTreeMap::new();
        aliases.insert("weechat".to_string(), "weechat".to_string());
        aliases.insert("wc".to_string(), "weechat".to_string());

        let mut targets = BTreeMap::new();
        targets.insert(
            "weechat".to_string(),
            TargetConfig {
                image: "0b10/weechat:edge".to_string(),
                session_root: PathBuf::from(".weechat"),
                mount_point: default_mount_point(),
                run_options: Vec::new(),
                network: NetworkConfig {
                    bridge_name: "weechat-bridge".to_string(),
                    driver: default_driver(),
                    subnet: "172.18.0.0/30".to_string(),
                    ip_range: "172.18.0.0/30".to_string(),
                    gateway: "172.18.0.1".to_string(),
                },
                allowlist: AllowListConfig {
                    set_name: "irc".to_string(),
                    hosts: vec!["freenode.net".to_string(), "example.com".to_string()],
                    hosts_file: PathBuf::from("/tmp/hosts"),
                    resolver_options: Vec::new(),
                },
                pre_hooks: Hook::default_pre(),
                post_hooks: Hook::default_post(),
            },
        );

        Self {
            engine: "docker".to_string(),
            daemon_url: Some("unix:///var/run/docker.sock".to_string()),
            privilege_helper: Some("sudo".to_string()),
            command_timeout: "30s".to_string(),
            global_run_options: [
                "--rm",
                "--interactive",
                "--tty",
                "--cap-drop=ALL",
                "--read-only",
                "--privileged=false",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            aliases,
            targets,
        }
    }
}

impl Config {
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        serde_yaml::from_str(s).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load `explicit` if given (must exist), else the default location if present,
    /// else the built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => match default_config_path().filter(|p| p.is_file()) {
                Some(p) => p,
                None => {
                    tracing::debug!("no configuration file; using built-in defaults");
                    return Ok(Self::default());
                }
            },
        };
        let text = fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Self::from_yaml_str(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Canonical target name for an alias; unknown names map to themselves.
    pub fn resolve_alias<'s>(&'s self, name: &'s str) -> &'s str {
        self.aliases.get(name).map(String::as_str).unwrap_or(name)
    }

    pub fn command_timeout(&self) -> Result<Duration> {
        humantime::parse_duration(self.command_timeout.trim()).map_err(|e| {
            Error::Config(format!("command_timeout {:?}: {e}", self.command_timeout))
        })
    }

    /// Build the immutable descriptor for `name` (alias or canonical).
    pub fn target(&self, name: &str) -> Result<Target> {
        validate_target_name(name)?;
        let canonical = self.resolve_alias(name);
        let tc = self.targets.get(canonical).ok_or_else(|| {
            Error::InputValidation(format!(
                "unknown target {name:?} (known: {})",
                self.targets.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })?;

        let network = NetworkSpec::parse(
            &tc.network.bridge_name,
            &tc.network.driver,
            &tc.network.subnet,
            &tc.network.ip_range,
            &tc.network.gateway,
        )?;
        let session_root = absolute_from_home(&tc.session_root)?;
        let overlay = OverlayPaths::under(&session_root)?;
        if tc.image.trim().is_empty() {
            return Err(Error::InputValidation(format!(
                "target {canonical:?} has no image"
            )));
        }
        if tc.allowlist.hosts.iter().any(|h| h.trim().is_empty()) {
            return Err(Error::InputValidation(format!(
                "target {canonical:?} has an empty allow-list hostname"
            )));
        }

        let mut run_options = tc.run_options.clone();
        run_options.push("--volume".to_string());
        run_options.push(format!("{}:{}:rw", overlay.merged.display(), tc.mount_point));
        run_options.push("--network".to_string());
        run_options.push(network.bridge_name.clone());

        Ok(Target {
            name: canonical.to_string(),
            image: tc.image.trim().to_string(),
            run_options,
            network,
            overlay,
            session_root,
            allowlist: AllowList {
                set_name: tc.allowlist.set_name.clone(),
                hosts: tc.allowlist.hosts.clone(),
                hosts_file: tc.allowlist.hosts_file.clone(),
                resolver_options: tc.allowlist.resolver_options.clone(),
            },
            pre_hooks: tc.pre_hooks.clone(),
            post_hooks: tc.post_hooks.clone(),
        })
    }

    /// Aliases pointing at `target`, sorted.
    pub fn aliases_of(&self, target: &str) -> Vec<&str> {
        self.aliases
            .iter()
            .filter(|(alias, canonical)| canonical.as_str() == target && alias.as_str() != target)
            .map(|(alias, _)| alias.as_str())
            .collect()
    }
}

fn default_config_path() -> Option<PathBuf> {
    let base = env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| home::home_dir().map(|h| h.join(".config")))?;
    Some(base.join("cowjail").join("config.yaml"))
}

fn absolute_from_home(p: &Path) -> Result<PathBuf> {
    if p.is_absolute() {
        return Ok(p.to_path_buf());
    }
    let home = home::home_dir()
        .ok_or_else(|| Error::Config("cannot determine the home directory".to_string()))?;
    Ok(home.join(p))
}
