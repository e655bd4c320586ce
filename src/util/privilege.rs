/*!
Privilege elevation for mount, ipset and iptables calls.

The helper (sudo by default) is prepended to the request unless the process already
runs with effective uid 0 or no helper is configured.
*/
use std::ffi::OsString;

use super::ExecRequest;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Privilege {
    helper: Option<String>,
}

impl Privilege {
    pub fn new(helper: Option<&str>) -> Self {
        let helper = helper
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(str::to_string);
        Self { helper }
    }

    /// Helper configured, but skipped when already root.
    pub fn detect(helper: Option<&str>) -> Self {
        if is_root() {
            Self::new(None)
        } else {
            Self::new(helper)
        }
    }

    pub fn helper(&self) -> Option<&str> {
        self.helper.as_deref()
    }

    /// Privileged calls can succeed: a helper is configured or we already are root.
    pub fn can_elevate(&self) -> bool {
        self.helper.is_some() || is_root()
    }

    /// Build a request for `program args...`, elevated when a helper is active.
    pub fn request<I, S>(&self, program: &str, args: I) -> ExecRequest
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        match &self.helper {
            Some(h) => ExecRequest::new(h.as_str()).arg(program).args(args),
            None => ExecRequest::new(program).args(args),
        }
    }
}

#[cfg(unix)]
fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

#[cfg(not(unix))]
fn is_root() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_prepends_helper() {
        let p = Privilege::new(Some("sudo"));
        let req = p.request("umount", ["/m"]);
        assert_eq!(req.command_line(), "sudo umount /m");
    }

    #[test]
    fn test_blank_helper_is_disabled() {
        let p = Privilege::new(Some("  "));
        assert_eq!(p.helper(), None);
        assert_eq!(p.request("ipset", ["list"]).command_line(), "ipset list");
    }
}
