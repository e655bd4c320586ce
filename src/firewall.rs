/*!
Egress allow-list: a `hash:net` ip set of resolved hosts and one ACCEPT rule at the
head of OUTPUT that matches it.

Programming is all-or-nothing from the caller's point of view: any failed create,
add or insert is returned and the session must not proceed.
*/
use std::collections::BTreeSet;

use crate::errors::{Error, Result};
use crate::resolver::HostEntry;
use crate::util::{Exec, ExecOutput, Privilege};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Inet,
    Inet6,
}

impl Family {
    fn of(entries: &[HostEntry]) -> Result<Self> {
        let v4 = entries.iter().filter(|e| e.address.is_ipv4()).count();
        match (v4, entries.len() - v4) {
            (0, 0) => Err(Error::Firewall("allow-list is empty".to_string())),
            (_, 0) => Ok(Family::Inet),
            (0, _) => Ok(Family::Inet6),
            _ => Err(Error::Firewall(
                "allow-list mixes IPv4 and IPv6 addresses; one set holds a single family"
                    .to_string(),
            )),
        }
    }

    fn ipset_name(self) -> &'static str {
        match self {
            Family::Inet => "inet",
            Family::Inet6 => "inet6",
        }
    }

    fn iptables(self) -> &'static str {
        match self {
            Family::Inet => "iptables",
            Family::Inet6 => "ip6tables",
        }
    }
}

pub struct Firewall<'a> {
    exec: &'a dyn Exec,
    privilege: &'a Privilege,
}

impl<'a> Firewall<'a> {
    pub fn new(exec: &'a dyn Exec, privilege: &'a Privilege) -> Self {
        Self { exec, privilege }
    }

    /// (Re)create `set_name` from `entries` and allow egress to it.
    pub fn program(&self, set_name: &str, entries: &[HostEntry]) -> Result<()> {
        if set_name.trim().is_empty() {
            return Err(Error::Firewall("ip set name must not be empty".to_string()));
        }
        let family = Family::of(entries)?;

        // A rule left over from a previous run keeps the set busy; both may be absent.
        let stale_rule = self.call(family.iptables(), &rule_args("-D", set_name));
        tracing::debug!(removed = stale_rule.is_ok(), "stale egress rule");
        let destroyed = self.call("ipset", &["destroy".to_string(), set_name.to_string()]);
        tracing::debug!(destroyed = destroyed.is_ok(), set = set_name, "previous ip set");

        self.call(
            "ipset",
            &[
                "create".to_string(),
                set_name.to_string(),
                "hash:net".to_string(),
                "family".to_string(),
                family.ipset_name().to_string(),
            ],
        )?;
        // Hosts behind one front end resolve alike; a second add of a member fails.
        let mut seen = BTreeSet::new();
        for entry in entries {
            let cidr = entry.cidr();
            if !seen.insert(cidr.clone()) {
                tracing::debug!(host = %entry.hostname, %cidr, "address already in set");
                continue;
            }
            self.call("ipset", &["add".to_string(), set_name.to_string(), cidr])?;
        }
        self.call(family.iptables(), &rule_args("-I", set_name))?;
        tracing::info!(set = set_name, entries = entries.len(), "egress allow-list installed");
        Ok(())
    }

    /// Command lines `program` would run; addresses are unknown until resolution.
    pub fn plan(&self, set_name: &str, hostnames: &[String]) -> Vec<String> {
        let preview = |program: &str, args: Vec<String>| {
            self.privilege.request(program, args).command_line()
        };
        let words = |ws: &[&str]| ws.iter().map(|w| w.to_string()).collect::<Vec<_>>();
        let mut lines = vec![
            preview("iptables", rule_args("-D", set_name)),
            preview("ipset", words(&["destroy", set_name])),
            preview("ipset", words(&["create", set_name, "hash:net", "family", "<family>"])),
        ];
        lines.extend(hostnames.iter().map(|h| {
            let member = format!("<{h}>/32");
            preview("ipset", words(&["add", set_name, member.as_str()]))
        }));
        lines.push(preview("iptables", rule_args("-I", set_name)));
        lines
    }

    fn call(&self, program: &str, args: &[String]) -> Result<ExecOutput> {
        let req = self.privilege.request(program, args);
        let line = req.command_line();
        let out = self
            .exec
            .run(req)
            .map_err(|e| Error::Firewall(format!("{line}: {e:#}")))?;
        if out.success() {
            Ok(out)
        } else {
            Err(Error::Firewall(format!("{line}: {}", out.failure_reason())))
        }
    }
}

fn rule_args(op: &str, set_name: &str) -> Vec<String> {
    [op, "OUTPUT", "-m", "set", "--match-set", set_name, "dst", "-j", "ACCEPT"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(host: &str, ip: &str) -> HostEntry {
        HostEntry::new(host, ip.parse().unwrap()).unwrap()
    }

    #[test]
    fn test_family_follows_entries() {
        assert_eq!(Family::of(&[entry("a", "1.2.3.4")]).unwrap(), Family::Inet);
        assert_eq!(Family::of(&[entry("a", "::1")]).unwrap(), Family::Inet6);
        assert!(Family::of(&[entry("a", "1.2.3.4"), entry("b", "::1")]).is_err());
        assert!(Family::of(&[]).is_err());
    }

    #[test]
    fn test_rule_args_inserts_at_head_of_output() {
        assert_eq!(
            rule_args("-I", "irc").join(" "),
            "-I OUTPUT -m set --match-set irc dst -j ACCEPT"
        );
    }
}
