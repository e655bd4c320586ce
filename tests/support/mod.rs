/*!
Test support helpers shared across integration tests.

- RecordingExec: fake `Exec` that records every command line and answers from
  scripted rules (first rule whose needle occurs in the command line wins;
  anything unmatched succeeds with empty output)
- target_in(root): the weechat target with its session root and hosts file under `root`
*/

use std::cell::RefCell;
use std::path::Path;

use cowjail::{Config, Exec, ExecOutput, ExecRequest, Target};

#[derive(Default)]
pub struct RecordingExec {
    calls: RefCell<Vec<String>>,
    rules: Vec<(String, ExecOutput)>,
}

#[allow(dead_code)]
impl RecordingExec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands containing `needle` with exit `code` and `stdout`.
    pub fn respond(mut self, needle: &str, code: i32, stdout: &str) -> Self {
        self.rules.push((
            needle.to_string(),
            ExecOutput {
                code: Some(code),
                stdout: stdout.to_string(),
                ..ExecOutput::default()
            },
        ));
        self
    }

    /// Fail commands containing `needle` with exit 1 and `stderr`.
    pub fn fail(mut self, needle: &str, stderr: &str) -> Self {
        self.rules.push((
            needle.to_string(),
            ExecOutput {
                code: Some(1),
                stderr: stderr.to_string(),
                ..ExecOutput::default()
            },
        ));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.contains(needle))
            .count()
    }

    /// Index of the first call containing `needle`.
    pub fn position(&self, needle: &str) -> Option<usize> {
        self.calls.borrow().iter().position(|c| c.contains(needle))
    }
}

impl Exec for RecordingExec {
    fn run(&self, request: ExecRequest) -> anyhow::Result<ExecOutput> {
        let line = request.command_line();
        self.calls.borrow_mut().push(line.clone());
        let out = self
            .rules
            .iter()
            .find(|(needle, _)| line.contains(needle.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_else(|| ExecOutput {
                code: Some(0),
                ..ExecOutput::default()
            });
        Ok(out)
    }
}

#[allow(dead_code)]
pub fn config_in(root: &Path) -> Config {
    let yaml = format!(
        r#"
targets:
  weechat:
    image: 0b10/weechat:edge
    session_root: '{root}'
    network:
      bridge_name: weechat-bridge
      subnet: 172.18.0.0/30
      ip_range: 172.18.0.0/30
      gateway: 172.18.0.1
    allowlist:
      set_name: irc
      hosts: [freenode.net, example.com]
      hosts_file: '{root}/hosts'
"#,
        root = root.display()
    );
    Config::from_yaml_str(&yaml).expect("test config parses")
}

#[allow(dead_code)]
pub fn target_in(root: &Path) -> Target {
    config_in(root).target("wc").expect("test target builds")
}
