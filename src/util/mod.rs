#![allow(clippy::module_name_repetitions)]
//! Small utilities: command execution, privilege elevation, shell escaping for previews.

pub mod exec;
pub mod privilege;

pub use exec::{Exec, ExecOutput, ExecRequest, ExecService};
pub use privilege::Privilege;

pub fn shell_join(args: &[String]) -> String {
    args.iter()
        .map(|a| shell_escape(a))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn shell_escape(s: &str) -> String {
    if s.is_empty() {
        "''".to_string()
    } else if s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_=./:@,".contains(c))
    {
        s.to_string()
    } else {
        let escaped = s.replace('\'', "'\"'\"'");
        format!("'{}'", escaped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_escape_plain_and_quoted() {
        assert_eq!(shell_escape("--cap-drop=ALL"), "--cap-drop=ALL");
        assert_eq!(shell_escape(""), "''");
        assert_eq!(shell_escape("it's"), "'it'\"'\"'s'");
    }
}
