#![allow(clippy::module_name_repetitions)]
//! Color mode configuration, ANSI painting and the user-facing console.
//!
//! Console policy:
//! - Hook descriptions, progress and outcomes go to the console (stdout by default);
//!   the final fatal error of a command goes to stderr.
//! - Diagnostics go through `tracing` on stderr, never through the console.
//! - Message text is identical with and without color; helpers only add ANSI codes.

use std::io::{self, Write};

use clap::ValueEnum;
use once_cell::sync::OnceCell;

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, ValueEnum)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

static COLOR_MODE: OnceCell<ColorMode> = OnceCell::new();

pub fn set_color_mode(mode: ColorMode) {
    let _ = COLOR_MODE.set(mode);
}

fn parse_color_mode(s: &str) -> Option<ColorMode> {
    match s.trim().to_ascii_lowercase().as_str() {
        "auto" => Some(ColorMode::Auto),
        "always" | "on" | "true" | "yes" => Some(ColorMode::Always),
        "never" | "off" | "false" | "no" => Some(ColorMode::Never),
        _ => None,
    }
}

fn env_color_mode_pref() -> Option<ColorMode> {
    std::env::var("COWJAIL_COLOR")
        .ok()
        .and_then(|v| parse_color_mode(&v))
}

fn no_color_env() -> bool {
    // Per https://no-color.org/
    std::env::var("NO_COLOR").is_ok()
}

fn color_enabled_for(is_tty: bool) -> bool {
    let mode = COLOR_MODE.get().copied().or_else(env_color_mode_pref);
    resolve_color(mode, no_color_env(), is_tty)
}

/// Precedence: explicit mode (flag, then COWJAIL_COLOR), then NO_COLOR, then the TTY.
fn resolve_color(mode: Option<ColorMode>, no_color: bool, is_tty: bool) -> bool {
    match mode {
        Some(ColorMode::Always) => true,
        Some(ColorMode::Never) => false,
        Some(ColorMode::Auto) | None => !no_color && is_tty,
    }
}

pub fn color_enabled_stdout() -> bool {
    color_enabled_for(atty::is(atty::Stream::Stdout))
}

pub fn color_enabled_stderr() -> bool {
    color_enabled_for(atty::is(atty::Stream::Stderr))
}

/// Wrap string with ANSI color code when enabled; otherwise return unchanged.
pub fn paint(enabled: bool, code: &str, s: &str) -> String {
    if enabled {
        format!("{code}{s}\x1b[0m")
    } else {
        s.to_string()
    }
}

const GREEN: &str = "\x1b[92m";
const YELLOW: &str = "\x1b[93m";
const RED: &str = "\x1b[91m";

/// Line-oriented user output. Write errors are ignored.
pub struct Console<'w> {
    out: Box<dyn Write + 'w>,
    color: bool,
}

impl Console<'static> {
    pub fn stdout() -> Self {
        Self {
            out: Box::new(io::stdout()),
            color: color_enabled_stdout(),
        }
    }

    /// For fatal errors, so they stay visible when stdout is redirected.
    pub fn stderr() -> Self {
        Self {
            out: Box::new(io::stderr()),
            color: color_enabled_stderr(),
        }
    }
}

impl<'w> Console<'w> {
    /// Console over an arbitrary writer, without color.
    pub fn new(out: impl Write + 'w) -> Self {
        Self {
            out: Box::new(out),
            color: false,
        }
    }

    fn line(&mut self, s: &str) {
        let _ = writeln!(self.out, "{s}");
        let _ = self.out.flush();
    }

    pub fn info(&mut self, msg: &str) {
        self.line(msg);
    }

    pub fn complete(&mut self, msg: &str) {
        let s = paint(self.color, GREEN, &format!("  + {msg} ...ok"));
        self.line(&s);
    }

    pub fn warn(&mut self, msg: &str) {
        let s = paint(self.color, YELLOW, &format!("  WARN: {msg}"));
        self.line(&s);
    }

    pub fn error(&mut self, msg: &str) {
        let s = paint(self.color, RED, &format!("  ERROR: {msg}"));
        self.line(&s);
    }

    pub fn failed(&mut self, msg: &str) {
        let s = paint(self.color, RED, &format!("  ERROR: {msg} ...failed"));
        self.line(&s);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_color_mode_synonyms() {
        assert_eq!(parse_color_mode(" ON "), Some(ColorMode::Always));
        assert_eq!(parse_color_mode("no"), Some(ColorMode::Never));
        assert_eq!(parse_color_mode("rainbow"), None);
    }

    #[test]
    fn test_explicit_mode_wins_over_no_color() {
        assert!(resolve_color(Some(ColorMode::Always), true, false));
        assert!(!resolve_color(Some(ColorMode::Never), false, true));
        assert!(!resolve_color(Some(ColorMode::Auto), true, true));
        assert!(!resolve_color(None, true, true));
        assert!(resolve_color(None, false, true));
        assert!(!resolve_color(None, false, false));
    }

    #[test]
    fn test_console_lines_are_plain_without_color() {
        let mut buf = Vec::new();
        {
            let mut c = Console::new(&mut buf);
            c.info("mounting overlay fs");
            c.complete("weechat-bridge network created");
            c.failed("0b10/weechat:edge");
        }
        let s = String::from_utf8(buf).unwrap();
        assert_eq!(
            s,
            "mounting overlay fs\n  + weechat-bridge network created ...ok\n  ERROR: 0b10/weechat:edge ...failed\n"
        );
    }
}
