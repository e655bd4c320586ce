//! Error mapping guide:
//! - Map io::ErrorKind::NotFound to exit code 127; all others to 1.
//! - Phase errors carry the human-readable reason verbatim; `Display` is what the CLI prints.
//! - Teardown and stop failures are collected, never reduced to the first one.
use std::fmt;
use std::io;

/// Errors surfaced by session setup, run, teardown and stop.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InputValidation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to resolve '{host}': {reason}")]
    Resolution { host: String, reason: String },

    #[error("firewall: {0}")]
    Firewall(String),

    #[error("mount failed: {0}")]
    Mount(String),

    #[error("unmount failed: {0}")]
    Unmount(String),

    #[error("cleanup failed: {0}")]
    Cleanup(String),

    #[error("network: {0}")]
    Network(String),

    #[error("invalid container handle: {0:?}")]
    InvalidHandle(String),

    #[error("container engine: {0}")]
    Engine(String),

    #[error("{0}")]
    Teardown(Failures),

    #[error("failed to stop {} container(s): {}", .0.len(), .0)]
    Stop(Failures),

    #[error("another session of '{0}' is already running (lock held)")]
    Locked(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Ordered collection of failures from a best-effort sequence.
#[derive(Debug, Default)]
pub struct Failures(Vec<Error>);

impl Failures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, e: Error) {
        self.0.push(e);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Error> {
        self.0.iter()
    }

    /// `Ok(())` when nothing failed, otherwise the collection wrapped by `wrap`.
    pub fn into_result(self, wrap: fn(Failures) -> Error) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(wrap(self))
        }
    }
}

impl fmt::Display for Failures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|e| e.to_string()).collect();
        f.write_str(&parts.join("; "))
    }
}

/// Map an io::Error to a process exit code:
/// - 127 for NotFound (command not found)
/// - 1 for all other errors
pub fn exit_code_for_io_error(e: &io::Error) -> u8 {
    if e.kind() == io::ErrorKind::NotFound {
        127
    } else {
        1
    }
}

/// Convert a session error to an exit code (parity with io::Error mapping).
pub fn exit_code_for_error(e: &Error) -> u8 {
    match e {
        Error::Io(ioe) => exit_code_for_io_error(ioe),
        _ => 1,
    }
}
