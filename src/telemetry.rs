//! Diagnostic logging on stderr.
//!
//! Filter comes from COWJAIL_LOG (EnvFilter syntax); default "warn", or "debug"
//! for cowjail itself when verbose. User-facing progress goes through `Console`.

use std::env;

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;

static INIT: OnceCell<()> = OnceCell::new();

fn filter_directive(verbose: bool) -> String {
    match env::var("COWJAIL_LOG") {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ if verbose => "warn,cowjail=debug".to_string(),
        _ => "warn".to_string(),
    }
}

/// Install the global subscriber once; later calls are no-ops.
pub fn telemetry_init(verbose: bool) {
    if INIT.get().is_some() {
        return;
    }
    let filter = EnvFilter::try_new(filter_directive(verbose))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
    if installed.is_err() {
        eprintln!("cowjail: logging init skipped (global subscriber already set)");
    }
    let _ = INIT.set(());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        telemetry_init(false);
        telemetry_init(true);
        assert!(INIT.get().is_some());
    }
}
