use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "cowjail",
    version,
    about = "Run an interactive container on a copy-on-write home with allow-listed egress"
)]
pub(crate) struct Cli {
    /// Configuration file (defaults to ~/.config/cowjail/config.yaml, then built-ins)
    #[arg(long, global = true, env = "COWJAIL_CONFIG")]
    pub(crate) config: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(long, short, global = true)]
    pub(crate) verbose: bool,

    /// Print the planned hooks and engine command line without executing
    #[arg(long = "dry-run", global = true)]
    pub(crate) dry_run: bool,

    /// Colorize output: auto|always|never
    #[arg(long, global = true, value_enum)]
    pub(crate) color: Option<cowjail::ColorMode>,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub(crate) enum Command {
    /// Set up the overlay and bridge, run the container, then tear down
    Run {
        /// Target name or alias
        target: String,
    },
    /// Stop every running container of the target image
    Stop {
        /// Target name or alias
        target: String,
    },
    /// Resolve allow-listed hosts, program the firewall and write the hosts file
    Net {
        /// Target name or alias
        target: String,
    },
    /// List configured targets with their image and aliases
    Targets,
}
