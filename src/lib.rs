#![doc = r#"
cowjail runs an interactive container on top of a copy-on-write overlay of a
persistent home directory, on a dedicated bridge network, with egress limited to
an allow-list of resolved hosts.

Modules:
- config: YAML configuration and built-in targets
- target: immutable session descriptors
- session: run/stop lifecycle with guaranteed teardown
- hooks, overlay, network: setup and teardown steps
- resolver, firewall: allow-list resolution and egress programming
- engine: container engine CLI adapter
- images: local image builds and OS package installation
- util: command execution seam and privilege elevation
"#]

pub mod color;
pub mod config;
pub mod engine;
pub mod errors;
pub mod firewall;
pub mod hooks;
pub mod images;
pub mod lock;
pub mod network;
pub mod overlay;
pub mod resolver;
pub mod session;
pub mod target;
pub mod telemetry;
pub mod util;

pub use color::{set_color_mode, ColorMode, Console};
pub use config::Config;
pub use engine::{container_runtime_path, parse_handles, ContainerHandle, Engine};
pub use errors::{exit_code_for_error, exit_code_for_io_error, Error, Failures, Result};
pub use hooks::{Hook, HookContext};
pub use session::{Phase, RunReport, SessionController, SessionOutcome, StopReport};
pub use target::{AllowList, NetworkSpec, OverlayPaths, Target};
pub use telemetry::telemetry_init;
pub use util::{shell_join, Exec, ExecOutput, ExecRequest, ExecService, Privilege};
