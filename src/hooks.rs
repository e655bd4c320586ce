/*!
Setup and teardown hooks.

A hook is a tag with a fixed description; the action is parameterized by the
`HookContext` handed in at execution time, so hook tables hold no captured state
and can be exercised against fabricated paths.
*/
use serde::Deserialize;

use crate::errors::Result;
use crate::network::BridgeManager;
use crate::overlay::OverlayManager;
use crate::target::{NetworkSpec, OverlayPaths};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Hook {
    DiscardUpper,
    CreateDirs,
    MountOverlay,
    RecreateNetwork,
    UnmountOverlay,
    ResetUpper,
    RemoveNetwork,
}

/// Components and arguments a hook acts on.
pub struct HookContext<'c, 'a> {
    pub overlay: &'c OverlayManager<'a>,
    pub bridge: &'c BridgeManager<'a>,
    pub paths: &'c OverlayPaths,
    pub network: &'c NetworkSpec,
}

impl Hook {
    pub fn description(&self) -> &'static str {
        match self {
            Hook::DiscardUpper => "discarding any previous overlay data",
            Hook::CreateDirs => "creating overlay directories",
            Hook::MountOverlay => "mounting overlay fs",
            Hook::RecreateNetwork => "recreating bridge network",
            Hook::UnmountOverlay => "unmounting overlay fs",
            Hook::ResetUpper => "discarding overlay data",
            Hook::RemoveNetwork => "removing bridge network",
        }
    }

    /// Run the hook. `Some(note)` is an outcome line for the console.
    pub fn execute(&self, ctx: &HookContext<'_, '_>) -> Result<Option<String>> {
        let name = &ctx.network.bridge_name;
        match self {
            Hook::DiscardUpper => {
                ctx.overlay.discard_upper(ctx.paths);
                Ok(None)
            }
            Hook::CreateDirs => ctx.overlay.create_dirs(ctx.paths).map(|_| None),
            Hook::MountOverlay => ctx.overlay.mount(ctx.paths).map(|_| None),
            Hook::RecreateNetwork => {
                ctx.bridge.remove(name)?;
                ctx.bridge.create(ctx.network)?;
                Ok(Some(format!("{name} network created")))
            }
            Hook::UnmountOverlay => ctx.overlay.unmount(ctx.paths).map(|_| None),
            Hook::ResetUpper => ctx.overlay.reset_upper(ctx.paths).map(|_| None),
            Hook::RemoveNetwork => {
                let removed = ctx.bridge.remove(name)?;
                Ok(Some(removal_note(name, removed)))
            }
        }
    }

    pub fn default_pre() -> Vec<Hook> {
        vec![
            Hook::DiscardUpper,
            Hook::CreateDirs,
            Hook::MountOverlay,
            Hook::RecreateNetwork,
        ]
    }

    pub fn default_post() -> Vec<Hook> {
        vec![Hook::UnmountOverlay, Hook::ResetUpper, Hook::RemoveNetwork]
    }
}

pub(crate) fn removal_note(name: &str, removed: usize) -> String {
    if removed == 0 {
        format!("no existing network \"{name}\" to remove")
    } else {
        format!("existing network \"{name}\" removed")
    }
}
