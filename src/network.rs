//! Bridge network lifecycle for the session container.

use crate::engine::Engine;
use crate::errors::Result;
use crate::target::NetworkSpec;

pub struct BridgeManager<'a> {
    engine: &'a Engine<'a>,
}

impl<'a> BridgeManager<'a> {
    pub fn new(engine: &'a Engine<'a>) -> Self {
        Self { engine }
    }

    /// Create the bridge; fails if a network of that name still exists.
    pub fn create(&self, spec: &NetworkSpec) -> Result<()> {
        self.engine.create_network(spec)?;
        tracing::info!(bridge = %spec.bridge_name, subnet = %spec.subnet, "network created");
        Ok(())
    }

    /// Remove every network named `name`, including orphans of crashed sessions.
    /// Returns how many were removed; none existing is not an error.
    pub fn remove(&self, name: &str) -> Result<usize> {
        let nets = self.engine.networks_named(name)?;
        for net in &nets {
            self.engine.remove_network(&net.id)?;
            tracing::info!(bridge = %net.name, id = %net.id, "network removed");
        }
        Ok(nets.len())
    }
}
