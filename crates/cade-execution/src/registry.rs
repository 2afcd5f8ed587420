use cade_core::capability::{Capability, CapabilityHandle, CapabilityRegistry};
use std::collections::HashMap;
use std::sync::Arc;

/// `CapabilityRegistry` populated at startup.
///
/// Names are resolved into handles once, at registration.
#[derive(Default, Clone)]
pub struct InMemoryCapabilityRegistry {
    handles: HashMap<String, CapabilityHandle>,
}

impl InMemoryCapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `capability` under `name`, replacing any previous registration.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        capability: Arc<dyn Capability>,
    ) -> &mut Self {
        let name = name.into();
        let handle = CapabilityHandle::new(name.as_str(), capability);
        if self.handles.insert(name.clone(), handle).is_some() {
            tracing::debug!(capability = %name, "Replaced capability registration");
        }
        self
    }

    /// Builder-style `register`.
    pub fn with(mut self, name: impl Into<String>, capability: Arc<dyn Capability>) -> Self {
        self.register(name, capability);
        self
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl CapabilityRegistry for InMemoryCapabilityRegistry {
    fn get(&self, name: &str) -> Option<CapabilityHandle> {
        self.handles.get(name).cloned()
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handles.keys().cloned().collect();
        names.sort();
        names
    }
}
