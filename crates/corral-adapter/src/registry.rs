//! Registry of resource adapters by name.
//!
//! The registry is populated once at process start and shared by reference
//! with the orchestrator. Resolution is a pure lookup.

use std::collections::HashMap;
use std::sync::Arc;

use corral_store::HardwareProfile;
use parking_lot::RwLock;

use crate::adapter::ResourceAdapter;
use crate::{AdapterError, Result};

/// Adapter instances keyed by adapter name.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: RwLock<HashMap<String, Arc<dyn ResourceAdapter>>>,
}

impl AdapterRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own name, replacing any previous one.
    pub fn register(&self, adapter: Arc<dyn ResourceAdapter>) {
        let name = adapter.name().to_string();
        self.adapters.write().insert(name, adapter);
    }

    /// Register an adapter under an explicit name.
    pub fn register_as(&self, name: impl Into<String>, adapter: Arc<dyn ResourceAdapter>) {
        self.adapters.write().insert(name.into(), adapter);
    }

    /// Get an adapter by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn ResourceAdapter>> {
        self.adapters.read().get(name).cloned()
    }

    /// Resolve the adapter of a hardware profile.
    ///
    /// # Errors
    ///
    /// Returns `OperationFailed` if the profile has no adapter configured or
    /// the configured adapter is not registered.
    pub fn resolve(&self, hardware_profile: &HardwareProfile) -> Result<Arc<dyn ResourceAdapter>> {
        let name = hardware_profile.resource_adapter.as_deref().ok_or_else(|| {
            AdapterError::OperationFailed(format!(
                "hardware profile [{}] does not have an associated resource adapter",
                hardware_profile.name
            ))
        })?;

        self.get(name).ok_or_else(|| {
            AdapterError::OperationFailed(format!(
                "resource adapter [{name}] of hardware profile [{}] is not registered",
                hardware_profile.name
            ))
        })
    }

    /// Names of all registered adapters, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.adapters.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Get the number of registered adapters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.read().len()
    }

    /// Check if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.read().is_empty()
    }
}
