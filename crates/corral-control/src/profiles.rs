//! Profile model queries.
//!
//! Read-only views over the hardware/software usable-with mapping, plus
//! mapping maintenance by profile name.

use std::collections::BTreeSet;

use corral_core::HardwareProfileId;
use corral_store::{HardwareProfile, Node, SoftwareProfile, Store};
use tracing::info;

use crate::error::{ControlError, Result};

/// Profile lookups against a store.
#[derive(Clone, Copy)]
pub struct ProfileModel<'a> {
    store: &'a dyn Store,
}

impl<'a> ProfileModel<'a> {
    /// Create a model over a store.
    #[must_use]
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Resolve a hardware profile by name.
    ///
    /// # Errors
    ///
    /// Returns `HardwareProfileNotFound` if no profile has this name.
    pub fn hardware_profile(&self, name: &str) -> Result<HardwareProfile> {
        self.store
            .get_hardware_profile_by_name(name)?
            .ok_or_else(|| ControlError::HardwareProfileNotFound(name.to_string()))
    }

    /// Resolve a software profile by name.
    ///
    /// # Errors
    ///
    /// Returns `SoftwareProfileNotFound` if no profile has this name.
    pub fn software_profile(&self, name: &str) -> Result<SoftwareProfile> {
        self.store
            .get_software_profile_by_name(name)?
            .ok_or_else(|| ControlError::SoftwareProfileNotFound(name.to_string()))
    }

    /// Returns true if nodes of `hardware_profile` may run `software_profile`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lookup fails.
    pub fn is_usable(
        &self,
        hardware_profile: &HardwareProfile,
        software_profile: &SoftwareProfile,
    ) -> Result<bool> {
        Ok(self.store.is_usable(
            &hardware_profile.hardware_profile_id,
            &software_profile.software_profile_id,
        )?)
    }

    /// Hardware profiles allowed to run the named software profile.
    ///
    /// # Errors
    ///
    /// Returns `SoftwareProfileNotFound` for an unknown name.
    pub fn allowed_hardware_profiles(
        &self,
        software_profile: &str,
    ) -> Result<BTreeSet<HardwareProfileId>> {
        let sw = self.software_profile(software_profile)?;
        Ok(self
            .store
            .allowed_hardware_profiles(&sw.software_profile_id)?)
    }

    /// Allow the named software profile on the named hardware profile.
    ///
    /// Returns `false` if the mapping already existed.
    ///
    /// # Errors
    ///
    /// Returns a not-found error for unknown names.
    pub fn set_profile_mapping(&self, hardware_profile: &str, software_profile: &str) -> Result<bool> {
        let hw = self.hardware_profile(hardware_profile)?;
        let sw = self.software_profile(software_profile)?;
        let added = self
            .store
            .add_profile_mapping(&sw.software_profile_id, &hw.hardware_profile_id)?;
        if added {
            info!(
                hardware_profile = %hw.name,
                software_profile = %sw.name,
                "profile mapping added"
            );
        }
        Ok(added)
    }

    /// Idle nodes whose hardware profile may run the named software profile.
    ///
    /// # Errors
    ///
    /// Returns `SoftwareProfileNotFound` for an unknown name.
    pub fn usable_idle_nodes(&self, software_profile: &str) -> Result<Vec<Node>> {
        let mut nodes = Vec::new();
        for hw in self.allowed_hardware_profiles(software_profile)? {
            nodes.extend(
                self.store
                    .list_nodes_by_hardware_profile(&hw)?
                    .into_iter()
                    .filter(|n| n.is_idle && !n.is_deleted()),
            );
        }
        Ok(nodes)
    }
}
