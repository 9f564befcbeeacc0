//! The resource adapter contract.
//!
//! Every provisioning backend implements [`ResourceAdapter`]. Batched actions
//! receive every node of one hardware profile group in a single call so an
//! adapter can issue bulk requests to its backend; callers never invoke a
//! batched action once per node.
//!
//! Adapters receive node references for the duration of one call and must
//! not retain them. The orchestrator owns the authoritative copies.

use async_trait::async_trait;

use corral_store::{HardwareProfile, Node, NodeState, SoftwareProfile};

use crate::types::{AddNodesRequest, AdapterContext, BootMethod, NodeTransfer, UpdateNodeRequest};
use crate::{AdapterError, Result};

/// The capability set of a provisioning backend.
#[async_trait]
pub trait ResourceAdapter: Send + Sync {
    /// The name this adapter is registered under.
    fn name(&self) -> &str;

    /// Check a provisioning request before any node is created.
    ///
    /// # Errors
    ///
    /// Returns `CommandFailed` for an unusable request or `NodeAlreadyExists`
    /// if a requested name is taken.
    async fn validate_start_arguments(
        &self,
        ctx: &AdapterContext<'_>,
        request: &AddNodesRequest,
        hardware_profile: &HardwareProfile,
        software_profile: Option<&SoftwareProfile>,
    ) -> Result<()>;

    /// Provision new nodes and return the created records.
    ///
    /// Nodes are persisted as they are created.
    ///
    /// # Errors
    ///
    /// Returns `CommandFailed` if the request selects no provisioning mode.
    async fn start(
        &self,
        ctx: &AdapterContext<'_>,
        request: &AddNodesRequest,
        hardware_profile: &HardwareProfile,
        software_profile: Option<&SoftwareProfile>,
    ) -> Result<Vec<Node>>;

    /// Release the backing resources of deleted nodes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend refuses the deletion.
    async fn delete_node(&self, nodes: &[Node]) -> Result<()>;

    /// Reprovision nodes whose software profile changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn transfer_node(
        &self,
        transfers: &[NodeTransfer],
        new_software_profile: &str,
    ) -> Result<()>;

    /// Try to suspend a node in place. Returns `true` on success.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn suspend_active_node(&self, _node: &Node) -> Result<bool> {
        Ok(false)
    }

    /// Idle a group of nodes and return the state they all end up in.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn idle_active_node(&self, nodes: &[Node]) -> Result<NodeState>;

    /// Bring an idle node back into service on a software profile.
    ///
    /// The adapter may update adapter-owned fields such as `boot_from`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn activate_idle_node(
        &self,
        node: &mut Node,
        software_profile: &str,
        profile_changed: bool,
    ) -> Result<()>;

    /// Power on nodes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn startup_node(
        &self,
        nodes: &[Node],
        remaining_nodes: &[String],
        boot_method: BootMethod,
    ) -> Result<()>;

    /// Power off nodes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn shutdown_node(&self, nodes: &[Node], soft: bool) -> Result<()>;

    /// Power cycle nodes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn reboot_node(&self, nodes: &[Node], soft: bool) -> Result<()>;

    /// Snapshot a node.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedOperation` unless the adapter overrides it.
    async fn checkpoint_node(&self, _node: &Node) -> Result<()> {
        Err(AdapterError::unsupported(self.name(), "checkpoint_node"))
    }

    /// Restore a node from its snapshot.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedOperation` unless the adapter overrides it.
    async fn revert_node_to_checkpoint(&self, _node: &Node) -> Result<()> {
        Err(AdapterError::unsupported(self.name(), "revert_node_to_checkpoint"))
    }

    /// Move a node to other backing capacity.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedOperation` unless the adapter overrides it.
    async fn migrate_node(
        &self,
        _node: &Node,
        _remaining_nodes: &[String],
        _live: bool,
    ) -> Result<()> {
        Err(AdapterError::unsupported(self.name(), "migrate_node"))
    }

    /// Apply adapter-level changes to a node.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn update_node(&self, _node: &mut Node, _request: &UpdateNodeRequest) -> Result<()> {
        Ok(())
    }

    /// Ask long-running provisioning for `hardware_profile` to stop at its
    /// next check. Runs for other hardware profiles keep going.
    fn abort(&self, _hardware_profile: &HardwareProfile) {}
}
