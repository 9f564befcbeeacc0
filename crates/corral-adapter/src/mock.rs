//! Mock resource adapter for testing.

use std::collections::HashSet;

use async_trait::async_trait;
use corral_store::{HardwareProfile, Node, NodeState, SoftwareProfile};
use parking_lot::Mutex;

use crate::adapter::ResourceAdapter;
use crate::node_factory::{create_new_node, NewNode, NodeOptions};
use crate::types::{AddNodesRequest, AdapterContext, BootMethod, NodeTransfer, UpdateNodeRequest};
use crate::{AdapterError, Result};

/// One recorded adapter call. Node lists are recorded by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterCall {
    /// `validate_start_arguments`.
    Validate,
    /// `start`, with the names of the created nodes.
    Start(Vec<String>),
    /// `delete_node`.
    Delete(Vec<String>),
    /// `transfer_node`.
    Transfer(Vec<String>, String),
    /// `suspend_active_node`.
    Suspend(String),
    /// `idle_active_node`.
    IdleActive(Vec<String>),
    /// `activate_idle_node`.
    ActivateIdle(String, String, bool),
    /// `startup_node`.
    Startup(Vec<String>, BootMethod),
    /// `shutdown_node`.
    Shutdown(Vec<String>, bool),
    /// `reboot_node`.
    Reboot(Vec<String>, bool),
    /// `checkpoint_node`.
    Checkpoint(String),
    /// `revert_node_to_checkpoint`.
    Revert(String),
    /// `migrate_node`.
    Migrate(String, bool),
    /// `update_node`.
    Update(String),
}

/// In-memory adapter recording every call it receives.
pub struct MockAdapter {
    name: String,
    calls: Mutex<Vec<AdapterCall>>,
    suspendable: Mutex<HashSet<String>>,
    idle_state: Mutex<NodeState>,
    failing: Mutex<HashSet<&'static str>>,
    aborted: Mutex<Vec<String>>,
}

impl MockAdapter {
    /// Create a mock registered under `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            calls: Mutex::new(Vec::new()),
            suspendable: Mutex::new(HashSet::new()),
            idle_state: Mutex::new(NodeState::Discovered),
            failing: Mutex::new(HashSet::new()),
            aborted: Mutex::new(Vec::new()),
        }
    }

    /// Let `suspend_active_node` succeed for the named node.
    pub fn allow_suspend(&self, node_name: impl Into<String>) {
        self.suspendable.lock().insert(node_name.into());
    }

    /// Set the state reported by `idle_active_node`.
    pub fn set_idle_state(&self, state: NodeState) {
        *self.idle_state.lock() = state;
    }

    /// Make an operation (by trait method name) fail with `OperationFailed`.
    pub fn fail_on(&self, operation: &'static str) {
        self.failing.lock().insert(operation);
    }

    /// All calls received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<AdapterCall> {
        self.calls.lock().clone()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Names of the hardware profiles `abort` was called for, in order.
    #[must_use]
    pub fn aborted(&self) -> Vec<String> {
        self.aborted.lock().clone()
    }

    fn record(&self, operation: &'static str, call: AdapterCall) -> Result<()> {
        self.calls.lock().push(call);
        if self.failing.lock().contains(operation) {
            return Err(AdapterError::OperationFailed(format!(
                "{operation} failed on mock adapter {}",
                self.name
            )));
        }
        Ok(())
    }

    fn names(nodes: &[Node]) -> Vec<String> {
        nodes.iter().map(|n| n.name.clone()).collect()
    }
}

#[async_trait]
impl ResourceAdapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn validate_start_arguments(
        &self,
        _ctx: &AdapterContext<'_>,
        _request: &AddNodesRequest,
        _hardware_profile: &HardwareProfile,
        _software_profile: Option<&SoftwareProfile>,
    ) -> Result<()> {
        self.record("validate_start_arguments", AdapterCall::Validate)
    }

    async fn start(
        &self,
        ctx: &AdapterContext<'_>,
        request: &AddNodesRequest,
        hardware_profile: &HardwareProfile,
        software_profile: Option<&SoftwareProfile>,
    ) -> Result<Vec<Node>> {
        let mut requests: Vec<NewNode> = request
            .node_details
            .iter()
            .map(|details| NewNode {
                name: details.name.clone(),
                nics: details.nics.clone(),
                add_host_session: Some(ctx.add_host_session),
                tags: request.tags.clone(),
            })
            .collect();
        if requests.is_empty() {
            let count = request.count.unwrap_or(0) as usize;
            requests = vec![
                NewNode {
                    add_host_session: Some(ctx.add_host_session),
                    tags: request.tags.clone(),
                    ..NewNode::default()
                };
                count
            ];
        }

        let mut nodes = Vec::with_capacity(requests.len());
        for new_node in &requests {
            nodes.push(create_new_node(
                ctx.store,
                new_node,
                hardware_profile,
                software_profile,
                NodeOptions::default(),
            )?);
        }

        self.record("start", AdapterCall::Start(Self::names(&nodes)))?;
        Ok(nodes)
    }

    async fn delete_node(&self, nodes: &[Node]) -> Result<()> {
        self.record("delete_node", AdapterCall::Delete(Self::names(nodes)))
    }

    async fn transfer_node(
        &self,
        transfers: &[NodeTransfer],
        new_software_profile: &str,
    ) -> Result<()> {
        let names = transfers.iter().map(|t| t.node.name.clone()).collect();
        self.record(
            "transfer_node",
            AdapterCall::Transfer(names, new_software_profile.to_string()),
        )
    }

    async fn suspend_active_node(&self, node: &Node) -> Result<bool> {
        self.record("suspend_active_node", AdapterCall::Suspend(node.name.clone()))?;
        Ok(self.suspendable.lock().contains(&node.name))
    }

    async fn idle_active_node(&self, nodes: &[Node]) -> Result<NodeState> {
        self.record("idle_active_node", AdapterCall::IdleActive(Self::names(nodes)))?;
        Ok(self.idle_state.lock().clone())
    }

    async fn activate_idle_node(
        &self,
        node: &mut Node,
        software_profile: &str,
        profile_changed: bool,
    ) -> Result<()> {
        self.record(
            "activate_idle_node",
            AdapterCall::ActivateIdle(node.name.clone(), software_profile.to_string(), profile_changed),
        )
    }

    async fn startup_node(
        &self,
        nodes: &[Node],
        _remaining_nodes: &[String],
        boot_method: BootMethod,
    ) -> Result<()> {
        self.record("startup_node", AdapterCall::Startup(Self::names(nodes), boot_method))
    }

    async fn shutdown_node(&self, nodes: &[Node], soft: bool) -> Result<()> {
        self.record("shutdown_node", AdapterCall::Shutdown(Self::names(nodes), soft))
    }

    async fn reboot_node(&self, nodes: &[Node], soft: bool) -> Result<()> {
        self.record("reboot_node", AdapterCall::Reboot(Self::names(nodes), soft))
    }

    async fn checkpoint_node(&self, node: &Node) -> Result<()> {
        self.record("checkpoint_node", AdapterCall::Checkpoint(node.name.clone()))
    }

    async fn revert_node_to_checkpoint(&self, node: &Node) -> Result<()> {
        self.record("revert_node_to_checkpoint", AdapterCall::Revert(node.name.clone()))
    }

    async fn migrate_node(&self, node: &Node, _remaining_nodes: &[String], live: bool) -> Result<()> {
        self.record("migrate_node", AdapterCall::Migrate(node.name.clone(), live))
    }

    async fn update_node(&self, node: &mut Node, request: &UpdateNodeRequest) -> Result<()> {
        self.record("update_node", AdapterCall::Update(node.name.clone()))?;
        if let Some(tags) = &request.tags {
            node.tags.clone_from(tags);
        }
        Ok(())
    }

    fn abort(&self, hardware_profile: &HardwareProfile) {
        self.aborted.lock().push(hardware_profile.name.clone());
    }
}
