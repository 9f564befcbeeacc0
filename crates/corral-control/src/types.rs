//! Request and response types for orchestrator operations.

use std::fmt;
use std::path::PathBuf;

use corral_adapter::{BootMethod, NodeTransfer};
use corral_core::{AddHostSessionId, MacAddress, NodeId};
use corral_store::{Node, TagFilter};
use serde::{Deserialize, Serialize};

/// Which nodes an operation applies to.
///
/// Deleted nodes are never selected.
#[derive(Debug, Clone)]
pub enum NodeSelector {
    /// Nodes by name; every name must resolve.
    Names(Vec<String>),
    /// Nodes by id; every id must resolve.
    Ids(Vec<NodeId>),
    /// Nodes by the MAC address of any NIC; every address must resolve.
    Macs(Vec<MacAddress>),
    /// Nodes running a software profile, by profile name.
    SoftwareProfile(String),
    /// Nodes of a hardware profile, by profile name.
    HardwareProfile(String),
    /// Nodes created in one provisioning batch.
    Session(AddHostSessionId),
    /// Nodes carrying any of the tags.
    Tags(Vec<TagFilter>),
    /// Nodes whose name matches a `%` wildcard pattern.
    NameFilter(String),
    /// Every live node.
    All,
}

impl NodeSelector {
    /// Select nodes by name.
    #[must_use]
    pub fn names<I, T>(names: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::Names(names.into_iter().map(Into::into).collect())
    }

    /// Select nodes by hex-encoded id.
    ///
    /// # Errors
    ///
    /// Returns `InvalidId` for a malformed id.
    pub fn ids_from_hex<I, T>(ids: I) -> corral_core::Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let ids = ids
            .into_iter()
            .map(|id| NodeId::from_hex(id.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::Ids(ids))
    }

    /// Select nodes by MAC address text.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMac` for a malformed address.
    pub fn macs_from_strs<I, T>(macs: I) -> corral_core::Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let macs = macs
            .into_iter()
            .map(|mac| mac.as_ref().parse::<MacAddress>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::Macs(macs))
    }
}

/// Category of a per-node failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// The node is not in a valid state for a transfer, or already runs
    /// the destination profile.
    NodeTransferNotValid,
    /// The node is already idle.
    NodeAlreadyIdle,
    /// The node is already active.
    NodeAlreadyActive,
    /// The node has no software profile to return to.
    SoftwareProfileNotFound,
    /// The request is invalid for this node.
    InvalidArgument,
    /// The node's hardware profile may not run the software profile.
    ProfileMappingNotAllowed,
    /// The node is locked.
    NodeSoftwareProfileLocked,
}

impl FailureKind {
    /// The category name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NodeTransferNotValid => "NodeTransferNotValid",
            Self::NodeAlreadyIdle => "NodeAlreadyIdle",
            Self::NodeAlreadyActive => "NodeAlreadyActive",
            Self::SoftwareProfileNotFound => "SoftwareProfileNotFound",
            Self::InvalidArgument => "InvalidArgument",
            Self::ProfileMappingNotAllowed => "ProfileMappingNotAllowed",
            Self::NodeSoftwareProfileLocked => "NodeSoftwareProfileLocked",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A precondition or lock failure for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeFailure {
    /// Node name.
    pub node: String,
    /// Failure category.
    pub kind: FailureKind,
    /// Human readable reason.
    pub message: String,
}

impl NodeFailure {
    /// Create a failure for a node.
    #[must_use]
    pub fn new(node: &Node, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            node: node.name.clone(),
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for NodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.node, self.message, self.kind)
    }
}

/// Per-node result of a batch operation.
#[derive(Debug, Clone, Default)]
pub struct OperationReport {
    /// Nodes the operation was applied to, as committed.
    pub succeeded: Vec<Node>,
    /// Nodes that failed a precondition or lock check.
    pub failures: Vec<NodeFailure>,
}

impl OperationReport {
    /// Returns true if no node failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Names of the nodes the operation was applied to.
    #[must_use]
    pub fn succeeded_names(&self) -> Vec<&str> {
        self.succeeded.iter().map(|n| n.name.as_str()).collect()
    }

    /// Names of the nodes that failed with `kind`.
    #[must_use]
    pub fn failed(&self, kind: FailureKind) -> Vec<&str> {
        self.failures
            .iter()
            .filter(|f| f.kind == kind)
            .map(|f| f.node.as_str())
            .collect()
    }

    pub(crate) fn fail(&mut self, failure: NodeFailure) {
        tracing::debug!(node = %failure.node, kind = %failure.kind, "{}", failure.message);
        self.failures.push(failure);
    }
}

/// Staged result of a transfer, before it is committed.
#[derive(Debug, Clone, Default)]
pub struct TransferOutcome {
    /// Nodes carrying their new software profile, with the one they left.
    pub transfers: Vec<NodeTransfer>,
    /// Nodes that failed a precondition or lock check.
    pub failures: Vec<NodeFailure>,
}

/// Nodes created by one provisioning request.
#[derive(Debug, Clone)]
pub struct AddNodesOutcome {
    /// Batch identifier shared by the created nodes.
    pub add_host_session: AddHostSessionId,
    /// Created nodes.
    pub nodes: Vec<Node>,
}

/// Options for starting nodes.
#[derive(Debug, Clone, Default)]
pub struct StartupOptions {
    /// Other nodes the adapter may need to coordinate with.
    pub remaining_nodes: Vec<String>,
    /// How the nodes boot.
    pub boot_method: BootMethod,
}

/// Configuration for the control plane service.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Address the HTTP server binds to.
    pub listen_addr: String,
    /// `RocksDB` data directory.
    pub data_dir: PathBuf,
    /// Capacity of the event broadcast channel.
    pub event_channel_capacity: usize,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            data_dir: PathBuf::from("/var/lib/corral"),
            event_channel_capacity: 256,
        }
    }
}

impl ControlConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            data_dir: std::env::var("DATA_DIR").map_or(defaults.data_dir, PathBuf::from),
            event_channel_capacity: std::env::var("EVENT_CHANNEL_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|c| *c > 0)
                .unwrap_or(defaults.event_channel_capacity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_core::HardwareProfileId;

    #[test]
    fn control_config_defaults() {
        let config = ControlConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/corral"));
        assert_eq!(config.event_channel_capacity, 256);
    }

    #[test]
    fn selectors_parse_ids_and_macs() {
        let id = corral_core::NodeId::generate(&HardwareProfileId::generate(), "n1");
        let selector = NodeSelector::ids_from_hex([id.to_hex()]).unwrap();
        assert!(matches!(selector, NodeSelector::Ids(ids) if ids == vec![id]));

        assert!(matches!(
            NodeSelector::ids_from_hex(["zz"]),
            Err(corral_core::CoreError::InvalidId(_))
        ));

        let selector = NodeSelector::macs_from_strs(["52:54:00:AB:CD:EF"]).unwrap();
        assert!(matches!(selector, NodeSelector::Macs(macs) if macs.len() == 1));
        assert!(matches!(
            NodeSelector::macs_from_strs(["not-a-mac"]),
            Err(corral_core::CoreError::InvalidMac(_))
        ));
    }

    #[test]
    fn report_groups_failures() {
        let n1 = Node::new("n1", HardwareProfileId::generate(), None);
        let n2 = Node::new("n2", HardwareProfileId::generate(), None);
        let mut report = OperationReport::default();
        assert!(report.is_success());

        report.fail(NodeFailure::new(&n1, FailureKind::NodeAlreadyIdle, "already idle"));
        report.fail(NodeFailure::new(&n2, FailureKind::NodeSoftwareProfileLocked, "locked"));
        report.succeeded.push(n2.clone());

        assert!(!report.is_success());
        assert_eq!(report.failed(FailureKind::NodeAlreadyIdle), vec!["n1"]);
        assert_eq!(report.succeeded_names(), vec!["n2"]);
        assert_eq!(
            report.failures[1].to_string(),
            "n2: locked (NodeSoftwareProfileLocked)"
        );
    }
}
