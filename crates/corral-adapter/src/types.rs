//! Types for the adapter crate.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use corral_core::{AddHostSessionId, MacAddress, SoftwareProfileId};
use corral_store::{Node, Store};
use serde::{Deserialize, Serialize};

/// Per-call context handed to provisioning operations.
pub struct AdapterContext<'a> {
    /// The store new nodes are persisted to.
    pub store: &'a dyn Store,
    /// Batch identifier shared by every node created in this call.
    pub add_host_session: AddHostSessionId,
}

impl<'a> AdapterContext<'a> {
    /// Create a context with a fresh add-host session.
    #[must_use]
    pub fn new(store: &'a dyn Store) -> Self {
        Self {
            store,
            add_host_session: AddHostSessionId::generate(),
        }
    }
}

/// Caller-supplied details of one NIC of a predefined node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NicDetails {
    /// Hardware address.
    #[serde(default)]
    pub mac: Option<MacAddress>,
    /// Address to assign.
    #[serde(default)]
    pub ip: Option<Ipv4Addr>,
    /// Network device name on the node.
    #[serde(default)]
    pub device: Option<String>,
}

/// Caller-supplied details of one predefined node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDetails {
    /// Host name; generated from the name format when absent.
    #[serde(default)]
    pub name: Option<String>,
    /// Network interfaces.
    #[serde(default)]
    pub nics: Vec<NicDetails>,
}

impl NodeDetails {
    /// Returns true if the caller pinned a name, MAC or IP.
    #[must_use]
    pub fn is_predefined(&self) -> bool {
        self.name.is_some() || self.nics.iter().any(|n| n.mac.is_some() || n.ip.is_some())
    }

    /// The first MAC address given for this node.
    #[must_use]
    pub fn first_mac(&self) -> Option<MacAddress> {
        self.nics.iter().find_map(|n| n.mac)
    }
}

/// A request to provision new nodes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddNodesRequest {
    /// Hardware profile name.
    pub hardware_profile: String,
    /// Software profile name.
    #[serde(default)]
    pub software_profile: Option<String>,
    /// Number of nodes to discover; `Some(0)` discovers until aborted.
    #[serde(default)]
    pub count: Option<u32>,
    /// Predefined node descriptions.
    #[serde(default)]
    pub node_details: Vec<NodeDetails>,
    /// Tags applied to every created node.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl AddNodesRequest {
    /// Returns true if any node description pins a name, MAC or IP.
    #[must_use]
    pub fn is_predefined(&self) -> bool {
        self.node_details.iter().any(NodeDetails::is_predefined)
    }

    /// Returns true if the request asks for DHCP discovery.
    #[must_use]
    pub fn is_discovery(&self) -> bool {
        !self.is_predefined() && self.count.is_some()
    }
}

/// A node whose software profile was changed by a transfer.
#[derive(Debug, Clone)]
pub struct NodeTransfer {
    /// The node, already carrying its new software profile.
    pub node: Node,
    /// The software profile the node was transferred from.
    pub previous_software_profile: Option<SoftwareProfileId>,
}

/// How nodes boot when started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BootMethod {
    /// Network boot.
    #[default]
    Network,
    /// Local disk boot.
    Local,
}

/// Adapter-level changes requested for a node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateNodeRequest {
    /// Replacement tag set.
    #[serde(default)]
    pub tags: Option<BTreeMap<String, String>>,
    /// Adapter-specific arguments.
    #[serde(default)]
    pub adapter_args: BTreeMap<String, String>,
}
