//! Domain types stored in the database.
//!
//! These types represent the persisted state of hardware profiles, software
//! profiles and nodes. Relationships are expressed by identifier only; they
//! are resolved through explicit [`Store`](crate::Store) queries.

use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use corral_core::{AddHostSessionId, HardwareProfileId, MacAddress, NodeId, SoftwareProfileId};
use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};

/// Where the resources of a hardware profile live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    /// Provisioned from this installer over a local provisioning network.
    #[default]
    Local,
    /// Provisioned elsewhere (cloud, remote site); no IP generation or PXE.
    Remote,
}

/// A provisioning network interface of a hardware profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningNic {
    /// Installer-side network device (e.g. `eth1`), used for DHCP capture.
    pub device: String,
    /// The provisioning network new nodes are addressed from.
    pub network: Ipv4Network,
}

/// A class of physical or virtual resource plus its provisioning backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareProfile {
    /// Unique identifier.
    pub hardware_profile_id: HardwareProfileId,
    /// Unique name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Local or remote resources.
    pub location: Location,
    /// Template for generated node names, e.g. `compute-#NN`. `*` means
    /// names must always be supplied by the caller.
    pub name_format: String,
    /// Name of the resource adapter that provisions this profile.
    pub resource_adapter: Option<String>,
    /// Default adapter configuration profile.
    #[serde(default)]
    pub default_adapter_config: Option<String>,
    /// Software profile nodes are parked on when idled and not suspendable.
    #[serde(default)]
    pub idle_software_profile_id: Option<SoftwareProfileId>,
    /// Provisioning network interfaces.
    #[serde(default)]
    pub provisioning_nics: Vec<ProvisioningNic>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl HardwareProfile {
    /// Create a local hardware profile with the given adapter.
    #[must_use]
    pub fn new(name: impl Into<String>, resource_adapter: Option<&str>) -> Self {
        let name = name.into();
        Self {
            hardware_profile_id: HardwareProfileId::generate(),
            name_format: format!("{name}-#NN"),
            name,
            description: String::new(),
            location: Location::Local,
            resource_adapter: resource_adapter.map(ToString::to_string),
            default_adapter_config: None,
            idle_software_profile_id: None,
            provisioning_nics: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// The first provisioning NIC, if any.
    #[must_use]
    pub fn provisioning_nic(&self) -> Option<&ProvisioningNic> {
        self.provisioning_nics.first()
    }
}

/// An installable role/stack assignable to nodes, or an idle parking profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftwareProfile {
    /// Unique identifier.
    pub software_profile_id: SoftwareProfileId,
    /// Unique name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Idle profiles can never be the destination of active work.
    pub is_idle: bool,
    /// Names of the components enabled on this profile.
    #[serde(default)]
    pub components: Vec<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl SoftwareProfile {
    /// Create a new, non-idle software profile.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            software_profile_id: SoftwareProfileId::generate(),
            name: name.into(),
            description: String::new(),
            is_idle: false,
            components: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Create a new idle (parking) software profile.
    #[must_use]
    pub fn idle(name: impl Into<String>) -> Self {
        Self {
            is_idle: true,
            ..Self::new(name)
        }
    }

    /// Returns true if the named component is enabled on this profile.
    #[must_use]
    pub fn has_component(&self, name: &str) -> bool {
        self.components.iter().any(|c| c == name)
    }
}

/// Lifecycle state of a node.
///
/// The well-known states are modelled as variants; resource adapters may
/// report any other state string, which is kept verbatim in [`NodeState::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeState {
    /// Created by discovery, not yet installed.
    Discovered,
    /// Boot configuration written, installation pending.
    Provisioned,
    /// Fully provisioned and in service.
    Installed,
    /// Software profile changed; awaiting reinstall.
    Expired,
    /// Soft-terminal: kept for audit, excluded from active selection.
    Deleted,
    /// Adapter-defined state.
    Other(String),
}

impl NodeState {
    /// The state string as stored and reported in events.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Discovered => "Discovered",
            Self::Provisioned => "Provisioned",
            Self::Installed => "Installed",
            Self::Expired => "Expired",
            Self::Deleted => "Deleted",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for NodeState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Discovered" => Self::Discovered,
            "Provisioned" => Self::Provisioned,
            "Installed" => Self::Installed,
            "Expired" => Self::Expired,
            "Deleted" => Self::Deleted,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for NodeState {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<NodeState> for String {
    fn from(state: NodeState) -> Self {
        match state {
            NodeState::Other(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-node protection level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LockState {
    /// Eligible for all operations.
    #[default]
    Unlocked,
    /// Only a fallback transfer candidate; not idled or activated.
    SoftLocked,
    /// Never mutated by lifecycle operations.
    HardLocked,
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unlocked => "Unlocked",
            Self::SoftLocked => "SoftLocked",
            Self::HardLocked => "HardLocked",
        })
    }
}

/// Where a node boots from on its next power cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BootFrom {
    /// Network boot (PXE); triggers (re)installation.
    #[default]
    Network,
    /// Boot from local disk.
    Local,
}

/// A network interface of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Nic {
    /// Hardware address, when known.
    pub mac: Option<MacAddress>,
    /// Assigned address, when known.
    pub ip: Option<Ipv4Addr>,
    /// Network device name on the node.
    #[serde(default)]
    pub device: Option<String>,
    /// Whether this is the provisioning (boot) interface.
    #[serde(default)]
    pub boot: bool,
}

/// A node record stored in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier for the node.
    pub node_id: NodeId,
    /// Host name, unique case-insensitively among live nodes.
    pub name: String,
    /// Current lifecycle state.
    pub state: NodeState,
    /// Protection level.
    pub lock_state: LockState,
    /// Whether the node occupies its hardware profile's idle pool.
    pub is_idle: bool,
    /// Owning hardware profile. Immutable after creation.
    pub hardware_profile_id: HardwareProfileId,
    /// Current software profile; `None` while parked without a role.
    pub software_profile_id: Option<SoftwareProfileId>,
    /// Network interfaces.
    #[serde(default)]
    pub nics: Vec<Nic>,
    /// Provisioning batch this node was created in.
    #[serde(default)]
    pub add_host_session: Option<AddHostSessionId>,
    /// Arbitrary key/value tags.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Boot source for the next power cycle.
    #[serde(default)]
    pub boot_from: BootFrom,
    /// Store revision this copy was read at; maintained by the store.
    #[serde(default)]
    pub revision: u64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Node {
    /// Create a new, unpersisted node in the `Discovered` state.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        hardware_profile_id: HardwareProfileId,
        software_profile_id: Option<SoftwareProfileId>,
    ) -> Self {
        let name = name.into();
        let now = Utc::now();
        Self {
            node_id: NodeId::generate(&hardware_profile_id, &name),
            name,
            state: NodeState::Discovered,
            lock_state: LockState::Unlocked,
            is_idle: false,
            hardware_profile_id,
            software_profile_id,
            nics: Vec::new(),
            add_host_session: None,
            tags: BTreeMap::new(),
            boot_from: BootFrom::Network,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// The provisioning NIC: the first boot NIC, else the first NIC.
    #[must_use]
    pub fn provisioning_nic(&self) -> Option<&Nic> {
        self.nics
            .iter()
            .find(|nic| nic.boot)
            .or_else(|| self.nics.first())
    }

    /// All MAC addresses known for this node.
    pub fn macs(&self) -> impl Iterator<Item = MacAddress> + '_ {
        self.nics.iter().filter_map(|nic| nic.mac)
    }

    /// All IP addresses known for this node.
    pub fn ips(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        self.nics.iter().filter_map(|nic| nic.ip)
    }

    /// Returns true once the node has been deleted.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.state == NodeState::Deleted
    }

    /// The short host name (everything before the first `.`).
    #[must_use]
    pub fn short_name(&self) -> &str {
        self.name.split('.').next().unwrap_or(&self.name)
    }
}
