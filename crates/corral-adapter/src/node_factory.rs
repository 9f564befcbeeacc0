//! Creation of new node records.
//!
//! Provisioning backends create nodes through [`create_new_node`], which
//! settles the name, NICs and addresses, checks them against the store and
//! persists the node immediately so later duplicate checks in the same batch
//! see it.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use corral_core::AddHostSessionId;
use corral_store::{
    HardwareProfile, Location, Nic, Node, SoftwareProfile, Store, StoreError,
};
use tracing::debug;

use crate::types::NicDetails;
use crate::{AdapterError, Result};

/// Highest index tried when generating a name from a name format.
const MAX_NAME_INDEX: u32 = 1_000_000;

/// Input for one new node.
#[derive(Debug, Clone, Default)]
pub struct NewNode {
    /// Explicit host name.
    pub name: Option<String>,
    /// Network interfaces.
    pub nics: Vec<NicDetails>,
    /// Batch the node belongs to.
    pub add_host_session: Option<AddHostSessionId>,
    /// Initial tags.
    pub tags: BTreeMap<String, String>,
}

/// Options controlling node creation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeOptions<'a> {
    /// Allocate an address from the provisioning network when none is given.
    pub generate_ip: bool,
    /// DNS zone appended to unqualified names.
    pub dns_zone: Option<&'a str>,
}

/// Expand a name format such as `compute-#NN` for an index.
///
/// The first `#` followed by `N`s is replaced by the index zero-padded to the
/// number of `N`s. Returns `None` if the format has no such run.
#[must_use]
pub fn format_name(format: &str, index: u32) -> Option<String> {
    let start = format.find("#N")?;
    let width = format[start + 1..].chars().take_while(|c| *c == 'N').count();
    let end = start + 1 + width;
    Some(format!(
        "{}{index:0width$}{}",
        &format[..start],
        &format[end..]
    ))
}

fn qualify(name: &str, dns_zone: Option<&str>) -> String {
    match dns_zone {
        Some(zone) if !zone.is_empty() && !name.contains('.') => format!("{name}.{zone}"),
        _ => name.to_string(),
    }
}

/// Returns true if a live node already answers to `name`.
///
/// # Errors
///
/// Returns an error if the store lookup fails.
pub fn node_name_taken(store: &dyn Store, name: &str) -> Result<bool> {
    match store.get_node_by_name(name) {
        Ok(found) => Ok(found.is_some()),
        Err(StoreError::AmbiguousName(_)) => Ok(true),
        Err(e) => Err(e.into()),
    }
}

fn resolve_name(
    store: &dyn Store,
    request: &NewNode,
    hardware_profile: &HardwareProfile,
    dns_zone: Option<&str>,
) -> Result<String> {
    if let Some(name) = &request.name {
        let name = qualify(name, dns_zone);
        if node_name_taken(store, &name)? {
            return Err(AdapterError::NodeAlreadyExists(name));
        }
        return Ok(name);
    }

    if hardware_profile.name_format == "*" {
        return Err(AdapterError::CommandFailed(format!(
            "host names must be specified for nodes in hardware profile [{}]",
            hardware_profile.name
        )));
    }

    for index in 1..=MAX_NAME_INDEX {
        let Some(candidate) = format_name(&hardware_profile.name_format, index) else {
            return Err(AdapterError::CommandFailed(format!(
                "invalid name format [{}] in hardware profile [{}]",
                hardware_profile.name_format, hardware_profile.name
            )));
        };
        let candidate = qualify(&candidate, dns_zone);
        if !node_name_taken(store, &candidate)? {
            return Ok(candidate);
        }
    }

    Err(AdapterError::CommandFailed(format!(
        "no free host name left for name format [{}]",
        hardware_profile.name_format
    )))
}

/// The first unused host address of the provisioning network.
fn allocate_ip(store: &dyn Store, hardware_profile: &HardwareProfile) -> Result<Option<Ipv4Addr>> {
    let Some(nic) = hardware_profile.provisioning_nic() else {
        return Ok(None);
    };
    let network = nic.network;
    for ip in network.iter() {
        if ip == network.network() || ip == network.broadcast() {
            continue;
        }
        if store.get_node_by_ip(ip)?.is_none() {
            return Ok(Some(ip));
        }
    }
    Err(AdapterError::CommandFailed(format!(
        "provisioning network {network} of hardware profile [{}] is exhausted",
        hardware_profile.name
    )))
}

fn build_nics(request: &NewNode, hardware_profile: &HardwareProfile) -> Vec<Nic> {
    let provisioning_device = hardware_profile.provisioning_nic().map(|p| p.device.clone());

    let mut nics: Vec<Nic> = request
        .nics
        .iter()
        .map(|details| Nic {
            mac: details.mac,
            ip: details.ip,
            device: details.device.clone(),
            boot: false,
        })
        .collect();

    if nics.is_empty() && provisioning_device.is_some() {
        nics.push(Nic {
            device: provisioning_device.clone(),
            ..Nic::default()
        });
    }

    let boot_index = nics
        .iter()
        .position(|n| n.device.is_some() && n.device == provisioning_device)
        .unwrap_or(0);
    if let Some(nic) = nics.get_mut(boot_index) {
        nic.boot = true;
    }
    nics
}

/// Create and persist a new node.
///
/// # Errors
///
/// Returns `NodeAlreadyExists`, `MacAddressAlreadyExists` or
/// `IpAlreadyExists` for duplicates, `CommandFailed` when no name can be
/// determined, or a store error.
pub fn create_new_node(
    store: &dyn Store,
    request: &NewNode,
    hardware_profile: &HardwareProfile,
    software_profile: Option<&SoftwareProfile>,
    options: NodeOptions<'_>,
) -> Result<Node> {
    let name = resolve_name(store, request, hardware_profile, options.dns_zone)?;
    let mut nics = build_nics(request, hardware_profile);

    for nic in &nics {
        if let Some(mac) = nic.mac {
            if store.get_node_by_mac(&mac)?.is_some() {
                return Err(AdapterError::MacAddressAlreadyExists(mac.to_string()));
            }
        }
        if let Some(ip) = nic.ip {
            if store.get_node_by_ip(ip)?.is_some() {
                return Err(AdapterError::IpAlreadyExists(ip.to_string()));
            }
        }
    }

    let generate = options.generate_ip && hardware_profile.location == Location::Local;
    if generate {
        if let Some(boot_nic) = nics.iter_mut().find(|n| n.boot) {
            if boot_nic.ip.is_none() {
                boot_nic.ip = allocate_ip(store, hardware_profile)?;
            }
        }
    }

    let mut node = Node::new(
        name,
        hardware_profile.hardware_profile_id,
        software_profile.map(|sw| sw.software_profile_id),
    );
    node.nics = nics;
    node.add_host_session = request.add_host_session;
    node.tags.clone_from(&request.tags);

    let stored = store.insert_node(&node)?;
    debug!(
        node = %stored.name,
        hardware_profile = %hardware_profile.name,
        "node created"
    );
    Ok(stored)
}
