//! Key encoding utilities for `RocksDB`.
//!
//! This module provides functions to encode and decode keys for various indexes.
//! All keys are designed to support efficient prefix scans.

use std::net::Ipv4Addr;

use corral_core::{
    AddHostSessionId, HardwareProfileId, MacAddress, NodeId, SoftwareProfileId,
};

/// Length of an encoded UUID-backed identifier.
const UUID_LEN: usize = 16;

/// Length of an encoded node identifier.
const NODE_ID_LEN: usize = 32;

/// Encode a node key (just the node ID bytes).
#[must_use]
pub fn node_key(node_id: &NodeId) -> Vec<u8> {
    node_id.as_bytes().to_vec()
}

/// Encode a name index key. Names are matched case-insensitively.
#[must_use]
pub fn name_key(name: &str) -> Vec<u8> {
    name.to_lowercase().into_bytes()
}

/// Encode the prefix used to find fully-qualified names by short name.
#[must_use]
pub fn short_name_prefix(short_name: &str) -> Vec<u8> {
    let mut key = name_key(short_name);
    key.push(b'.');
    key
}

/// Encode a MAC index key.
#[must_use]
pub fn mac_key(mac: &MacAddress) -> Vec<u8> {
    mac.octets().to_vec()
}

/// Encode an IP index key.
#[must_use]
pub fn ip_key(ip: Ipv4Addr) -> Vec<u8> {
    ip.octets().to_vec()
}

/// Encode a hardware profile key.
#[must_use]
pub fn hardware_profile_key(id: &HardwareProfileId) -> Vec<u8> {
    id.as_bytes().to_vec()
}

/// Encode a software profile key.
#[must_use]
pub fn software_profile_key(id: &SoftwareProfileId) -> Vec<u8> {
    id.as_bytes().to_vec()
}

/// Encode a profile mapping key: `software_profile_id || hardware_profile_id`.
///
/// A prefix scan on the software profile lists its allowed hardware profiles.
#[must_use]
pub fn mapping_key(sw: &SoftwareProfileId, hw: &HardwareProfileId) -> Vec<u8> {
    let mut key = Vec::with_capacity(UUID_LEN * 2);
    key.extend_from_slice(sw.as_bytes());
    key.extend_from_slice(hw.as_bytes());
    key
}

/// Split a profile mapping key into its two identifiers.
///
/// Returns `None` if the key has the wrong length.
#[must_use]
pub fn split_mapping_key(key: &[u8]) -> Option<(SoftwareProfileId, HardwareProfileId)> {
    if key.len() != UUID_LEN * 2 {
        return None;
    }
    let sw: [u8; UUID_LEN] = key[..UUID_LEN].try_into().ok()?;
    let hw: [u8; UUID_LEN] = key[UUID_LEN..].try_into().ok()?;
    Some((
        SoftwareProfileId::from_bytes(sw),
        HardwareProfileId::from_bytes(hw),
    ))
}

/// Encode an owner-node index key: `owner_id || node_id`.
///
/// Used for the hardware profile, software profile and session indexes; all
/// owners are 16-byte UUIDs.
#[must_use]
pub fn owner_node_key(owner: &[u8; UUID_LEN], node_id: &NodeId) -> Vec<u8> {
    let mut key = Vec::with_capacity(UUID_LEN + NODE_ID_LEN);
    key.extend_from_slice(owner);
    key.extend_from_slice(node_id.as_bytes());
    key
}

/// Encode a hardware profile prefix for scanning its nodes.
#[must_use]
pub fn hardware_profile_prefix(id: &HardwareProfileId) -> Vec<u8> {
    id.as_bytes().to_vec()
}

/// Encode a software profile prefix for scanning its nodes.
#[must_use]
pub fn software_profile_prefix(id: &SoftwareProfileId) -> Vec<u8> {
    id.as_bytes().to_vec()
}

/// Encode a session prefix for scanning its nodes.
#[must_use]
pub fn session_prefix(id: &AddHostSessionId) -> Vec<u8> {
    id.as_bytes().to_vec()
}

/// Extract the node ID from an owner-node key.
///
/// Returns `None` if the key has the wrong length.
#[must_use]
pub fn extract_node_id_from_owner_key(key: &[u8]) -> Option<NodeId> {
    if key.len() != UUID_LEN + NODE_ID_LEN {
        return None;
    }
    let bytes: [u8; NODE_ID_LEN] = key[UUID_LEN..].try_into().ok()?;
    Some(NodeId::from_bytes(bytes))
}

/// Decode a node ID stored as an index value.
#[must_use]
pub fn node_id_from_value(value: &[u8]) -> Option<NodeId> {
    let bytes: [u8; NODE_ID_LEN] = value.try_into().ok()?;
    Some(NodeId::from_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_node_key_roundtrip() {
        let hw = HardwareProfileId::generate();
        let node_id = NodeId::from_bytes([2u8; 32]);

        let key = owner_node_key(hw.as_bytes(), &node_id);
        assert_eq!(key.len(), 48);
        assert!(key.starts_with(&hardware_profile_prefix(&hw)));
        assert_eq!(extract_node_id_from_owner_key(&key), Some(node_id));
        assert_eq!(extract_node_id_from_owner_key(&key[..40]), None);
    }

    #[test]
    fn mapping_key_roundtrip() {
        let sw = SoftwareProfileId::generate();
        let hw = HardwareProfileId::generate();

        let key = mapping_key(&sw, &hw);
        assert!(key.starts_with(&software_profile_prefix(&sw)));
        assert_eq!(split_mapping_key(&key), Some((sw, hw)));
    }

    #[test]
    fn name_keys_are_case_insensitive() {
        assert_eq!(name_key("Compute-01.Private"), name_key("compute-01.private"));
        assert!(name_key("compute-01.private").starts_with(&short_name_prefix("COMPUTE-01")));
        assert!(!name_key("compute-010.private").starts_with(&short_name_prefix("compute-01")));
    }

    #[test]
    fn node_id_value_roundtrip() {
        let id = NodeId::from_bytes([9u8; 32]);
        assert_eq!(node_id_from_value(&node_key(&id)), Some(id));
        assert_eq!(node_id_from_value(b"short"), None);
    }
}
