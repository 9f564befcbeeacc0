//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.

use std::collections::{BTreeSet, HashSet};
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use corral_core::{AddHostSessionId, HardwareProfileId, MacAddress, NodeId, SoftwareProfileId};
use parking_lot::Mutex;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::keys;
use crate::query::{matches_any_tag, name_matches, TagFilter};
use crate::schema::{all_column_families, cf};
use crate::types::{HardwareProfile, Node, NodeState, SoftwareProfile};
use crate::Store;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    /// Serializes the check-then-write of node inserts and commits.
    write_lock: Mutex<()>,
}

/// One index entry of a node: column family, key and a label for errors.
struct IndexEntry {
    cf: &'static str,
    key: Vec<u8>,
    label: String,
}

impl IndexEntry {
    fn same_slot(&self, other: &Self) -> bool {
        self.cf == other.cf && self.key == other.key
    }
}

/// Index slots that must be unique among live nodes.
fn unique_entries(node: &Node) -> Vec<IndexEntry> {
    if node.is_deleted() {
        return Vec::new();
    }
    let mut entries = vec![IndexEntry {
        cf: cf::NODES_BY_NAME,
        key: keys::name_key(&node.name),
        label: format!("node name {}", node.name),
    }];
    entries.extend(node.macs().map(|mac| IndexEntry {
        cf: cf::NODES_BY_MAC,
        key: keys::mac_key(&mac),
        label: format!("MAC address {mac}"),
    }));
    entries.extend(node.ips().map(|ip| IndexEntry {
        cf: cf::NODES_BY_IP,
        key: keys::ip_key(ip),
        label: format!("IP address {ip}"),
    }));
    entries
}

/// Prefix-scan index slots, kept for deleted nodes too.
fn owner_entries(node: &Node) -> Vec<IndexEntry> {
    let mut entries = vec![IndexEntry {
        cf: cf::NODES_BY_HARDWARE_PROFILE,
        key: keys::owner_node_key(node.hardware_profile_id.as_bytes(), &node.node_id),
        label: String::new(),
    }];
    if let Some(sw) = &node.software_profile_id {
        entries.push(IndexEntry {
            cf: cf::NODES_BY_SOFTWARE_PROFILE,
            key: keys::owner_node_key(sw.as_bytes(), &node.node_id),
            label: String::new(),
        });
    }
    if let Some(session) = &node.add_host_session {
        entries.push(IndexEntry {
            cf: cf::NODES_BY_SESSION,
            key: keys::owner_node_key(session.as_bytes(), &node.node_id),
            label: String::new(),
        });
    }
    entries
}

/// Tracks unique slots claimed and released within one write batch.
#[derive(Default)]
struct BatchSlots {
    claimed: HashSet<(&'static str, Vec<u8>)>,
    released: HashSet<(&'static str, Vec<u8>)>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Read a raw value.
    fn get_raw(&self, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Read and decode a record.
    fn get_record<T: serde::de::DeserializeOwned>(
        &self,
        cf_name: &str,
        key: &[u8],
    ) -> Result<Option<T>> {
        self.get_raw(cf_name, key)?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    /// Decode every record of a column family.
    fn all_records<T: serde::de::DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            records.push(Self::deserialize(&value)?);
        }
        Ok(records)
    }

    /// Collect all `(key, value)` pairs whose key starts with `prefix`.
    fn prefix_entries(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<(Box<[u8]>, Box<[u8]>)>> {
        let cf = self.cf(cf_name)?;
        let mut entries = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward));

        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            // Stop if we're past the prefix
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((key, value));
        }
        Ok(entries)
    }

    /// Resolve a unique index slot to the owning node ID.
    fn index_lookup(&self, cf_name: &str, key: &[u8]) -> Result<Option<NodeId>> {
        Ok(self
            .get_raw(cf_name, key)?
            .and_then(|value| keys::node_id_from_value(&value)))
    }

    /// Load the nodes referenced by an owner-node index prefix.
    fn nodes_by_owner(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<Node>> {
        let mut nodes = Vec::new();
        for (key, _) in self.prefix_entries(cf_name, prefix)? {
            let Some(node_id) = keys::extract_node_id_from_owner_key(&key) else {
                continue;
            };
            if let Some(node) = self.get_node(&node_id)? {
                nodes.push(node);
            }
        }
        Ok(nodes)
    }

    fn check_mapping(&self, node: &Node) -> Result<()> {
        if node.is_deleted() {
            return Ok(());
        }
        if let Some(sw) = &node.software_profile_id {
            if !self.is_usable(&node.hardware_profile_id, sw)? {
                return Err(StoreError::MappingViolation {
                    node: node.name.clone(),
                    hardware_profile: node.hardware_profile_id.to_string(),
                    software_profile: sw.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Add the writes moving a node from `old` to `new` to the batch.
    ///
    /// Must be called with the write lock held.
    fn stage_node_write(
        &self,
        batch: &mut WriteBatch,
        slots: &mut BatchSlots,
        old: Option<&Node>,
        new: &Node,
    ) -> Result<()> {
        let id_value = keys::node_key(&new.node_id);

        let old_unique = old.map(unique_entries).unwrap_or_default();
        let new_unique = unique_entries(new);
        for entry in &new_unique {
            if old_unique.iter().any(|o| o.same_slot(entry)) {
                continue;
            }
            let slot = (entry.cf, entry.key.clone());
            let taken_in_db = !slots.released.contains(&slot)
                && self
                    .index_lookup(entry.cf, &entry.key)?
                    .is_some_and(|owner| owner != new.node_id);
            if taken_in_db || !slots.claimed.insert(slot) {
                return Err(StoreError::AlreadyExists(entry.label.clone()));
            }
        }
        for entry in &old_unique {
            if !new_unique.iter().any(|n| n.same_slot(entry)) {
                batch.delete_cf(&self.cf(entry.cf)?, &entry.key);
                slots.released.insert((entry.cf, entry.key.clone()));
            }
        }
        for entry in &new_unique {
            batch.put_cf(&self.cf(entry.cf)?, &entry.key, &id_value);
        }

        let old_owner = old.map(owner_entries).unwrap_or_default();
        let new_owner = owner_entries(new);
        for entry in &old_owner {
            if !new_owner.iter().any(|n| n.same_slot(entry)) {
                batch.delete_cf(&self.cf(entry.cf)?, &entry.key);
            }
        }
        for entry in &new_owner {
            batch.put_cf(&self.cf(entry.cf)?, &entry.key, b"");
        }

        batch.put_cf(&self.cf(cf::NODES)?, &id_value, Self::serialize(new)?);
        Ok(())
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Write a profile record and maintain its unique name index.
    /// An idle profile must be an idle software profile mapped to `hw`.
    fn check_idle_profile(&self, hw: &HardwareProfile, sw: &SoftwareProfileId) -> Result<()> {
        let idle = self.get_software_profile(sw)?.ok_or(StoreError::NotFound)?;
        if !idle.is_idle {
            return Err(StoreError::InvalidIdleProfile(format!(
                "{} is not an idle software profile",
                idle.name
            )));
        }
        if !self.is_usable(&hw.hardware_profile_id, sw)? {
            return Err(StoreError::InvalidIdleProfile(format!(
                "{} is not mapped to hardware profile {}",
                idle.name, hw.name
            )));
        }
        Ok(())
    }

    fn put_named_profile<T: serde::Serialize>(
        &self,
        records_cf: &str,
        names_cf: &str,
        id_key: &[u8],
        name: &str,
        old_name: Option<&str>,
        record: &T,
    ) -> Result<()> {
        let name_key = keys::name_key(name);
        if let Some(owner) = self.get_raw(names_cf, &name_key)? {
            if owner.as_slice() != id_key {
                return Err(StoreError::AlreadyExists(format!("profile name {name}")));
            }
        }

        let cf_records = self.cf(records_cf)?;
        let cf_names = self.cf(names_cf)?;
        let mut batch = WriteBatch::default();
        if let Some(old) = old_name {
            let old_key = keys::name_key(old);
            if old_key != name_key {
                batch.delete_cf(&cf_names, &old_key);
            }
        }
        batch.put_cf(&cf_names, &name_key, id_key);
        batch.put_cf(&cf_records, id_key, Self::serialize(record)?);
        self.write(batch)
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Hardware Profile Operations
    // =========================================================================

    fn put_hardware_profile(&self, profile: &HardwareProfile) -> Result<()> {
        let _guard = self.write_lock.lock();
        let key = keys::hardware_profile_key(&profile.hardware_profile_id);
        let old = self.get_hardware_profile(&profile.hardware_profile_id)?;
        if let Some(idle) = &profile.idle_software_profile_id {
            let unchanged = old
                .as_ref()
                .is_some_and(|o| o.idle_software_profile_id.as_ref() == Some(idle));
            if !unchanged {
                self.check_idle_profile(profile, idle)?;
            }
        }
        self.put_named_profile(
            cf::HARDWARE_PROFILES,
            cf::HARDWARE_PROFILES_BY_NAME,
            &key,
            &profile.name,
            old.as_ref().map(|p| p.name.as_str()),
            profile,
        )
    }

    fn get_hardware_profile(&self, id: &HardwareProfileId) -> Result<Option<HardwareProfile>> {
        self.get_record(cf::HARDWARE_PROFILES, &keys::hardware_profile_key(id))
    }

    fn get_hardware_profile_by_name(&self, name: &str) -> Result<Option<HardwareProfile>> {
        match self.get_raw(cf::HARDWARE_PROFILES_BY_NAME, &keys::name_key(name))? {
            Some(id) => self.get_record(cf::HARDWARE_PROFILES, &id),
            None => Ok(None),
        }
    }

    fn list_hardware_profiles(&self) -> Result<Vec<HardwareProfile>> {
        self.all_records(cf::HARDWARE_PROFILES)
    }

    fn set_idle_software_profile(
        &self,
        hw: &HardwareProfileId,
        sw: Option<&SoftwareProfileId>,
    ) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut profile = self.get_hardware_profile(hw)?.ok_or(StoreError::NotFound)?;
        if let Some(sw) = sw {
            self.check_idle_profile(&profile, sw)?;
        }

        profile.idle_software_profile_id = sw.copied();
        let cf = self.cf(cf::HARDWARE_PROFILES)?;
        self.db
            .put_cf(&cf, keys::hardware_profile_key(hw), Self::serialize(&profile)?)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    // =========================================================================
    // Software Profile Operations
    // =========================================================================

    fn put_software_profile(&self, profile: &SoftwareProfile) -> Result<()> {
        let _guard = self.write_lock.lock();
        let key = keys::software_profile_key(&profile.software_profile_id);
        let old = self.get_software_profile(&profile.software_profile_id)?;
        if !profile.is_idle && old.as_ref().is_some_and(|o| o.is_idle) {
            let parked_on = self
                .list_hardware_profiles()?
                .into_iter()
                .find(|hw| hw.idle_software_profile_id == Some(profile.software_profile_id));
            if let Some(hw) = parked_on {
                return Err(StoreError::InvalidIdleProfile(format!(
                    "{} is the idle profile of hardware profile {}",
                    profile.name, hw.name
                )));
            }
        }
        self.put_named_profile(
            cf::SOFTWARE_PROFILES,
            cf::SOFTWARE_PROFILES_BY_NAME,
            &key,
            &profile.name,
            old.as_ref().map(|p| p.name.as_str()),
            profile,
        )
    }

    fn get_software_profile(&self, id: &SoftwareProfileId) -> Result<Option<SoftwareProfile>> {
        self.get_record(cf::SOFTWARE_PROFILES, &keys::software_profile_key(id))
    }

    fn get_software_profile_by_name(&self, name: &str) -> Result<Option<SoftwareProfile>> {
        match self.get_raw(cf::SOFTWARE_PROFILES_BY_NAME, &keys::name_key(name))? {
            Some(id) => self.get_record(cf::SOFTWARE_PROFILES, &id),
            None => Ok(None),
        }
    }

    fn list_software_profiles(&self) -> Result<Vec<SoftwareProfile>> {
        self.all_records(cf::SOFTWARE_PROFILES)
    }

    // =========================================================================
    // Profile Mapping Operations
    // =========================================================================

    fn add_profile_mapping(&self, sw: &SoftwareProfileId, hw: &HardwareProfileId) -> Result<bool> {
        if self.get_software_profile(sw)?.is_none() || self.get_hardware_profile(hw)?.is_none() {
            return Err(StoreError::NotFound);
        }

        let key = keys::mapping_key(sw, hw);
        if self.get_raw(cf::PROFILE_MAPPINGS, &key)?.is_some() {
            return Ok(false);
        }

        let cf = self.cf(cf::PROFILE_MAPPINGS)?;
        self.db
            .put_cf(&cf, &key, b"")
            .map_err(|e| StoreError::Database(e.to_string()))?;
        debug!(software_profile = %sw, hardware_profile = %hw, "profile mapping added");
        Ok(true)
    }

    fn remove_profile_mapping(
        &self,
        sw: &SoftwareProfileId,
        hw: &HardwareProfileId,
    ) -> Result<()> {
        let _guard = self.write_lock.lock();

        let key = keys::mapping_key(sw, hw);
        if self.get_raw(cf::PROFILE_MAPPINGS, &key)?.is_none() {
            return Err(StoreError::NotFound);
        }

        let hardware_profile = self
            .get_hardware_profile(hw)?
            .ok_or(StoreError::NotFound)?;
        if hardware_profile.idle_software_profile_id == Some(*sw) {
            return Err(StoreError::IdleProfileInUse {
                hardware_profile: hw.to_string(),
                software_profile: sw.to_string(),
            });
        }

        let in_use = self
            .list_nodes_by_software_profile(sw)?
            .iter()
            .filter(|n| !n.is_deleted() && n.hardware_profile_id == *hw)
            .count();
        if in_use > 0 {
            return Err(StoreError::MappingInUse {
                hardware_profile: hw.to_string(),
                software_profile: sw.to_string(),
                nodes: in_use,
            });
        }

        let cf = self.cf(cf::PROFILE_MAPPINGS)?;
        self.db
            .delete_cf(&cf, &key)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn is_usable(&self, hw: &HardwareProfileId, sw: &SoftwareProfileId) -> Result<bool> {
        Ok(self
            .get_raw(cf::PROFILE_MAPPINGS, &keys::mapping_key(sw, hw))?
            .is_some())
    }

    fn allowed_hardware_profiles(
        &self,
        sw: &SoftwareProfileId,
    ) -> Result<BTreeSet<HardwareProfileId>> {
        Ok(self
            .prefix_entries(cf::PROFILE_MAPPINGS, &keys::software_profile_prefix(sw))?
            .iter()
            .filter_map(|(key, _)| keys::split_mapping_key(key))
            .map(|(_, hw)| hw)
            .collect())
    }

    fn list_profile_mappings(&self) -> Result<Vec<(SoftwareProfileId, HardwareProfileId)>> {
        Ok(self
            .prefix_entries(cf::PROFILE_MAPPINGS, &[])?
            .iter()
            .filter_map(|(key, _)| keys::split_mapping_key(key))
            .collect())
    }

    // =========================================================================
    // Node Operations
    // =========================================================================

    fn insert_node(&self, node: &Node) -> Result<Node> {
        let _guard = self.write_lock.lock();

        if self.get_node(&node.node_id)?.is_some() {
            return Err(StoreError::AlreadyExists(format!("node {}", node.node_id)));
        }
        if self.get_hardware_profile(&node.hardware_profile_id)?.is_none() {
            return Err(StoreError::NotFound);
        }
        self.check_mapping(node)?;

        let mut stored = node.clone();
        stored.revision = 1;

        let mut batch = WriteBatch::default();
        self.stage_node_write(&mut batch, &mut BatchSlots::default(), None, &stored)?;
        self.write(batch)?;

        debug!(node = %stored.name, node_id = %stored.node_id, "node inserted");
        Ok(stored)
    }

    fn commit_nodes(&self, nodes: &[Node]) -> Result<Vec<Node>> {
        let _guard = self.write_lock.lock();

        let now = Utc::now();
        let mut batch = WriteBatch::default();
        let mut slots = BatchSlots::default();
        let mut seen = HashSet::new();
        let mut committed = Vec::with_capacity(nodes.len());

        for node in nodes {
            if !seen.insert(node.node_id) {
                return Err(StoreError::Conflict(node.name.clone()));
            }
            let current = self.get_node(&node.node_id)?.ok_or(StoreError::NotFound)?;
            if current.revision != node.revision {
                return Err(StoreError::Conflict(node.name.clone()));
            }
            if current.hardware_profile_id != node.hardware_profile_id {
                return Err(StoreError::HardwareProfileImmutable(node.name.clone()));
            }
            self.check_mapping(node)?;

            let mut next = node.clone();
            next.revision = current.revision + 1;
            next.updated_at = now;
            self.stage_node_write(&mut batch, &mut slots, Some(&current), &next)?;
            committed.push(next);
        }

        if committed.is_empty() {
            return Ok(committed);
        }
        self.write(batch)?;

        debug!(count = committed.len(), "nodes committed");
        Ok(committed)
    }

    fn get_node(&self, node_id: &NodeId) -> Result<Option<Node>> {
        self.get_record(cf::NODES, &keys::node_key(node_id))
    }

    fn get_node_by_name(&self, name: &str) -> Result<Option<Node>> {
        if let Some(node_id) = self.index_lookup(cf::NODES_BY_NAME, &keys::name_key(name))? {
            return self.get_node(&node_id);
        }
        if name.contains('.') {
            return Ok(None);
        }

        let matches = self.prefix_entries(cf::NODES_BY_NAME, &keys::short_name_prefix(name))?;
        match matches.as_slice() {
            [] => Ok(None),
            [(_, value)] => match keys::node_id_from_value(value) {
                Some(node_id) => self.get_node(&node_id),
                None => Ok(None),
            },
            _ => Err(StoreError::AmbiguousName(name.to_string())),
        }
    }

    fn get_node_by_mac(&self, mac: &MacAddress) -> Result<Option<Node>> {
        match self.index_lookup(cf::NODES_BY_MAC, &keys::mac_key(mac))? {
            Some(node_id) => self.get_node(&node_id),
            None => Ok(None),
        }
    }

    fn get_node_by_ip(&self, ip: Ipv4Addr) -> Result<Option<Node>> {
        match self.index_lookup(cf::NODES_BY_IP, &keys::ip_key(ip))? {
            Some(node_id) => self.get_node(&node_id),
            None => Ok(None),
        }
    }

    fn list_nodes_by_hardware_profile(&self, hw: &HardwareProfileId) -> Result<Vec<Node>> {
        self.nodes_by_owner(
            cf::NODES_BY_HARDWARE_PROFILE,
            &keys::hardware_profile_prefix(hw),
        )
    }

    fn list_nodes_by_software_profile(&self, sw: &SoftwareProfileId) -> Result<Vec<Node>> {
        self.nodes_by_owner(
            cf::NODES_BY_SOFTWARE_PROFILE,
            &keys::software_profile_prefix(sw),
        )
    }

    fn list_nodes_by_session(&self, session: &AddHostSessionId) -> Result<Vec<Node>> {
        let mut nodes = self.nodes_by_owner(cf::NODES_BY_SESSION, &keys::session_prefix(session))?;
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(nodes)
    }

    fn list_nodes_by_state(&self, state: &NodeState) -> Result<Vec<Node>> {
        Ok(self
            .list_all_nodes()?
            .into_iter()
            .filter(|n| n.state == *state)
            .collect())
    }

    fn list_nodes_by_tags(&self, tags: &[TagFilter]) -> Result<Vec<Node>> {
        Ok(self
            .list_all_nodes()?
            .into_iter()
            .filter(|n| matches_any_tag(n, tags))
            .collect())
    }

    fn list_nodes_matching(&self, pattern: &str) -> Result<Vec<Node>> {
        Ok(self
            .list_all_nodes()?
            .into_iter()
            .filter(|n| name_matches(pattern, &n.name))
            .collect())
    }

    fn list_all_nodes(&self) -> Result<Vec<Node>> {
        self.all_records(cf::NODES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LockState, Nic};
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    /// A store with one hardware profile mapped to one software profile.
    fn mapped_store() -> (RocksStore, TempDir, HardwareProfile, SoftwareProfile) {
        let (store, dir) = create_test_store();
        let hw = HardwareProfile::new("rack1", Some("default"));
        let sw = SoftwareProfile::new("compute");
        store.put_hardware_profile(&hw).unwrap();
        store.put_software_profile(&sw).unwrap();
        store
            .add_profile_mapping(&sw.software_profile_id, &hw.hardware_profile_id)
            .unwrap();
        (store, dir, hw, sw)
    }

    fn create_test_node(hw: &HardwareProfile, sw: &SoftwareProfile, name: &str, last: u8) -> Node {
        let mut node = Node::new(name, hw.hardware_profile_id, Some(sw.software_profile_id));
        node.nics.push(Nic {
            mac: Some(MacAddress::from_octets([0x52, 0x54, 0, 0, 0, last])),
            ip: Some(Ipv4Addr::new(10, 0, 0, last)),
            device: Some("eth0".to_string()),
            boot: true,
        });
        node
    }

    #[test]
    fn profile_crud() {
        let (store, _dir) = create_test_store();
        let mut hw = HardwareProfile::new("rack1", None);
        store.put_hardware_profile(&hw).unwrap();

        let by_name = store.get_hardware_profile_by_name("RACK1").unwrap().unwrap();
        assert_eq!(by_name.hardware_profile_id, hw.hardware_profile_id);

        // Rename releases the old name
        hw.name = "rack2".to_string();
        store.put_hardware_profile(&hw).unwrap();
        assert!(store.get_hardware_profile_by_name("rack1").unwrap().is_none());
        assert!(store.get_hardware_profile_by_name("rack2").unwrap().is_some());

        // Another profile cannot take the name
        let dup = HardwareProfile::new("rack2", None);
        assert!(matches!(
            store.put_hardware_profile(&dup),
            Err(StoreError::AlreadyExists(_))
        ));

        let sw = SoftwareProfile::new("compute");
        store.put_software_profile(&sw).unwrap();
        assert_eq!(store.list_software_profiles().unwrap().len(), 1);
        assert_eq!(store.list_hardware_profiles().unwrap().len(), 1);
    }

    #[test]
    fn profile_mappings() {
        let (store, _dir, hw, sw) = mapped_store();
        let other_hw = HardwareProfile::new("rack2", None);
        store.put_hardware_profile(&other_hw).unwrap();

        assert!(store
            .is_usable(&hw.hardware_profile_id, &sw.software_profile_id)
            .unwrap());
        assert!(!store
            .is_usable(&other_hw.hardware_profile_id, &sw.software_profile_id)
            .unwrap());

        // Idempotent
        assert!(!store
            .add_profile_mapping(&sw.software_profile_id, &hw.hardware_profile_id)
            .unwrap());
        assert!(store
            .add_profile_mapping(&sw.software_profile_id, &other_hw.hardware_profile_id)
            .unwrap());

        let allowed = store
            .allowed_hardware_profiles(&sw.software_profile_id)
            .unwrap();
        assert_eq!(allowed.len(), 2);
        assert!(allowed.contains(&other_hw.hardware_profile_id));
        assert_eq!(store.list_profile_mappings().unwrap().len(), 2);

        store
            .remove_profile_mapping(&sw.software_profile_id, &other_hw.hardware_profile_id)
            .unwrap();
        assert!(matches!(
            store.remove_profile_mapping(&sw.software_profile_id, &other_hw.hardware_profile_id),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn mapping_in_use_cannot_be_removed() {
        let (store, _dir, hw, sw) = mapped_store();
        let node = store.insert_node(&create_test_node(&hw, &sw, "n1", 1)).unwrap();

        let result = store.remove_profile_mapping(&sw.software_profile_id, &hw.hardware_profile_id);
        assert!(matches!(result, Err(StoreError::MappingInUse { nodes: 1, .. })));

        // Once the node is deleted the mapping is free
        let mut deleted = node;
        deleted.state = NodeState::Deleted;
        store.commit_nodes(&[deleted]).unwrap();
        store
            .remove_profile_mapping(&sw.software_profile_id, &hw.hardware_profile_id)
            .unwrap();
    }

    #[test]
    fn idle_profile_mapping_cannot_be_removed() {
        let (store, _dir, hw, _sw) = mapped_store();
        let idle = SoftwareProfile::idle("parked");
        store.put_software_profile(&idle).unwrap();
        store
            .add_profile_mapping(&idle.software_profile_id, &hw.hardware_profile_id)
            .unwrap();
        store
            .set_idle_software_profile(&hw.hardware_profile_id, Some(&idle.software_profile_id))
            .unwrap();

        let result =
            store.remove_profile_mapping(&idle.software_profile_id, &hw.hardware_profile_id);
        assert!(matches!(result, Err(StoreError::IdleProfileInUse { .. })));
        assert!(store
            .is_usable(&hw.hardware_profile_id, &idle.software_profile_id)
            .unwrap());

        // Clearing the idle profile releases the mapping
        store
            .set_idle_software_profile(&hw.hardware_profile_id, None)
            .unwrap();
        store
            .remove_profile_mapping(&idle.software_profile_id, &hw.hardware_profile_id)
            .unwrap();
        assert!(!store
            .is_usable(&hw.hardware_profile_id, &idle.software_profile_id)
            .unwrap());
    }

    #[test]
    fn hardware_profile_upsert_checks_idle_profile() {
        let (store, _dir, mut hw, _sw) = mapped_store();
        let idle = SoftwareProfile::idle("parked");
        store.put_software_profile(&idle).unwrap();

        hw.idle_software_profile_id = Some(idle.software_profile_id);
        assert!(matches!(
            store.put_hardware_profile(&hw),
            Err(StoreError::InvalidIdleProfile(_))
        ));

        store
            .add_profile_mapping(&idle.software_profile_id, &hw.hardware_profile_id)
            .unwrap();
        store.put_hardware_profile(&hw).unwrap();

        // An idle profile in use cannot stop being idle
        let mut active = idle.clone();
        active.is_idle = false;
        assert!(matches!(
            store.put_software_profile(&active),
            Err(StoreError::InvalidIdleProfile(_))
        ));
    }

    #[test]
    fn idle_profile_must_be_idle_and_mapped() {
        let (store, _dir, hw, sw) = mapped_store();
        let idle = SoftwareProfile::idle("parked");
        store.put_software_profile(&idle).unwrap();

        // Not idle
        assert!(matches!(
            store.set_idle_software_profile(&hw.hardware_profile_id, Some(&sw.software_profile_id)),
            Err(StoreError::InvalidIdleProfile(_))
        ));
        // Not mapped
        assert!(matches!(
            store.set_idle_software_profile(&hw.hardware_profile_id, Some(&idle.software_profile_id)),
            Err(StoreError::InvalidIdleProfile(_))
        ));

        store
            .add_profile_mapping(&idle.software_profile_id, &hw.hardware_profile_id)
            .unwrap();
        store
            .set_idle_software_profile(&hw.hardware_profile_id, Some(&idle.software_profile_id))
            .unwrap();
        let stored = store
            .get_hardware_profile(&hw.hardware_profile_id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.idle_software_profile_id, Some(idle.software_profile_id));

        store
            .set_idle_software_profile(&hw.hardware_profile_id, None)
            .unwrap();
    }

    #[test]
    fn insert_enforces_uniqueness() {
        let (store, _dir, hw, sw) = mapped_store();
        let stored = store.insert_node(&create_test_node(&hw, &sw, "n1", 1)).unwrap();
        assert_eq!(stored.revision, 1);

        // Same name, different case
        let dup_name = create_test_node(&hw, &sw, "N1", 2);
        assert!(matches!(
            store.insert_node(&dup_name),
            Err(StoreError::AlreadyExists(_))
        ));

        // Same MAC
        let dup_mac = create_test_node(&hw, &sw, "n2", 1);
        assert!(matches!(
            store.insert_node(&dup_mac),
            Err(StoreError::AlreadyExists(_))
        ));

        store.insert_node(&create_test_node(&hw, &sw, "n2", 2)).unwrap();
        assert_eq!(store.list_all_nodes().unwrap().len(), 2);
    }

    #[test]
    fn insert_enforces_mapping() {
        let (store, _dir, hw, _sw) = mapped_store();
        let unmapped = SoftwareProfile::new("storage");
        store.put_software_profile(&unmapped).unwrap();

        let node = create_test_node(&hw, &unmapped, "n1", 1);
        assert!(matches!(
            store.insert_node(&node),
            Err(StoreError::MappingViolation { .. })
        ));
    }

    #[test]
    fn node_lookups() {
        let (store, _dir, hw, sw) = mapped_store();
        let node = store
            .insert_node(&create_test_node(&hw, &sw, "compute-01.cluster", 1))
            .unwrap();
        store
            .insert_node(&create_test_node(&hw, &sw, "compute-02.cluster", 2))
            .unwrap();

        let by_name = store.get_node_by_name("Compute-01.Cluster").unwrap().unwrap();
        assert_eq!(by_name.node_id, node.node_id);

        let by_short = store.get_node_by_name("compute-01").unwrap().unwrap();
        assert_eq!(by_short.node_id, node.node_id);

        let by_mac = store
            .get_node_by_mac(&"52:54:00:00:00:01".parse().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(by_mac.node_id, node.node_id);

        let by_ip = store
            .get_node_by_ip(Ipv4Addr::new(10, 0, 0, 2))
            .unwrap()
            .unwrap();
        assert_eq!(by_ip.name, "compute-02.cluster");

        assert!(store.get_node_by_name("compute-03").unwrap().is_none());
        assert_eq!(
            store
                .list_nodes_by_hardware_profile(&hw.hardware_profile_id)
                .unwrap()
                .len(),
            2
        );
        assert_eq!(store.list_nodes_matching("compute-%").unwrap().len(), 2);
        assert_eq!(store.list_nodes_matching("%-02").unwrap().len(), 1);
    }

    #[test]
    fn ambiguous_short_name() {
        let (store, _dir, hw, sw) = mapped_store();
        store
            .insert_node(&create_test_node(&hw, &sw, "n1.east", 1))
            .unwrap();
        store
            .insert_node(&create_test_node(&hw, &sw, "n1.west", 2))
            .unwrap();

        assert!(matches!(
            store.get_node_by_name("n1"),
            Err(StoreError::AmbiguousName(_))
        ));
        assert!(store.get_node_by_name("n1.east").unwrap().is_some());
    }

    #[test]
    fn commit_bumps_revision_and_moves_indexes() {
        let (store, _dir, hw, sw) = mapped_store();
        let other = SoftwareProfile::new("storage");
        store.put_software_profile(&other).unwrap();
        store
            .add_profile_mapping(&other.software_profile_id, &hw.hardware_profile_id)
            .unwrap();

        let mut node = store.insert_node(&create_test_node(&hw, &sw, "n1", 1)).unwrap();
        node.software_profile_id = Some(other.software_profile_id);
        node.state = NodeState::Installed;
        let committed = store.commit_nodes(&[node]).unwrap();
        assert_eq!(committed[0].revision, 2);

        assert!(store
            .list_nodes_by_software_profile(&sw.software_profile_id)
            .unwrap()
            .is_empty());
        assert_eq!(
            store
                .list_nodes_by_software_profile(&other.software_profile_id)
                .unwrap()
                .len(),
            1
        );
        assert_eq!(
            store
                .list_nodes_by_state(&NodeState::Installed)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn commit_detects_conflict() {
        let (store, _dir, hw, sw) = mapped_store();
        let node = store.insert_node(&create_test_node(&hw, &sw, "n1", 1)).unwrap();

        let mut first = node.clone();
        first.lock_state = LockState::SoftLocked;
        let mut second = node;
        second.state = NodeState::Installed;

        store.commit_nodes(&[first]).unwrap();
        let result = store.commit_nodes(&[second]);
        assert!(matches!(result, Err(StoreError::Conflict(ref name)) if name == "n1"));

        let stored = store.get_node_by_name("n1").unwrap().unwrap();
        assert_eq!(stored.lock_state, LockState::SoftLocked);
        assert_eq!(stored.state, NodeState::Discovered);
    }

    #[test]
    fn commit_is_all_or_nothing() {
        let (store, _dir, hw, sw) = mapped_store();
        let unmapped = SoftwareProfile::new("storage");
        store.put_software_profile(&unmapped).unwrap();

        let mut a = store.insert_node(&create_test_node(&hw, &sw, "a", 1)).unwrap();
        let mut b = store.insert_node(&create_test_node(&hw, &sw, "b", 2)).unwrap();
        a.state = NodeState::Installed;
        b.software_profile_id = Some(unmapped.software_profile_id);

        assert!(matches!(
            store.commit_nodes(&[a.clone(), b]),
            Err(StoreError::MappingViolation { .. })
        ));
        let stored = store.get_node(&a.node_id).unwrap().unwrap();
        assert_eq!(stored.state, NodeState::Discovered);
        assert_eq!(stored.revision, 1);
    }

    #[test]
    fn hardware_profile_is_immutable() {
        let (store, _dir, hw, sw) = mapped_store();
        let mut node = store.insert_node(&create_test_node(&hw, &sw, "n1", 1)).unwrap();
        node.hardware_profile_id = HardwareProfileId::generate();
        assert!(matches!(
            store.commit_nodes(&[node]),
            Err(StoreError::HardwareProfileImmutable(_))
        ));
    }

    #[test]
    fn deleted_nodes_release_unique_slots() {
        let (store, _dir, hw, sw) = mapped_store();
        let mut node = store.insert_node(&create_test_node(&hw, &sw, "n1", 1)).unwrap();
        node.state = NodeState::Deleted;
        store.commit_nodes(&[node.clone()]).unwrap();

        assert!(store.get_node_by_name("n1").unwrap().is_none());
        assert!(store
            .get_node_by_ip(Ipv4Addr::new(10, 0, 0, 1))
            .unwrap()
            .is_none());

        // The record stays for audit and its slots can be reused
        assert!(store.get_node(&node.node_id).unwrap().unwrap().is_deleted());
        store.insert_node(&create_test_node(&hw, &sw, "n1", 1)).unwrap();
    }

    #[test]
    fn session_listing_is_ordered_by_name() {
        let (store, _dir, hw, sw) = mapped_store();
        let session = AddHostSessionId::generate();
        for (name, last) in [("n3", 3), ("n1", 1), ("n2", 2)] {
            let mut node = create_test_node(&hw, &sw, name, last);
            node.add_host_session = Some(session);
            store.insert_node(&node).unwrap();
        }

        let names: Vec<_> = store
            .list_nodes_by_session(&session)
            .unwrap()
            .into_iter()
            .map(|n| n.name)
            .collect();
        assert_eq!(names, vec!["n1", "n2", "n3"]);
    }

    #[test]
    fn tags_query() {
        let (store, _dir, hw, sw) = mapped_store();
        let mut node = create_test_node(&hw, &sw, "n1", 1);
        node.tags.insert("rack".to_string(), "r1".to_string());
        store.insert_node(&node).unwrap();
        store.insert_node(&create_test_node(&hw, &sw, "n2", 2)).unwrap();

        assert_eq!(
            store.list_nodes_by_tags(&[TagFilter::key("rack")]).unwrap().len(),
            1
        );
        assert!(store
            .list_nodes_by_tags(&[TagFilter::pair("rack", "r2")])
            .unwrap()
            .is_empty());
    }
}
