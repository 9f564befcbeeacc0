//! `RocksDB` storage layer for corral.
//!
//! This crate provides persistent storage for hardware profiles, software
//! profiles, their usable-with mapping and nodes, using `RocksDB` with column
//! families for efficient indexing.
//!
//! # Architecture
//!
//! The storage uses the following column families:
//!
//! - `hardware_profiles` / `software_profiles`: primary profile records
//! - `*_by_name`: unique, case-insensitive profile name indexes
//! - `profile_mappings`: the software → hardware usable-with set
//! - `nodes`: primary node records, keyed by `node_id`
//! - `nodes_by_name`, `nodes_by_mac`, `nodes_by_ip`: uniqueness indexes for live nodes
//! - `nodes_by_hardware_profile`, `nodes_by_software_profile`, `nodes_by_session`:
//!   prefix-scan indexes
//!
//! Node writes are optimistic: every node carries the revision it was read
//! at, and [`Store::commit_nodes`] refuses the whole batch with
//! [`StoreError::Conflict`] if any node changed underneath the caller.
//! [`Transaction`] wraps this into a request-scoped unit of work.
//!
//! # Example
//!
//! ```no_run
//! use corral_store::{HardwareProfile, RocksStore, Store};
//!
//! let store = RocksStore::open("/tmp/corral-db").unwrap();
//!
//! let hw = HardwareProfile::new("rack1", Some("default"));
//! store.put_hardware_profile(&hw).unwrap();
//! let nodes = store.list_nodes_by_hardware_profile(&hw.hardware_profile_id).unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod query;
pub mod rocks;
pub mod schema;
pub mod txn;
pub mod types;

pub use error::{Result, StoreError};
pub use query::TagFilter;
pub use rocks::RocksStore;
pub use txn::Transaction;
pub use types::{
    BootFrom, HardwareProfile, Location, LockState, Nic, Node, NodeState, ProvisioningNic,
    SoftwareProfile,
};

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use corral_core::{AddHostSessionId, HardwareProfileId, MacAddress, NodeId, SoftwareProfileId};

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing for different implementations
/// (e.g., `RocksDB`, in-memory for testing). It is object safe; resource
/// adapters receive it as `&dyn Store`.
pub trait Store: Send + Sync {
    // =========================================================================
    // Hardware Profile Operations
    // =========================================================================

    /// Insert or update a hardware profile.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if another profile has the same name,
    /// or `StoreError::InvalidIdleProfile` if a newly set idle profile is not
    /// an idle software profile mapped to this one.
    fn put_hardware_profile(&self, profile: &HardwareProfile) -> Result<()>;

    /// Get a hardware profile by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_hardware_profile(&self, id: &HardwareProfileId) -> Result<Option<HardwareProfile>>;

    /// Get a hardware profile by name (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_hardware_profile_by_name(&self, name: &str) -> Result<Option<HardwareProfile>>;

    /// List all hardware profiles.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_hardware_profiles(&self) -> Result<Vec<HardwareProfile>>;

    /// Set or clear the idle software profile of a hardware profile.
    ///
    /// The idle profile must be an idle software profile that is already
    /// mapped to the hardware profile.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if either profile doesn't exist, or
    /// `StoreError::InvalidIdleProfile` if the software profile is not idle or
    /// not mapped.
    fn set_idle_software_profile(
        &self,
        hw: &HardwareProfileId,
        sw: Option<&SoftwareProfileId>,
    ) -> Result<()>;

    // =========================================================================
    // Software Profile Operations
    // =========================================================================

    /// Insert or update a software profile.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if another profile has the same name,
    /// or `StoreError::InvalidIdleProfile` if a hardware profile parks nodes on
    /// it and the update clears its idle flag.
    fn put_software_profile(&self, profile: &SoftwareProfile) -> Result<()>;

    /// Get a software profile by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_software_profile(&self, id: &SoftwareProfileId) -> Result<Option<SoftwareProfile>>;

    /// Get a software profile by name (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_software_profile_by_name(&self, name: &str) -> Result<Option<SoftwareProfile>>;

    /// List all software profiles.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_software_profiles(&self) -> Result<Vec<SoftwareProfile>>;

    // =========================================================================
    // Profile Mapping Operations
    // =========================================================================

    /// Allow nodes of `hw` to run `sw`.
    ///
    /// Returns `false` if the mapping already existed.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if either profile doesn't exist.
    fn add_profile_mapping(&self, sw: &SoftwareProfileId, hw: &HardwareProfileId) -> Result<bool>;

    /// Remove a usable-with mapping.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::MappingInUse` if a live node runs the pair,
    /// `StoreError::IdleProfileInUse` if `sw` is the idle profile of `hw`, or
    /// `StoreError::NotFound` if the mapping doesn't exist.
    fn remove_profile_mapping(&self, sw: &SoftwareProfileId, hw: &HardwareProfileId)
        -> Result<()>;

    /// Returns true if nodes of `hw` may run `sw`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn is_usable(&self, hw: &HardwareProfileId, sw: &SoftwareProfileId) -> Result<bool>;

    /// The hardware profiles allowed to run `sw`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn allowed_hardware_profiles(&self, sw: &SoftwareProfileId)
        -> Result<BTreeSet<HardwareProfileId>>;

    /// List every `(software, hardware)` mapping.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_profile_mappings(&self) -> Result<Vec<(SoftwareProfileId, HardwareProfileId)>>;

    // =========================================================================
    // Node Operations
    // =========================================================================

    /// Persist a new node and return the stored copy.
    ///
    /// Name (case-insensitive), MAC and IP must be unique among live nodes,
    /// and the software profile, if any, must be usable with the hardware
    /// profile.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` on a uniqueness violation,
    /// `StoreError::NotFound` if the hardware profile doesn't exist, or
    /// `StoreError::MappingViolation`.
    fn insert_node(&self, node: &Node) -> Result<Node>;

    /// Atomically write a batch of modified nodes.
    ///
    /// Each node must still be at the revision it was read at. Revisions are
    /// bumped and all indexes maintained. Nodes committed as `Deleted` release
    /// their name, MAC and IP.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if any node was modified concurrently,
    /// `StoreError::HardwareProfileImmutable`, `StoreError::MappingViolation`,
    /// or `StoreError::AlreadyExists`. Nothing is written on error.
    fn commit_nodes(&self, nodes: &[Node]) -> Result<Vec<Node>>;

    /// Get a node by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_node(&self, node_id: &NodeId) -> Result<Option<Node>>;

    /// Get a live node by name.
    ///
    /// Matching is case-insensitive. A name without a `.` also matches a
    /// fully-qualified name with that short name.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AmbiguousName` if a short name matches several nodes.
    fn get_node_by_name(&self, name: &str) -> Result<Option<Node>>;

    /// Get the live node owning a MAC address.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_node_by_mac(&self, mac: &MacAddress) -> Result<Option<Node>>;

    /// Get the live node owning an IP address.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_node_by_ip(&self, ip: Ipv4Addr) -> Result<Option<Node>>;

    /// List all nodes of a hardware profile, including deleted ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_nodes_by_hardware_profile(&self, hw: &HardwareProfileId) -> Result<Vec<Node>>;

    /// List all nodes currently on a software profile, including deleted ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_nodes_by_software_profile(&self, sw: &SoftwareProfileId) -> Result<Vec<Node>>;

    /// List the nodes created in an add-host session, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_nodes_by_session(&self, session: &AddHostSessionId) -> Result<Vec<Node>>;

    /// List all nodes in a lifecycle state.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_nodes_by_state(&self, state: &NodeState) -> Result<Vec<Node>>;

    /// List nodes carrying any of the given tags.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_nodes_by_tags(&self, tags: &[TagFilter]) -> Result<Vec<Node>>;

    /// List nodes whose name matches a `%`-wildcard pattern.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_nodes_matching(&self, pattern: &str) -> Result<Vec<Node>>;

    /// List all nodes in the database.
    ///
    /// Use with caution in production; prefer filtered queries.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_all_nodes(&self) -> Result<Vec<Node>>;
}
