//! Error types for the storage layer.

use thiserror::Error;

/// A result type using `StoreError`.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested record was not found.
    #[error("record not found")]
    NotFound,

    /// A uniqueness constraint (name, MAC, IP) would be violated.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The node's software profile is not usable with its hardware profile.
    #[error(
        "software profile {software_profile} is not mapped to hardware profile {hardware_profile} (node {node})"
    )]
    MappingViolation {
        /// Node name.
        node: String,
        /// Hardware profile identifier.
        hardware_profile: String,
        /// Software profile identifier.
        software_profile: String,
    },

    /// A mapping cannot be removed while live nodes depend on it.
    #[error("mapping {software_profile} -> {hardware_profile} is in use by {nodes} node(s)")]
    MappingInUse {
        /// Hardware profile identifier.
        hardware_profile: String,
        /// Software profile identifier.
        software_profile: String,
        /// Number of live nodes using the pair.
        nodes: usize,
    },

    /// A mapping cannot be removed while its software profile is the
    /// hardware profile's idle profile.
    #[error("software profile {software_profile} is the idle profile of hardware profile {hardware_profile}")]
    IdleProfileInUse {
        /// Hardware profile identifier.
        hardware_profile: String,
        /// Software profile identifier.
        software_profile: String,
    },

    /// The idle software profile assignment is not allowed.
    #[error("invalid idle software profile: {0}")]
    InvalidIdleProfile(String),

    /// A commit tried to change a node's hardware profile.
    #[error("hardware profile of node {0} cannot be changed")]
    HardwareProfileImmutable(String),

    /// The node was modified since it was read.
    #[error("node {0} was modified concurrently")]
    Conflict(String),

    /// A short name matched more than one node.
    #[error("name {0} is ambiguous")]
    AmbiguousName(String),

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Returns true if retrying the unit of work may succeed.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::Database(_))
    }
}
