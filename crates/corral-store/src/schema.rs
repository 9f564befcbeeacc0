//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Primary hardware profile records, keyed by `hardware_profile_id`.
    pub const HARDWARE_PROFILES: &str = "hardware_profiles";

    /// Index: hardware profiles by lowercased name.
    pub const HARDWARE_PROFILES_BY_NAME: &str = "hardware_profiles_by_name";

    /// Primary software profile records, keyed by `software_profile_id`.
    pub const SOFTWARE_PROFILES: &str = "software_profiles";

    /// Index: software profiles by lowercased name.
    pub const SOFTWARE_PROFILES_BY_NAME: &str = "software_profiles_by_name";

    /// Usable-with mapping, keyed by `software_profile_id || hardware_profile_id`.
    pub const PROFILE_MAPPINGS: &str = "profile_mappings";

    /// Primary node records, keyed by `node_id`.
    pub const NODES: &str = "nodes";

    /// Index: live nodes by lowercased name.
    pub const NODES_BY_NAME: &str = "nodes_by_name";

    /// Index: live nodes by MAC address octets.
    pub const NODES_BY_MAC: &str = "nodes_by_mac";

    /// Index: live nodes by IPv4 address octets.
    pub const NODES_BY_IP: &str = "nodes_by_ip";

    /// Index: nodes by hardware profile, keyed by `hardware_profile_id || node_id`.
    pub const NODES_BY_HARDWARE_PROFILE: &str = "nodes_by_hardware_profile";

    /// Index: nodes by software profile, keyed by `software_profile_id || node_id`.
    pub const NODES_BY_SOFTWARE_PROFILE: &str = "nodes_by_software_profile";

    /// Index: nodes by add-host session, keyed by `session_id || node_id`.
    pub const NODES_BY_SESSION: &str = "nodes_by_session";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::HARDWARE_PROFILES,
        cf::HARDWARE_PROFILES_BY_NAME,
        cf::SOFTWARE_PROFILES,
        cf::SOFTWARE_PROFILES_BY_NAME,
        cf::PROFILE_MAPPINGS,
        cf::NODES,
        cf::NODES_BY_NAME,
        cf::NODES_BY_MAC,
        cf::NODES_BY_IP,
        cf::NODES_BY_HARDWARE_PROFILE,
        cf::NODES_BY_SOFTWARE_PROFILE,
        cf::NODES_BY_SESSION,
    ]
}
