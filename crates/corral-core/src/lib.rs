//! Core types and utilities for corral.
//!
//! This crate provides the foundational types used throughout the node
//! lifecycle platform:
//!
//! - **Identifiers**: Strongly-typed IDs for nodes, profiles, and add-host sessions
//! - **MAC addresses**: A normalized hardware address type used for discovery
//! - **Error types**: Common error definitions shared across crates
//!
//! # Example
//!
//! ```
//! use corral_core::{HardwareProfileId, MacAddress, NodeId};
//!
//! let hardware_profile = HardwareProfileId::generate();
//! let node_id = NodeId::generate(&hardware_profile, "compute-01");
//!
//! let mac: MacAddress = "52:54:00:AB:CD:EF".parse().unwrap();
//! assert_eq!(mac.to_string(), "52:54:00:ab:cd:ef");
//! # let _ = node_id;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;
pub mod mac;

pub use error::{CoreError, Result};
pub use ids::{AddHostSessionId, HardwareProfileId, IdError, NodeId, SoftwareProfileId};
pub use mac::MacAddress;
