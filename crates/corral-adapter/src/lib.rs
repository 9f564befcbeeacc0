//! Resource adapters for corral.
//!
//! This crate provides the [`ResourceAdapter`] contract every provisioning
//! backend implements, the [`AdapterRegistry`] the orchestrator resolves
//! adapters from, and the reference [`BareMetalAdapter`]. It handles:
//!
//! - Node record creation (names, NICs, IP allocation, duplicate checks)
//! - Predefined and DHCP-discovery provisioning
//! - PXE boot configuration and site hook invocation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Orchestrator                             │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │ resolve(hardware profile)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       AdapterRegistry                            │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      BareMetalAdapter                            │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────────┐   │
//! │  │ Node        │ │ PXE boot    │ │  DHCP discovery loop    │   │
//! │  │ factory     │ │ writer      │ │  (packet capture)       │   │
//! │  └─────────────┘ └─────────────┘ └─────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │              Hook script (power and provisioning)                │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use corral_adapter::{AdapterRegistry, BareMetalAdapter, BareMetalConfig};
//!
//! let registry = AdapterRegistry::new();
//! registry.register(Arc::new(BareMetalAdapter::new(BareMetalConfig::from_env())));
//! assert!(registry.get("default").is_some());
//! ```
//!
//! # Testing
//!
//! Enable the `test-utils` feature to use [`MockAdapter`], which records
//! every call and can be told to fail individual operations.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod adapter;
pub mod bare_metal;
pub mod error;
pub mod node_factory;
pub mod registry;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use adapter::ResourceAdapter;
pub use bare_metal::{BareMetalAdapter, BareMetalConfig};
pub use error::{AdapterError, Result};
pub use node_factory::{create_new_node, NewNode, NodeOptions};
pub use registry::AdapterRegistry;
pub use types::{
    AddNodesRequest, AdapterContext, BootMethod, NicDetails, NodeDetails, NodeTransfer,
    UpdateNodeRequest,
};

#[cfg(any(test, feature = "test-utils"))]
pub use mock::{AdapterCall, MockAdapter};
