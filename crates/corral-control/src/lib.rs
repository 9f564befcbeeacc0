//! Lifecycle orchestrator for corral cluster nodes.
//!
//! This crate decides what may happen to a node and in which order: it
//! checks profile mappings and lock states, stages changes in a store
//! transaction, delegates the physical work to the resource adapter of each
//! node's hardware profile, commits, and publishes state change events.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Caller (CLI / API / corrald)                │
//! └─────────────────────────────────────────────────────────────┘
//!                              │  Transaction
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Orchestrator                         │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐    │
//! │  │  Profile    │ │  Lifecycle  │ │  Per-node reports   │    │
//! │  │  model      │ │  checks     │ │  and events         │    │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┼──────────────┐
//!               ▼              ▼              ▼
//!        ┌──────────┐   ┌──────────┐   ┌──────────┐
//!        │  Store   │   │ Adapter  │   │  Event   │
//!        │ (RocksDB)│   │ registry │   │  sink    │
//!        └──────────┘   └──────────┘   └──────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use corral_adapter::{AdapterRegistry, BareMetalAdapter, BareMetalConfig};
//! use corral_control::{NodeSelector, Orchestrator, TracingEventSink};
//! use corral_store::RocksStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RocksStore::open("/tmp/corral")?);
//! let registry = Arc::new(AdapterRegistry::new());
//! registry.register(Arc::new(BareMetalAdapter::new(BareMetalConfig::default())));
//!
//! let orchestrator = Orchestrator::new(store, registry, Arc::new(TracingEventSink));
//!
//! let mut txn = orchestrator.begin();
//! let report = orchestrator
//!     .transfer_count_nodes(&mut txn, None, "compute", 4, false)
//!     .await?;
//! for failure in &report.failures {
//!     println!("{failure}");
//! }
//!
//! let nodes = orchestrator.resolve_nodes(&txn, &NodeSelector::names(["n01"]))?;
//! orchestrator.idle(&mut txn, nodes).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Node states
//!
//! - `Discovered` → `Provisioned` → `Installed` as a node is brought up
//! - `Installed` → `Expired` on transfer, until reinstalled
//! - any state → `Deleted`, after which the node is never selected again
//!
//! Adapters may report their own states for idled nodes. See the
//! [`lifecycle`] module for the per-node checks.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod events;
pub mod lifecycle;
pub mod profiles;
pub mod service;
pub mod types;

pub use error::{ControlError, Result};
pub use events::{BroadcastEventSink, EventSink, NodeStateChanged, TracingEventSink};
pub use profiles::ProfileModel;
pub use service::Orchestrator;
pub use types::{
    AddNodesOutcome, ControlConfig, FailureKind, NodeFailure, NodeSelector, OperationReport,
    StartupOptions, TransferOutcome,
};

#[cfg(any(test, feature = "test-utils"))]
pub use events::RecordingEventSink;

// Re-export commonly used types from dependencies for convenience
pub use corral_adapter::{AddNodesRequest, BootMethod, UpdateNodeRequest};
pub use corral_store::{BootFrom, LockState, Node, NodeState, Transaction};
