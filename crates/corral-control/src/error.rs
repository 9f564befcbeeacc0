//! Error types for the control plane.
//!
//! Only errors that make a whole request unserviceable are raised here.
//! Per-node precondition and lock failures are reported as
//! [`NodeFailure`](crate::types::NodeFailure) values instead.

use corral_adapter::AdapterError;
use corral_core::CoreError;
use corral_store::StoreError;
use thiserror::Error;

/// A result type using `ControlError`.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Errors that can occur in control plane operations.
#[derive(Debug, Error)]
pub enum ControlError {
    /// A node name or id did not resolve.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// A software profile name or id did not resolve.
    #[error("software profile not found: {0}")]
    SoftwareProfileNotFound(String),

    /// A hardware profile name or id did not resolve.
    #[error("hardware profile not found: {0}")]
    HardwareProfileNotFound(String),

    /// No valid transfer could be made.
    #[error("node transfer not valid: {0}")]
    NodeTransferNotValid(String),

    /// The request arguments are invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A node id or MAC address in a selector is malformed.
    #[error("invalid selector: {0}")]
    InvalidSelector(#[from] CoreError),

    /// The software profile may not run on the hardware profile.
    #[error(
        "software profile [{software_profile}] is not usable with hardware profile [{hardware_profile}]"
    )]
    ProfileMappingNotAllowed {
        /// Hardware profile name.
        hardware_profile: String,
        /// Software profile name.
        software_profile: String,
    },

    /// The node is locked against this change.
    #[error("node is locked: {0}")]
    NodeLocked(String),

    /// The hardware profile has no usable adapter, or an adapter operation failed.
    #[error("operation failed: {0}")]
    OperationFailed(String),

    /// A provisioning command was rejected or failed.
    #[error("command failed: {0}")]
    CommandFailed(String),

    /// Other resource adapter error.
    #[error("adapter error: {0}")]
    Adapter(AdapterError),

    /// Storage layer error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<AdapterError> for ControlError {
    fn from(e: AdapterError) -> Self {
        match e {
            AdapterError::OperationFailed(message) => Self::OperationFailed(message),
            AdapterError::CommandFailed(message) => Self::CommandFailed(message),
            AdapterError::Store(e) => Self::Store(e),
            other => Self::Adapter(other),
        }
    }
}

impl ControlError {
    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::NodeNotFound(_)
            | Self::SoftwareProfileNotFound(_)
            | Self::HardwareProfileNotFound(_) => 404,
            Self::InvalidArgument(_) | Self::InvalidSelector(_) | Self::CommandFailed(_) => 400,
            Self::NodeTransferNotValid(_)
            | Self::ProfileMappingNotAllowed { .. }
            | Self::NodeLocked(_) => 409,
            Self::Adapter(e) if e.is_duplicate() => 409,
            Self::Adapter(AdapterError::UnsupportedOperation { .. }) => 501,
            Self::Adapter(_) => 502,
            Self::Store(
                StoreError::Conflict(_)
                | StoreError::MappingInUse { .. }
                | StoreError::IdleProfileInUse { .. },
            ) => 409,
            Self::Store(StoreError::NotFound) => 404,
            Self::Store(_) | Self::OperationFailed(_) | Self::Internal(_) => 500,
        }
    }

    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_retriable(),
            Self::Adapter(e) => e.is_retriable(),
            Self::Internal(_) => true,
            _ => false,
        }
    }
}
