//! Error types for the adapter crate.

use thiserror::Error;

/// Errors that can occur during resource adapter operations.
#[derive(Error, Debug)]
pub enum AdapterError {
    /// The adapter could not carry out the operation.
    #[error("Operation failed: {0}")]
    OperationFailed(String),

    /// The provisioning request is invalid or a provisioning step failed.
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// The adapter does not implement this operation.
    #[error("Operation not supported by adapter {adapter}: {operation}")]
    UnsupportedOperation {
        /// Adapter name.
        adapter: String,
        /// Operation name.
        operation: &'static str,
    },

    /// A node with this name already exists.
    #[error("Node already exists: {0}")]
    NodeAlreadyExists(String),

    /// A node with this MAC address already exists.
    #[error("MAC address already exists: {0}")]
    MacAddressAlreadyExists(String),

    /// A node with this IP address already exists.
    #[error("IP address already exists: {0}")]
    IpAlreadyExists(String),

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] corral_store::StoreError),

    /// I/O error (boot configuration, subprocesses).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AdapterError {
    /// Build an `UnsupportedOperation` error.
    #[must_use]
    pub fn unsupported(adapter: &str, operation: &'static str) -> Self {
        Self::UnsupportedOperation {
            adapter: adapter.to_string(),
            operation,
        }
    }

    /// Check if this error is retriable.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Io(_) => true,
            Self::Store(e) => e.is_retriable(),
            _ => false,
        }
    }

    /// Returns true for duplicate name, MAC or IP errors.
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(
            self,
            Self::NodeAlreadyExists(_)
                | Self::MacAddressAlreadyExists(_)
                | Self::IpAlreadyExists(_)
                | Self::Store(corral_store::StoreError::AlreadyExists(_))
        )
    }
}

/// A specialized Result type for adapter operations.
pub type Result<T> = std::result::Result<T, AdapterError>;
