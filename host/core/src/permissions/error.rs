//! Error types for the capability broker.

use thiserror::Error;

use super::provider::WindowFeature;

/// Errors raised while querying or requesting an OS capability.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    /// The capability type string is not one of the recognized five
    #[error("Invalid permission type: {0}")]
    UnsupportedType(String),

    /// The provider answered with a status spelling we do not know
    #[error("Unrecognized permission status: {0}")]
    UnrecognizedStatus(String),

    /// No permission API on this platform
    #[error("Capability provider unavailable: {0}")]
    Unavailable(String),

    /// The provider call itself faulted
    #[error("Capability provider failed: {0}")]
    Provider(String),

    /// A handler ran after `cleanup`
    #[error("capability broker is not initialized")]
    NotInitialized,
}

/// Errors raised by the window-capability provider.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WindowCapabilityError {
    /// The sender has no window
    #[error("No window found")]
    NoWindow,

    /// The window lacks the feature
    #[error("{0} not available")]
    Unsupported(WindowFeature),

    /// An argument was out of range
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The platform rejected the operation
    #[error("Window operation failed: {0}")]
    Platform(String),
}
