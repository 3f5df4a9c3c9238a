//! Host-level error taxonomy.
//!
//! Only [`HostError::LaunchFailure`] ever escapes [`crate::NativeHost::boot`];
//! the other variants describe failures that are logged, skipped or turned
//! into structured reply payloads at the boundary where they happen.

use thiserror::Error;

use crate::extensions::ExtensionError;
use crate::orchestrator::{OrchestratorError, SubsystemError};
use crate::permissions::CapabilityError;

/// Top-level error type for the native host.
#[derive(Debug, Error)]
pub enum HostError {
    /// A single extension failed to load or execute
    #[error("Extension discovery failed: {0}")]
    DiscoveryFailure(#[from] ExtensionError),

    /// The backend did not report a bound port
    #[error("Backend launch failed: {0}")]
    LaunchFailure(#[from] OrchestratorError),

    /// The scheduler or API server failed after the handshake
    #[error("Subsystem '{name}' failed to start: {source}")]
    SubsystemStartFailure {
        /// Subsystem that failed
        name: &'static str,
        /// Why it failed
        #[source]
        source: SubsystemError,
    },

    /// An OS capability provider call faulted
    #[error("Capability query failed: {0}")]
    CapabilityQueryFailure(CapabilityError),

    /// A caller supplied an unrecognized capability type
    #[error("Unsupported capability type: {0}")]
    UnsupportedCapabilityType(String),
}

impl HostError {
    /// Whether this failure must abort startup
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::LaunchFailure(_))
    }
}

impl From<CapabilityError> for HostError {
    fn from(err: CapabilityError) -> Self {
        match err {
            CapabilityError::UnsupportedType(kind) => Self::UnsupportedCapabilityType(kind),
            other => Self::CapabilityQueryFailure(other),
        }
    }
}

/// Result type for host operations.
pub type HostResult<T> = Result<T, HostError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_launch_failure_is_fatal() {
        assert!(HostError::LaunchFailure(OrchestratorError::ExitedBeforePort).is_fatal());
        assert!(!HostError::SubsystemStartFailure {
            name: "api",
            source: SubsystemError::BackendNotReady,
        }
        .is_fatal());
        assert!(!HostError::from(ExtensionError::Unresolved("a.js".to_string())).is_fatal());
    }

    #[test]
    fn test_capability_errors_split_by_kind() {
        let err = HostError::from(CapabilityError::UnsupportedType("bluetooth".to_string()));
        assert!(matches!(err, HostError::UnsupportedCapabilityType(ref t) if t == "bluetooth"));

        let err = HostError::from(CapabilityError::NotInitialized);
        assert!(matches!(err, HostError::CapabilityQueryFailure(_)));
    }
}
