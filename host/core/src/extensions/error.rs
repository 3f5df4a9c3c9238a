//! Error types for the extension system.

use thiserror::Error;

/// Errors that can occur while loading a single extension module.
#[derive(Debug, Error)]
pub enum ExtensionError {
    /// The loader has nothing for this reference
    #[error("No module registered for '{0}'")]
    Unresolved(String),

    /// Module initialization raised an error
    #[error("Module '{reference}' failed to initialize: {message}")]
    InitFailed {
        /// Module reference that failed
        reference: String,
        /// Error text raised by the module
        message: String,
    },

    /// Filesystem error while reading the module
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for extension operations.
pub type ExtensionResult<T> = Result<T, ExtensionError>;
