//! Error types for the process orchestrator.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::session::SessionError;

/// Errors from launching the backend and completing the port handshake.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// `start` was called twice
    #[error("Backend already started for this session")]
    AlreadyStarted,

    /// The backend program could not be spawned
    #[error("Failed to spawn backend program '{program}': {source}")]
    Spawn {
        /// Program that failed to start
        program: String,
        /// Underlying spawn error
        #[source]
        source: io::Error,
    },

    /// The backend exited before the port handshake
    #[error("Backend process exited before reporting a bound port")]
    ExitedBeforePort,

    /// Port search and the OS fallback both failed
    #[error("No free port available near {preferred}: {source}")]
    NoFreePort {
        /// Port the search started from
        preferred: u16,
        /// Error from the OS fallback bind
        #[source]
        source: io::Error,
    },

    /// The session refused the bound port
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// The session cookie could not be stored
    #[error(transparent)]
    Cookie(#[from] CookieError),
}

/// The embedded content's cookie store rejected the session cookie.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to store session cookie: {0}")]
pub struct CookieError(pub String);

/// Errors from starting or running a dependent subsystem.
#[derive(Debug, Error)]
pub enum SubsystemError {
    /// The session port is still pending
    #[error("Backend has not reported its bound port yet")]
    BackendNotReady,

    /// The listening socket could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested
        addr: SocketAddr,
        /// Underlying bind error
        #[source]
        source: io::Error,
    },

    /// The subsystem failed after starting
    #[error("Subsystem '{name}' failed: {message}")]
    Failed {
        /// Subsystem name
        name: &'static str,
        /// Failure description
        message: String,
    },
}
