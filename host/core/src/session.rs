//! Session State
//!
//! The per-launch credentials shared between the native host and the backend
//! process. A [`Session`] is created once per application launch and shared as
//! `Arc<Session>` with every component that needs the secret or the ports.
//!
//! # Security Model
//!
//! - The secret is 32 bytes of cryptographically random data
//! - It is handed to the backend as hex (environment, cookie, request header)
//! - Presented secrets are compared in constant time
//! - A new secret is generated on every launch and never persisted
//!
//! # Write-once Fields
//!
//! The secret, the internal API port and the backend settings are fixed at
//! construction. The backend's bound port starts as [`BackendPort::Pending`]
//! and transitions to [`BackendPort::Bound`] exactly once, when the handshake
//! completes. Readers that see `Pending` must fail closed.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Size of the session secret in bytes
pub const SECRET_SIZE: usize = 32;

/// Errors related to session state
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// The secret could not be decoded
    #[error("invalid secret format: {0}")]
    InvalidSecret(String),

    /// The backend port was already recorded
    #[error("backend port already bound to {existing}")]
    PortAlreadyBound {
        /// The port recorded by the first handshake
        existing: u16,
    },
}

// =============================================================================
// Secret
// =============================================================================

/// Shared secret authenticating the backend process to the native host
///
/// This is the sole credential between the two processes for the lifetime of
/// the session.
#[derive(Clone)]
pub struct SessionSecret {
    bytes: [u8; SECRET_SIZE],
}

impl SessionSecret {
    /// Generate a new random secret from the system CSPRNG
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; SECRET_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Decode a secret from its hex form
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not hex or not `SECRET_SIZE` bytes long.
    pub fn from_hex(encoded: &str) -> Result<Self, SessionError> {
        let decoded =
            hex::decode(encoded.trim()).map_err(|e| SessionError::InvalidSecret(e.to_string()))?;
        if decoded.len() != SECRET_SIZE {
            return Err(SessionError::InvalidSecret(format!(
                "expected {} bytes, got {}",
                SECRET_SIZE,
                decoded.len()
            )));
        }
        let mut bytes = [0u8; SECRET_SIZE];
        bytes.copy_from_slice(&decoded);
        Ok(Self { bytes })
    }

    /// Hex encoding used on the wire
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Check a presented secret using constant-time comparison
    #[must_use]
    pub fn verify(&self, presented: &str) -> bool {
        match Self::from_hex(presented) {
            Ok(other) => constant_time_compare(&self.bytes, &other.bytes),
            Err(_) => false,
        }
    }
}

impl fmt::Debug for SessionSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionSecret([REDACTED])")
    }
}

impl PartialEq for SessionSecret {
    fn eq(&self, other: &Self) -> bool {
        constant_time_compare(&self.bytes, &other.bytes)
    }
}

impl Eq for SessionSecret {}

fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }

    result == 0
}

// =============================================================================
// Backend settings
// =============================================================================

/// Backend runtime settings (ini-equivalent key/value pairs)
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendSettings(BTreeMap<String, String>);

impl BackendSettings {
    /// Create an empty settings set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, replacing any previous one
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Look up a value
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Number of settings
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no settings are present
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Render as backend command-line flags (`-d key=value`, sorted by key)
    #[must_use]
    pub fn to_flags(&self) -> Vec<String> {
        self.0
            .iter()
            .flat_map(|(key, value)| ["-d".to_string(), format!("{key}={value}")])
            .collect()
    }
}

impl From<BTreeMap<String, String>> for BackendSettings {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

// =============================================================================
// Session
// =============================================================================

/// Handshake state of the backend's bound port
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendPort {
    /// The backend has not reported its port yet
    Pending,
    /// The backend is serving on this port
    Bound(u16),
}

impl BackendPort {
    /// The port, if bound
    #[must_use]
    pub fn port(self) -> Option<u16> {
        match self {
            Self::Pending => None,
            Self::Bound(port) => Some(port),
        }
    }
}

/// Per-launch session shared by the orchestrator, the bridge and the broker
#[derive(Debug)]
pub struct Session {
    secret: SessionSecret,
    api_port: u16,
    settings: BackendSettings,
    backend_port: OnceLock<u16>,
}

impl Session {
    /// Create a session with a freshly generated secret
    #[must_use]
    pub fn new(api_port: u16, settings: BackendSettings) -> Self {
        Self::with_secret(SessionSecret::generate(), api_port, settings)
    }

    /// Create a session with a caller-supplied secret
    #[must_use]
    pub fn with_secret(secret: SessionSecret, api_port: u16, settings: BackendSettings) -> Self {
        Self {
            secret,
            api_port,
            settings,
            backend_port: OnceLock::new(),
        }
    }

    /// The shared secret
    #[must_use]
    pub fn secret(&self) -> &SessionSecret {
        &self.secret
    }

    /// Port of the internal API server
    #[must_use]
    pub fn api_port(&self) -> u16 {
        self.api_port
    }

    /// Backend runtime settings
    #[must_use]
    pub fn settings(&self) -> &BackendSettings {
        &self.settings
    }

    /// Base URL the backend uses to call the internal API server
    #[must_use]
    pub fn api_url(&self) -> String {
        format!("http://127.0.0.1:{}/api/", self.api_port)
    }

    /// Current handshake state of the backend port
    #[must_use]
    pub fn backend_port(&self) -> BackendPort {
        match self.backend_port.get() {
            Some(port) => BackendPort::Bound(*port),
            None => BackendPort::Pending,
        }
    }

    /// Record the backend's bound port
    ///
    /// # Errors
    ///
    /// Returns `PortAlreadyBound` if a port was already recorded; the first
    /// value is kept.
    pub fn bind_backend_port(&self, port: u16) -> Result<(), SessionError> {
        self.backend_port
            .set(port)
            .map_err(|_| SessionError::PortAlreadyBound {
                existing: self.backend_port.get().copied().unwrap_or(port),
            })?;
        tracing::debug!(port = port, "Backend port recorded in session");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_hex_roundtrip_and_verify() {
        let secret = SessionSecret::generate();
        let encoded = secret.to_hex();
        assert_eq!(encoded.len(), SECRET_SIZE * 2);
        assert!(secret.verify(&encoded));
        assert_eq!(SessionSecret::from_hex(&encoded).unwrap(), secret);
    }

    #[test]
    fn test_secret_rejects_wrong_values() {
        let secret = SessionSecret::generate();
        let other = SessionSecret::generate();
        assert!(!secret.verify(&other.to_hex()));
        assert!(!secret.verify("not-hex"));
        assert!(!secret.verify("abcd"));
        assert!(!secret.verify(""));
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = SessionSecret::generate();
        let debug = format!("{secret:?}");
        assert!(!debug.contains(&secret.to_hex()));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_settings_render_as_sorted_flags() {
        let settings = BackendSettings::new()
            .with("memory_limit", "512M")
            .with("display_errors", "1");
        assert_eq!(
            settings.to_flags(),
            vec!["-d", "display_errors=1", "-d", "memory_limit=512M"]
        );
    }

    #[test]
    fn test_backend_port_is_write_once() {
        let session = Session::new(4000, BackendSettings::new());
        assert_eq!(session.backend_port(), BackendPort::Pending);
        assert_eq!(session.backend_port().port(), None);

        session.bind_backend_port(8100).unwrap();
        assert_eq!(session.backend_port(), BackendPort::Bound(8100));

        let err = session.bind_backend_port(8200).unwrap_err();
        assert_eq!(err, SessionError::PortAlreadyBound { existing: 8100 });
        assert_eq!(session.backend_port(), BackendPort::Bound(8100));
    }

    #[test]
    fn test_api_url() {
        let session = Session::new(4123, BackendSettings::new());
        assert_eq!(session.api_url(), "http://127.0.0.1:4123/api/");
    }
}
