//! Dependent subsystems
//!
//! Subsystems start only after the backend handshake. They receive a
//! [`SubsystemContext`] that can only be built from a session whose backend
//! port is bound, so a subsystem never observes a partial handshake.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::error::SubsystemError;
use crate::extensions::ExtensionSet;
use crate::session::{BackendPort, BackendSettings, Session, SessionSecret};

/// How long a stopping subsystem may take before it is aborted
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Parameters shared by every dependent subsystem
#[derive(Clone, Debug)]
pub struct SubsystemContext {
    session: Arc<Session>,
    backend_port: u16,
    extensions: ExtensionSet,
}

impl SubsystemContext {
    /// Build a context from a session whose handshake has completed
    ///
    /// # Errors
    ///
    /// Returns `BackendNotReady` while the backend port is still pending.
    pub fn new(session: Arc<Session>, extensions: ExtensionSet) -> Result<Self, SubsystemError> {
        match session.backend_port() {
            BackendPort::Bound(backend_port) => Ok(Self {
                session,
                backend_port,
                extensions,
            }),
            BackendPort::Pending => Err(SubsystemError::BackendNotReady),
        }
    }

    /// The session secret
    #[must_use]
    pub fn secret(&self) -> &SessionSecret {
        self.session.secret()
    }

    /// Internal API server port
    #[must_use]
    pub fn api_port(&self) -> u16 {
        self.session.api_port()
    }

    /// Internal API base URL handed to backend processes
    #[must_use]
    pub fn api_url(&self) -> String {
        self.session.api_url()
    }

    /// The backend's bound port
    #[must_use]
    pub fn backend_port(&self) -> u16 {
        self.backend_port
    }

    /// Backend runtime settings
    #[must_use]
    pub fn settings(&self) -> &BackendSettings {
        self.session.settings()
    }

    /// The loaded extensions
    #[must_use]
    pub fn extensions(&self) -> &ExtensionSet {
        &self.extensions
    }
}

/// A service started after the backend handshake
#[async_trait]
pub trait Subsystem: Send + Sync {
    /// Name used in logs and reports
    fn name(&self) -> &'static str;

    /// Start the subsystem and return a handle controlling it
    async fn start(&self, ctx: SubsystemContext) -> Result<SubsystemHandle, SubsystemError>;
}

/// A running subsystem
#[derive(Debug)]
pub struct SubsystemHandle {
    name: &'static str,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SubsystemHandle {
    /// Wrap a spawned task and its shutdown trigger
    #[must_use]
    pub fn new(name: &'static str, shutdown: oneshot::Sender<()>, task: JoinHandle<()>) -> Self {
        Self {
            name,
            shutdown: Some(shutdown),
            task,
        }
    }

    /// Subsystem name
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the subsystem task has ended
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal graceful shutdown, aborting the task if it does not end in time
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }

        let abort = self.task.abort_handle();
        match tokio::time::timeout(STOP_GRACE, &mut self.task).await {
            Ok(_) => debug!(subsystem = self.name, "Subsystem stopped"),
            Err(_) => {
                warn!(subsystem = self.name, "Subsystem did not stop in time, aborting");
                abort.abort();
            }
        }
        info!(subsystem = self.name, "Subsystem shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_requires_bound_port() {
        let session = Arc::new(Session::new(4000, BackendSettings::new()));
        let err = SubsystemContext::new(Arc::clone(&session), ExtensionSet::default()).unwrap_err();
        assert!(matches!(err, SubsystemError::BackendNotReady));

        session.bind_backend_port(8100).unwrap();
        let ctx = SubsystemContext::new(session, ExtensionSet::default()).unwrap();
        assert_eq!(ctx.backend_port(), 8100);
        assert_eq!(ctx.api_port(), 4000);
        assert_eq!(ctx.api_url(), "http://127.0.0.1:4000/api/");
    }

    #[tokio::test]
    async fn test_stop_signals_task() {
        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let _ = rx.await;
        });

        let handle = SubsystemHandle::new("probe", tx, task);
        assert_eq!(handle.name(), "probe");
        handle.stop().await;
    }
}
