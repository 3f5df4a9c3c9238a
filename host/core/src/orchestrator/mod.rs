//! Process Orchestrator
//!
//! Starts the backend process, completes the port handshake and then starts
//! the subsystems that depend on it.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator::start(session)
//!   1. find_available_port(preferred)
//!   2. BackendLauncher::launch(LaunchRequest)
//!   3. await bound port ─────────────── exits first ──► ExitedBeforePort
//!   4. Session::bind_backend_port
//!   5. CookieStore::set(_php_native = secret)
//!   6. BackendHandle
//!
//! start_subsystem / start_api / run_scheduler
//!   refused with BackendNotReady until step 4 has happened
//! ```
//!
//! # Module Structure
//!
//! - `backend`: launch request, launchers, port handshake parsing
//! - `cookies`: session cookie and its store
//! - `subsystem`: the dependent subsystem contract
//! - `scheduler`: periodic scheduler subsystem
//! - `api`: internal API server subsystem
//! - `error`: orchestrator and subsystem errors

mod api;
mod backend;
mod cookies;
mod error;
mod scheduler;
mod subsystem;

pub use api::{build_router, ApiError, ApiServer, SECRET_HEADER};
pub use backend::{
    find_available_port, parse_bound_port, session_env, BackendLauncher, LaunchRequest,
    ProcessLauncher, RunningBackend, ENV_API_URL, ENV_RUNNING, ENV_SECRET,
};
pub use cookies::{CookieJar, CookieStore, SessionCookie, SESSION_COOKIE_NAME};
pub use error::{CookieError, OrchestratorError, SubsystemError};
pub use scheduler::Scheduler;
pub use subsystem::{Subsystem, SubsystemContext, SubsystemHandle};

use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::{Arc, OnceLock};

use tokio::process::Child;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::bridge::BridgeMessage;
use crate::config::{BackendConfig, SchedulerConfig};
use crate::extensions::ExtensionSet;
use crate::session::Session;

// =============================================================================
// Orchestrator
// =============================================================================

/// Owns the backend launch and gates the dependent subsystems on it
pub struct Orchestrator {
    config: BackendConfig,
    working_dir: PathBuf,
    launcher: Arc<dyn BackendLauncher>,
    cookies: Arc<dyn CookieStore>,
    extensions: ExtensionSet,
    session: OnceLock<Arc<Session>>,
}

impl Orchestrator {
    /// Create an orchestrator for the backend described by `config`
    #[must_use]
    pub fn new(
        config: BackendConfig,
        working_dir: PathBuf,
        launcher: Arc<dyn BackendLauncher>,
        cookies: Arc<dyn CookieStore>,
    ) -> Self {
        Self {
            config,
            working_dir,
            launcher,
            cookies,
            extensions: ExtensionSet::default(),
            session: OnceLock::new(),
        }
    }

    /// Extensions handed to subsystems
    #[must_use]
    pub fn with_extensions(mut self, extensions: ExtensionSet) -> Self {
        self.extensions = extensions;
        self
    }

    /// The session passed to [`Self::start`], if any
    #[must_use]
    pub fn session(&self) -> Option<&Arc<Session>> {
        self.session.get()
    }

    /// Launch the backend and complete the port handshake
    ///
    /// # Errors
    ///
    /// - `AlreadyStarted` on a second call
    /// - `Spawn` / `NoFreePort` when the process cannot be started
    /// - `ExitedBeforePort` when the backend exits without reporting a port
    /// - `Cookie` when the session cookie cannot be stored
    pub async fn start(&self, session: Arc<Session>) -> Result<BackendHandle, OrchestratorError> {
        if self.session.set(Arc::clone(&session)).is_err() {
            return Err(OrchestratorError::AlreadyStarted);
        }

        let offered = find_available_port(self.config.preferred_port).await?;
        if offered != self.config.preferred_port {
            debug!(
                preferred = self.config.preferred_port,
                offered = offered,
                "Preferred backend port taken"
            );
        }

        let request = LaunchRequest::build(&self.config, &self.working_dir, &session, offered);
        info!(
            program = %request.program,
            port = offered,
            working_dir = %self.working_dir.display(),
            "Starting backend"
        );
        let running = self.launcher.launch(request).await?;

        let port = running
            .port
            .await
            .map_err(|_| OrchestratorError::ExitedBeforePort)?;
        session.bind_backend_port(port)?;

        self.cookies
            .set(SessionCookie::for_backend(&session, port))
            .await?;

        info!(port = port, "Backend handshake complete");
        Ok(BackendHandle {
            port,
            child: running.child,
        })
    }

    /// Start a subsystem once the handshake has completed
    ///
    /// # Errors
    ///
    /// Returns `BackendNotReady` before the backend has reported its port,
    /// otherwise whatever the subsystem fails with.
    pub async fn start_subsystem(
        &self,
        subsystem: &dyn Subsystem,
    ) -> Result<SubsystemHandle, SubsystemError> {
        let session = self.session.get().ok_or(SubsystemError::BackendNotReady)?;
        let ctx = SubsystemContext::new(Arc::clone(session), self.extensions.clone())?;
        debug!(subsystem = subsystem.name(), "Starting subsystem");
        subsystem.start(ctx).await
    }

    /// Start the periodic scheduler
    ///
    /// # Errors
    ///
    /// See [`Self::start_subsystem`].
    pub async fn run_scheduler(
        &self,
        config: &SchedulerConfig,
    ) -> Result<SubsystemHandle, SubsystemError> {
        let scheduler = Scheduler::new(self.config.program.clone(), config)
            .with_working_dir(self.working_dir.clone());
        self.start_subsystem(&scheduler).await
    }

    /// Start the internal API server, feeding `bridge`
    ///
    /// # Errors
    ///
    /// See [`Self::start_subsystem`].
    pub async fn start_api(
        &self,
        bridge: mpsc::Sender<BridgeMessage>,
    ) -> Result<SubsystemHandle, SubsystemError> {
        self.start_subsystem(&ApiServer::new(bridge)).await
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("program", &self.config.program)
            .field("working_dir", &self.working_dir)
            .field("started", &self.session.get().is_some())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Backend handle
// =============================================================================

/// The running backend after a completed handshake
#[derive(Debug)]
pub struct BackendHandle {
    port: u16,
    child: Option<Child>,
}

impl BackendHandle {
    /// Port the backend reported
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether a child process is attached
    #[must_use]
    pub fn has_process(&self) -> bool {
        self.child.is_some()
    }

    /// Wait for the backend process to exit
    ///
    /// Returns `None` when no child process is attached.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from waiting on the child.
    pub async fn wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        match self.child.as_mut() {
            Some(child) => child.wait().await.map(Some),
            None => Ok(None),
        }
    }

    /// Kill the backend process
    pub async fn shutdown(mut self) {
        let Some(mut child) = self.child.take() else {
            debug!("No backend process to stop");
            return;
        };

        match child.kill().await {
            Ok(()) => info!(port = self.port, "Backend process stopped"),
            Err(e) => warn!(port = self.port, error = %e, "Failed to stop backend process"),
        }
    }
}
