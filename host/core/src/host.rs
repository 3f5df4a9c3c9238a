//! Host lifecycle
//!
//! [`NativeHost`] wires the four parts together in a fixed order:
//!
//! ```text
//! boot
//!   1. load_extensions(app_root)
//!   2. before_ready hooks
//!   3. Orchestrator::start ───────── failure ──► HostError::LaunchFailure (boot aborted)
//!   4. API server, scheduler ─────── failure ──► logged, boot continues degraded
//!   5. extension IPC handlers, capability broker
//!   6. after_ready hooks
//!
//! shutdown
//!   before_quit hooks ─► broker cleanup ─► extension handlers removed
//!   ─► subsystems stopped ─► backend killed ─► event router drained
//! ```

use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bridge::{BridgeMessage, EmbeddedContent, EventRouter, HeadlessContent, LogSink, TracingLogSink};
use crate::config::HostConfig;
use crate::error::{HostError, HostResult};
use crate::extensions::{load_extensions, ExtensionSet, HookContext, ModuleLoader};
use crate::ipc::IpcRegistry;
use crate::orchestrator::{
    BackendHandle, BackendLauncher, CookieJar, CookieStore, Orchestrator, ProcessLauncher,
    SubsystemError, SubsystemHandle,
};
use crate::permissions::{
    CapabilityBroker, CapabilityProvider, NoWindows, UnavailableCapabilities, WindowProvider,
};
use crate::session::Session;

/// Capacity of the transport channel between the API server and the router
const BRIDGE_CAPACITY: usize = 256;

/// How long shutdown waits for the router to drain
const ROUTER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Services
// =============================================================================

/// Collaborators the host is built from
#[derive(Clone)]
pub struct HostServices {
    /// Resolves extension module references
    pub loader: Arc<dyn ModuleLoader>,
    /// Starts the backend process
    pub launcher: Arc<dyn BackendLauncher>,
    /// The embedded content's cookie store
    pub cookies: Arc<dyn CookieStore>,
    /// OS permission primitives
    pub capabilities: Arc<dyn CapabilityProvider>,
    /// Native windows
    pub windows: Arc<dyn WindowProvider>,
    /// The embedded content's event buses
    pub content: Arc<dyn EmbeddedContent>,
    /// Destination for forwarded backend log lines
    pub log_sink: Arc<dyn LogSink>,
}

impl HostServices {
    /// Services for a host without windows or embedded content
    ///
    /// Spawns the backend as a child process, keeps cookies in memory and
    /// reports every OS capability as unavailable.
    #[must_use]
    pub fn headless(loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            loader,
            launcher: Arc::new(ProcessLauncher::new()),
            cookies: Arc::new(CookieJar::new()),
            capabilities: Arc::new(UnavailableCapabilities),
            windows: Arc::new(NoWindows),
            content: Arc::new(HeadlessContent),
            log_sink: Arc::new(TracingLogSink),
        }
    }

    /// Replace the backend launcher
    #[must_use]
    pub fn with_launcher(mut self, launcher: Arc<dyn BackendLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    /// Replace the cookie store
    #[must_use]
    pub fn with_cookies(mut self, cookies: Arc<dyn CookieStore>) -> Self {
        self.cookies = cookies;
        self
    }

    /// Replace the capability provider
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Arc<dyn CapabilityProvider>) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Replace the window provider
    #[must_use]
    pub fn with_windows(mut self, windows: Arc<dyn WindowProvider>) -> Self {
        self.windows = windows;
        self
    }

    /// Replace the embedded content
    #[must_use]
    pub fn with_content(mut self, content: Arc<dyn EmbeddedContent>) -> Self {
        self.content = content;
        self
    }

    /// Replace the log sink
    #[must_use]
    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = sink;
        self
    }
}

impl std::fmt::Debug for HostServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostServices").finish_non_exhaustive()
    }
}

// =============================================================================
// Report
// =============================================================================

/// What a boot produced
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HostReport {
    /// Number of loaded extensions
    pub extensions: usize,
    /// Port the backend reported
    pub backend_port: u16,
    /// Whether the internal API server is running
    pub api: bool,
    /// Whether the scheduler is running
    pub scheduler: bool,
    /// Whether the capability broker's handlers are installed
    pub broker: bool,
    /// IPC channels contributed by extensions
    pub extension_channels: usize,
    /// Lifecycle hooks that failed during boot
    pub hook_failures: usize,
}

// =============================================================================
// Host
// =============================================================================

/// A booted native host
pub struct NativeHost {
    config: HostConfig,
    session: Arc<Session>,
    ipc: IpcRegistry,
    extensions: ExtensionSet,
    orchestrator: Orchestrator,
    backend: Option<BackendHandle>,
    subsystems: Vec<SubsystemHandle>,
    broker: CapabilityBroker,
    router: Arc<EventRouter>,
    router_task: JoinHandle<()>,
    bridge: mpsc::Sender<BridgeMessage>,
    extension_channels: Vec<String>,
    report: HostReport,
}

impl NativeHost {
    /// Boot the host
    ///
    /// # Errors
    ///
    /// Returns `LaunchFailure` when the backend cannot be started or exits
    /// before reporting its port. Every other failure is logged and boot
    /// continues.
    pub async fn boot(config: HostConfig, services: HostServices) -> HostResult<Self> {
        info!(
            app_root = %config.app_root.display(),
            source = %config.source(),
            "Booting native host"
        );

        let extensions = ExtensionSet::new(
            load_extensions(&config.app_root, services.loader.as_ref()).await,
        );

        let session = Arc::new(Session::new(
            config.api_port,
            config.backend.settings.clone(),
        ));
        let ipc = IpcRegistry::new();
        let hooks = HookContext::new(Arc::clone(&session), ipc.clone());

        let mut report = HostReport {
            extensions: extensions.len(),
            ..HostReport::default()
        };
        report.hook_failures += extensions.before_ready(&hooks).await;

        let router = Arc::new(EventRouter::new(services.content, services.log_sink));
        let (bridge, receiver) = mpsc::channel(BRIDGE_CAPACITY);
        let router_task = tokio::spawn(Arc::clone(&router).run(receiver));

        let orchestrator = Orchestrator::new(
            config.backend.clone(),
            config.backend_working_dir(),
            services.launcher,
            services.cookies,
        )
        .with_extensions(extensions.clone());

        let backend = match orchestrator.start(Arc::clone(&session)).await {
            Ok(backend) => backend,
            Err(e) => {
                let err = HostError::LaunchFailure(e);
                error!(error = %err, "Native host boot aborted");
                return Err(err);
            }
        };
        report.backend_port = backend.port();

        let mut subsystems = Vec::new();
        if let Some(handle) = started("api", orchestrator.start_api(bridge.clone()).await) {
            report.api = true;
            subsystems.push(handle);
        }
        if config.scheduler.enabled {
            if let Some(handle) =
                started("scheduler", orchestrator.run_scheduler(&config.scheduler).await)
            {
                report.scheduler = true;
                subsystems.push(handle);
            }
        } else {
            debug!("Scheduler disabled");
        }

        let extension_channels = extensions.install_ipc_handlers(&ipc);
        report.extension_channels = extension_channels.len();

        let broker = CapabilityBroker::new(services.capabilities, services.windows);
        match broker.initialize(&ipc) {
            Ok(()) => report.broker = true,
            Err(e) => warn!(error = %e, "Capability broker unavailable"),
        }

        report.hook_failures += extensions.after_ready(&hooks).await;

        info!(
            backend_port = report.backend_port,
            api = report.api,
            scheduler = report.scheduler,
            extensions = report.extensions,
            "Native host ready"
        );

        Ok(Self {
            config,
            session,
            ipc,
            extensions,
            orchestrator,
            backend: Some(backend),
            subsystems,
            broker,
            router,
            router_task,
            bridge,
            extension_channels,
            report,
        })
    }

    /// The configuration the host booted with
    #[must_use]
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// The launch session
    #[must_use]
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// The IPC handler table
    #[must_use]
    pub fn ipc(&self) -> &IpcRegistry {
        &self.ipc
    }

    /// The loaded extensions
    #[must_use]
    pub fn extensions(&self) -> &ExtensionSet {
        &self.extensions
    }

    /// The orchestrator, for starting further subsystems
    #[must_use]
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// The capability broker
    #[must_use]
    pub fn broker(&self) -> &CapabilityBroker {
        &self.broker
    }

    /// The event router, for registering native listeners
    #[must_use]
    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    /// A sender onto the native transport
    #[must_use]
    pub fn bridge(&self) -> mpsc::Sender<BridgeMessage> {
        self.bridge.clone()
    }

    /// What boot produced
    #[must_use]
    pub fn report(&self) -> &HostReport {
        &self.report
    }

    /// Resolve when the backend process exits
    ///
    /// Never resolves when the launcher did not hand over a child process.
    pub async fn backend_exited(&mut self) -> Option<ExitStatus> {
        match self.backend.as_mut() {
            Some(backend) if backend.has_process() => match backend.wait().await {
                Ok(status) => status,
                Err(e) => {
                    warn!(error = %e, "Failed to wait on backend process");
                    None
                }
            },
            _ => std::future::pending().await,
        }
    }

    /// Tear everything down in reverse order of boot
    pub async fn shutdown(mut self) {
        info!("Shutting down native host");

        self.extensions.before_quit().await;
        self.broker.cleanup(&self.ipc);
        self.extensions
            .remove_ipc_handlers(&self.ipc, &self.extension_channels);

        while let Some(handle) = self.subsystems.pop() {
            handle.stop().await;
        }

        if let Some(backend) = self.backend.take() {
            backend.shutdown().await;
        }

        drop(self.bridge);
        let abort = self.router_task.abort_handle();
        if tokio::time::timeout(ROUTER_DRAIN_TIMEOUT, self.router_task)
            .await
            .is_err()
        {
            warn!("Event router did not drain in time, aborting");
            abort.abort();
        }

        info!("Native host stopped");
    }
}

impl std::fmt::Debug for NativeHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeHost")
            .field("app_root", &self.config.app_root)
            .field("report", &self.report)
            .finish_non_exhaustive()
    }
}

/// Keep a started subsystem, logging a failed one
fn started(
    name: &'static str,
    result: Result<SubsystemHandle, SubsystemError>,
) -> Option<SubsystemHandle> {
    match result {
        Ok(handle) => Some(handle),
        Err(source) => {
            let err = HostError::SubsystemStartFailure { name, source };
            warn!(error = %err, "Continuing in degraded mode");
            None
        }
    }
}
