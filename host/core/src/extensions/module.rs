//! Extension module contract
//!
//! An extension is a bundle of optional hooks. Every method of
//! [`ExtensionModule`] defaults to a no-op, so a module only overrides the
//! hooks it actually provides.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use super::loader::ModuleReference;
use crate::ipc::{IpcHandler, IpcRegistry, WindowId};
use crate::session::Session;

/// What lifecycle hooks get to see of the host
#[derive(Clone, Debug)]
pub struct HookContext {
    /// The launch session (secret, ports, backend settings)
    pub session: Arc<Session>,
    /// The IPC handler table
    pub ipc: IpcRegistry,
    /// The main window, once one exists
    pub main_window: Option<WindowId>,
}

impl HookContext {
    /// Create a context with no main window
    #[must_use]
    pub fn new(session: Arc<Session>, ipc: IpcRegistry) -> Self {
        Self {
            session,
            ipc,
            main_window: None,
        }
    }

    /// Attach the main window
    #[must_use]
    pub fn with_main_window(mut self, window: WindowId) -> Self {
        self.main_window = Some(window);
        self
    }
}

/// Hooks an extension module may provide
#[async_trait]
pub trait ExtensionModule: Send + Sync {
    /// Runs before the application reports ready
    async fn before_ready(&self, _ctx: &HookContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs once the application is ready and the backend is serving
    async fn after_ready(&self, _ctx: &HookContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs when the application is about to quit
    async fn before_quit(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// IPC handlers keyed by channel name
    fn ipc_handlers(&self) -> BTreeMap<String, IpcHandler> {
        BTreeMap::new()
    }

    /// Register routes on the internal API server
    fn api_routes(&self, router: axum::Router) -> axum::Router {
        router
    }
}

/// A loaded extension, identified by its source path
#[derive(Clone)]
pub struct Extension {
    source: PathBuf,
    reference: ModuleReference,
    module: Arc<dyn ExtensionModule>,
}

impl Extension {
    /// Wrap a loaded module
    #[must_use]
    pub fn new(source: PathBuf, reference: ModuleReference, module: Arc<dyn ExtensionModule>) -> Self {
        Self {
            source,
            reference,
            module,
        }
    }

    /// Path the module was loaded from
    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Module reference the loader resolved
    #[must_use]
    pub fn reference(&self) -> &ModuleReference {
        &self.reference
    }

    /// The module's hooks
    #[must_use]
    pub fn module(&self) -> &Arc<dyn ExtensionModule> {
        &self.module
    }
}

impl fmt::Debug for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extension")
            .field("source", &self.source)
            .field("reference", &self.reference)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Extension {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}
