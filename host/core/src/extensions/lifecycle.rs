//! Running extension hooks
//!
//! Hooks run sequentially in load order. A failing hook is logged and the
//! remaining extensions still run.

use std::sync::Arc;

use tracing::{debug, warn};

use super::module::{Extension, HookContext};
use crate::ipc::IpcRegistry;

/// The loaded extensions, shared for the lifetime of the process
#[derive(Clone, Debug)]
pub struct ExtensionSet {
    extensions: Arc<[Extension]>,
}

impl ExtensionSet {
    /// Wrap the result of discovery
    #[must_use]
    pub fn new(extensions: Vec<Extension>) -> Self {
        Self {
            extensions: extensions.into(),
        }
    }

    /// Number of loaded extensions
    #[must_use]
    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    /// Whether no extension was loaded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// Extensions in load order
    pub fn iter(&self) -> impl Iterator<Item = &Extension> {
        self.extensions.iter()
    }

    /// Run every `before_ready` hook, returning the number that failed
    pub async fn before_ready(&self, ctx: &HookContext) -> usize {
        let mut failures = 0;
        for ext in self.iter() {
            if let Err(e) = ext.module().before_ready(ctx).await {
                warn!(source = %ext.source().display(), error = %format!("{e:#}"), "beforeReady hook failed");
                failures += 1;
            }
        }
        failures
    }

    /// Run every `after_ready` hook, returning the number that failed
    pub async fn after_ready(&self, ctx: &HookContext) -> usize {
        let mut failures = 0;
        for ext in self.iter() {
            if let Err(e) = ext.module().after_ready(ctx).await {
                warn!(source = %ext.source().display(), error = %format!("{e:#}"), "afterReady hook failed");
                failures += 1;
            }
        }
        failures
    }

    /// Run every `before_quit` hook, returning the number that failed
    pub async fn before_quit(&self) -> usize {
        let mut failures = 0;
        for ext in self.iter() {
            if let Err(e) = ext.module().before_quit().await {
                warn!(source = %ext.source().display(), error = %format!("{e:#}"), "beforeQuit hook failed");
                failures += 1;
            }
        }
        failures
    }

    /// Install every extension's IPC handlers
    ///
    /// A channel that is already taken is logged and skipped. Returns the
    /// channels that were installed, for [`Self::remove_ipc_handlers`].
    pub fn install_ipc_handlers(&self, ipc: &IpcRegistry) -> Vec<String> {
        let mut installed = Vec::new();
        for ext in self.iter() {
            for (channel, handler) in ext.module().ipc_handlers() {
                match ipc.handle(channel.clone(), handler) {
                    Ok(()) => {
                        debug!(source = %ext.source().display(), channel = %channel, "Extension IPC handler installed");
                        installed.push(channel);
                    }
                    Err(e) => {
                        warn!(source = %ext.source().display(), error = %e, "Skipping extension IPC handler");
                    }
                }
            }
        }
        installed
    }

    /// Remove handlers previously installed by [`Self::install_ipc_handlers`]
    pub fn remove_ipc_handlers(&self, ipc: &IpcRegistry, channels: &[String]) {
        for channel in channels {
            ipc.remove_handler(channel);
        }
    }

    /// Let every extension register routes on the internal API router
    #[must_use]
    pub fn apply_api_routes(&self, router: axum::Router) -> axum::Router {
        self.iter()
            .fold(router, |router, ext| ext.module().api_routes(router))
    }
}

impl Default for ExtensionSet {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl From<Vec<Extension>> for ExtensionSet {
    fn from(extensions: Vec<Extension>) -> Self {
        Self::new(extensions)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::extensions::{ExtensionModule, ModuleReference};
    use crate::ipc::{handler, IpcHandler, IpcRequest, WindowId};
    use crate::session::{BackendSettings, Session};

    struct Counting {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl ExtensionModule for Counting {
        async fn before_ready(&self, _ctx: &HookContext) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("boom");
            }
            Ok(())
        }

        fn ipc_handlers(&self) -> BTreeMap<String, IpcHandler> {
            let mut handlers = BTreeMap::new();
            handlers.insert(
                "ext:ping".to_string(),
                handler(|_req: IpcRequest| async { json!("pong") }),
            );
            handlers
        }
    }

    fn extension(name: &str, module: Counting) -> Extension {
        let path = PathBuf::from(format!("/app/{name}"));
        let reference = ModuleReference::from_path(&path);
        Extension::new(path, reference, Arc::new(module))
    }

    fn ctx() -> HookContext {
        HookContext::new(
            Arc::new(Session::new(4000, BackendSettings::new())),
            IpcRegistry::new(),
        )
    }

    #[tokio::test]
    async fn test_failing_hook_does_not_stop_others() {
        let calls = Arc::new(AtomicUsize::new(0));
        let set = ExtensionSet::new(vec![
            extension(
                "a.js",
                Counting {
                    calls: Arc::clone(&calls),
                    fail: true,
                },
            ),
            extension(
                "b.js",
                Counting {
                    calls: Arc::clone(&calls),
                    fail: false,
                },
            ),
        ]);

        let failures = set.before_ready(&ctx()).await;
        assert_eq!(failures, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // Hooks that were not overridden are no-ops
        assert_eq!(set.after_ready(&ctx()).await, 0);
        assert_eq!(set.before_quit().await, 0);
    }

    #[tokio::test]
    async fn test_conflicting_ipc_channels_are_skipped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let set = ExtensionSet::new(vec![
            extension(
                "a.js",
                Counting {
                    calls: Arc::clone(&calls),
                    fail: false,
                },
            ),
            extension(
                "b.js",
                Counting {
                    calls: Arc::clone(&calls),
                    fail: false,
                },
            ),
        ]);
        let ipc = IpcRegistry::new();

        let installed = set.install_ipc_handlers(&ipc);
        assert_eq!(installed, vec!["ext:ping".to_string()]);

        let reply = ipc
            .invoke("ext:ping", IpcRequest::new(WindowId(1), vec![]))
            .await
            .unwrap();
        assert_eq!(reply, json!("pong"));

        set.remove_ipc_handlers(&ipc, &installed);
        assert!(ipc.is_empty());
    }
}
