//! Extension discovery and loading
//!
//! Discovery is strictly sequential: the single-file convention first, then
//! the directory convention in directory-listing order. A later extension can
//! therefore rely on an earlier one having finished its module-level setup.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use super::error::{ExtensionError, ExtensionResult};
use super::module::{Extension, ExtensionModule};
use crate::error::HostError;

/// Single extension file, relative to the application root
pub const SINGLE_EXTENSION_FILE: &str = "resources/js/nativephp-extension.js";

/// Extension directory, relative to the application root
pub const EXTENSIONS_DIR: &str = "resources/js/nativephp-extensions";

/// File suffixes recognized as extension modules
pub const SCRIPT_EXTENSIONS: &[&str] = &[".js", ".mjs"];

// =============================================================================
// Module references
// =============================================================================

/// Path convention used when turning a path into a module reference
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathStyle {
    /// Drive-letter paths with backslash separators
    Windows,
    /// Slash-separated paths
    Posix,
}

impl PathStyle {
    /// Convention of the compile target
    #[must_use]
    pub fn native() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else {
            Self::Posix
        }
    }
}

/// File URL identifying a module to the loader
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ModuleReference(String);

impl ModuleReference {
    /// Build a reference using the compile target's path convention
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        Self::with_style(&path.to_string_lossy(), PathStyle::native())
    }

    /// Build a reference using an explicit path convention
    ///
    /// Windows paths have their backslashes converted to forward slashes;
    /// other paths are used unmodified.
    #[must_use]
    pub fn with_style(path: &str, style: PathStyle) -> Self {
        match style {
            PathStyle::Windows => Self(format!("file:///{}", path.replace('\\', "/"))),
            PathStyle::Posix => Self(format!("file://{path}")),
        }
    }

    /// The URL string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Final path segment of the URL
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.0.rsplit('/').next().filter(|name| !name.is_empty())
    }
}

impl fmt::Display for ModuleReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Loaders
// =============================================================================

/// Resolves a module reference into an extension module
///
/// `Ok(None)` means the module loaded but exports nothing usable as an
/// extension; that is not an error.
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    /// Load the module behind `reference`
    async fn load(
        &self,
        reference: &ModuleReference,
    ) -> ExtensionResult<Option<Arc<dyn ExtensionModule>>>;
}

/// Factory producing a module's default export
pub type ModuleFactory =
    Arc<dyn Fn() -> ExtensionResult<Option<Arc<dyn ExtensionModule>>> + Send + Sync>;

/// Loader backed by an explicit registry of module factories
///
/// Factories are keyed by module file name (`analytics.js`), so the same
/// registry works regardless of where the application root lives.
#[derive(Clone, Default)]
pub struct RegistryLoader {
    factories: Arc<RwLock<HashMap<String, ModuleFactory>>>,
}

impl RegistryLoader {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for a module file name
    pub fn register<F>(&self, file_name: impl Into<String>, factory: F)
    where
        F: Fn() -> ExtensionResult<Option<Arc<dyn ExtensionModule>>> + Send + Sync + 'static,
    {
        self.factories
            .write()
            .insert(file_name.into(), Arc::new(factory));
    }

    /// Register a ready-made module as a file's default export
    pub fn register_module(&self, file_name: impl Into<String>, module: Arc<dyn ExtensionModule>) {
        self.register(file_name, move || Ok(Some(Arc::clone(&module))));
    }

    /// Registered file names, sorted
    #[must_use]
    pub fn file_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl ModuleLoader for RegistryLoader {
    async fn load(
        &self,
        reference: &ModuleReference,
    ) -> ExtensionResult<Option<Arc<dyn ExtensionModule>>> {
        let factory = reference
            .file_name()
            .and_then(|name| self.factories.read().get(name).cloned())
            .ok_or_else(|| ExtensionError::Unresolved(reference.to_string()))?;

        factory()
    }
}

impl fmt::Debug for RegistryLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryLoader")
            .field("file_names", &self.file_names())
            .finish()
    }
}

// =============================================================================
// Discovery
// =============================================================================

/// Discover and load every extension under `base_path`
///
/// Never fails: per-module failures are logged and skipped. Each discovered
/// file is loaded exactly once per call; nothing is cached across calls.
pub async fn load_extensions(base_path: &Path, loader: &dyn ModuleLoader) -> Vec<Extension> {
    let mut discovery = Discovery::new(loader);

    let single = base_path.join(SINGLE_EXTENSION_FILE);
    if is_file(&single).await {
        discovery.load(single).await;
    }

    let dir = base_path.join(EXTENSIONS_DIR);
    if is_dir(&dir).await {
        match list_scripts(&dir).await {
            Ok(paths) => {
                for path in paths {
                    discovery.load(path).await;
                }
            }
            Err(e) => {
                error!(path = %dir.display(), error = %e, "Failed to read extensions directory");
            }
        }
    }

    let extensions = discovery.finish();
    info!(count = extensions.len(), "Extension discovery complete");
    extensions
}

struct Discovery<'a> {
    loader: &'a dyn ModuleLoader,
    loaded: Vec<Extension>,
}

impl<'a> Discovery<'a> {
    fn new(loader: &'a dyn ModuleLoader) -> Self {
        Self {
            loader,
            loaded: Vec::new(),
        }
    }

    async fn load(&mut self, path: PathBuf) {
        let reference = ModuleReference::from_path(&path);

        match self.loader.load(&reference).await {
            Ok(Some(module)) => {
                info!(path = %path.display(), "Loaded extension");
                self.loaded.push(Extension::new(path, reference, module));
            }
            Ok(None) => {
                debug!(path = %path.display(), "Module has no default export");
            }
            Err(e) => {
                let err = HostError::from(e);
                warn!(path = %path.display(), error = %err, "Skipping extension");
            }
        }
    }

    fn finish(self) -> Vec<Extension> {
        self.loaded
    }
}

fn is_script(file_name: &str) -> bool {
    SCRIPT_EXTENSIONS
        .iter()
        .any(|suffix| file_name.ends_with(suffix))
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

/// Script entries of `dir`, in directory-listing order
async fn list_scripts(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut scripts = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        if is_script(&entry.file_name().to_string_lossy()) {
            scripts.push(entry.path());
        }
    }

    Ok(scripts)
}
