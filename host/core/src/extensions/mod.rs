//! Extension system
//!
//! User-supplied extension modules hook into the host's lifecycle, contribute
//! IPC handlers and register routes on the internal API server.
//!
//! # Architecture
//!
//! ```text
//! load_extensions(base_path, loader)
//! ├── resources/js/nativephp-extension.js        (single-file convention)
//! └── resources/js/nativephp-extensions/*.{js,mjs} (directory convention)
//!         │
//!         ▼
//!   ModuleLoader::load(ModuleReference) ──► Option<Arc<dyn ExtensionModule>>
//!         │
//!         ▼
//!   ExtensionSet (Arc<[Extension]>, load order)
//!   ├── before_ready / after_ready / before_quit
//!   ├── install_ipc_handlers(IpcRegistry)
//!   └── apply_api_routes(axum::Router)
//! ```
//!
//! Discovery never fails as a whole: every per-module failure is logged and
//! skipped so one broken extension cannot block startup.

mod error;
mod lifecycle;
mod loader;
mod module;

pub use error::{ExtensionError, ExtensionResult};
pub use lifecycle::ExtensionSet;
pub use loader::{
    load_extensions, ModuleFactory, ModuleLoader, ModuleReference, PathStyle, RegistryLoader,
    EXTENSIONS_DIR, SCRIPT_EXTENSIONS, SINGLE_EXTENSION_FILE,
};
pub use module::{Extension, ExtensionModule, HookContext};
