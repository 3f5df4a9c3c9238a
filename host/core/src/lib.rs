//! Native Host Core - process orchestration for a native desktop shell
//!
//! This crate hosts a backend web application as a native desktop program. It
//! launches the backend process, brokers OS capabilities to the embedded
//! content over IPC, lets user extensions hook into the lifecycle, and routes
//! backend events into the embedded content's component framework.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                            NativeHost                                 │
//! │                                                                      │
//! │  ┌────────────────┐   hooks, IPC handlers, API routes                │
//! │  │   Extension    │──────────────────────────────┐                   │
//! │  │    Loader      │                              │                   │
//! │  └────────────────┘                              ▼                   │
//! │                                        ┌──────────────────┐          │
//! │  ┌────────────────┐   port handshake   │   IpcRegistry    │◄── IPC ──┼── embedded
//! │  │    Process     │──────────┐         └──────────────────┘          │   content
//! │  │  Orchestrator  │          │                   ▲                   │
//! │  └───────┬────────┘          ▼                   │                   │
//! │          │            ┌────────────┐   ┌──────────────────┐          │
//! │          │            │  Session   │   │   Capability     │── OS ────┼── permissions,
//! │          │            │ secret/port│   │     Broker       │          │   windows
//! │          │            └────────────┘   └──────────────────┘          │
//! │          ▼                                                           │
//! │  ┌────────────────┐  /api/broadcast   ┌──────────────────┐           │
//! │  │  API server    │─────────────────► │   Event Router   │───────────┼──► component
//! │  │  Scheduler     │  /api/log         └──────────────────┘           │    framework
//! │  └────────────────┘                                                  │
//! └──────────────────────────────────────────────────────────────────────┘
//!             ▲
//!             │ HTTP (X-NativePHP-Secret)
//!       backend process
//! ```
//!
//! # Module Overview
//!
//! - [`extensions`]: extension discovery and lifecycle hooks
//! - [`orchestrator`]: backend launch, port handshake, dependent subsystems
//! - [`permissions`]: the capability broker and its OS collaborators
//! - [`bridge`]: event routing into the embedded content
//! - [`session`]: per-launch secret, ports and backend settings
//! - [`ipc`]: the IPC handler table
//! - [`config`]: TOML/env configuration
//! - [`host`]: boot and shutdown ordering
//!
//! # No Rendering Dependencies
//!
//! Windows, the embedded content and OS permission prompts are reached only
//! through traits, so the whole crate runs headless.

#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bridge;
pub mod config;
pub mod error;
pub mod extensions;
pub mod host;
pub mod ipc;
pub mod orchestrator;
pub mod permissions;
pub mod session;

// Re-exports for convenience
pub use error::{HostError, HostResult};
pub use host::{HostReport, HostServices, NativeHost};
pub use ipc::{handler, IpcError, IpcHandler, IpcRegistry, IpcRequest, WindowId};
pub use session::{BackendPort, BackendSettings, Session, SessionError, SessionSecret};

// Extension exports
pub use extensions::{
    load_extensions, Extension, ExtensionError, ExtensionModule, ExtensionSet, HookContext,
    ModuleLoader, ModuleReference, RegistryLoader,
};

// Orchestrator exports
pub use orchestrator::{
    ApiServer, BackendHandle, BackendLauncher, CookieJar, CookieStore, LaunchRequest,
    Orchestrator, OrchestratorError, ProcessLauncher, Scheduler, Subsystem, SubsystemContext,
    SubsystemError, SubsystemHandle,
};

// Capability broker exports
pub use permissions::{
    CapabilityBroker, CapabilityError, CapabilityProvider, CapabilityType, NativeWindow,
    PermissionStatus, WindowProvider,
};

// Event bridge exports
pub use bridge::{
    BridgeMessage, EmbeddedContent, EventRouter, HeadlessContent, LogEnvelope, NativeEvent,
};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, BackendConfig, ConfigError,
    ConfigOverrides, ConfigSource, HostConfig, SchedulerConfig,
};
