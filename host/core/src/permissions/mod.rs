//! Capability Broker
//!
//! Uniform request/response access to OS permission and window-capability
//! primitives over fixed IPC channels.
//!
//! # Module Structure
//!
//! - `types`: capability vocabulary and the JSON reply payloads
//! - `provider`: collaborator traits for the OS permission and window APIs
//! - `broker`: [`CapabilityBroker`], channel registration and normalization
//! - `error`: capability and window error types

mod broker;
mod error;
mod provider;
mod types;

pub use broker::{
    CapabilityBroker, CHANNELS, DISABLE_LOOPBACK_AUDIO, ENABLE_LOOPBACK_AUDIO,
    OVERLAY_CHECK_SUPPORT, OVERLAY_GET_OPACITY, OVERLAY_SET_ALWAYS_ON_TOP,
    OVERLAY_SET_BACKGROUND_COLOR, OVERLAY_SET_OPACITY, PERMISSIONS_CHECK, PERMISSIONS_GET_ALL,
    PERMISSIONS_REQUEST, PERMISSIONS_REQUEST_SCREEN_CAPTURE, SCREEN_PROTECTION_CHECK_SUPPORT,
    SCREEN_PROTECTION_GET_STATUS, SCREEN_PROTECTION_SET,
};
pub use error::{CapabilityError, WindowCapabilityError};
pub use provider::{
    CapabilityProvider, NativeWindow, NoWindows, UnavailableCapabilities, WindowFeature,
    WindowProvider,
};
pub use types::{
    AllPermissionsResponse, CapabilityType, FeatureSupport, Folder, PermissionRecord,
    PermissionResponse, PermissionStatus, ProtectionState, ProtectionStatus, ToggleResponse,
};
