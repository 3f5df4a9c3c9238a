//! Capability Broker
//!
//! Exposes OS permission and window-capability primitives over fixed IPC
//! channels, normalizing every provider call into a structured reply.
//!
//! # Lifecycle
//!
//! ```text
//!   new() ──► initialize(ipc) ──► [handlers live] ──► cleanup(ipc)
//!                  │                                       │
//!                  └── installs every CHANNELS entry       └── removes the same names
//! ```
//!
//! A handler that was already cloned out of the table when `cleanup` ran
//! answers with a "not initialized" failure instead of touching the provider.
//!
//! No operation here returns a Rust error to the IPC caller: provider faults,
//! unknown capability types and missing windows all become payload fields.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::error::{CapabilityError, WindowCapabilityError};
use super::provider::{CapabilityProvider, NativeWindow, WindowFeature, WindowProvider};
use super::types::{
    AllPermissionsResponse, CapabilityType, FeatureSupport, PermissionResponse, PermissionStatus,
    ProtectionState, ProtectionStatus, ToggleResponse,
};
use crate::ipc::{handler, IpcError, IpcHandler, IpcRegistry, IpcRequest, WindowId};

// =============================================================================
// Channel names
// =============================================================================

/// `permissions:check`
pub const PERMISSIONS_CHECK: &str = "permissions:check";
/// `permissions:request`
pub const PERMISSIONS_REQUEST: &str = "permissions:request";
/// `permissions:get-all`
pub const PERMISSIONS_GET_ALL: &str = "permissions:get-all";
/// `permissions:request-screen-capture`
pub const PERMISSIONS_REQUEST_SCREEN_CAPTURE: &str = "permissions:request-screen-capture";
/// `screen-protection:check-support`
pub const SCREEN_PROTECTION_CHECK_SUPPORT: &str = "screen-protection:check-support";
/// `screen-protection:set`
pub const SCREEN_PROTECTION_SET: &str = "screen-protection:set";
/// `screen-protection:get-status`
pub const SCREEN_PROTECTION_GET_STATUS: &str = "screen-protection:get-status";
/// `overlay-mode:check-support`
pub const OVERLAY_CHECK_SUPPORT: &str = "overlay-mode:check-support";
/// `overlay-mode:set-always-on-top`
pub const OVERLAY_SET_ALWAYS_ON_TOP: &str = "overlay-mode:set-always-on-top";
/// `overlay-mode:set-opacity`
pub const OVERLAY_SET_OPACITY: &str = "overlay-mode:set-opacity";
/// `overlay-mode:get-opacity`
pub const OVERLAY_GET_OPACITY: &str = "overlay-mode:get-opacity";
/// `overlay-mode:set-background-color`
pub const OVERLAY_SET_BACKGROUND_COLOR: &str = "overlay-mode:set-background-color";
/// `enable-loopback-audio`
pub const ENABLE_LOOPBACK_AUDIO: &str = "enable-loopback-audio";
/// `disable-loopback-audio`
pub const DISABLE_LOOPBACK_AUDIO: &str = "disable-loopback-audio";

/// Every channel the broker owns, in installation order
pub const CHANNELS: [&str; 14] = [
    PERMISSIONS_CHECK,
    PERMISSIONS_REQUEST,
    PERMISSIONS_GET_ALL,
    PERMISSIONS_REQUEST_SCREEN_CAPTURE,
    SCREEN_PROTECTION_CHECK_SUPPORT,
    SCREEN_PROTECTION_SET,
    SCREEN_PROTECTION_GET_STATUS,
    OVERLAY_CHECK_SUPPORT,
    OVERLAY_SET_ALWAYS_ON_TOP,
    OVERLAY_SET_OPACITY,
    OVERLAY_GET_OPACITY,
    OVERLAY_SET_BACKGROUND_COLOR,
    ENABLE_LOOPBACK_AUDIO,
    DISABLE_LOOPBACK_AUDIO,
];

const OVERLAY_FEATURES: [WindowFeature; 3] = [
    WindowFeature::AlwaysOnTop,
    WindowFeature::Opacity,
    WindowFeature::BackgroundColor,
];

// =============================================================================
// Broker
// =============================================================================

/// Translates capability primitives into the IPC request/response contract
///
/// Cloning yields another handle to the same broker.
#[derive(Clone)]
pub struct CapabilityBroker {
    inner: Arc<BrokerInner>,
}

struct BrokerInner {
    provider: Arc<dyn CapabilityProvider>,
    windows: Arc<dyn WindowProvider>,
    initialized: AtomicBool,
    // Serializes initialize/cleanup against each other
    registration: Mutex<()>,
}

impl CapabilityBroker {
    /// Create a broker over the given collaborators
    #[must_use]
    pub fn new(provider: Arc<dyn CapabilityProvider>, windows: Arc<dyn WindowProvider>) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                provider,
                windows,
                initialized: AtomicBool::new(false),
                registration: Mutex::new(()),
            }),
        }
    }

    /// Whether the broker's handlers are currently installed
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::SeqCst)
    }

    /// Install a handler for every channel in [`CHANNELS`]
    ///
    /// Calling this while already initialized is a no-op. If any channel is
    /// already taken by someone else, the channels installed so far are
    /// removed again and the table is left as it was.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRegistered` naming the conflicting channel.
    pub fn initialize(&self, ipc: &IpcRegistry) -> Result<(), IpcError> {
        let _guard = self.inner.registration.lock();
        if self.is_initialized() {
            debug!("Capability broker already initialized");
            return Ok(());
        }

        info!("Initializing capability broker handlers");
        let mut installed: Vec<&'static str> = Vec::with_capacity(CHANNELS.len());
        for channel in CHANNELS {
            if let Err(e) = ipc.handle(channel, self.channel_handler(channel)) {
                for done in &installed {
                    ipc.remove_handler(*done);
                }
                warn!(channel = channel, error = %e, "Capability broker initialization rolled back");
                return Err(e);
            }
            installed.push(channel);
        }

        self.inner.initialized.store(true, Ordering::SeqCst);
        info!(channels = installed.len(), "Capability broker handlers initialized");
        Ok(())
    }

    /// Remove every channel installed by [`Self::initialize`]
    ///
    /// A no-op when the broker was never initialized.
    pub fn cleanup(&self, ipc: &IpcRegistry) {
        let _guard = self.inner.registration.lock();
        if !self.inner.initialized.swap(false, Ordering::SeqCst) {
            debug!("Capability broker not initialized, nothing to clean up");
            return;
        }

        for channel in CHANNELS {
            ipc.remove_handler(channel);
        }
        info!("Capability broker handlers cleaned up");
    }

    fn channel_handler(&self, channel: &'static str) -> IpcHandler {
        let broker = self.clone();
        handler(move |request: IpcRequest| {
            let broker = broker.clone();
            async move {
                if !broker.is_initialized() {
                    return not_initialized();
                }
                broker.dispatch(channel, request).await
            }
        })
    }

    async fn dispatch(&self, channel: &str, request: IpcRequest) -> Value {
        let sender = request.sender;
        match channel {
            PERMISSIONS_CHECK => to_value(self.check(request.arg_str(0).unwrap_or_default()).await),
            PERMISSIONS_REQUEST => {
                to_value(self.request(request.arg_str(0).unwrap_or_default()).await)
            }
            PERMISSIONS_GET_ALL => to_value(self.get_all().await),
            PERMISSIONS_REQUEST_SCREEN_CAPTURE => to_value(
                self.request_screen_capture(request.arg_bool(0).unwrap_or(false))
                    .await,
            ),
            SCREEN_PROTECTION_CHECK_SUPPORT => to_value(self.screen_protection_support(sender)),
            SCREEN_PROTECTION_SET => match request.arg_bool(0) {
                Some(enabled) => to_value(self.set_screen_protection(sender, enabled)),
                None => to_value(ToggleResponse::failed(missing_argument("enabled"))),
            },
            SCREEN_PROTECTION_GET_STATUS => to_value(self.screen_protection_status(sender)),
            OVERLAY_CHECK_SUPPORT => to_value(self.overlay_support(sender)),
            OVERLAY_SET_ALWAYS_ON_TOP => match request.arg_bool(0) {
                Some(on_top) => {
                    to_value(self.set_always_on_top(sender, on_top, request.arg_str(1)))
                }
                None => to_value(ToggleResponse::failed(missing_argument("enabled"))),
            },
            OVERLAY_SET_OPACITY => match request.arg_f64(0) {
                Some(opacity) => to_value(self.set_opacity(sender, opacity)),
                None => to_value(ToggleResponse::failed(missing_argument("opacity"))),
            },
            OVERLAY_GET_OPACITY => to_value(self.get_opacity(sender)),
            OVERLAY_SET_BACKGROUND_COLOR => match request.arg_str(0) {
                Some(color) => to_value(self.set_background_color(sender, color)),
                None => to_value(ToggleResponse::failed(missing_argument("color"))),
            },
            ENABLE_LOOPBACK_AUDIO => to_value(self.set_loopback_audio(true).await),
            DISABLE_LOOPBACK_AUDIO => to_value(self.set_loopback_audio(false).await),
            other => json!({ "success": false, "error": format!("unknown channel: {other}") }),
        }
    }

    // =========================================================================
    // Permissions
    // =========================================================================

    /// Current authorization status of `permission`
    pub async fn check(&self, permission: &str) -> PermissionResponse {
        debug!(permission = permission, "Checking permission");
        let kind = match permission.parse::<CapabilityType>() {
            Ok(kind) => kind,
            Err(e) => return PermissionResponse::failed(permission, e),
        };

        let outcome = self.status_of(kind).await;
        respond(permission, kind, outcome)
    }

    /// Invoke the type-specific request primitive for `permission`
    pub async fn request(&self, permission: &str) -> PermissionResponse {
        debug!(permission = permission, "Requesting permission");
        let kind = match permission.parse::<CapabilityType>() {
            Ok(kind) => kind,
            Err(e) => return PermissionResponse::failed(permission, e),
        };

        let provider = &self.inner.provider;
        let outcome = match kind {
            CapabilityType::Camera => normalize(provider.ask_for_camera()).await,
            CapabilityType::Microphone => normalize(provider.ask_for_microphone()).await,
            CapabilityType::Screen => self.request_screen_then_read(false).await,
            CapabilityType::Documents | CapabilityType::Downloads => match kind.folder() {
                Some(folder) => normalize(provider.ask_for_folder(folder)).await,
                None => Err(CapabilityError::UnsupportedType(permission.to_string())),
            },
        };

        respond(permission, kind, outcome)
    }

    /// Status of every recognized capability type
    ///
    /// A type whose query faults reports [`PermissionStatus::Error`]; the
    /// other types are unaffected.
    pub async fn get_all(&self) -> AllPermissionsResponse {
        let mut permissions = BTreeMap::new();
        for kind in CapabilityType::ALL {
            let status = match self.status_of(kind).await {
                Ok(status) => status,
                Err(e) => {
                    warn!(permission = %kind, error = %e, "Permission status query failed");
                    PermissionStatus::Error
                }
            };
            permissions.insert(kind, status);
        }

        AllPermissionsResponse {
            success: true,
            permissions: Some(permissions),
            error: None,
        }
    }

    /// Screen-capture request with control over opening system preferences
    ///
    /// Returns immediately when access is already authorized.
    pub async fn request_screen_capture(&self, open_preferences: bool) -> PermissionResponse {
        debug!(open_preferences, "Requesting screen capture permission");
        let kind = CapabilityType::Screen;

        let outcome = match self.status_of(kind).await {
            Ok(PermissionStatus::Authorized) => Ok(PermissionStatus::Authorized),
            Ok(_) => self.request_screen_then_read(open_preferences).await,
            Err(e) => Err(e),
        };

        respond(kind.as_str(), kind, outcome)
    }

    async fn status_of(&self, kind: CapabilityType) -> Result<PermissionStatus, CapabilityError> {
        normalize(self.inner.provider.auth_status(kind)).await
    }

    async fn request_screen_then_read(
        &self,
        open_preferences: bool,
    ) -> Result<PermissionStatus, CapabilityError> {
        self.inner
            .provider
            .request_screen_capture_async(open_preferences)
            .await?;
        self.status_of(CapabilityType::Screen).await
    }

    /// Enable or disable loopback audio capture
    pub async fn set_loopback_audio(&self, enabled: bool) -> ToggleResponse {
        match self.inner.provider.set_loopback_audio(enabled).await {
            Ok(()) => ToggleResponse::enabled(enabled),
            Err(e) => {
                warn!(enabled, error = %e, "Loopback audio toggle failed");
                ToggleResponse::failed(e)
            }
        }
    }

    // =========================================================================
    // Screen protection
    // =========================================================================

    /// Whether the sender's window supports content protection
    #[must_use]
    pub fn screen_protection_support(&self, sender: WindowId) -> FeatureSupport {
        let Some(window) = self.inner.windows.window_for(sender) else {
            return FeatureSupport::unsupported(WindowCapabilityError::NoWindow.to_string());
        };

        let supported = window.supports(WindowFeature::ContentProtection);
        FeatureSupport {
            supported,
            platform: Some(self.inner.provider.platform().to_string()),
            reason: Some(if supported {
                "Screen protection available".to_string()
            } else {
                "Method not available".to_string()
            }),
            ..FeatureSupport::default()
        }
    }

    /// Enable or disable content protection on the sender's window
    ///
    /// Enabling also hides the window from shared-window menus where the
    /// platform allows; failure of that step is only logged.
    #[must_use]
    pub fn set_screen_protection(&self, sender: WindowId, enabled: bool) -> ToggleResponse {
        let result = self.with_window(sender, WindowFeature::ContentProtection, |window| {
            window.set_content_protection(enabled)?;
            if enabled && window.supports(WindowFeature::HideFromWindowMenu) {
                if let Err(e) = window.set_hidden_from_window_menu(true) {
                    warn!(window = %sender, error = %e, "Additional screen protection step failed");
                }
            }
            Ok(())
        });

        toggle(result.map(|()| ToggleResponse::enabled(enabled)))
    }

    /// Whether content protection is active on the sender's window
    #[must_use]
    pub fn screen_protection_status(&self, sender: WindowId) -> ProtectionStatus {
        let result = self.with_window(sender, WindowFeature::ContentProtection, |window| {
            window.content_protection()
        });

        match result {
            Ok(Some(true)) => ProtectionStatus {
                status: ProtectionState::Active,
                reason: None,
                error: None,
            },
            Ok(Some(false)) => ProtectionStatus {
                status: ProtectionState::Inactive,
                reason: None,
                error: None,
            },
            Ok(None) | Err(WindowCapabilityError::Unsupported(_)) => ProtectionStatus {
                status: ProtectionState::Unknown,
                reason: Some("Cannot determine status".to_string()),
                error: None,
            },
            Err(e) => ProtectionStatus {
                status: ProtectionState::Unknown,
                reason: None,
                error: Some(e.to_string()),
            },
        }
    }

    // =========================================================================
    // Overlay mode
    // =========================================================================

    /// Which overlay features the sender's window supports
    #[must_use]
    pub fn overlay_support(&self, sender: WindowId) -> FeatureSupport {
        let Some(window) = self.inner.windows.window_for(sender) else {
            return FeatureSupport::unsupported(WindowCapabilityError::NoWindow.to_string());
        };

        let features: BTreeMap<String, bool> = OVERLAY_FEATURES
            .into_iter()
            .map(|feature| (feature.as_str().to_string(), window.supports(feature)))
            .collect();
        let supported = features.values().any(|&available| available);

        FeatureSupport {
            supported,
            platform: Some(self.inner.provider.platform().to_string()),
            reason: (!supported).then(|| "Overlay mode not available".to_string()),
            features: Some(features),
            error: None,
        }
    }

    /// Keep the sender's window above all others
    ///
    /// `level` is passed through to the window untouched; `None` leaves the
    /// platform default.
    #[must_use]
    pub fn set_always_on_top(
        &self,
        sender: WindowId,
        on_top: bool,
        level: Option<&str>,
    ) -> ToggleResponse {
        let result = self.with_window(sender, WindowFeature::AlwaysOnTop, |window| {
            window.set_always_on_top(on_top, level)
        });
        toggle(result.map(|()| ToggleResponse::enabled(on_top)))
    }

    /// Set the sender window's opacity, which must lie in `0.0..=1.0`
    #[must_use]
    pub fn set_opacity(&self, sender: WindowId, opacity: f64) -> ToggleResponse {
        if !(0.0..=1.0).contains(&opacity) {
            return ToggleResponse::failed(WindowCapabilityError::InvalidArgument(format!(
                "opacity must be between 0 and 1, got {opacity}"
            )));
        }

        let result = self.with_window(sender, WindowFeature::Opacity, |window| {
            window.set_opacity(opacity)
        });
        toggle(result.map(|()| ToggleResponse::value(opacity)))
    }

    /// Current opacity of the sender's window
    #[must_use]
    pub fn get_opacity(&self, sender: WindowId) -> ToggleResponse {
        let result = self.with_window(sender, WindowFeature::Opacity, |window| window.opacity());
        toggle(result.map(ToggleResponse::value))
    }

    /// Set the sender window's background colour
    #[must_use]
    pub fn set_background_color(&self, sender: WindowId, color: &str) -> ToggleResponse {
        let result = self.with_window(sender, WindowFeature::BackgroundColor, |window| {
            window.set_background_color(color)
        });
        toggle(result.map(|()| ToggleResponse::value(color)))
    }

    fn with_window<T>(
        &self,
        sender: WindowId,
        feature: WindowFeature,
        op: impl FnOnce(&dyn NativeWindow) -> Result<T, WindowCapabilityError>,
    ) -> Result<T, WindowCapabilityError> {
        let window = self
            .inner
            .windows
            .window_for(sender)
            .ok_or(WindowCapabilityError::NoWindow)?;
        if !window.supports(feature) {
            return Err(WindowCapabilityError::Unsupported(feature));
        }
        op(window.as_ref())
    }
}

impl std::fmt::Debug for CapabilityBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityBroker")
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Helpers
// =============================================================================

async fn normalize(
    call: impl Future<Output = Result<String, CapabilityError>>,
) -> Result<PermissionStatus, CapabilityError> {
    let raw = call.await?;
    PermissionStatus::from_provider(&raw)
}

fn respond(
    permission: &str,
    kind: CapabilityType,
    outcome: Result<PermissionStatus, CapabilityError>,
) -> PermissionResponse {
    match outcome {
        Ok(status) => {
            debug!(permission = %kind, status = %status, "Permission status");
            PermissionResponse::granted(kind, status)
        }
        Err(e) => {
            warn!(permission = %kind, error = %e, "Capability query failed");
            PermissionResponse::failed(permission, e)
        }
    }
}

fn toggle(result: Result<ToggleResponse, WindowCapabilityError>) -> ToggleResponse {
    result.unwrap_or_else(|e| {
        debug!(error = %e, "Window capability operation failed");
        ToggleResponse::failed(e)
    })
}

fn missing_argument(name: &str) -> WindowCapabilityError {
    WindowCapabilityError::InvalidArgument(format!("missing argument '{name}'"))
}

fn not_initialized() -> Value {
    json!({ "success": false, "error": CapabilityError::NotInitialized.to_string() })
}

fn to_value(response: impl Serialize) -> Value {
    serde_json::to_value(response)
        .unwrap_or_else(|e| json!({ "success": false, "error": e.to_string() }))
}
