//! Collaborator traits for OS capability APIs
//!
//! The broker never talks to the OS directly. It goes through two seams:
//!
//! ```text
//!   CapabilityBroker
//!        │
//!        ├──► CapabilityProvider   permission status + request primitives
//!        │
//!        └──► WindowProvider ──► NativeWindow   content protection, overlay
//! ```
//!
//! Screen capture is deliberately two calls: `request_screen_capture_async`
//! returns as soon as the request is handed to the OS, and the outcome is
//! read separately through `auth_status(Screen)`.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::error::{CapabilityError, WindowCapabilityError};
use super::types::{CapabilityType, Folder};
use crate::ipc::WindowId;

/// OS permission API
///
/// Status strings are returned as the platform spells them and normalized
/// by the broker.
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    /// Current authorization status of `kind`
    async fn auth_status(&self, kind: CapabilityType) -> Result<String, CapabilityError>;

    /// Prompt for camera access, resolving to the resulting status
    async fn ask_for_camera(&self) -> Result<String, CapabilityError>;

    /// Prompt for microphone access, resolving to the resulting status
    async fn ask_for_microphone(&self) -> Result<String, CapabilityError>;

    /// Prompt for access to a user folder, resolving to the resulting status
    async fn ask_for_folder(&self, folder: Folder) -> Result<String, CapabilityError>;

    /// Hand a screen-capture request to the OS without waiting for the answer
    ///
    /// With `open_preferences` set, platforms that have already shown their
    /// one-time prompt open the system preferences pane instead.
    async fn request_screen_capture_async(
        &self,
        open_preferences: bool,
    ) -> Result<(), CapabilityError>;

    /// Route system audio output into capture streams
    async fn set_loopback_audio(&self, _enabled: bool) -> Result<(), CapabilityError> {
        Err(CapabilityError::Unavailable("loopback audio".to_string()))
    }

    /// Platform name reported in feature-support replies
    fn platform(&self) -> &str {
        std::env::consts::OS
    }
}

/// Provider for platforms without a permission API
///
/// Every query fails with [`CapabilityError::Unavailable`], which the broker
/// turns into structured failure replies.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableCapabilities;

impl UnavailableCapabilities {
    fn unavailable<T>() -> Result<T, CapabilityError> {
        Err(CapabilityError::Unavailable(format!(
            "no permission API on {}",
            std::env::consts::OS
        )))
    }
}

#[async_trait]
impl CapabilityProvider for UnavailableCapabilities {
    async fn auth_status(&self, _kind: CapabilityType) -> Result<String, CapabilityError> {
        Self::unavailable()
    }

    async fn ask_for_camera(&self) -> Result<String, CapabilityError> {
        Self::unavailable()
    }

    async fn ask_for_microphone(&self) -> Result<String, CapabilityError> {
        Self::unavailable()
    }

    async fn ask_for_folder(&self, _folder: Folder) -> Result<String, CapabilityError> {
        Self::unavailable()
    }

    async fn request_screen_capture_async(
        &self,
        _open_preferences: bool,
    ) -> Result<(), CapabilityError> {
        Self::unavailable()
    }
}

// =============================================================================
// Windows
// =============================================================================

/// Window capability that may or may not exist on the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowFeature {
    /// Excluding the window from screen captures
    ContentProtection,
    /// Hiding the window from shared-window menus
    HideFromWindowMenu,
    /// Keeping the window above all others
    AlwaysOnTop,
    /// Window-level opacity
    Opacity,
    /// Window background colour
    BackgroundColor,
}

impl WindowFeature {
    /// Key used in multi-feature support replies
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ContentProtection => "contentProtection",
            Self::HideFromWindowMenu => "hideFromWindowMenu",
            Self::AlwaysOnTop => "alwaysOnTop",
            Self::Opacity => "opacity",
            Self::BackgroundColor => "backgroundColor",
        }
    }
}

impl fmt::Display for WindowFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A native window as seen by the broker
///
/// Every operation defaults to [`WindowCapabilityError::Unsupported`], so a
/// window implementation only provides what its platform can do.
pub trait NativeWindow: Send + Sync {
    /// Whether the platform implements `feature` for this window
    fn supports(&self, feature: WindowFeature) -> bool;

    /// Enable or disable content protection
    fn set_content_protection(&self, _enabled: bool) -> Result<(), WindowCapabilityError> {
        Err(WindowCapabilityError::Unsupported(WindowFeature::ContentProtection))
    }

    /// Whether content protection is active; `None` if it cannot be determined
    fn content_protection(&self) -> Result<Option<bool>, WindowCapabilityError> {
        Err(WindowCapabilityError::Unsupported(WindowFeature::ContentProtection))
    }

    /// Hide the window from shared-window menus
    fn set_hidden_from_window_menu(&self, _hidden: bool) -> Result<(), WindowCapabilityError> {
        Err(WindowCapabilityError::Unsupported(WindowFeature::HideFromWindowMenu))
    }

    /// Keep the window above others, optionally at a named stacking level
    /// such as `floating` or `screen-saver`
    fn set_always_on_top(
        &self,
        _on_top: bool,
        _level: Option<&str>,
    ) -> Result<(), WindowCapabilityError> {
        Err(WindowCapabilityError::Unsupported(WindowFeature::AlwaysOnTop))
    }

    /// Set opacity in `0.0..=1.0`
    fn set_opacity(&self, _opacity: f64) -> Result<(), WindowCapabilityError> {
        Err(WindowCapabilityError::Unsupported(WindowFeature::Opacity))
    }

    /// Current opacity
    fn opacity(&self) -> Result<f64, WindowCapabilityError> {
        Err(WindowCapabilityError::Unsupported(WindowFeature::Opacity))
    }

    /// Set the background colour (CSS-style string, e.g. `#00000000`)
    fn set_background_color(&self, _color: &str) -> Result<(), WindowCapabilityError> {
        Err(WindowCapabilityError::Unsupported(WindowFeature::BackgroundColor))
    }
}

/// Resolves the window that sent an IPC request
pub trait WindowProvider: Send + Sync {
    /// The window behind `id`, if it still exists
    fn window_for(&self, id: WindowId) -> Option<Arc<dyn NativeWindow>>;
}

/// Window provider for hosts that own no windows
#[derive(Debug, Clone, Copy, Default)]
pub struct NoWindows;

impl WindowProvider for NoWindows {
    fn window_for(&self, _id: WindowId) -> Option<Arc<dyn NativeWindow>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bare;

    impl NativeWindow for Bare {
        fn supports(&self, _feature: WindowFeature) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_unavailable_provider_fails_every_query() {
        let provider = UnavailableCapabilities;
        for kind in CapabilityType::ALL {
            assert!(matches!(
                provider.auth_status(kind).await,
                Err(CapabilityError::Unavailable(_))
            ));
        }
        assert!(provider.ask_for_camera().await.is_err());
        assert!(provider.request_screen_capture_async(true).await.is_err());
        assert!(provider.set_loopback_audio(true).await.is_err());
    }

    #[test]
    fn test_window_defaults_are_unsupported() {
        let window = Bare;
        assert_eq!(
            window.set_opacity(0.5),
            Err(WindowCapabilityError::Unsupported(WindowFeature::Opacity))
        );
        let err = window.set_content_protection(true).unwrap_err();
        assert_eq!(err.to_string(), "contentProtection not available");
        assert!(NoWindows.window_for(WindowId(1)).is_none());
    }
}
