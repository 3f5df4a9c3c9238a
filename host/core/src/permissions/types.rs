//! Permission vocabulary and response payloads
//!
//! Response payloads serialize with camelCase keys and omit absent optional
//! fields, matching what the embedded content expects to receive.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::CapabilityError;

/// OS capability that can be queried or requested
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityType {
    /// Camera access
    Camera,
    /// Microphone access
    Microphone,
    /// Screen capture (screen recording)
    Screen,
    /// Documents folder
    Documents,
    /// Downloads folder
    Downloads,
}

impl CapabilityType {
    /// Every recognized capability type, in canonical order
    pub const ALL: [Self; 5] = [
        Self::Camera,
        Self::Microphone,
        Self::Screen,
        Self::Documents,
        Self::Downloads,
    ];

    /// Wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Camera => "camera",
            Self::Microphone => "microphone",
            Self::Screen => "screen",
            Self::Documents => "documents",
            Self::Downloads => "downloads",
        }
    }

    /// The folder behind a folder capability
    #[must_use]
    pub fn folder(self) -> Option<Folder> {
        match self {
            Self::Documents => Some(Folder::Documents),
            Self::Downloads => Some(Folder::Downloads),
            _ => None,
        }
    }
}

impl fmt::Display for CapabilityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CapabilityType {
    type Err = CapabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| CapabilityError::UnsupportedType(s.to_string()))
    }
}

/// User folder guarded by a folder-access permission
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Folder {
    /// ~/Documents
    Documents,
    /// ~/Downloads
    Downloads,
}

/// Authorization state of a capability
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    /// The user has not been asked yet
    NotDetermined,
    /// The user refused
    Denied,
    /// The user granted access
    Authorized,
    /// Access is blocked by policy
    Restricted,
    /// Partial access was granted
    Limited,
    /// The status could not be queried
    Error,
}

impl PermissionStatus {
    /// Normalize a status string reported by the capability provider
    ///
    /// # Errors
    ///
    /// Returns `UnrecognizedStatus` for spellings outside the vocabulary.
    pub fn from_provider(raw: &str) -> Result<Self, CapabilityError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "not determined" | "not_determined" | "not-determined" => Ok(Self::NotDetermined),
            "denied" => Ok(Self::Denied),
            "authorized" | "granted" => Ok(Self::Authorized),
            "restricted" => Ok(Self::Restricted),
            "limited" => Ok(Self::Limited),
            "error" => Ok(Self::Error),
            _ => Err(CapabilityError::UnrecognizedStatus(raw.to_string())),
        }
    }

    /// Wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotDetermined => "not_determined",
            Self::Denied => "denied",
            Self::Authorized => "authorized",
            Self::Restricted => "restricted",
            Self::Limited => "limited",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for PermissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A capability together with its live status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRecord {
    /// The capability
    #[serde(rename = "type")]
    pub kind: CapabilityType,
    /// Its status at query time
    pub status: PermissionStatus,
}

// =============================================================================
// Response payloads
// =============================================================================

/// Reply to `permissions:check`, `permissions:request` and
/// `permissions:request-screen-capture`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionResponse {
    /// Whether the query completed
    pub success: bool,
    /// The permission type as supplied by the caller
    pub permission: String,
    /// The status, on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PermissionStatus>,
    /// Failure description, on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PermissionResponse {
    /// Successful reply
    #[must_use]
    pub fn granted(kind: CapabilityType, status: PermissionStatus) -> Self {
        Self {
            success: true,
            permission: kind.to_string(),
            status: Some(status),
            error: None,
        }
    }

    /// Failed reply
    #[must_use]
    pub fn failed(permission: impl Into<String>, error: impl fmt::Display) -> Self {
        Self {
            success: false,
            permission: permission.into(),
            status: None,
            error: Some(error.to_string()),
        }
    }
}

/// Reply to `permissions:get-all`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllPermissionsResponse {
    /// Whether the query completed
    pub success: bool,
    /// Status per capability type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<BTreeMap<CapabilityType, PermissionStatus>>,
    /// Failure description, on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Reply to the `*:check-support` channels
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSupport {
    /// Whether the feature is available
    pub supported: bool,
    /// Host platform
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    /// Why the feature is (un)available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Per-feature availability, for multi-feature checks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<BTreeMap<String, bool>>,
    /// Failure description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FeatureSupport {
    /// Unsupported, with a reason
    #[must_use]
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self {
            supported: false,
            reason: Some(reason.into()),
            ..Self::default()
        }
    }
}

/// Reply to setter channels and simple getters
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleResponse {
    /// Whether the operation completed
    pub success: bool,
    /// The flag that was applied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// The value that was applied or read
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Failure description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToggleResponse {
    /// Successful flag change
    #[must_use]
    pub fn enabled(enabled: bool) -> Self {
        Self {
            success: true,
            enabled: Some(enabled),
            ..Self::default()
        }
    }

    /// Successful value change or read
    #[must_use]
    pub fn value(value: impl Into<Value>) -> Self {
        Self {
            success: true,
            value: Some(value.into()),
            ..Self::default()
        }
    }

    /// Failed operation
    #[must_use]
    pub fn failed(error: impl fmt::Display) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            ..Self::default()
        }
    }
}

/// Content protection state of a window
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtectionState {
    /// The window is excluded from captures
    Active,
    /// The window can be captured
    Inactive,
    /// The state cannot be determined
    Unknown,
}

/// Reply to `screen-protection:get-status`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectionStatus {
    /// Current state
    pub status: ProtectionState,
    /// Why the state is unknown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Failure description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
