//! Legacy listener string decomposition
//!
//! Components of the legacy front-end framework declare interest in native
//! events with a single delimited string. Two signatures are recognized:
//!
//! ```text
//!   native-<type>:<channel>,<event>        full form
//!   native:<event>                         shorthand, implies private / nativephp
//!   native:<type>,<channel>,<event>        shorthand prefix with explicit fields
//! ```
//!
//! Fields are separated by `:` or `,`. In the three-field forms the event
//! name is the last `.`-separated segment, so `event.fired` names `fired`.
//! The one-field shorthand keeps its event whole.
//! Any other shape is not a native listener and never matches.

use std::fmt;

use super::envelope::normalize_event_name;

/// Namespace token every legacy native listener starts with
pub const LEGACY_NAMESPACE: &str = "native";

/// Channel type implied by the shorthand signature
pub const SHORTHAND_CHANNEL_TYPE: &str = "private";

/// Channel implied by the shorthand signature
pub const SHORTHAND_CHANNEL: &str = "nativephp";

/// Prefix spelling a listener string starts with
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signature {
    /// `native:`
    Shorthand,
    /// `native-`
    Full,
}

impl Signature {
    /// The literal prefix
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Shorthand => "native:",
            Self::Full => "native-",
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured form of a legacy listener string
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelExpression {
    /// The prefix spelling
    pub signature: Signature,
    /// Channel type, e.g. `private`
    pub channel_type: String,
    /// Channel name
    pub channel: String,
    /// Event name compared against incoming events
    pub event_name: String,
}

impl ChannelExpression {
    /// Decompose a listener string
    ///
    /// Returns `None` for strings outside the namespace or of unknown shape.
    #[must_use]
    pub fn parse(listener: &str) -> Option<Self> {
        let (signature, body) =
            if let Some(body) = listener.strip_prefix(Signature::Shorthand.as_str()) {
                (Signature::Shorthand, body)
            } else if let Some(body) = listener.strip_prefix(Signature::Full.as_str()) {
                (Signature::Full, body)
            } else {
                return None;
            };

        let fields: Vec<&str> = body.split(|c: char| c == ':' || c == ',').collect();
        if fields.iter().any(|field| field.is_empty()) {
            return None;
        }

        // The shorthand event is compared whole; explicit fields keep only the last segment
        let (channel_type, channel, event_name) = match (signature, fields.as_slice()) {
            (Signature::Shorthand, [event]) => (SHORTHAND_CHANNEL_TYPE, SHORTHAND_CHANNEL, *event),
            (_, [channel_type, channel, event]) => {
                let name = event.rsplit('.').next().filter(|name| !name.is_empty())?;
                (*channel_type, *channel, name)
            }
            _ => return None,
        };

        Some(Self {
            signature,
            channel_type: channel_type.to_string(),
            channel: channel.to_string(),
            event_name: normalize_event_name(event_name).to_string(),
        })
    }

    /// Whether this listener should receive `event` (already normalized)
    #[must_use]
    pub fn matches(&self, event: &str) -> bool {
        self.event_name == event
    }
}
