//! Messages carried on the native transport

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Channel carrying [`NativeEvent`] envelopes
pub const NATIVE_EVENT_CHANNEL: &str = "native-event";

/// Channel carrying [`LogEnvelope`] messages
pub const LOG_CHANNEL: &str = "log";

/// Strip every leading escape marker (backslash) from an event name
///
/// Backend event names are fully qualified class names and may arrive with
/// one or more leading backslashes depending on how they were serialized.
#[must_use]
pub fn normalize_event_name(name: &str) -> &str {
    name.trim_start_matches('\\')
}

/// An event emitted by the backend
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NativeEvent {
    /// Event name, possibly carrying leading escape markers
    pub event: String,
    /// Event payload, passed through untouched
    #[serde(default)]
    pub payload: Value,
}

impl NativeEvent {
    /// Create an event
    #[must_use]
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }

    /// The event name without leading escape markers
    #[must_use]
    pub fn name(&self) -> &str {
        normalize_event_name(&self.event)
    }
}

/// Severity of a forwarded log line
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    /// `error`
    Error,
    /// `warn`
    Warn,
    /// Anything else
    Info,
}

impl LogLevel {
    /// Route a level string by exact match; anything but `error`/`warn` is info
    #[must_use]
    pub fn from_level(level: &str) -> Self {
        match level {
            "error" => Self::Error,
            "warn" => Self::Warn,
            _ => Self::Info,
        }
    }
}

/// A structured log line forwarded from the backend
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEnvelope {
    /// Level as sent by the backend
    pub level: String,
    /// Message text
    pub message: String,
    /// Structured context
    #[serde(default)]
    pub context: Value,
}

impl LogEnvelope {
    /// Routing level of this line
    #[must_use]
    pub fn routed_level(&self) -> LogLevel {
        LogLevel::from_level(&self.level)
    }
}

/// Anything delivered over the native transport
#[derive(Clone, Debug, PartialEq)]
pub enum BridgeMessage {
    /// A `native-event` envelope
    Event(NativeEvent),
    /// A `log` envelope
    Log(LogEnvelope),
}

impl BridgeMessage {
    /// Channel this message travels on
    #[must_use]
    pub fn channel(&self) -> &'static str {
        match self {
            Self::Event(_) => NATIVE_EVENT_CHANNEL,
            Self::Log(_) => LOG_CHANNEL,
        }
    }

    /// Decode a raw channel payload
    ///
    /// Returns `None` for unknown channels or payloads of the wrong shape.
    #[must_use]
    pub fn decode(channel: &str, data: Value) -> Option<Self> {
        match channel {
            NATIVE_EVENT_CHANNEL => serde_json::from_value(data).ok().map(Self::Event),
            LOG_CHANNEL => serde_json::from_value(data).ok().map(Self::Log),
            _ => None,
        }
    }
}

impl From<NativeEvent> for BridgeMessage {
    fn from(event: NativeEvent) -> Self {
        Self::Event(event)
    }
}

impl From<LogEnvelope> for BridgeMessage {
    fn from(log: LogEnvelope) -> Self {
        Self::Log(log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_strips_every_leading_backslash() {
        assert_eq!(normalize_event_name("\\\\foo"), "foo");
        assert_eq!(normalize_event_name("\\App\\Events\\Saved"), "App\\Events\\Saved");
        assert_eq!(normalize_event_name("foo\\"), "foo\\");
        assert_eq!(normalize_event_name(""), "");
    }

    #[test]
    fn test_level_routing_is_exact() {
        assert_eq!(LogLevel::from_level("error"), LogLevel::Error);
        assert_eq!(LogLevel::from_level("warn"), LogLevel::Warn);
        assert_eq!(LogLevel::from_level("ERROR"), LogLevel::Info);
        assert_eq!(LogLevel::from_level("warning"), LogLevel::Info);
        assert_eq!(LogLevel::from_level("debug"), LogLevel::Info);
    }

    #[test]
    fn test_decode_by_channel() {
        let event = BridgeMessage::decode(
            NATIVE_EVENT_CHANNEL,
            json!({ "event": "\\App\\Saved", "payload": [1, 2] }),
        )
        .unwrap();
        assert_eq!(event.channel(), NATIVE_EVENT_CHANNEL);

        let log = BridgeMessage::decode(LOG_CHANNEL, json!({ "level": "warn", "message": "hi" }));
        assert!(matches!(log, Some(BridgeMessage::Log(ref l)) if l.context.is_null()));

        assert!(BridgeMessage::decode("other", json!({})).is_none());
        assert!(BridgeMessage::decode(LOG_CHANNEL, json!({ "level": 3 })).is_none());
    }
}
