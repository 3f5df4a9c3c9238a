//! Event Bridge
//!
//! Delivers backend events and log lines arriving on the native transport
//! into the embedded content, whichever component framework it runs.

pub mod adapter;
pub mod channel;
pub mod envelope;
pub mod router;

pub use adapter::{
    probe_adapters, AdapterKind, EmbeddedContent, EventBusAdapter, GlobalBus,
    GlobalDispatchAdapter, HeadlessContent, LegacyBus, LegacyComponent, LegacyListenerAdapter,
    GLOBAL_EVENT_PREFIX,
};
pub use channel::{ChannelExpression, Signature, LEGACY_NAMESPACE};
pub use envelope::{
    normalize_event_name, BridgeMessage, LogEnvelope, LogLevel, NativeEvent, LOG_CHANNEL,
    NATIVE_EVENT_CHANNEL,
};
pub use router::{DispatchReport, EventRouter, ListenerId, LogSink, NativeListener, TracingLogSink};
