//! Event-bus adapters for the embedded content
//!
//! The embedded content may host either (or both) of two incompatible major
//! versions of its component framework. Each is reached through its own
//! adapter, selected by probing the content on every dispatch:
//!
//! ```text
//!   EmbeddedContent ──probe──► global_bus()  ──► GlobalDispatchAdapter   dispatch("native:" + event)
//!                         └──► legacy_bus()  ──► LegacyListenerAdapter   emit(listener, payload)
//! ```
//!
//! When both are present both fire for the same event.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::trace;

use super::channel::{ChannelExpression, LEGACY_NAMESPACE};

/// Prefix the global dispatch protocol puts in front of event names
pub const GLOBAL_EVENT_PREFIX: &str = "native:";

// =============================================================================
// Framework surfaces
// =============================================================================

/// Newer framework: one global dispatch call
pub trait GlobalBus: Send + Sync {
    /// Dispatch `name` with `payload` to every interested component
    fn dispatch(&self, name: &str, payload: &Value);
}

/// A live component of the legacy framework
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LegacyComponent {
    /// Component identifier, for diagnostics
    pub id: String,
    /// Declared listener names; `None` when the component declares none
    pub listeners: Option<Vec<String>>,
}

/// Legacy framework: per-component listener lists and a per-event emit
pub trait LegacyBus: Send + Sync {
    /// Every live component
    fn components(&self) -> Vec<LegacyComponent>;

    /// Emit `payload` under the listener key `listener`
    fn emit(&self, listener: &str, payload: &Value);
}

/// The embedded content, as far as event delivery is concerned
pub trait EmbeddedContent: Send + Sync {
    /// The newer framework's bus, if loaded
    fn global_bus(&self) -> Option<Arc<dyn GlobalBus>>;

    /// The legacy framework's bus, if loaded
    fn legacy_bus(&self) -> Option<Arc<dyn LegacyBus>>;
}

/// Content with neither framework loaded
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessContent;

impl EmbeddedContent for HeadlessContent {
    fn global_bus(&self) -> Option<Arc<dyn GlobalBus>> {
        None
    }

    fn legacy_bus(&self) -> Option<Arc<dyn LegacyBus>> {
        None
    }
}

// =============================================================================
// Adapters
// =============================================================================

/// Which dispatch protocol an adapter speaks
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdapterKind {
    /// Global dispatch keyed by prefixed event name
    Global,
    /// Per-listener legacy emit
    Legacy,
}

/// Uniform dispatch contract over both protocols
pub trait EventBusAdapter: Send + Sync {
    /// Protocol spoken by this adapter
    fn kind(&self) -> AdapterKind;

    /// Deliver a normalized event name with its raw payload
    ///
    /// Returns the number of deliveries made.
    fn dispatch(&self, event_name: &str, payload: &Value) -> usize;
}

/// Adapter for the global dispatch protocol
pub struct GlobalDispatchAdapter {
    bus: Arc<dyn GlobalBus>,
}

impl GlobalDispatchAdapter {
    /// Wrap a global bus
    #[must_use]
    pub fn new(bus: Arc<dyn GlobalBus>) -> Self {
        Self { bus }
    }
}

impl EventBusAdapter for GlobalDispatchAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Global
    }

    fn dispatch(&self, event_name: &str, payload: &Value) -> usize {
        let name = format!("{GLOBAL_EVENT_PREFIX}{event_name}");
        trace!(name = %name, "Global dispatch");
        self.bus.dispatch(&name, payload);
        1
    }
}

/// Adapter for the legacy per-listener protocol
pub struct LegacyListenerAdapter {
    bus: Arc<dyn LegacyBus>,
}

impl LegacyListenerAdapter {
    /// Wrap a legacy bus
    #[must_use]
    pub fn new(bus: Arc<dyn LegacyBus>) -> Self {
        Self { bus }
    }
}

impl EventBusAdapter for LegacyListenerAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Legacy
    }

    fn dispatch(&self, event_name: &str, payload: &Value) -> usize {
        let mut delivered = 0;

        for component in self.bus.components() {
            let Some(listeners) = component.listeners else {
                continue;
            };

            for listener in listeners
                .iter()
                .filter(|listener| listener.starts_with(LEGACY_NAMESPACE))
            {
                let matched = ChannelExpression::parse(listener)
                    .is_some_and(|expr| expr.matches(event_name));
                if matched {
                    trace!(component = %component.id, listener = %listener, "Legacy emit");
                    self.bus.emit(listener, payload);
                    delivered += 1;
                }
            }
        }

        delivered
    }
}

impl fmt::Debug for dyn EventBusAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventBusAdapter({:?})", self.kind())
    }
}

/// Adapters for whatever frameworks `content` currently hosts
#[must_use]
pub fn probe_adapters(content: &dyn EmbeddedContent) -> Vec<Box<dyn EventBusAdapter>> {
    let mut adapters: Vec<Box<dyn EventBusAdapter>> = Vec::with_capacity(2);
    if let Some(bus) = content.global_bus() {
        adapters.push(Box::new(GlobalDispatchAdapter::new(bus)));
    }
    if let Some(bus) = content.legacy_bus() {
        adapters.push(Box::new(LegacyListenerAdapter::new(bus)));
    }
    adapters
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingLegacy {
        components: Vec<LegacyComponent>,
        emitted: Mutex<Vec<(String, Value)>>,
    }

    impl LegacyBus for RecordingLegacy {
        fn components(&self) -> Vec<LegacyComponent> {
            self.components.clone()
        }

        fn emit(&self, listener: &str, payload: &Value) {
            self.emitted.lock().push((listener.to_string(), payload.clone()));
        }
    }

    fn component(id: &str, listeners: Option<&[&str]>) -> LegacyComponent {
        LegacyComponent {
            id: id.to_string(),
            listeners: listeners.map(|l| l.iter().map(|s| (*s).to_string()).collect()),
        }
    }

    #[test]
    fn test_legacy_emits_with_original_listener_key() {
        let bus = Arc::new(RecordingLegacy {
            components: vec![
                component(
                    "orders",
                    Some(&["refresh", "native:private,table,event.fired", "native:other"]),
                ),
                component("plain", None),
                component("mirror", Some(&["native-private:orders,fired"])),
            ],
            ..RecordingLegacy::default()
        });
        let adapter = LegacyListenerAdapter::new(bus.clone());

        let delivered = adapter.dispatch("fired", &json!({ "id": 7 }));

        assert_eq!(delivered, 2);
        assert_eq!(
            *bus.emitted.lock(),
            vec![
                ("native:private,table,event.fired".to_string(), json!({ "id": 7 })),
                ("native-private:orders,fired".to_string(), json!({ "id": 7 })),
            ]
        );
    }

    #[test]
    fn test_legacy_ignores_non_matching_event() {
        let bus = Arc::new(RecordingLegacy {
            components: vec![component("orders", Some(&["native:private,table,event.fired"]))],
            ..RecordingLegacy::default()
        });
        let adapter = LegacyListenerAdapter::new(bus.clone());

        assert_eq!(adapter.dispatch("private", &Value::Null), 0);
        assert!(bus.emitted.lock().is_empty());
    }

    #[test]
    fn test_probe_headless_yields_nothing() {
        assert!(probe_adapters(&HeadlessContent).is_empty());
    }
}
