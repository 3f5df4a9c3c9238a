//! Event Router
//!
//! Consumes messages from the native transport and delivers them:
//!
//! ```text
//!   BridgeMessage::Event ──► normalize ──┬──► probed adapters (global / legacy)
//!                                        └──► native listeners registered with on()
//!
//!   BridgeMessage::Log   ──► LogSink (by exact level)
//! ```
//!
//! Adapters are probed per message, so a framework that loads after startup
//! starts receiving events without re-registration.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::adapter::{probe_adapters, AdapterKind, EmbeddedContent};
use super::envelope::{normalize_event_name, BridgeMessage, LogEnvelope, LogLevel, NativeEvent};

// =============================================================================
// Log sinks
// =============================================================================

/// Console-equivalent destination for forwarded log lines
pub trait LogSink: Send + Sync {
    /// Write one forwarded line
    fn log(&self, level: LogLevel, envelope: &LogEnvelope);
}

/// Sink writing forwarded lines to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn log(&self, level: LogLevel, envelope: &LogEnvelope) {
        let LogEnvelope {
            level: raw,
            message,
            context,
        } = envelope;
        match level {
            LogLevel::Error => {
                error!(target: "nativehost::backend", level = %raw, context = %context, "{message}");
            }
            LogLevel::Warn => {
                warn!(target: "nativehost::backend", level = %raw, context = %context, "{message}");
            }
            LogLevel::Info => {
                info!(target: "nativehost::backend", level = %raw, context = %context, "{message}");
            }
        }
    }
}

// =============================================================================
// Router
// =============================================================================

/// Handle returned by [`EventRouter::on`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Callback for native listeners: `(payload, event_name)`
pub type NativeListener = Arc<dyn Fn(&Value, &str) + Send + Sync>;

/// What a single routed message produced
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchReport {
    /// An event was routed
    Event {
        /// Normalized event name
        event: String,
        /// Deliveries through the global dispatch protocol
        global: usize,
        /// Deliveries through the legacy listener protocol
        legacy: usize,
        /// Native listener callbacks invoked
        native: usize,
    },
    /// A log line was forwarded
    Log(LogLevel),
}

impl DispatchReport {
    /// Total deliveries for an event; zero for logs
    #[must_use]
    pub fn deliveries(&self) -> usize {
        match self {
            Self::Event {
                global,
                legacy,
                native,
                ..
            } => global + legacy + native,
            Self::Log(_) => 0,
        }
    }
}

/// Routes native-transport messages into the embedded content
pub struct EventRouter {
    content: Arc<dyn EmbeddedContent>,
    sink: Arc<dyn LogSink>,
    listeners: RwLock<Vec<(ListenerId, String, NativeListener)>>,
    next_id: AtomicU64,
}

impl EventRouter {
    /// Router over `content`, forwarding logs to `sink`
    #[must_use]
    pub fn new(content: Arc<dyn EmbeddedContent>, sink: Arc<dyn LogSink>) -> Self {
        Self {
            content,
            sink,
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a native listener for `event`
    ///
    /// The name is normalized, so `\\App\\Saved` and `App\\Saved` are the same
    /// registration target.
    pub fn on<F>(&self, event: &str, callback: F) -> ListenerId
    where
        F: Fn(&Value, &str) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((
            id,
            normalize_event_name(event).to_string(),
            Arc::new(callback),
        ));
        id
    }

    /// Remove a native listener; returns whether it was registered
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _, _)| *existing != id);
        listeners.len() != before
    }

    /// Route a single message
    pub fn route(&self, message: BridgeMessage) -> DispatchReport {
        match message {
            BridgeMessage::Event(event) => self.route_event(&event),
            BridgeMessage::Log(envelope) => {
                let level = envelope.routed_level();
                self.sink.log(level, &envelope);
                DispatchReport::Log(level)
            }
        }
    }

    fn route_event(&self, event: &NativeEvent) -> DispatchReport {
        let name = event.name();
        let mut global = 0;
        let mut legacy = 0;

        for adapter in probe_adapters(self.content.as_ref()) {
            let delivered = adapter.dispatch(name, &event.payload);
            match adapter.kind() {
                AdapterKind::Global => global += delivered,
                AdapterKind::Legacy => legacy += delivered,
            }
        }

        // Snapshot so callbacks may register or remove listeners
        let matching: Vec<NativeListener> = self
            .listeners
            .read()
            .iter()
            .filter(|(_, registered, _)| registered == name)
            .map(|(_, _, callback)| Arc::clone(callback))
            .collect();
        for callback in &matching {
            callback(&event.payload, name);
        }

        debug!(
            event = name,
            global,
            legacy,
            native = matching.len(),
            "Native event routed"
        );

        DispatchReport::Event {
            event: name.to_string(),
            global,
            legacy,
            native: matching.len(),
        }
    }

    /// Route messages until every sender is dropped
    pub async fn run(self: Arc<Self>, mut receiver: mpsc::Receiver<BridgeMessage>) {
        info!("Event router running");
        while let Some(message) = receiver.recv().await {
            self.route(message);
        }
        info!("Event router stopped, transport closed");
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("listeners", &self.listeners.read().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::adapter::{GlobalBus, LegacyBus, LegacyComponent};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[derive(Default)]
    struct Recorder {
        global: Mutex<Vec<(String, Value)>>,
        legacy: Mutex<Vec<(String, Value)>>,
        logs: Mutex<Vec<(LogLevel, String)>>,
    }

    impl GlobalBus for Recorder {
        fn dispatch(&self, name: &str, payload: &Value) {
            self.global.lock().push((name.to_string(), payload.clone()));
        }
    }

    impl LegacyBus for Recorder {
        fn components(&self) -> Vec<LegacyComponent> {
            vec![LegacyComponent {
                id: "c1".to_string(),
                listeners: Some(vec![
                    "native:private,table,event.fired".to_string(),
                    "native:App\\Events\\Saved".to_string(),
                    "native:order.shipped".to_string(),
                ]),
            }]
        }

        fn emit(&self, listener: &str, payload: &Value) {
            self.legacy.lock().push((listener.to_string(), payload.clone()));
        }
    }

    impl LogSink for Recorder {
        fn log(&self, level: LogLevel, envelope: &LogEnvelope) {
            self.logs.lock().push((level, envelope.message.clone()));
        }
    }

    struct Both(Arc<Recorder>);

    impl EmbeddedContent for Both {
        fn global_bus(&self) -> Option<Arc<dyn GlobalBus>> {
            Some(self.0.clone())
        }

        fn legacy_bus(&self) -> Option<Arc<dyn LegacyBus>> {
            Some(self.0.clone())
        }
    }

    fn router() -> (EventRouter, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let router = EventRouter::new(Arc::new(Both(recorder.clone())), recorder.clone());
        (router, recorder)
    }

    #[test]
    fn test_both_protocols_fire() {
        let (router, recorder) = router();

        let report = router.route(NativeEvent::new("fired", json!([1])).into());

        assert_eq!(
            report,
            DispatchReport::Event {
                event: "fired".to_string(),
                global: 1,
                legacy: 1,
                native: 0,
            }
        );
        assert_eq!(
            *recorder.global.lock(),
            vec![("native:fired".to_string(), json!([1]))]
        );
        assert_eq!(
            *recorder.legacy.lock(),
            vec![("native:private,table,event.fired".to_string(), json!([1]))]
        );
    }

    #[test]
    fn test_shorthand_listener_receives_dotted_event() {
        let (router, recorder) = router();

        let report = router.route(NativeEvent::new("order.shipped", json!({ "id": 7 })).into());
        assert_eq!(
            report,
            DispatchReport::Event {
                event: "order.shipped".to_string(),
                global: 1,
                legacy: 1,
                native: 0,
            }
        );
        assert_eq!(
            *recorder.legacy.lock(),
            vec![("native:order.shipped".to_string(), json!({ "id": 7 }))]
        );

        let report = router.route(NativeEvent::new("shipped", json!(null)).into());
        assert!(matches!(report, DispatchReport::Event { legacy: 0, .. }));
    }

    #[test]
    fn test_escaped_event_dispatches_identically() {
        let (router, recorder) = router();

        let plain = router.route(NativeEvent::new("App\\Events\\Saved", json!("p")).into());
        let escaped = router.route(NativeEvent::new("\\\\App\\Events\\Saved", json!("p")).into());

        assert_eq!(plain, escaped);
        let global = recorder.global.lock();
        assert_eq!(global[0], global[1]);
        let legacy = recorder.legacy.lock();
        assert_eq!(legacy.len(), 2);
        assert_eq!(legacy[0], legacy[1]);
    }

    #[test]
    fn test_native_listeners_normalize_both_sides() {
        let (router, _recorder) = router();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let id = router.on("\\foo", move |payload, event| {
            sink.lock().push((event.to_string(), payload.clone()));
        });

        router.route(NativeEvent::new("\\\\foo", json!(1)).into());
        router.route(NativeEvent::new("bar", json!(2)).into());
        assert_eq!(*seen.lock(), vec![("foo".to_string(), json!(1))]);

        assert!(router.off(id));
        assert!(!router.off(id));
        router.route(NativeEvent::new("foo", json!(3)).into());
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_log_routing_by_level() {
        let (router, recorder) = router();
        for level in ["error", "warn", "info", "debug", "Error"] {
            router.route(
                LogEnvelope {
                    level: level.to_string(),
                    message: level.to_string(),
                    context: Value::Null,
                }
                .into(),
            );
        }

        assert_eq!(
            *recorder.logs.lock(),
            vec![
                (LogLevel::Error, "error".to_string()),
                (LogLevel::Warn, "warn".to_string()),
                (LogLevel::Info, "info".to_string()),
                (LogLevel::Info, "debug".to_string()),
                (LogLevel::Info, "Error".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_run_drains_until_closed() {
        let (router, recorder) = router();
        let (tx, rx) = mpsc::channel(8);
        tx.send(NativeEvent::new("fired", Value::Null).into())
            .await
            .unwrap();
        drop(tx);

        Arc::new(router).run(rx).await;
        assert_eq!(recorder.global.lock().len(), 1);
    }
}
