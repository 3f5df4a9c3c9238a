//! IPC Handler Table
//!
//! Request/response handlers keyed by channel name, invoked by the embedded
//! content. Both the capability broker and loaded extensions install their
//! handlers here.
//!
//! Handlers are cloned out of the table before they run, so removing a channel
//! never waits on (or races with) a request that is already executing.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;

/// Identifier of the window whose content sent a request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WindowId(pub u32);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "window-{}", self.0)
    }
}

/// A single request arriving on an IPC channel
#[derive(Clone, Debug)]
pub struct IpcRequest {
    /// Window whose content made the request
    pub sender: WindowId,
    /// Positional arguments
    pub args: Vec<Value>,
}

impl IpcRequest {
    /// Create a request
    #[must_use]
    pub fn new(sender: WindowId, args: Vec<Value>) -> Self {
        Self { sender, args }
    }

    /// Argument at `index` as a string
    #[must_use]
    pub fn arg_str(&self, index: usize) -> Option<&str> {
        self.args.get(index).and_then(Value::as_str)
    }

    /// Argument at `index` as a boolean
    #[must_use]
    pub fn arg_bool(&self, index: usize) -> Option<bool> {
        self.args.get(index).and_then(Value::as_bool)
    }

    /// Argument at `index` as a number
    #[must_use]
    pub fn arg_f64(&self, index: usize) -> Option<f64> {
        self.args.get(index).and_then(Value::as_f64)
    }
}

/// Handler bound to a channel
pub type IpcHandler = Arc<dyn Fn(IpcRequest) -> BoxFuture<'static, Value> + Send + Sync>;

/// Errors from the handler table
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IpcError {
    /// A handler is already bound to the channel
    #[error("a handler is already registered for channel '{0}'")]
    AlreadyRegistered(String),

    /// No handler is bound to the channel
    #[error("no handler registered for channel '{0}'")]
    NoHandler(String),
}

/// Shared handler table
///
/// Cloning the registry yields another handle to the same table.
#[derive(Clone, Default)]
pub struct IpcRegistry {
    handlers: Arc<DashMap<String, IpcHandler>>,
}

impl IpcRegistry {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a handler to a channel
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRegistered` if the channel already has a handler.
    pub fn handle(&self, channel: impl Into<String>, handler: IpcHandler) -> Result<(), IpcError> {
        use dashmap::mapref::entry::Entry;

        let channel = channel.into();
        match self.handlers.entry(channel) {
            Entry::Occupied(entry) => Err(IpcError::AlreadyRegistered(entry.key().clone())),
            Entry::Vacant(entry) => {
                tracing::trace!(channel = %entry.key(), "IPC handler registered");
                entry.insert(handler);
                Ok(())
            }
        }
    }

    /// Unbind a channel, returning whether a handler was present
    pub fn remove_handler(&self, channel: &str) -> bool {
        let removed = self.handlers.remove(channel).is_some();
        if removed {
            tracing::trace!(channel = channel, "IPC handler removed");
        }
        removed
    }

    /// Whether a channel has a handler
    #[must_use]
    pub fn contains(&self, channel: &str) -> bool {
        self.handlers.contains_key(channel)
    }

    /// Registered channel names, sorted
    #[must_use]
    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.handlers.iter().map(|e| e.key().clone()).collect();
        channels.sort();
        channels
    }

    /// Number of registered channels
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether the table is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Invoke the handler bound to `channel`
    ///
    /// # Errors
    ///
    /// Returns `NoHandler` if nothing is bound to the channel.
    pub async fn invoke(&self, channel: &str, request: IpcRequest) -> Result<Value, IpcError> {
        // Clone out so the map shard lock is not held across the await
        let handler = self
            .handlers
            .get(channel)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| IpcError::NoHandler(channel.to_string()))?;

        Ok(handler(request).await)
    }
}

impl fmt::Debug for IpcRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IpcRegistry")
            .field("channels", &self.channels())
            .finish()
    }
}

/// Wrap an async closure as an [`IpcHandler`]
pub fn handler<F, Fut>(f: F) -> IpcHandler
where
    F: Fn(IpcRequest) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Value> + Send + 'static,
{
    Arc::new(move |request| -> BoxFuture<'static, Value> { Box::pin(f(request)) })
}
