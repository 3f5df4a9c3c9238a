//! Internal API server subsystem
//!
//! The backend talks back to the host over a loopback HTTP API. Every route,
//! including those registered by extensions, sits behind a middleware that
//! checks the session secret:
//!
//! ```text
//!   backend ──HTTP──► 127.0.0.1:<api_port>
//!                       │
//!                       ├─ require_secret (X-NativePHP-Secret, 403 on mismatch)
//!                       │
//!                       ├─ POST /api/broadcast  ──► BridgeMessage::Event ─┐
//!                       ├─ POST /api/log        ──► BridgeMessage::Log  ──┴─► mpsc ──► EventRouter
//!                       ├─ GET  /api/ping
//!                       └─ extension routes (load order)
//! ```

use std::net::{Ipv4Addr, SocketAddr};

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::error::SubsystemError;
use super::subsystem::{Subsystem, SubsystemContext, SubsystemHandle};
use crate::bridge::{BridgeMessage, LogEnvelope, NativeEvent};
use crate::extensions::ExtensionSet;
use crate::session::SessionSecret;

/// Header carrying the session secret on every API request
pub const SECRET_HEADER: &str = "X-NativePHP-Secret";

// =============================================================================
// Errors
// =============================================================================

/// API error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing or wrong secret header (403)
    #[error("Forbidden")]
    Forbidden,

    /// The router is gone (503)
    #[error("Event bridge is closed")]
    BridgeClosed,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::BridgeClosed => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

// =============================================================================
// Router
// =============================================================================

/// Build the API router
///
/// Extension routes are merged after the built-in ones and are covered by the
/// same secret check.
pub fn build_router(
    secret: SessionSecret,
    bridge: mpsc::Sender<BridgeMessage>,
    extensions: &ExtensionSet,
) -> Router {
    let builtin = Router::new()
        .route("/api/ping", get(ping))
        .route("/api/broadcast", post(broadcast))
        .route("/api/log", post(forward_log))
        .with_state(bridge);

    extensions
        .apply_api_routes(builtin)
        .layer(middleware::from_fn_with_state(secret, require_secret))
}

async fn require_secret(
    State(secret): State<SessionSecret>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let presented = request
        .headers()
        .get(SECRET_HEADER)
        .and_then(|value| value.to_str().ok());

    match presented {
        Some(value) if secret.verify(value) => Ok(next.run(request).await),
        _ => {
            warn!(path = %request.uri().path(), "Rejected API request with missing or invalid secret");
            Err(ApiError::Forbidden)
        }
    }
}

async fn ping() -> Json<serde_json::Value> {
    Json(json!({ "success": true }))
}

async fn broadcast(
    State(bridge): State<mpsc::Sender<BridgeMessage>>,
    Json(event): Json<NativeEvent>,
) -> Result<Json<serde_json::Value>, ApiError> {
    debug!(event = %event.event, "Broadcast received");
    bridge
        .send(event.into())
        .await
        .map_err(|_| ApiError::BridgeClosed)?;
    Ok(Json(json!({ "success": true })))
}

async fn forward_log(
    State(bridge): State<mpsc::Sender<BridgeMessage>>,
    Json(envelope): Json<LogEnvelope>,
) -> Result<Json<serde_json::Value>, ApiError> {
    bridge
        .send(envelope.into())
        .await
        .map_err(|_| ApiError::BridgeClosed)?;
    Ok(Json(json!({ "success": true })))
}

// =============================================================================
// Subsystem
// =============================================================================

/// The internal API server
#[derive(Clone, Debug)]
pub struct ApiServer {
    bridge: mpsc::Sender<BridgeMessage>,
}

impl ApiServer {
    /// Server feeding received events and logs into `bridge`
    #[must_use]
    pub fn new(bridge: mpsc::Sender<BridgeMessage>) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl Subsystem for ApiServer {
    fn name(&self) -> &'static str {
        "api"
    }

    async fn start(&self, ctx: SubsystemContext) -> Result<SubsystemHandle, SubsystemError> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, ctx.api_port()));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| SubsystemError::Bind { addr, source })?;

        let app = build_router(ctx.secret().clone(), self.bridge.clone(), ctx.extensions());
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                error!(error = %e, "API server terminated");
            }
        });

        info!(addr = %addr, extensions = ctx.extensions().len(), "API server listening");
        Ok(SubsystemHandle::new(self.name(), shutdown_tx, task))
    }
}
