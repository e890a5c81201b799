//! Spinnaker audit log webhook receiver.
//!
//! Exposes an axum [`Router`] that accepts Spinnaker Echo webhook deliveries,
//! checks their Basic credentials, turns recognised events into audit messages
//! with [`audit::classify`], and hands the result to an [`audit::AuditSink`].
//!
//! | Route | Method | Purpose |
//! |-------|--------|---------|
//! | `/` | `POST` | Echo webhook target |
//! | `/healthz` | `GET` | Liveness probe |
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP framing and status mapping live here. Sink
//! construction is left to the binary, which passes a ready
//! [`audit::AuditSink`] in through [`WebhookState`].

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub mod error;
pub mod handler;
pub mod state;

pub use error::{WebhookError, MALFORMED_BODY};
pub use state::WebhookState;

/// Builds the webhook router.
pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/", post(handler::receive_event))
        .route("/healthz", get(handler::healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves `app` on `listener` until `shutdown` resolves, then drains
/// in-flight requests.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> std::io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "Spinnaker audit log listener started");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    tracing::info!("Spinnaker audit log listener stopped");
    Ok(())
}
