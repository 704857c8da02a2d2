//! `api` crate — HTTP REST surface for the presentation layer and the
//! admin configuration surface.
//!
//! Routes:
//!   POST   /api/v1/definitions
//!   GET    /api/v1/definitions/{key}
//!   POST   /api/v1/instances
//!   GET    /api/v1/instances/{id}
//!   GET    /api/v1/instances/{id}/timeline
//!   GET    /api/v1/instances/{id}/candidates
//!   POST   /api/v1/instances/{id}/complete
//!   POST   /api/v1/instances/{id}/skip
//!   POST   /api/v1/instances/{id}/cancel
//!   POST   /api/v1/instances/{id}/events
//!   GET    /api/v1/rules
//!   POST   /api/v1/rules
//!   PATCH  /api/v1/rules/{id}
//!   DELETE /api/v1/rules/{id}

pub mod handlers;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use handlers::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/definitions", post(handlers::definitions::publish))
        .route("/api/v1/definitions/:key", get(handlers::definitions::get_active))
        .route("/api/v1/instances", post(handlers::instances::start))
        .route("/api/v1/instances/:id", get(handlers::instances::get))
        .route("/api/v1/instances/:id/timeline", get(handlers::instances::timeline))
        .route("/api/v1/instances/:id/candidates", get(handlers::instances::candidates))
        .route("/api/v1/instances/:id/complete", post(handlers::instances::complete))
        .route("/api/v1/instances/:id/skip", post(handlers::instances::skip))
        .route("/api/v1/instances/:id/cancel", post(handlers::instances::cancel))
        .route("/api/v1/instances/:id/events", post(handlers::instances::raise_event))
        .route(
            "/api/v1/rules",
            get(handlers::rules::list).post(handlers::rules::create),
        )
        .route(
            "/api/v1/rules/:id",
            axum::routing::patch(handlers::rules::update).delete(handlers::rules::remove),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(bind: &str, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("listening on {bind}");
    axum::serve(listener, router(state)).await
}
