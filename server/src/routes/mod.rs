use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::create_cors_layer;
use crate::handlers::{health_check, holds, orders, sessions};
use crate::state::AppState;

pub fn create_routes(state: AppState, cors_origins: &str) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/sessions", post(sessions::create_session))
        .route("/api/sessions/:id", put(sessions::edit_session))
        .route("/api/sessions/:id/tickets", get(sessions::session_tickets))
        .route("/api/holds", post(holds::create_hold))
        .route("/api/holds/:id", delete(holds::cancel_hold))
        .route("/api/orders", post(orders::create_order))
        .route("/api/orders/:id/finish", post(orders::finish_order))
        .layer(TraceLayer::new_for_http())
        .layer(create_cors_layer(cors_origins))
        .with_state(state)
}
