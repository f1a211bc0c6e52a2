use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handler;
use crate::state::AppState;

/// Build the axum router with all lending endpoints.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/health", get(handler::health_handler))
        .route(
            "/v1/books/:catalog",
            get(handler::search_handler).delete(handler::remove_title_handler),
        )
        .route(
            "/v1/books/:catalog/stock",
            post(handler::add_stock_handler).patch(handler::adjust_stock_handler),
        )
        .route(
            "/v1/requests",
            post(handler::raise_handler).get(handler::list_requests_handler),
        )
        .route("/v1/requests/:id/approve", post(handler::approve_handler))
        .route("/v1/requests/:id/reject", post(handler::reject_handler))
        .route("/v1/loans", get(handler::list_loans_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
