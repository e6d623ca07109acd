// Library entry point for the binary and the HTTP tests

pub mod api_docs;
pub mod app;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod services;

pub use app::AppState;
pub use error::{ApiError, ApiResult};

use std::sync::Arc;

use axum::Router;

/// Full application router with CORS, ready to serve.
pub fn build_app(state: Arc<AppState>) -> Router {
    routes::create_router()
        .layer(app::create_cors())
        .with_state(state)
}
