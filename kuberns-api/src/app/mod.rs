// Shared handler state: the instance store and the deployment dispatcher.
pub mod state;

pub use state::AppState;

use tower_http::cors::{Any, CorsLayer};

/// The dashboard is served from another origin, so every origin is accepted.
pub fn create_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}
