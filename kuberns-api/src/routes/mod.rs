// Public service routes plus the webapp, environment, instance and log resources.
pub mod public;
pub mod webapps;

use axum::Router;
use crate::app::AppState;
use std::sync::Arc;

/// All kuberns routes; state is attached in [`crate::build_app`].
pub fn create_router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(public::create_public_routes())
        .merge(webapps::create_webapp_routes())
}
