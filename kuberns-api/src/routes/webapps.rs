// WebApp, environment, instance and log routes
use crate::app::AppState;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;

use crate::handlers::{environments, instances, logs, webapps};

pub fn create_webapp_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/webapps",
            get(webapps::list_webapps).post(webapps::create_webapp),
        )
        .route(
            "/webapps/{id}",
            get(webapps::get_webapp).delete(webapps::delete_webapp),
        )
        .route("/webapps/{id}/status", get(webapps::webapp_status))
        .route("/webapps/{id}/logs", get(webapps::webapp_logs))
        .route("/environments", get(environments::list_environments))
        .route("/environments/{id}", get(environments::get_environment))
        .route("/instances", get(instances::list_instances))
        .route("/instances/{id}", get(instances::get_instance))
        .route("/logs", get(logs::list_logs))
}
