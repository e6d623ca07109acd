// Service routes: banner, health, wizard metadata, OpenAPI document
use crate::app::AppState;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use utoipa::OpenApi;

use crate::api_docs;
use crate::handlers::metadata;

pub fn create_public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metadata", get(metadata::metadata))
        .route("/api-docs/openapi.json", get(openapi_json))
}

async fn root() -> &'static str {
    "Kuberns API v0.1.0 - deployments run in the background"
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(api_docs::ApiDoc::openapi())
}
