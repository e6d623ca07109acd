use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use kuberns_common::Instance;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiResult;

#[utoipa::path(
    get,
    path = "/instances",
    responses((status = 200, description = "All instances", body = Vec<Instance>))
)]
pub async fn list_instances(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Instance>>> {
    Ok(Json(state.store.list_instances().await?))
}

#[utoipa::path(
    get,
    path = "/instances/{id}",
    params(("id" = Uuid, Path, description = "Instance id")),
    responses(
        (status = 200, description = "Instance", body = Instance),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_instance(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Instance>> {
    Ok(Json(state.store.get_instance(id).await?))
}
