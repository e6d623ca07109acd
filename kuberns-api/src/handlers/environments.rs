use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use kuberns_common::EnvironmentDetail;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiResult;

#[utoipa::path(
    get,
    path = "/environments",
    responses((status = 200, description = "All environments with their instance", body = Vec<EnvironmentDetail>))
)]
pub async fn list_environments(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<EnvironmentDetail>>> {
    Ok(Json(state.store.list_environments().await?))
}

#[utoipa::path(
    get,
    path = "/environments/{id}",
    params(("id" = Uuid, Path, description = "Environment id")),
    responses(
        (status = 200, description = "Environment with its instance", body = EnvironmentDetail),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_environment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<EnvironmentDetail>> {
    Ok(Json(state.store.get_environment(id).await?))
}
