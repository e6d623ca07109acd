use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use kuberns_common::{CreateWebAppRequest, ValidationError, WebAppDetail};
use serde::Serialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiResult;
use crate::services::{self, WebAppLogs, WebAppStatus};

#[derive(Serialize, utoipa::ToSchema)]
pub struct CreateWebAppResponse {
    pub message: String,
    /// Always "deployment started": the deployment runs in the background.
    pub status: String,
    pub id: Uuid,
    pub data: WebAppDetail,
}

#[utoipa::path(
    post,
    path = "/webapps",
    request_body = CreateWebAppRequest,
    responses(
        (status = 201, description = "WebApp created, deployment started", body = CreateWebAppResponse),
        (status = 400, description = "Validation error")
    )
)]
pub async fn create_webapp(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateWebAppRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) =
        payload.map_err(|e| ValidationError::new("body", e.body_text()))?;
    let created = services::create_webapp(&state, request).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateWebAppResponse {
            message: "WebApp created successfully".to_string(),
            status: "deployment started".to_string(),
            id: created.webapp.id,
            data: created,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/webapps",
    responses((status = 200, description = "All webapps, newest first", body = Vec<WebAppDetail>))
)]
pub async fn list_webapps(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<WebAppDetail>>> {
    Ok(Json(state.store.list_webapps().await?))
}

#[utoipa::path(
    get,
    path = "/webapps/{id}",
    params(("id" = Uuid, Path, description = "WebApp id")),
    responses(
        (status = 200, description = "WebApp with environment, instance and database config", body = WebAppDetail),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_webapp(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<WebAppDetail>> {
    Ok(Json(state.store.get_webapp(id).await?))
}

#[utoipa::path(
    delete,
    path = "/webapps/{id}",
    params(("id" = Uuid, Path, description = "WebApp id")),
    responses(
        (status = 204, description = "Deleted with its environment, instance and logs"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_webapp(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.store.delete_webapp(id).await?;
    tracing::info!(webapp_id = %id, "🗑️ webapp deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/webapps/{id}/status",
    params(("id" = Uuid, Path, description = "WebApp id")),
    responses(
        (status = 200, description = "Instance status and latest logs", body = WebAppStatus),
        (status = 404, description = "Not found")
    )
)]
pub async fn webapp_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<WebAppStatus>> {
    Ok(Json(services::webapp_status(&state, id).await?))
}

#[utoipa::path(
    get,
    path = "/webapps/{id}/logs",
    params(("id" = Uuid, Path, description = "WebApp id")),
    responses(
        (status = 200, description = "All deployment logs, oldest first", body = WebAppLogs),
        (status = 404, description = "Not found")
    )
)]
pub async fn webapp_logs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<WebAppLogs>> {
    Ok(Json(services::webapp_logs(&state, id).await?))
}
