use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use kuberns_common::LogEntry;
use serde::Deserialize;

use crate::app::AppState;
use crate::error::ApiResult;

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LogsQuery {
    /// Maximum number of entries; all when omitted.
    pub limit: Option<usize>,
}

#[utoipa::path(
    get,
    path = "/logs",
    params(LogsQuery),
    responses((status = 200, description = "Deployment logs across all instances, newest first", body = Vec<LogEntry>))
)]
pub async fn list_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LogsQuery>,
) -> ApiResult<Json<Vec<LogEntry>>> {
    Ok(Json(state.store.list_all_logs(query.limit).await?))
}
