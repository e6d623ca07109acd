use kuberns_common::{CreateWebAppRequest, InstanceStatus, LogEntry, LogOrder, WebAppDetail};
use kuberns_orchestrator::OrchestratorResult;
use serde::Serialize;
use uuid::Uuid;

use crate::app::AppState;

/// Latest entries shown on the deployment dashboard.
pub const STATUS_LOG_LIMIT: usize = 20;

/// Live deployment status for the dashboard.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct WebAppStatus {
    pub id: Uuid,
    pub name: String,
    pub instance_status: InstanceStatus,
    pub public_ip: Option<String>,
    /// Newest first, at most [`STATUS_LOG_LIMIT`].
    pub logs: Vec<LogEntry>,
}

/// Full deployment log, oldest first.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct WebAppLogs {
    pub id: Uuid,
    pub logs: Vec<LogEntry>,
}

/// Validates, writes the webapp with its environment and pending instance,
/// then hands the instance to the orchestrator. Returns before deployment starts.
///
/// Nothing is written when validation fails. If the hand-off fails the
/// records just written are removed again before the error is returned.
pub async fn create_webapp(
    state: &AppState,
    request: CreateWebAppRequest,
) -> OrchestratorResult<WebAppDetail> {
    let new = request.validate()?;
    let created = state.store.create_webapp(&new).await?;
    let instance_id = created.instance().id;
    tracing::info!(
        webapp_id = %created.webapp.id,
        %instance_id,
        plan = %created.webapp.plan,
        "🆕 webapp created"
    );

    if let Err(e) = state.dispatcher.dispatch(instance_id).await {
        tracing::error!(%instance_id, error = %e, "could not schedule deployment");
        if let Err(undo) = state.store.delete_webapp(created.webapp.id).await {
            tracing::error!(
                webapp_id = %created.webapp.id,
                error = %undo,
                "could not remove unscheduled webapp"
            );
        }
        return Err(e);
    }
    Ok(created)
}

pub async fn webapp_status(state: &AppState, id: Uuid) -> OrchestratorResult<WebAppStatus> {
    let webapp = state.store.get_webapp(id).await?;
    let instance = webapp.instance();
    let logs = state
        .store
        .list_logs(instance.id, LogOrder::Reverse, Some(STATUS_LOG_LIMIT))
        .await?;
    Ok(WebAppStatus {
        id: webapp.webapp.id,
        name: webapp.webapp.name.clone(),
        instance_status: instance.status,
        public_ip: instance.public_ip.clone(),
        logs,
    })
}

pub async fn webapp_logs(state: &AppState, id: Uuid) -> OrchestratorResult<WebAppLogs> {
    let webapp = state.store.get_webapp(id).await?;
    let logs = state
        .store
        .list_logs(webapp.instance().id, LogOrder::Chronological, None)
        .await?;
    Ok(WebAppLogs {
        id: webapp.webapp.id,
        logs,
    })
}
