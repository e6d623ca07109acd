//! Persistence for webapps, their environment and instance, and deployment logs.
//!
//! Two backends: [`PostgresStore`] for real deployments and [`MemoryStore`]
//! for tests and single-process development.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use std::sync::Arc;

use async_trait::async_trait;
use kuberns_common::{
    EnvironmentDetail, Instance, InstanceStatus, LogEntry, LogOrder, NewWebApp, WebApp,
    WebAppDetail,
};
use uuid::Uuid;

use crate::config::Settings;
use crate::error::OrchestratorResult;

#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Creates the webapp, its environment, its `pending` instance and the
    /// optional database config in one atomic write.
    async fn create_webapp(&self, new: &NewWebApp) -> OrchestratorResult<WebAppDetail>;

    async fn get_webapp(&self, id: Uuid) -> OrchestratorResult<WebAppDetail>;

    /// Newest first.
    async fn list_webapps(&self) -> OrchestratorResult<Vec<WebAppDetail>>;

    /// Removes the webapp and everything it owns, logs included.
    async fn delete_webapp(&self, id: Uuid) -> OrchestratorResult<()>;

    async fn get_environment(&self, id: Uuid) -> OrchestratorResult<EnvironmentDetail>;

    async fn list_environments(&self) -> OrchestratorResult<Vec<EnvironmentDetail>>;

    async fn get_instance(&self, id: Uuid) -> OrchestratorResult<Instance>;

    async fn list_instances(&self) -> OrchestratorResult<Vec<Instance>>;

    /// The webapp an instance belongs to.
    async fn webapp_for_instance(&self, instance_id: Uuid) -> OrchestratorResult<WebApp>;

    /// Compare-and-set on the instance status.
    ///
    /// Fails with `InvalidTransition` when `expected -> status` is not an
    /// edge of the lifecycle, or when the stored status is no longer
    /// `expected`. `public_ip` is written only when given.
    async fn update_instance_status(
        &self,
        id: Uuid,
        expected: InstanceStatus,
        status: InstanceStatus,
        public_ip: Option<&str>,
    ) -> OrchestratorResult<Instance>;

    /// Moves a non-terminal instance to `failed`.
    ///
    /// Returns `false` when the instance was already terminal.
    async fn fail_instance(&self, id: Uuid) -> OrchestratorResult<bool>;

    /// Appends a log entry with a server-assigned timestamp that never goes
    /// backwards within the instance.
    async fn append_log(&self, instance_id: Uuid, message: &str) -> OrchestratorResult<LogEntry>;

    /// Entries for one instance, ordered by (timestamp, seq).
    async fn list_logs(
        &self,
        instance_id: Uuid,
        order: LogOrder,
        limit: Option<usize>,
    ) -> OrchestratorResult<Vec<LogEntry>>;

    /// Entries across all instances, newest first.
    async fn list_all_logs(&self, limit: Option<usize>) -> OrchestratorResult<Vec<LogEntry>>;
}

/// Picks the backend from `DATABASE_URL`: Postgres (migrated) when set,
/// memory otherwise.
pub async fn connect(settings: &Settings) -> OrchestratorResult<Arc<dyn InstanceStore>> {
    match settings.database_url.as_deref() {
        Some(url) => {
            let store = PostgresStore::connect(url).await?;
            store.migrate().await?;
            tracing::info!("🗄️  using postgres store");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store (state is lost on exit)");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
