// Shared fixtures for orchestrator integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kuberns_common::validation::{DatabaseConfigRequest, EnvironmentRequest};
use kuberns_common::{CreateWebAppRequest, NewWebApp};
use kuberns_orchestrator::store::{InstanceStore, MemoryStore, PostgresStore};
use kuberns_orchestrator::{DeploymentStateMachine, JobReport, JobRunner};
use kuberns_providers::{NetworkAddress, ProvisionError, ProvisionRequest, Provisioner, ProvisionerKind};
use sqlx::postgres::PgPoolOptions;
use tokio::sync::broadcast;

pub fn webapp_request(name: &str, plan: &str) -> CreateWebAppRequest {
    CreateWebAppRequest {
        name: name.to_string(),
        region: "us-east-1".to_string(),
        template: "reactjs".to_string(),
        plan: plan.to_string(),
        repo: format!("acme/{}", name),
        branch: "main".to_string(),
        environment: Some(EnvironmentRequest {
            port: Some(3000),
            environment_variables: [("NODE_ENV".to_string(), "production".to_string())].into(),
        }),
        ..Default::default()
    }
}

pub fn new_webapp(name: &str, plan: &str) -> NewWebApp {
    webapp_request(name, plan).validate().expect("fixture request is valid")
}

pub fn new_webapp_with_database(name: &str) -> NewWebApp {
    let mut req = webapp_request(name, "pro");
    req.database_enabled = true;
    req.database_type = Some("postgresql".to_string());
    req.database_config = Some(DatabaseConfigRequest::default());
    req.validate().expect("fixture request is valid")
}

pub fn memory_store() -> Arc<dyn InstanceStore> {
    Arc::new(MemoryStore::new())
}

/// Postgres store from `DATABASE_URL`, migrated. `None` when the variable is
/// unset so callers can skip.
///
/// One pool per test: each `#[tokio::test]` has its own runtime.
pub async fn postgres_store() -> Option<PostgresStore> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("Failed to connect to test database");
    let store = PostgresStore::from_pool(pool);
    store.migrate().await.expect("Failed to run migrations on test database");
    Some(store)
}

pub fn runner_with(
    store: Arc<dyn InstanceStore>,
    provisioner: Arc<dyn Provisioner>,
    concurrency: usize,
) -> JobRunner {
    let machine = DeploymentStateMachine::new(store, provisioner);
    JobRunner::start(Arc::new(machine), concurrency)
}

/// Collects `n` reports or panics after a generous timeout.
pub async fn collect_reports(rx: &mut broadcast::Receiver<JobReport>, n: usize) -> Vec<JobReport> {
    let mut out = Vec::with_capacity(n);
    while out.len() < n {
        let report = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("timed out waiting for job report")
            .expect("report channel closed");
        out.push(report);
    }
    out
}

/// Provisioner that panics, for crash reporting.
pub struct PanickingProvisioner;

#[async_trait]
impl Provisioner for PanickingProvisioner {
    fn kind(&self) -> ProvisionerKind {
        ProvisionerKind::Simulated
    }

    async fn provision(&self, _request: &ProvisionRequest) -> Result<NetworkAddress, ProvisionError> {
        panic!("provisioner exploded");
    }
}
