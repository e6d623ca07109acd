// Common test utilities and fixtures
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum_test::TestServer;
use kuberns_api::{build_app, AppState};
use kuberns_orchestrator::store::MemoryStore;
use kuberns_orchestrator::{
    DeploymentStateMachine, InstanceStore, JobDispatcher, JobRunner, OrchestratorError,
    OrchestratorResult,
};
use kuberns_providers::simulated::SimulatedProvisioner;
use kuberns_providers::Provisioner;
use serde_json::{json, Value};
use uuid::Uuid;

pub struct TestApp {
    pub server: TestServer,
    pub store: Arc<dyn InstanceStore>,
}

/// App over a memory store with an in-process runner and the given backend.
pub fn test_app_with(provisioner: Arc<dyn Provisioner>) -> TestApp {
    let store: Arc<dyn InstanceStore> = Arc::new(MemoryStore::new());
    let machine = DeploymentStateMachine::new(store.clone(), provisioner);
    let runner = Arc::new(JobRunner::start(Arc::new(machine), 4));
    test_app_with_dispatcher(store, runner)
}

pub fn test_app() -> TestApp {
    test_app_with(Arc::new(SimulatedProvisioner::new(Duration::ZERO)))
}

pub fn test_app_with_dispatcher(
    store: Arc<dyn InstanceStore>,
    dispatcher: Arc<dyn JobDispatcher>,
) -> TestApp {
    let app = build_app(AppState::new(store.clone(), dispatcher));
    TestApp {
        server: TestServer::new(app).expect("Failed to start test server"),
        store,
    }
}

pub fn valid_payload(name: &str, plan: &str) -> Value {
    json!({
        "name": name,
        "region": "us-east-1",
        "template": "nextjs",
        "plan": plan,
        "repo": format!("acme/{}", name),
        "branch": "main",
        "environment": {
            "port": 3000,
            "environment_variables": { "NODE_ENV": "production" }
        }
    })
}

/// Creates a webapp and returns its id.
pub async fn create_webapp(app: &TestApp, name: &str, plan: &str) -> Uuid {
    let resp = app.server.post("/webapps").json(&valid_payload(name, plan)).await;
    resp.assert_status(axum::http::StatusCode::CREATED);
    let body: Value = resp.json();
    body["id"].as_str().and_then(|s| s.parse().ok()).expect("response carries an id")
}

/// Polls the status endpoint until the instance is active or failed.
pub async fn wait_for_terminal(app: &TestApp, webapp_id: Uuid) -> Value {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let body: Value = app
            .server
            .get(&format!("/webapps/{}/status", webapp_id))
            .await
            .json();
        if matches!(body["instance_status"].as_str(), Some("active") | Some("failed")) {
            return body;
        }
        assert!(tokio::time::Instant::now() < deadline, "deployment did not finish: {}", body);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Records dispatched instance ids without running anything.
#[derive(Default)]
pub struct RecordingDispatcher {
    pub dispatched: Mutex<Vec<Uuid>>,
}

#[async_trait]
impl JobDispatcher for RecordingDispatcher {
    async fn dispatch(&self, instance_id: Uuid) -> OrchestratorResult<()> {
        self.dispatched.lock().unwrap().push(instance_id);
        Ok(())
    }
}

/// Dispatcher whose queue is already closed.
pub struct ClosedDispatcher;

#[async_trait]
impl JobDispatcher for ClosedDispatcher {
    async fn dispatch(&self, _instance_id: Uuid) -> OrchestratorResult<()> {
        Err(OrchestratorError::QueueClosed)
    }
}
