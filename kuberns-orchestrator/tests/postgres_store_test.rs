// Runs against DATABASE_URL; every test is a no-op when it is unset.
mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use kuberns_common::{DatabaseType, InstanceStatus, LogOrder};
use kuberns_orchestrator::store::InstanceStore;
use kuberns_orchestrator::{DeploymentOutcome, DeploymentStateMachine, OrchestratorError};
use kuberns_providers::simulated::{FailingProvisioner, SimulatedProvisioner};
use kuberns_providers::ProvisionError;
use uuid::Uuid;

macro_rules! pg_store_or_skip {
    () => {
        match postgres_store().await {
            Some(store) => store,
            None => {
                eprintln!("DATABASE_URL not set, skipping");
                return;
            }
        }
    };
}

#[tokio::test]
async fn create_and_read_back() {
    let store = pg_store_or_skip!();
    let created = store.create_webapp(&new_webapp_with_database("pgapp")).await.unwrap();
    let inst = created.instance();
    assert_eq!(inst.status, InstanceStatus::Pending);
    assert_eq!((inst.cpu.as_str(), inst.ram.as_str(), inst.storage.as_str()), ("2", "4096", "100GB"));

    let db = created.database_config.as_ref().expect("database config created");
    assert_eq!(db.engine, DatabaseType::Postgresql);
    assert_eq!(db.name, "pgapp_db");

    let fetched = store.get_webapp(created.webapp.id).await.unwrap();
    assert_eq!(fetched.webapp.id, created.webapp.id);
    assert_eq!(fetched.environment.environment.environment_variables["NODE_ENV"], "production");
    assert_eq!(store.webapp_for_instance(inst.id).await.unwrap().id, created.webapp.id);

    store.delete_webapp(created.webapp.id).await.unwrap();
}

#[tokio::test]
async fn status_updates_are_compare_and_set() {
    let store = pg_store_or_skip!();
    let app = store.create_webapp(&new_webapp("pgcas", "starter")).await.unwrap();
    let id = app.instance().id;

    store
        .update_instance_status(id, InstanceStatus::Pending, InstanceStatus::Deploying, None)
        .await
        .unwrap();
    let err = store
        .update_instance_status(id, InstanceStatus::Pending, InstanceStatus::Deploying, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::InvalidTransition { from: InstanceStatus::Deploying, to: InstanceStatus::Deploying }
    ));
    assert!(store.fail_instance(id).await.unwrap());
    assert!(!store.fail_instance(id).await.unwrap());

    let missing = store
        .update_instance_status(Uuid::new_v4(), InstanceStatus::Pending, InstanceStatus::Deploying, None)
        .await
        .unwrap_err();
    assert!(missing.is_not_found());

    store.delete_webapp(app.webapp.id).await.unwrap();
}

#[tokio::test]
async fn log_timestamps_never_go_backwards() {
    let store = pg_store_or_skip!();
    let app = store.create_webapp(&new_webapp("pglogs", "starter")).await.unwrap();
    let id = app.instance().id;
    for i in 0..10 {
        store.append_log(id, &format!("[INFO] line {}", i)).await.unwrap();
    }

    let oldest_first = store.list_logs(id, LogOrder::Chronological, None).await.unwrap();
    assert_eq!(oldest_first.len(), 10);
    assert!(oldest_first.windows(2).all(|w| w[0].created_at <= w[1].created_at && w[0].seq < w[1].seq));
    let mut reverse = store.list_logs(id, LogOrder::Reverse, None).await.unwrap();
    reverse.reverse();
    assert_eq!(oldest_first, reverse);
    assert_eq!(store.list_logs(id, LogOrder::Reverse, Some(3)).await.unwrap()[0].message, "[INFO] line 9");
    assert_eq!(store.list_logs(id, LogOrder::Chronological, Some(usize::MAX)).await.unwrap().len(), 10);
    assert!(store.list_all_logs(Some(usize::MAX)).await.unwrap().len() >= 10);

    assert!(store.append_log(Uuid::new_v4(), "orphan").await.unwrap_err().is_not_found());

    store.delete_webapp(app.webapp.id).await.unwrap();
    assert!(store.list_logs(id, LogOrder::Chronological, None).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn state_machine_against_postgres() {
    let Some(pg) = postgres_store().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };
    let store: Arc<dyn InstanceStore> = Arc::new(pg);

    let ok = store.create_webapp(&new_webapp("pgok", "starter")).await.unwrap();
    let machine = DeploymentStateMachine::new(store.clone(), Arc::new(SimulatedProvisioner::new(Duration::ZERO)));
    assert!(matches!(machine.run(ok.instance().id).await, DeploymentOutcome::Active { .. }));
    let inst = store.get_instance(ok.instance().id).await.unwrap();
    assert_eq!(inst.status, InstanceStatus::Active);
    assert!(inst.public_ip.is_some());

    let bad = store.create_webapp(&new_webapp("pgbad", "pro")).await.unwrap();
    let machine = DeploymentStateMachine::new(
        store.clone(),
        Arc::new(FailingProvisioner::new(ProvisionError::retryable("rate limited"))),
    );
    assert!(matches!(machine.run(bad.instance().id).await, DeploymentOutcome::Failed { .. }));
    let inst = store.get_instance(bad.instance().id).await.unwrap();
    assert_eq!(inst.status, InstanceStatus::Failed);
    assert!(inst.public_ip.is_none());
    let last = store.list_logs(inst.id, LogOrder::Reverse, Some(1)).await.unwrap();
    assert!(last[0].message.contains("rate limited"));

    store.delete_webapp(ok.webapp.id).await.unwrap();
    store.delete_webapp(bad.webapp.id).await.unwrap();
}
