mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use kuberns_common::{InstanceStatus, LogOrder};
use kuberns_orchestrator::{DeploymentOutcome, JobOutcome};
use kuberns_providers::simulated::{FailingProvisioner, SimulatedProvisioner};
use kuberns_providers::ProvisionError;

#[tokio::test]
async fn starter_app_reaches_active() {
    let store = memory_store();
    let app = store.create_webapp(&new_webapp("shop", "starter")).await.unwrap();
    let id = app.instance().id;

    let runner = runner_with(store.clone(), Arc::new(SimulatedProvisioner::new(Duration::from_millis(20))), 4);
    let mut reports = runner.subscribe();
    runner.submit(id).unwrap();

    let report = collect_reports(&mut reports, 1).await.remove(0);
    assert_eq!(report.instance_id, id);

    let inst = store.get_instance(id).await.unwrap();
    assert_eq!(inst.status, InstanceStatus::Active);
    assert_eq!((inst.cpu.as_str(), inst.ram.as_str(), inst.storage.as_str()), ("0.5", "512", "10GB"));
    let ip = inst.public_ip.clone().expect("active instance has an address");
    assert!(!ip.is_empty());
    assert_eq!(report.outcome, JobOutcome::Finished(DeploymentOutcome::Active { public_ip: ip }));

    let logs = store.list_logs(id, LogOrder::Chronological, None).await.unwrap();
    assert!(logs.len() >= 5);
    assert!(logs.last().unwrap().message.contains("successfully"));
    runner.shutdown().await;
}

#[tokio::test]
async fn pro_app_with_failing_provisioner_fails() {
    let store = memory_store();
    let id = store.create_webapp(&new_webapp("api", "pro")).await.unwrap().instance().id;

    let runner = runner_with(
        store.clone(),
        Arc::new(FailingProvisioner::new(ProvisionError::terminal("capacity exhausted in us-east-1"))),
        4,
    );
    let mut reports = runner.subscribe();
    runner.submit(id).unwrap();
    collect_reports(&mut reports, 1).await;

    let inst = store.get_instance(id).await.unwrap();
    assert_eq!(inst.status, InstanceStatus::Failed);
    assert_eq!((inst.cpu.as_str(), inst.ram.as_str(), inst.storage.as_str()), ("2", "4096", "100GB"));
    assert!(inst.public_ip.is_none());

    let last = store.list_logs(id, LogOrder::Reverse, Some(1)).await.unwrap();
    assert!(last[0].message.starts_with("[ERROR]"));
    assert!(last[0].message.contains("capacity exhausted in us-east-1"));
    runner.shutdown().await;
}

#[tokio::test]
async fn concurrent_instances_keep_separate_ordered_logs() {
    let store = memory_store();
    let a = store.create_webapp(&new_webapp("alpha", "starter")).await.unwrap().instance().id;
    let b = store.create_webapp(&new_webapp("beta", "pro")).await.unwrap().instance().id;

    let runner = runner_with(store.clone(), Arc::new(SimulatedProvisioner::new(Duration::from_millis(30))), 4);
    let mut reports = runner.subscribe();
    runner.submit(a).unwrap();
    runner.submit(b).unwrap();
    collect_reports(&mut reports, 2).await;

    for id in [a, b] {
        let inst = store.get_instance(id).await.unwrap();
        assert!(inst.status.is_terminal());

        let oldest_first = store.list_logs(id, LogOrder::Chronological, None).await.unwrap();
        assert!(oldest_first.iter().all(|e| e.instance_id == id));
        assert!(oldest_first.windows(2).all(|w| (w[0].created_at, w[0].seq) <= (w[1].created_at, w[1].seq)));

        let mut reverse = store.list_logs(id, LogOrder::Reverse, None).await.unwrap();
        reverse.reverse();
        assert_eq!(oldest_first, reverse);
    }
    runner.shutdown().await;
}

#[tokio::test]
async fn double_submit_does_not_corrupt_state() {
    let store = memory_store();
    let id = store.create_webapp(&new_webapp("twice", "starter")).await.unwrap().instance().id;

    let runner = runner_with(store.clone(), Arc::new(SimulatedProvisioner::new(Duration::from_millis(20))), 4);
    let mut reports = runner.subscribe();
    runner.submit(id).unwrap();
    runner.submit(id).unwrap();
    let reports = collect_reports(&mut reports, 2).await;

    let active = reports
        .iter()
        .filter(|r| matches!(r.outcome, JobOutcome::Finished(DeploymentOutcome::Active { .. })))
        .count();
    let skipped = reports
        .iter()
        .filter(|r| matches!(r.outcome, JobOutcome::Finished(DeploymentOutcome::Skipped { .. })))
        .count();
    assert_eq!((active, skipped), (1, 1));

    assert_eq!(store.get_instance(id).await.unwrap().status, InstanceStatus::Active);
    let logs = store.list_logs(id, LogOrder::Chronological, None).await.unwrap();
    let received = logs.iter().filter(|e| e.message.contains("task received")).count();
    assert_eq!(received, 1);
    assert!(logs.last().unwrap().message.starts_with("[SUCCESS]"));
    runner.shutdown().await;
}

#[tokio::test]
async fn crashed_job_is_reported_and_leaves_last_status() {
    let store = memory_store();
    let id = store.create_webapp(&new_webapp("boom", "starter")).await.unwrap().instance().id;

    let runner = runner_with(store.clone(), Arc::new(PanickingProvisioner), 1);
    let mut reports = runner.subscribe();
    runner.submit(id).unwrap();

    let report = collect_reports(&mut reports, 1).await.remove(0);
    assert!(matches!(report.outcome, JobOutcome::Crashed(_)));
    assert_eq!(store.get_instance(id).await.unwrap().status, InstanceStatus::Provisioning);

    // The pool survives a crashed job.
    let next = store.create_webapp(&new_webapp("after", "starter")).await.unwrap().instance().id;
    runner.submit(next).unwrap();
    let report = collect_reports(&mut reports, 1).await.remove(0);
    assert_eq!(report.instance_id, next);
    runner.shutdown().await;
}

#[tokio::test]
async fn shutdown_waits_for_running_jobs() {
    let store = memory_store();
    let id = store.create_webapp(&new_webapp("slow", "starter")).await.unwrap().instance().id;

    let runner = runner_with(store.clone(), Arc::new(SimulatedProvisioner::new(Duration::from_millis(100))), 2);
    runner.submit(id).unwrap();
    runner.shutdown().await;

    assert_eq!(store.get_instance(id).await.unwrap().status, InstanceStatus::Active);
}

#[tokio::test]
async fn deleted_webapp_mid_deployment_does_not_crash() {
    let store = memory_store();
    let app = store.create_webapp(&new_webapp("gone", "starter")).await.unwrap();
    let id = app.instance().id;

    let runner = runner_with(store.clone(), Arc::new(SimulatedProvisioner::new(Duration::from_millis(200))), 1);
    let mut reports = runner.subscribe();
    runner.submit(id).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    store.delete_webapp(app.webapp.id).await.unwrap();

    let report = collect_reports(&mut reports, 1).await.remove(0);
    assert!(matches!(report.outcome, JobOutcome::Finished(DeploymentOutcome::Failed { .. })));
    assert!(store.get_instance(id).await.unwrap_err().is_not_found());
    runner.shutdown().await;
}
