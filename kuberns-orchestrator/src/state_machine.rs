use std::sync::Arc;
use std::time::Duration;

use kuberns_common::{Instance, InstanceStatus};
use kuberns_providers::{ProvisionRequest, Provisioner};
use uuid::Uuid;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::logger::LogSink;
use crate::store::InstanceStore;

/// How one deployment run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentOutcome {
    Active { public_ip: String },
    Failed { reason: String },
    /// Another run had already claimed the instance.
    Skipped { status: InstanceStatus },
}

impl DeploymentOutcome {
    pub fn status(&self) -> Option<InstanceStatus> {
        match self {
            DeploymentOutcome::Active { .. } => Some(InstanceStatus::Active),
            DeploymentOutcome::Failed { .. } => Some(InstanceStatus::Failed),
            DeploymentOutcome::Skipped { .. } => None,
        }
    }
}

/// Drives one instance from `pending` to `active` or `failed`.
///
/// Every status write is a compare-and-set on the previous status, and each
/// step's log entry is appended only after its status write succeeded.
pub struct DeploymentStateMachine {
    store: Arc<dyn InstanceStore>,
    logs: LogSink,
    provisioner: Arc<dyn Provisioner>,
    step_delay: Duration,
}

impl DeploymentStateMachine {
    pub fn new(store: Arc<dyn InstanceStore>, provisioner: Arc<dyn Provisioner>) -> Self {
        Self {
            logs: LogSink::new(store.clone()),
            store,
            provisioner,
            step_delay: Duration::ZERO,
        }
    }

    /// Pause between steps so the dashboard can show each phase.
    pub fn with_step_delay(mut self, step_delay: Duration) -> Self {
        self.step_delay = step_delay;
        self
    }

    pub fn logs(&self) -> &LogSink {
        &self.logs
    }

    /// Runs the deployment to a terminal status. Never returns an error:
    /// failures are recorded on the instance and reported in the outcome.
    pub async fn run(&self, instance_id: Uuid) -> DeploymentOutcome {
        match self.drive(instance_id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let reason = e.to_string();
                tracing::error!(%instance_id, error = %reason, "❌ deployment failed");
                self.mark_failed(instance_id, &reason).await;
                DeploymentOutcome::Failed { reason }
            }
        }
    }

    async fn drive(&self, instance_id: Uuid) -> OrchestratorResult<DeploymentOutcome> {
        let instance = self.store.get_instance(instance_id).await?;
        if instance.status != InstanceStatus::Pending {
            tracing::warn!(%instance_id, status = %instance.status, "deployment already handled, skipping");
            return Ok(DeploymentOutcome::Skipped {
                status: instance.status,
            });
        }

        // Claim the instance. Losing this race means another run owns it.
        let instance = match self
            .transition(&instance, InstanceStatus::Deploying, None)
            .await
        {
            Ok(i) => i,
            Err(OrchestratorError::InvalidTransition { from, .. }) => {
                tracing::warn!(%instance_id, status = %from, "deployment claimed by another run, skipping");
                return Ok(DeploymentOutcome::Skipped { status: from });
            }
            Err(e) => return Err(e),
        };
        self.logs.info(instance_id, "Deployment task received.").await?;
        self.logs.info(instance_id, "Deployment started...").await?;
        self.pause().await;

        let instance = self
            .transition(&instance, InstanceStatus::Provisioning, None)
            .await?;
        self.logs
            .info(instance_id, "Provisioning cloud resources...")
            .await?;
        self.pause().await;

        let webapp = self.store.webapp_for_instance(instance_id).await?;
        let request = ProvisionRequest {
            instance_id,
            cpu: instance.cpu.clone(),
            ram: instance.ram.clone(),
            storage: instance.storage.clone(),
            region: webapp.region.as_str().to_string(),
        };
        self.logs
            .info(
                instance_id,
                &format!(
                    "Initiating provisioning request (cpu={}, ram={}MB, storage={})...",
                    request.cpu, request.ram, request.storage
                ),
            )
            .await?;
        let address = self.provisioner.provision(&request).await?;
        self.logs
            .info(
                instance_id,
                &format!("Provision success. Instance running at {}", address),
            )
            .await?;
        self.pause().await;

        let instance = self
            .transition(&instance, InstanceStatus::Active, Some(address.as_str()))
            .await?;

        // Status is terminal from here on; a lost log line must not turn it into a failure.
        let public_ip = instance
            .public_ip
            .unwrap_or_else(|| address.into_string());
        for (line, ok) in [
            (format!("Instance provisioned. Assigned public IP: {}", public_ip), false),
            ("Deployment completed successfully!".to_string(), true),
        ] {
            let res = if ok {
                self.logs.success(instance_id, &line).await
            } else {
                self.logs.info(instance_id, &line).await
            };
            if let Err(e) = res {
                tracing::warn!(%instance_id, error = %e, "could not append deployment log");
            }
        }

        tracing::info!(%instance_id, %public_ip, "✅ deployment active");
        Ok(DeploymentOutcome::Active { public_ip })
    }

    async fn transition(
        &self,
        current: &Instance,
        to: InstanceStatus,
        public_ip: Option<&str>,
    ) -> OrchestratorResult<Instance> {
        let updated = self
            .store
            .update_instance_status(current.id, current.status, to, public_ip)
            .await?;
        tracing::info!(
            instance_id = %current.id,
            from = %current.status,
            to = %updated.status,
            "🔄 status transition"
        );
        Ok(updated)
    }

    /// Best effort: nothing here may fail the caller.
    async fn mark_failed(&self, instance_id: Uuid, reason: &str) {
        match self.store.fail_instance(instance_id).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(%instance_id, "instance already terminal, not marking failed");
                return;
            }
            Err(e) if e.is_not_found() => {
                tracing::warn!(%instance_id, "instance no longer exists, nothing to mark failed");
                return;
            }
            Err(e) => {
                tracing::error!(%instance_id, error = %e, "could not persist failed status");
            }
        }
        if let Err(e) = self
            .logs
            .error(instance_id, &format!("Deployment failed: {}", reason))
            .await
        {
            tracing::error!(%instance_id, error = %e, "could not append failure log");
        }
    }

    async fn pause(&self) {
        if !self.step_delay.is_zero() {
            tokio::time::sleep(self.step_delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use kuberns_common::validation::EnvironmentRequest;
    use kuberns_common::{CreateWebAppRequest, LogOrder};
    use kuberns_providers::simulated::{FailingProvisioner, SimulatedProvisioner};
    use kuberns_providers::ProvisionError;

    async fn pending_instance(store: &MemoryStore, plan: &str) -> Uuid {
        let app = CreateWebAppRequest {
            name: "api".to_string(),
            region: "us-west-2".to_string(),
            template: "fastapi".to_string(),
            plan: plan.to_string(),
            repo: "acme/api".to_string(),
            branch: "main".to_string(),
            environment: Some(EnvironmentRequest {
                port: Some(8080),
                ..Default::default()
            }),
            ..Default::default()
        }
        .validate()
        .unwrap();
        store.create_webapp(&app).await.unwrap().instance().id
    }

    #[tokio::test]
    async fn success_writes_the_full_trail() {
        let store = Arc::new(MemoryStore::new());
        let id = pending_instance(&store, "starter").await;
        let machine = DeploymentStateMachine::new(
            store.clone(),
            Arc::new(SimulatedProvisioner::new(Duration::ZERO)),
        );

        let outcome = machine.run(id).await;
        let expected_ip = SimulatedProvisioner::synthesize_address(id).into_string();
        assert_eq!(
            outcome,
            DeploymentOutcome::Active {
                public_ip: expected_ip.clone()
            }
        );

        let messages: Vec<String> = store
            .list_logs(id, LogOrder::Chronological, None)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.message)
            .collect();
        assert_eq!(
            messages,
            vec![
                "[INFO] Deployment task received.".to_string(),
                "[INFO] Deployment started...".to_string(),
                "[INFO] Provisioning cloud resources...".to_string(),
                "[INFO] Initiating provisioning request (cpu=0.5, ram=512MB, storage=10GB)...".to_string(),
                format!("[INFO] Provision success. Instance running at {}", expected_ip),
                format!("[INFO] Instance provisioned. Assigned public IP: {}", expected_ip),
                "[SUCCESS] Deployment completed successfully!".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn provisioner_failure_marks_failed() {
        let store = Arc::new(MemoryStore::new());
        let id = pending_instance(&store, "pro").await;
        let machine = DeploymentStateMachine::new(
            store.clone(),
            Arc::new(FailingProvisioner::new(ProvisionError::terminal("quota exceeded"))),
        );

        let outcome = machine.run(id).await;
        assert!(matches!(outcome, DeploymentOutcome::Failed { ref reason } if reason.contains("quota exceeded")));

        let inst = store.get_instance(id).await.unwrap();
        assert_eq!(inst.status, InstanceStatus::Failed);
        assert!(inst.public_ip.is_none());
        let last = store.list_logs(id, LogOrder::Reverse, Some(1)).await.unwrap();
        assert_eq!(last[0].message, "[ERROR] Deployment failed: provisioning failed: quota exceeded");
    }

    #[tokio::test]
    async fn second_run_is_skipped() {
        let store = Arc::new(MemoryStore::new());
        let id = pending_instance(&store, "starter").await;
        let machine = DeploymentStateMachine::new(
            store.clone(),
            Arc::new(SimulatedProvisioner::new(Duration::ZERO)),
        );

        assert!(matches!(machine.run(id).await, DeploymentOutcome::Active { .. }));
        let before = store.list_logs(id, LogOrder::Chronological, None).await.unwrap();

        assert_eq!(
            machine.run(id).await,
            DeploymentOutcome::Skipped {
                status: InstanceStatus::Active
            }
        );
        let after = store.list_logs(id, LogOrder::Chronological, None).await.unwrap();
        assert_eq!(before, after);
        assert_eq!(store.get_instance(id).await.unwrap().status, InstanceStatus::Active);
    }

    #[tokio::test]
    async fn missing_instance_fails_quietly() {
        let store = Arc::new(MemoryStore::new());
        let machine = DeploymentStateMachine::new(
            store,
            Arc::new(SimulatedProvisioner::new(Duration::ZERO)),
        );
        let outcome = machine.run(Uuid::new_v4()).await;
        assert!(matches!(outcome, DeploymentOutcome::Failed { ref reason } if reason.contains("not found")));
    }

    /// Delegates to a [`MemoryStore`], failing the n-th call of one write.
    struct FlakyStore {
        inner: MemoryStore,
        fail_append_at: Option<usize>,
        fail_status_to: Option<InstanceStatus>,
        appends: std::sync::atomic::AtomicUsize,
    }

    impl FlakyStore {
        fn new(inner: MemoryStore) -> Self {
            Self {
                inner,
                fail_append_at: None,
                fail_status_to: None,
                appends: std::sync::atomic::AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl InstanceStore for FlakyStore {
        async fn create_webapp(
            &self,
            new: &kuberns_common::NewWebApp,
        ) -> OrchestratorResult<kuberns_common::WebAppDetail> {
            self.inner.create_webapp(new).await
        }
        async fn get_webapp(&self, id: Uuid) -> OrchestratorResult<kuberns_common::WebAppDetail> {
            self.inner.get_webapp(id).await
        }
        async fn list_webapps(&self) -> OrchestratorResult<Vec<kuberns_common::WebAppDetail>> {
            self.inner.list_webapps().await
        }
        async fn delete_webapp(&self, id: Uuid) -> OrchestratorResult<()> {
            self.inner.delete_webapp(id).await
        }
        async fn get_environment(
            &self,
            id: Uuid,
        ) -> OrchestratorResult<kuberns_common::EnvironmentDetail> {
            self.inner.get_environment(id).await
        }
        async fn list_environments(
            &self,
        ) -> OrchestratorResult<Vec<kuberns_common::EnvironmentDetail>> {
            self.inner.list_environments().await
        }
        async fn get_instance(&self, id: Uuid) -> OrchestratorResult<Instance> {
            self.inner.get_instance(id).await
        }
        async fn list_instances(&self) -> OrchestratorResult<Vec<Instance>> {
            self.inner.list_instances().await
        }
        async fn webapp_for_instance(
            &self,
            instance_id: Uuid,
        ) -> OrchestratorResult<kuberns_common::WebApp> {
            self.inner.webapp_for_instance(instance_id).await
        }
        async fn update_instance_status(
            &self,
            id: Uuid,
            expected: InstanceStatus,
            status: InstanceStatus,
            public_ip: Option<&str>,
        ) -> OrchestratorResult<Instance> {
            if self.fail_status_to == Some(status) {
                return Err(OrchestratorError::Persistence("connection reset".to_string()));
            }
            self.inner
                .update_instance_status(id, expected, status, public_ip)
                .await
        }
        async fn fail_instance(&self, id: Uuid) -> OrchestratorResult<bool> {
            self.inner.fail_instance(id).await
        }
        async fn append_log(
            &self,
            instance_id: Uuid,
            message: &str,
        ) -> OrchestratorResult<kuberns_common::LogEntry> {
            let n = self
                .appends
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
                + 1;
            if self.fail_append_at == Some(n) {
                return Err(OrchestratorError::Persistence("disk full".to_string()));
            }
            self.inner.append_log(instance_id, message).await
        }
        async fn list_logs(
            &self,
            instance_id: Uuid,
            order: LogOrder,
            limit: Option<usize>,
        ) -> OrchestratorResult<Vec<kuberns_common::LogEntry>> {
            self.inner.list_logs(instance_id, order, limit).await
        }
        async fn list_all_logs(
            &self,
            limit: Option<usize>,
        ) -> OrchestratorResult<Vec<kuberns_common::LogEntry>> {
            self.inner.list_all_logs(limit).await
        }
    }

    async fn assert_failed_with(store: &FlakyStore, id: Uuid, outcome: DeploymentOutcome, reason: &str) {
        assert_eq!(
            outcome,
            DeploymentOutcome::Failed {
                reason: reason.to_string()
            }
        );
        let inst = store.get_instance(id).await.unwrap();
        assert_eq!(inst.status, InstanceStatus::Failed);
        assert!(inst.public_ip.is_none());
        let last = store.list_logs(id, LogOrder::Reverse, Some(1)).await.unwrap();
        assert_eq!(last[0].message, format!("[ERROR] Deployment failed: {}", reason));
    }

    #[tokio::test]
    async fn log_write_error_mid_run_marks_failed() {
        let inner = MemoryStore::new();
        let id = pending_instance(&inner, "starter").await;
        let store = Arc::new(FlakyStore {
            fail_append_at: Some(3),
            ..FlakyStore::new(inner)
        });
        let machine = DeploymentStateMachine::new(
            store.clone(),
            Arc::new(SimulatedProvisioner::new(Duration::ZERO)),
        );

        let outcome = machine.run(id).await;
        assert_failed_with(&store, id, outcome, "persistence error: disk full").await;
        let messages: Vec<String> = store
            .list_logs(id, LogOrder::Chronological, None)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.message)
            .collect();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1], "[INFO] Deployment started...");
    }

    #[tokio::test]
    async fn status_write_error_mid_run_marks_failed() {
        let inner = MemoryStore::new();
        let id = pending_instance(&inner, "starter").await;
        let store = Arc::new(FlakyStore {
            fail_status_to: Some(InstanceStatus::Active),
            ..FlakyStore::new(inner)
        });
        let machine = DeploymentStateMachine::new(
            store.clone(),
            Arc::new(SimulatedProvisioner::new(Duration::ZERO)),
        );

        let outcome = machine.run(id).await;
        assert_failed_with(&store, id, outcome, "persistence error: connection reset").await;
    }
}
