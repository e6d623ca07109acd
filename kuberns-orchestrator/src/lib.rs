pub mod bus;
pub mod config;
pub mod error;
pub mod job_runner;
pub mod logger;
pub mod state_machine;
pub mod store;

use std::sync::Arc;

use kuberns_providers::{Provisioner, ProvisionerManager};

pub use config::Settings;
pub use error::{OrchestratorError, OrchestratorResult};
pub use job_runner::{JobDispatcher, JobOutcome, JobReport, JobRunner};
pub use logger::LogSink;
pub use state_machine::{DeploymentOutcome, DeploymentStateMachine};
pub use store::InstanceStore;

/// Builds the configured provisioning backend.
pub fn build_provisioner(settings: &Settings) -> OrchestratorResult<Arc<dyn Provisioner>> {
    let provisioner = ProvisionerManager::get_provisioner(&settings.provisioner).ok_or_else(|| {
        OrchestratorError::Validation(kuberns_common::ValidationError::new(
            "PROVISIONER",
            format!(
                "provisioner '{}' is not available (not compiled in or CONTROL_PLANE_URL missing)",
                settings.provisioner.kind
            ),
        ))
    })?;
    tracing::info!(provisioner = %provisioner.kind(), "provisioner selected");
    Ok(provisioner)
}

/// Wires store, provisioner and state machine into a started job runner.
pub fn start_runner(
    store: Arc<dyn InstanceStore>,
    settings: &Settings,
) -> OrchestratorResult<Arc<JobRunner>> {
    let provisioner = build_provisioner(settings)?;
    let machine = DeploymentStateMachine::new(store, provisioner).with_step_delay(settings.step_delay);
    Ok(Arc::new(JobRunner::start(
        Arc::new(machine),
        settings.worker_concurrency,
    )))
}
