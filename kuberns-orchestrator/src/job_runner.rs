use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::state_machine::{DeploymentOutcome, DeploymentStateMachine};

/// Hands an instance to whatever executes deployments.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    async fn dispatch(&self, instance_id: Uuid) -> OrchestratorResult<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Finished(DeploymentOutcome),
    /// The job task panicked. The instance keeps its last persisted status.
    Crashed(String),
}

#[derive(Debug, Clone)]
pub struct JobReport {
    pub job_id: Uuid,
    pub instance_id: Uuid,
    pub outcome: JobOutcome,
    pub duration: Duration,
}

struct Job {
    id: Uuid,
    instance_id: Uuid,
}

const REPORT_BUFFER: usize = 256;

/// Runs deployments on a bounded pool of tokio tasks.
///
/// Submissions are fire-and-forget: jobs for different instances run in
/// parallel, up to `concurrency` at a time, in no guaranteed order.
pub struct JobRunner {
    queue: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
    reports: broadcast::Sender<JobReport>,
}

impl JobRunner {
    pub fn start(machine: Arc<DeploymentStateMachine>, concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        let (tx, rx) = mpsc::unbounded_channel();
        let (reports, _) = broadcast::channel(REPORT_BUFFER);
        let handle = tokio::spawn(dispatch_loop(machine, rx, reports.clone(), concurrency));
        tracing::info!(concurrency, "🚀 job runner started");
        Self {
            queue: Mutex::new(Some(tx)),
            loop_handle: Mutex::new(Some(handle)),
            reports,
        }
    }

    /// Queues a deployment and returns immediately.
    pub fn submit(&self, instance_id: Uuid) -> OrchestratorResult<()> {
        let queue = self.queue.lock().map_err(|_| OrchestratorError::QueueClosed)?;
        let tx = queue.as_ref().ok_or(OrchestratorError::QueueClosed)?;
        let job = Job {
            id: Uuid::new_v4(),
            instance_id,
        };
        tracing::debug!(job_id = %job.id, %instance_id, "job queued");
        tx.send(job).map_err(|_| OrchestratorError::QueueClosed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobReport> {
        self.reports.subscribe()
    }

    /// Stops accepting jobs and waits for queued and running ones to finish.
    pub async fn shutdown(&self) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.take();
        }
        let handle = self.loop_handle.lock().ok().and_then(|mut h| h.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "job runner loop ended abnormally");
            }
        }
        tracing::info!("job runner stopped");
    }
}

#[async_trait]
impl JobDispatcher for JobRunner {
    async fn dispatch(&self, instance_id: Uuid) -> OrchestratorResult<()> {
        self.submit(instance_id)
    }
}

async fn dispatch_loop(
    machine: Arc<DeploymentStateMachine>,
    mut rx: mpsc::UnboundedReceiver<Job>,
    reports: broadcast::Sender<JobReport>,
    concurrency: usize,
) {
    let permits = Arc::new(Semaphore::new(concurrency));
    while let Some(job) = rx.recv().await {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        let machine = machine.clone();
        let reports = reports.clone();
        tokio::spawn(async move {
            let report = run_job(machine, job).await;
            // No subscribers is fine.
            let _ = reports.send(report);
            drop(permit);
        });
    }
    // Every running job holds a permit; getting all of them back means the pool is idle.
    let _ = permits.acquire_many(concurrency as u32).await;
}

async fn run_job(machine: Arc<DeploymentStateMachine>, job: Job) -> JobReport {
    let started = Instant::now();
    let instance_id = job.instance_id;
    tracing::info!(job_id = %job.id, %instance_id, "▶️ deployment job started");

    // Own task so a panic is contained and reported instead of taking the pool down.
    let outcome = match tokio::spawn(async move { machine.run(instance_id).await }).await {
        Ok(outcome) => JobOutcome::Finished(outcome),
        Err(e) => {
            tracing::error!(job_id = %job.id, %instance_id, error = %e, "💥 deployment job crashed");
            JobOutcome::Crashed(e.to_string())
        }
    };

    let duration = started.elapsed();
    tracing::info!(
        job_id = %job.id,
        %instance_id,
        duration_ms = duration.as_millis() as u64,
        outcome = ?outcome,
        "deployment job finished"
    );
    JobReport {
        job_id: job.id,
        instance_id,
        outcome,
        duration,
    }
}
