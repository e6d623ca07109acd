use std::sync::Arc;

use kuberns_common::{LogEntry, LogOrder};
use uuid::Uuid;

use crate::error::OrchestratorResult;
use crate::store::InstanceStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Success,
    Error,
}

impl LogLevel {
    pub fn tag(&self) -> &'static str {
        match self {
            LogLevel::Info => "[INFO]",
            LogLevel::Success => "[SUCCESS]",
            LogLevel::Error => "[ERROR]",
        }
    }
}

/// Append-only deployment log for instances.
///
/// Every entry is written to the store and mirrored to the process log.
#[derive(Clone)]
pub struct LogSink {
    store: Arc<dyn InstanceStore>,
}

impl LogSink {
    pub fn new(store: Arc<dyn InstanceStore>) -> Self {
        Self { store }
    }

    /// Fails only with `NotFound` (instance gone) or a persistence error.
    pub async fn append(&self, instance_id: Uuid, message: &str) -> OrchestratorResult<LogEntry> {
        let entry = self.store.append_log(instance_id, message).await?;
        tracing::info!(%instance_id, seq = entry.seq, "📝 {}", entry.message);
        Ok(entry)
    }

    pub async fn write(
        &self,
        instance_id: Uuid,
        level: LogLevel,
        text: &str,
    ) -> OrchestratorResult<LogEntry> {
        self.append(instance_id, &format!("{} {}", level.tag(), text))
            .await
    }

    pub async fn info(&self, instance_id: Uuid, text: &str) -> OrchestratorResult<LogEntry> {
        self.write(instance_id, LogLevel::Info, text).await
    }

    pub async fn success(&self, instance_id: Uuid, text: &str) -> OrchestratorResult<LogEntry> {
        self.write(instance_id, LogLevel::Success, text).await
    }

    pub async fn error(&self, instance_id: Uuid, text: &str) -> OrchestratorResult<LogEntry> {
        self.write(instance_id, LogLevel::Error, text).await
    }

    pub async fn list(
        &self,
        instance_id: Uuid,
        order: LogOrder,
        limit: Option<usize>,
    ) -> OrchestratorResult<Vec<LogEntry>> {
        self.store.list_logs(instance_id, order, limit).await
    }

    /// Newest `n` entries, newest first.
    pub async fn latest(&self, instance_id: Uuid, n: usize) -> OrchestratorResult<Vec<LogEntry>> {
        self.list(instance_id, LogOrder::Reverse, Some(n)).await
    }

    /// Full trail, oldest first.
    pub async fn audit_trail(&self, instance_id: Uuid) -> OrchestratorResult<Vec<LogEntry>> {
        self.list(instance_id, LogOrder::Chronological, None).await
    }
}
