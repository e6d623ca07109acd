use kuberns_common::{InstanceStatus, ValidationError};
use kuberns_providers::ProvisionError;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("provisioning failed: {0}")]
    Provision(#[from] ProvisionError),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: InstanceStatus,
        to: InstanceStatus,
    },

    #[error("job queue is closed")]
    QueueClosed,

    #[error("command bus error: {0}")]
    Bus(String),
}

impl OrchestratorError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        OrchestratorError::NotFound { entity, id }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, OrchestratorError::NotFound { .. })
    }
}

impl From<sqlx::Error> for OrchestratorError {
    fn from(e: sqlx::Error) -> Self {
        OrchestratorError::Persistence(e.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for OrchestratorError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        OrchestratorError::Persistence(format!("migration failed: {}", e))
    }
}

impl From<redis::RedisError> for OrchestratorError {
    fn from(e: redis::RedisError) -> Self {
        OrchestratorError::Bus(e.to_string())
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
