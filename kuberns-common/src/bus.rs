use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -----------------------------------------------------------------------------
// Channels / Streams
// -----------------------------------------------------------------------------

pub const CHANNEL_ORCHESTRATOR_COMMANDS: &str = "orchestrator_events";

// -----------------------------------------------------------------------------
// Commands (CMD:*)
// -----------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum CommandType {
    #[serde(rename = "CMD:DEPLOY")]
    Deploy,
}

impl CommandType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandType::Deploy => "CMD:DEPLOY",
        }
    }
}

/// Message published on [`CHANNEL_ORCHESTRATOR_COMMANDS`].
///
/// Pub/Sub is fire-and-forget: a command published while no orchestrator is
/// subscribed is lost.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CommandEnvelope {
    pub event_id: Uuid,
    #[serde(rename = "type")]
    pub command_type: CommandType,
    pub occurred_at: DateTime<Utc>,
    pub instance_id: Uuid,
    pub correlation_id: Option<String>,
    pub source: String,
}

impl CommandEnvelope {
    pub fn deploy(instance_id: Uuid, correlation_id: Option<String>, source: &str) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            command_type: CommandType::Deploy,
            occurred_at: Utc::now(),
            instance_id,
            correlation_id,
            source: source.to_string(),
        }
    }
}
