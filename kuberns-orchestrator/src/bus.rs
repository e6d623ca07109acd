use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use kuberns_common::bus::{CommandEnvelope, CommandType, CHANNEL_ORCHESTRATOR_COMMANDS};
use redis::AsyncCommands;
use uuid::Uuid;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::job_runner::{JobDispatcher, JobRunner};

/// Publishes `CMD:DEPLOY` for a separately running orchestrator.
///
/// Pub/Sub delivers at most once: a command published while no orchestrator
/// is subscribed is lost and the instance stays `pending`.
#[derive(Clone)]
pub struct RedisDispatcher {
    client: redis::Client,
    source: String,
}

impl RedisDispatcher {
    pub fn new(client: redis::Client, source: &str) -> Self {
        Self {
            client,
            source: source.to_string(),
        }
    }

    pub async fn publish(&self, command: &CommandEnvelope) -> OrchestratorResult<()> {
        let payload = serde_json::to_string(command)
            .map_err(|e| OrchestratorError::Bus(format!("encode command: {}", e)))?;
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let receivers: i64 = conn.publish(CHANNEL_ORCHESTRATOR_COMMANDS, &payload).await?;
        if receivers == 0 {
            tracing::warn!(
                instance_id = %command.instance_id,
                "no orchestrator subscribed to '{}', command will be lost",
                CHANNEL_ORCHESTRATOR_COMMANDS
            );
        }
        tracing::info!(
            event_id = %command.event_id,
            instance_id = %command.instance_id,
            receivers,
            "📤 {} published",
            command.command_type.as_str()
        );
        Ok(())
    }
}

#[async_trait]
impl JobDispatcher for RedisDispatcher {
    async fn dispatch(&self, instance_id: Uuid) -> OrchestratorResult<()> {
        let command = CommandEnvelope::deploy(instance_id, None, &self.source);
        self.publish(&command).await
    }
}

/// Decodes one bus payload. Unknown or malformed payloads yield `None`.
pub fn parse_command(payload: &str) -> Option<CommandEnvelope> {
    serde_json::from_str::<CommandEnvelope>(payload).ok()
}

/// Subscribes to the command channel and submits every `CMD:DEPLOY` to the
/// local runner. Returns when the subscription stream ends.
pub async fn listen(client: redis::Client, runner: Arc<JobRunner>) -> OrchestratorResult<()> {
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.subscribe(CHANNEL_ORCHESTRATOR_COMMANDS).await?;
    tracing::info!(
        "🎧 listening on Redis channel '{}'",
        CHANNEL_ORCHESTRATOR_COMMANDS
    );

    let mut stream = pubsub.on_message();
    while let Some(msg) = stream.next().await {
        let payload: String = match msg.get_payload() {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "unreadable bus payload");
                continue;
            }
        };
        let Some(command) = parse_command(&payload) else {
            tracing::debug!(%payload, "ignoring unrecognized bus message");
            continue;
        };
        match command.command_type {
            CommandType::Deploy => {
                tracing::info!(
                    event_id = %command.event_id,
                    instance_id = %command.instance_id,
                    source = %command.source,
                    "📩 CMD:DEPLOY received"
                );
                if let Err(e) = runner.submit(command.instance_id) {
                    tracing::error!(instance_id = %command.instance_id, error = %e, "could not submit deployment");
                }
            }
        }
    }

    Err(OrchestratorError::Bus("subscription stream ended".to_string()))
}
