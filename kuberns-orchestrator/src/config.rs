use std::net::SocketAddr;
use std::time::Duration;

use kuberns_providers::{ProvisionerKind, ProvisionerSettings};

use crate::error::{OrchestratorError, OrchestratorResult};

pub const DEFAULT_API_BIND: &str = "0.0.0.0:8003";
pub const DEFAULT_ORCHESTRATOR_BIND: &str = "0.0.0.0:8001";

/// Process configuration, read from the environment (after `dotenv`).
#[derive(Debug, Clone)]
pub struct Settings {
    /// `None` selects the in-memory store.
    pub database_url: Option<String>,
    /// `None` disables the command bus; deployments run in-process.
    pub redis_url: Option<String>,
    pub provisioner: ProvisionerSettings,
    pub step_delay: Duration,
    pub worker_concurrency: usize,
    pub api_bind: SocketAddr,
    pub orchestrator_bind: SocketAddr,
}

impl Settings {
    pub fn from_env() -> OrchestratorResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> OrchestratorResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let kind = match get("PROVISIONER") {
            Some(raw) => raw.parse::<ProvisionerKind>().map_err(invalid("PROVISIONER"))?,
            None => ProvisionerKind::default(),
        };

        let defaults = ProvisionerSettings::default();
        let provisioner = ProvisionerSettings {
            kind,
            simulated_delay: millis(&get, "PROVISION_DELAY_MS", defaults.simulated_delay)?,
            control_plane_url: get("CONTROL_PLANE_URL"),
            control_plane_token: get("CONTROL_PLANE_TOKEN"),
            poll_interval: millis(&get, "CONTROL_PLANE_POLL_MS", defaults.poll_interval)?,
            max_polls: parse_or(&get, "CONTROL_PLANE_MAX_POLLS", defaults.max_polls)?,
        };

        Ok(Self {
            database_url: get("DATABASE_URL"),
            redis_url: get("REDIS_URL"),
            provisioner,
            step_delay: millis(&get, "DEPLOY_STEP_DELAY_MS", Duration::from_millis(1000))?,
            worker_concurrency: parse_or(&get, "WORKER_CONCURRENCY", 4usize)?.max(1),
            api_bind: parse_or(&get, "API_BIND", default_addr(DEFAULT_API_BIND))?,
            orchestrator_bind: parse_or(
                &get,
                "ORCHESTRATOR_BIND",
                default_addr(DEFAULT_ORCHESTRATOR_BIND),
            )?,
        })
    }
}

fn default_addr(raw: &str) -> SocketAddr {
    raw.parse()
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 8000)))
}

fn invalid<E: std::fmt::Display>(key: &'static str) -> impl Fn(E) -> OrchestratorError {
    move |e| OrchestratorError::Validation(kuberns_common::ValidationError::new(key, e.to_string()))
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> OrchestratorResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.parse::<T>().map_err(invalid(key)),
        None => Ok(default),
    }
}

fn millis<G>(get: &G, key: &'static str, default: Duration) -> OrchestratorResult<Duration>
where
    G: Fn(&str) -> Option<String>,
{
    parse_or(get, key, default.as_millis() as u64).map(Duration::from_millis)
}
