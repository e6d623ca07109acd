use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// What the orchestrator asks a backend to allocate for one instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProvisionRequest {
    pub instance_id: Uuid,
    pub cpu: String,
    pub ram: String,
    pub storage: String,
    pub region: String,
}

/// Public address of a provisioned instance.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NetworkAddress(String);

impl NetworkAddress {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Provisioning failure, split by whether trying again could help.
///
/// Rate limits, transport errors and "created but not reachable yet" are
/// retryable; rejected requests and exhausted quotas are terminal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProvisionError {
    #[error("{reason} (retryable)")]
    Retryable { reason: String },
    #[error("{reason}")]
    Terminal { reason: String },
}

impl ProvisionError {
    pub fn retryable(reason: impl Into<String>) -> Self {
        Self::Retryable {
            reason: reason.into(),
        }
    }

    pub fn terminal(reason: impl Into<String>) -> Self {
        Self::Terminal {
            reason: reason.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ProvisionError::Retryable { .. })
    }

    pub fn reason(&self) -> &str {
        match self {
            ProvisionError::Retryable { reason } | ProvisionError::Terminal { reason } => reason,
        }
    }
}

#[async_trait]
pub trait Provisioner: Send + Sync {
    fn kind(&self) -> ProvisionerKind;

    /// Allocates compute for the instance and returns its public address.
    /// Expected to take seconds; callers must run it off the request path.
    async fn provision(&self, request: &ProvisionRequest) -> Result<NetworkAddress, ProvisionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProvisionerKind {
    #[default]
    Simulated,
    Cloud,
}

impl ProvisionerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisionerKind::Simulated => "simulated",
            ProvisionerKind::Cloud => "cloud",
        }
    }
}

impl fmt::Display for ProvisionerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProvisionerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simulated" | "mock" => Ok(ProvisionerKind::Simulated),
            "cloud" => Ok(ProvisionerKind::Cloud),
            other => Err(format!("unknown provisioner '{}'", other)),
        }
    }
}

/// Construction-time inputs for [`ProvisionerManager::get_provisioner`].
#[derive(Debug, Clone)]
pub struct ProvisionerSettings {
    pub kind: ProvisionerKind,
    pub simulated_delay: Duration,
    pub control_plane_url: Option<String>,
    pub control_plane_token: Option<String>,
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl Default for ProvisionerSettings {
    fn default() -> Self {
        Self {
            kind: ProvisionerKind::Simulated,
            simulated_delay: Duration::from_secs(2),
            control_plane_url: None,
            control_plane_token: None,
            poll_interval: Duration::from_secs(3),
            max_polls: 20,
        }
    }
}

pub struct ProvisionerManager;

impl ProvisionerManager {
    /// Builds the backend selected by `settings.kind`.
    ///
    /// Returns `None` when the backend is not compiled in or is missing
    /// required settings (e.g. cloud without a control-plane URL).
    pub fn get_provisioner(settings: &ProvisionerSettings) -> Option<Arc<dyn Provisioner>> {
        match settings.kind {
            #[cfg(feature = "simulated")]
            ProvisionerKind::Simulated => Some(Arc::new(simulated::SimulatedProvisioner::new(
                settings.simulated_delay,
            ))),
            #[cfg(feature = "cloud")]
            ProvisionerKind::Cloud => {
                let base_url = settings
                    .control_plane_url
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())?;
                Some(Arc::new(
                    cloud::HttpControlPlaneProvisioner::new(
                        base_url,
                        settings.control_plane_token.clone(),
                    )
                    .with_polling(settings.poll_interval, settings.max_polls),
                ))
            }
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }
}

#[cfg(feature = "simulated")]
pub mod simulated;

#[cfg(feature = "cloud")]
pub mod cloud;
