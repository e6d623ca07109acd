use crate::{NetworkAddress, ProvisionError, ProvisionRequest, Provisioner, ProvisionerKind};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use uuid::Uuid;

/// Stand-in for a real resource-allocation API.
///
/// Sleeps for a bounded delay, then always succeeds with a `54.x.y.z`
/// address derived from the instance id, so the same instance always gets
/// the same address.
pub struct SimulatedProvisioner {
    delay: Duration,
}

impl SimulatedProvisioner {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn synthesize_address(instance_id: Uuid) -> NetworkAddress {
        let (hi, lo) = instance_id.as_u64_pair();
        let mut rng = StdRng::seed_from_u64(hi ^ lo);
        NetworkAddress::new(format!(
            "54.{}.{}.{}",
            rng.gen::<u8>(),
            rng.gen::<u8>(),
            rng.gen::<u8>()
        ))
    }
}

#[async_trait]
impl Provisioner for SimulatedProvisioner {
    fn kind(&self) -> ProvisionerKind {
        ProvisionerKind::Simulated
    }

    async fn provision(&self, request: &ProvisionRequest) -> Result<NetworkAddress, ProvisionError> {
        tracing::debug!(
            instance_id = %request.instance_id,
            cpu = %request.cpu,
            ram = %request.ram,
            storage = %request.storage,
            region = %request.region,
            delay_ms = self.delay.as_millis() as u64,
            "simulated provisioning"
        );
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(Self::synthesize_address(request.instance_id))
    }
}

/// Backend that never succeeds. Used to exercise the failure path.
pub struct FailingProvisioner {
    error: ProvisionError,
    delay: Duration,
}

impl FailingProvisioner {
    pub fn new(error: ProvisionError) -> Self {
        Self {
            error,
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Provisioner for FailingProvisioner {
    fn kind(&self) -> ProvisionerKind {
        ProvisionerKind::Simulated
    }

    async fn provision(&self, _request: &ProvisionRequest) -> Result<NetworkAddress, ProvisionError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Err(self.error.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(instance_id: Uuid) -> ProvisionRequest {
        ProvisionRequest {
            instance_id,
            cpu: "0.5".to_string(),
            ram: "512".to_string(),
            storage: "10GB".to_string(),
            region: "us-east-1".to_string(),
        }
    }

    #[tokio::test]
    async fn same_instance_same_address() {
        let p = SimulatedProvisioner::new(Duration::ZERO);
        let id = Uuid::new_v4();
        let a = p.provision(&request(id)).await.unwrap();
        let b = p.provision(&request(id)).await.unwrap();
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("54."));
        let octets: Vec<&str> = a.as_str().split('.').collect();
        assert_eq!(octets.len(), 4);
        assert!(octets.iter().all(|o| o.parse::<u8>().is_ok()));
    }

    #[tokio::test]
    async fn delay_is_applied() {
        let p = SimulatedProvisioner::new(Duration::from_millis(30));
        let start = std::time::Instant::now();
        p.provision(&request(Uuid::new_v4())).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn failing_backend_returns_its_error() {
        let p = FailingProvisioner::new(ProvisionError::terminal("capacity exhausted"));
        let err = p.provision(&request(Uuid::new_v4())).await.unwrap_err();
        assert_eq!(err.reason(), "capacity exhausted");
        assert!(!err.is_retryable());
    }
}
