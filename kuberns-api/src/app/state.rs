use std::sync::Arc;

use kuberns_orchestrator::{InstanceStore, JobDispatcher};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn InstanceStore>,
    /// In-process job runner, or the Redis publisher when the orchestrator runs separately.
    pub dispatcher: Arc<dyn JobDispatcher>,
}

impl AppState {
    pub fn new(store: Arc<dyn InstanceStore>, dispatcher: Arc<dyn JobDispatcher>) -> Arc<Self> {
        Arc::new(Self { store, dispatcher })
    }
}
