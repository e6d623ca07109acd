//! In-memory store. Data is lost when the process exits.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use kuberns_common::{
    DatabaseConfig, Environment, EnvironmentDetail, Instance, InstanceStatus, LogEntry, LogOrder,
    NewWebApp, WebApp, WebAppDetail,
};
use uuid::Uuid;

use super::InstanceStore;
use crate::error::{OrchestratorError, OrchestratorResult};

#[derive(Debug, Default)]
struct Tables {
    webapps: HashMap<Uuid, WebApp>,
    environments: HashMap<Uuid, Environment>,
    database_configs: HashMap<Uuid, DatabaseConfig>,
    instances: HashMap<Uuid, Instance>,
    // webapp id -> environment id, environment id -> instance id
    environment_of: HashMap<Uuid, Uuid>,
    instance_of: HashMap<Uuid, Uuid>,
    // per instance, in insertion order
    logs: HashMap<Uuid, Vec<LogEntry>>,
    next_seq: i64,
}

impl Tables {
    fn environment_detail(&self, environment_id: Uuid) -> OrchestratorResult<EnvironmentDetail> {
        let environment = self
            .environments
            .get(&environment_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::not_found("environment", environment_id))?;
        let instance = self
            .instance_of
            .get(&environment_id)
            .and_then(|id| self.instances.get(id))
            .cloned()
            .ok_or_else(|| {
                OrchestratorError::Persistence(format!(
                    "environment {} has no instance",
                    environment_id
                ))
            })?;
        Ok(EnvironmentDetail {
            environment,
            instance,
        })
    }

    fn webapp_detail(&self, webapp_id: Uuid) -> OrchestratorResult<WebAppDetail> {
        let webapp = self
            .webapps
            .get(&webapp_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::not_found("webapp", webapp_id))?;
        let environment_id = self.environment_of.get(&webapp_id).copied().ok_or_else(|| {
            OrchestratorError::Persistence(format!("webapp {} has no environment", webapp_id))
        })?;
        Ok(WebAppDetail {
            webapp,
            environment: self.environment_detail(environment_id)?,
            database_config: self.database_configs.get(&webapp_id).cloned(),
        })
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> OrchestratorResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| OrchestratorError::Persistence("lock poisoned".to_string()))
    }

    fn write(&self) -> OrchestratorResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| OrchestratorError::Persistence("lock poisoned".to_string()))
    }
}

#[async_trait]
impl InstanceStore for MemoryStore {
    async fn create_webapp(&self, new: &NewWebApp) -> OrchestratorResult<WebAppDetail> {
        let now = Utc::now();
        let webapp = WebApp {
            id: Uuid::new_v4(),
            name: new.name.clone(),
            region: new.region,
            template: new.template,
            plan: new.plan,
            repo: new.repo.clone(),
            branch: new.branch.clone(),
            organization: new.organization.clone(),
            database_enabled: new.database_enabled,
            database_type: new.database_type,
            created_at: now,
            updated_at: now,
        };
        let environment = Environment {
            id: Uuid::new_v4(),
            webapp_id: webapp.id,
            port: new.port,
            environment_variables: new.environment_variables.clone(),
            created_at: now,
            updated_at: now,
        };
        let resources = new.resources();
        let instance = Instance {
            id: Uuid::new_v4(),
            environment_id: environment.id,
            cpu: resources.cpu,
            ram: resources.ram,
            storage: resources.storage,
            status: InstanceStatus::Pending,
            public_ip: None,
            created_at: now,
            updated_at: now,
        };
        let database_config = new.database_config.as_ref().map(|db| DatabaseConfig {
            id: Uuid::new_v4(),
            webapp_id: webapp.id,
            engine: db.engine,
            name: db.name.clone(),
            username: db.username.clone(),
            created_at: now,
        });

        let mut t = self.write()?;
        let webapp_id = webapp.id;
        t.environment_of.insert(webapp_id, environment.id);
        t.instance_of.insert(environment.id, instance.id);
        t.logs.insert(instance.id, Vec::new());
        t.instances.insert(instance.id, instance);
        t.environments.insert(environment.id, environment);
        if let Some(db) = database_config {
            t.database_configs.insert(webapp_id, db);
        }
        t.webapps.insert(webapp_id, webapp);
        t.webapp_detail(webapp_id)
    }

    async fn get_webapp(&self, id: Uuid) -> OrchestratorResult<WebAppDetail> {
        self.read()?.webapp_detail(id)
    }

    async fn list_webapps(&self) -> OrchestratorResult<Vec<WebAppDetail>> {
        let t = self.read()?;
        let mut apps: Vec<&WebApp> = t.webapps.values().collect();
        apps.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        apps.into_iter().map(|a| t.webapp_detail(a.id)).collect()
    }

    async fn delete_webapp(&self, id: Uuid) -> OrchestratorResult<()> {
        let mut t = self.write()?;
        if t.webapps.remove(&id).is_none() {
            return Err(OrchestratorError::not_found("webapp", id));
        }
        t.database_configs.remove(&id);
        if let Some(environment_id) = t.environment_of.remove(&id) {
            t.environments.remove(&environment_id);
            if let Some(instance_id) = t.instance_of.remove(&environment_id) {
                t.instances.remove(&instance_id);
                t.logs.remove(&instance_id);
            }
        }
        Ok(())
    }

    async fn get_environment(&self, id: Uuid) -> OrchestratorResult<EnvironmentDetail> {
        self.read()?.environment_detail(id)
    }

    async fn list_environments(&self) -> OrchestratorResult<Vec<EnvironmentDetail>> {
        let t = self.read()?;
        let mut envs: Vec<&Environment> = t.environments.values().collect();
        envs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        envs.into_iter().map(|e| t.environment_detail(e.id)).collect()
    }

    async fn get_instance(&self, id: Uuid) -> OrchestratorResult<Instance> {
        self.read()?
            .instances
            .get(&id)
            .cloned()
            .ok_or_else(|| OrchestratorError::not_found("instance", id))
    }

    async fn list_instances(&self) -> OrchestratorResult<Vec<Instance>> {
        let t = self.read()?;
        let mut instances: Vec<Instance> = t.instances.values().cloned().collect();
        instances.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(instances)
    }

    async fn webapp_for_instance(&self, instance_id: Uuid) -> OrchestratorResult<WebApp> {
        let t = self.read()?;
        t.instances
            .get(&instance_id)
            .and_then(|i| t.environments.get(&i.environment_id))
            .and_then(|e| t.webapps.get(&e.webapp_id))
            .cloned()
            .ok_or_else(|| OrchestratorError::not_found("instance", instance_id))
    }

    async fn update_instance_status(
        &self,
        id: Uuid,
        expected: InstanceStatus,
        status: InstanceStatus,
        public_ip: Option<&str>,
    ) -> OrchestratorResult<Instance> {
        if !expected.can_transition_to(status) {
            return Err(OrchestratorError::InvalidTransition {
                from: expected,
                to: status,
            });
        }
        let mut t = self.write()?;
        let instance = t
            .instances
            .get_mut(&id)
            .ok_or_else(|| OrchestratorError::not_found("instance", id))?;
        if instance.status != expected {
            return Err(OrchestratorError::InvalidTransition {
                from: instance.status,
                to: status,
            });
        }
        instance.status = status;
        if let Some(ip) = public_ip {
            instance.public_ip = Some(ip.to_string());
        }
        instance.updated_at = Utc::now();
        Ok(instance.clone())
    }

    async fn fail_instance(&self, id: Uuid) -> OrchestratorResult<bool> {
        let mut t = self.write()?;
        let instance = t
            .instances
            .get_mut(&id)
            .ok_or_else(|| OrchestratorError::not_found("instance", id))?;
        if instance.status.is_terminal() {
            return Ok(false);
        }
        instance.status = InstanceStatus::Failed;
        instance.updated_at = Utc::now();
        Ok(true)
    }

    async fn append_log(&self, instance_id: Uuid, message: &str) -> OrchestratorResult<LogEntry> {
        let mut t = self.write()?;
        if !t.instances.contains_key(&instance_id) {
            return Err(OrchestratorError::not_found("instance", instance_id));
        }
        t.next_seq += 1;
        let seq = t.next_seq;
        let entries = t.logs.entry(instance_id).or_default();
        let now = Utc::now();
        let created_at = match entries.last() {
            Some(last) if last.created_at > now => last.created_at,
            _ => now,
        };
        let entry = LogEntry {
            id: Uuid::new_v4(),
            instance_id,
            seq,
            message: message.to_string(),
            created_at,
        };
        entries.push(entry.clone());
        Ok(entry)
    }

    async fn list_logs(
        &self,
        instance_id: Uuid,
        order: LogOrder,
        limit: Option<usize>,
    ) -> OrchestratorResult<Vec<LogEntry>> {
        let t = self.read()?;
        if !t.instances.contains_key(&instance_id) {
            return Err(OrchestratorError::not_found("instance", instance_id));
        }
        let entries = t.logs.get(&instance_id).map(Vec::as_slice).unwrap_or_default();
        let limit = limit.unwrap_or(usize::MAX);
        Ok(match order {
            LogOrder::Chronological => entries.iter().take(limit).cloned().collect(),
            LogOrder::Reverse => entries.iter().rev().take(limit).cloned().collect(),
        })
    }

    async fn list_all_logs(&self, limit: Option<usize>) -> OrchestratorResult<Vec<LogEntry>> {
        let t = self.read()?;
        let mut all: Vec<LogEntry> = t.logs.values().flatten().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.seq.cmp(&a.seq)));
        all.truncate(limit.unwrap_or(usize::MAX));
        Ok(all)
    }
}
