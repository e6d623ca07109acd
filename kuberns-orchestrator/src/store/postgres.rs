use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kuberns_common::{
    DatabaseConfig, Environment, EnvironmentDetail, Instance, InstanceStatus, LogEntry, LogOrder,
    NewWebApp, WebApp, WebAppDetail,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use super::InstanceStore;
use crate::error::{OrchestratorError, OrchestratorResult};

const INSTANCE_COLUMNS: &str =
    "id, environment_id, cpu, ram, storage, status, public_ip, created_at, updated_at";
const LOG_COLUMNS: &str = "id, instance_id, seq, message, created_at";

#[derive(Clone)]
pub struct PostgresStore {
    db: Pool<Postgres>,
}

#[derive(sqlx::FromRow)]
struct WebAppRow {
    id: Uuid,
    name: String,
    region: String,
    template: String,
    plan: String,
    repo: String,
    branch: String,
    organization: Option<String>,
    database_enabled: bool,
    database_type: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct EnvironmentRow {
    id: Uuid,
    webapp_id: Uuid,
    port: i32,
    environment_variables: Json<BTreeMap<String, String>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct DatabaseConfigRow {
    id: Uuid,
    webapp_id: Uuid,
    engine: String,
    name: String,
    username: String,
    created_at: DateTime<Utc>,
}

fn decode<T: std::str::FromStr>(column: &str, raw: &str) -> OrchestratorResult<T> {
    raw.parse::<T>().map_err(|_| {
        OrchestratorError::Persistence(format!("unexpected {} value '{}' in database", column, raw))
    })
}

/// Postgres LIMIT is a signed bigint.
fn clamp_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

impl TryFrom<WebAppRow> for WebApp {
    type Error = OrchestratorError;

    fn try_from(r: WebAppRow) -> OrchestratorResult<Self> {
        Ok(WebApp {
            id: r.id,
            region: decode("region", &r.region)?,
            template: decode("template", &r.template)?,
            plan: decode("plan", &r.plan)?,
            database_type: decode("database_type", &r.database_type)?,
            name: r.name,
            repo: r.repo,
            branch: r.branch,
            organization: r.organization,
            database_enabled: r.database_enabled,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

impl From<EnvironmentRow> for Environment {
    fn from(r: EnvironmentRow) -> Self {
        Environment {
            id: r.id,
            webapp_id: r.webapp_id,
            port: r.port,
            environment_variables: r.environment_variables.0,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

impl TryFrom<DatabaseConfigRow> for DatabaseConfig {
    type Error = OrchestratorError;

    fn try_from(r: DatabaseConfigRow) -> OrchestratorResult<Self> {
        Ok(DatabaseConfig {
            id: r.id,
            webapp_id: r.webapp_id,
            engine: decode("engine", &r.engine)?,
            name: r.name,
            username: r.username,
            created_at: r.created_at,
        })
    }
}

impl PostgresStore {
    pub async fn connect(database_url: &str) -> OrchestratorResult<Self> {
        let db = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { db })
    }

    pub fn from_pool(db: Pool<Postgres>) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.db
    }

    /// Applies `sqlx-migrations/`. Safe on every startup (sqlx takes a lock).
    pub async fn migrate(&self) -> OrchestratorResult<()> {
        sqlx::migrate!("../sqlx-migrations").run(&self.db).await?;
        Ok(())
    }

    async fn environment_detail(&self, env: Environment) -> OrchestratorResult<EnvironmentDetail> {
        let instance: Instance = sqlx::query_as(&format!(
            "SELECT {} FROM instances WHERE environment_id = $1",
            INSTANCE_COLUMNS
        ))
        .bind(env.id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| {
            OrchestratorError::Persistence(format!("environment {} has no instance", env.id))
        })?;
        Ok(EnvironmentDetail {
            environment: env,
            instance,
        })
    }

    async fn webapp_detail(&self, webapp: WebApp) -> OrchestratorResult<WebAppDetail> {
        let env: EnvironmentRow = sqlx::query_as(
            "SELECT id, webapp_id, port, environment_variables, created_at, updated_at
             FROM environments WHERE webapp_id = $1",
        )
        .bind(webapp.id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| {
            OrchestratorError::Persistence(format!("webapp {} has no environment", webapp.id))
        })?;

        let database_config = sqlx::query_as::<_, DatabaseConfigRow>(
            "SELECT id, webapp_id, engine, name, username, created_at
             FROM database_configs WHERE webapp_id = $1",
        )
        .bind(webapp.id)
        .fetch_optional(&self.db)
        .await?
        .map(DatabaseConfig::try_from)
        .transpose()?;

        Ok(WebAppDetail {
            webapp,
            environment: self.environment_detail(env.into()).await?,
            database_config,
        })
    }

    async fn instance_status(&self, id: Uuid) -> OrchestratorResult<Option<InstanceStatus>> {
        Ok(sqlx::query_scalar("SELECT status FROM instances WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?)
    }
}

#[async_trait]
impl InstanceStore for PostgresStore {
    async fn create_webapp(&self, new: &NewWebApp) -> OrchestratorResult<WebAppDetail> {
        let webapp_id = Uuid::new_v4();
        let environment_id = Uuid::new_v4();
        let instance_id = Uuid::new_v4();
        let resources = new.resources();

        let mut tx = self.db.begin().await?;

        sqlx::query(
            "INSERT INTO webapps
               (id, name, region, template, plan, repo, branch, organization,
                database_enabled, database_type, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), NOW())",
        )
        .bind(webapp_id)
        .bind(&new.name)
        .bind(new.region.as_str())
        .bind(new.template.as_str())
        .bind(new.plan.as_str())
        .bind(&new.repo)
        .bind(&new.branch)
        .bind(new.organization.as_deref())
        .bind(new.database_enabled)
        .bind(new.database_type.as_str())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO environments (id, webapp_id, port, environment_variables, created_at, updated_at)
             VALUES ($1, $2, $3, $4, NOW(), NOW())",
        )
        .bind(environment_id)
        .bind(webapp_id)
        .bind(new.port)
        .bind(Json(&new.environment_variables))
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO instances (id, environment_id, cpu, ram, storage, status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, 'pending', NOW(), NOW())",
        )
        .bind(instance_id)
        .bind(environment_id)
        .bind(&resources.cpu)
        .bind(&resources.ram)
        .bind(&resources.storage)
        .execute(&mut *tx)
        .await?;

        if let Some(db) = &new.database_config {
            sqlx::query(
                "INSERT INTO database_configs (id, webapp_id, engine, name, username, created_at)
                 VALUES ($1, $2, $3, $4, $5, NOW())",
            )
            .bind(Uuid::new_v4())
            .bind(webapp_id)
            .bind(db.engine.as_str())
            .bind(&db.name)
            .bind(&db.username)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        self.get_webapp(webapp_id).await
    }

    async fn get_webapp(&self, id: Uuid) -> OrchestratorResult<WebAppDetail> {
        let row: WebAppRow = sqlx::query_as("SELECT * FROM webapps WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("webapp", id))?;
        self.webapp_detail(row.try_into()?).await
    }

    async fn list_webapps(&self) -> OrchestratorResult<Vec<WebAppDetail>> {
        let rows: Vec<WebAppRow> =
            sqlx::query_as("SELECT * FROM webapps ORDER BY created_at DESC, id DESC")
                .fetch_all(&self.db)
                .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(self.webapp_detail(row.try_into()?).await?);
        }
        Ok(out)
    }

    async fn delete_webapp(&self, id: Uuid) -> OrchestratorResult<()> {
        let res = sqlx::query("DELETE FROM webapps WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        if res.rows_affected() == 0 {
            return Err(OrchestratorError::not_found("webapp", id));
        }
        Ok(())
    }

    async fn get_environment(&self, id: Uuid) -> OrchestratorResult<EnvironmentDetail> {
        let row: EnvironmentRow = sqlx::query_as(
            "SELECT id, webapp_id, port, environment_variables, created_at, updated_at
             FROM environments WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| OrchestratorError::not_found("environment", id))?;
        self.environment_detail(row.into()).await
    }

    async fn list_environments(&self) -> OrchestratorResult<Vec<EnvironmentDetail>> {
        let rows: Vec<EnvironmentRow> = sqlx::query_as(
            "SELECT id, webapp_id, port, environment_variables, created_at, updated_at
             FROM environments ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.db)
        .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(self.environment_detail(row.into()).await?);
        }
        Ok(out)
    }

    async fn get_instance(&self, id: Uuid) -> OrchestratorResult<Instance> {
        sqlx::query_as(&format!("SELECT {} FROM instances WHERE id = $1", INSTANCE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("instance", id))
    }

    async fn list_instances(&self) -> OrchestratorResult<Vec<Instance>> {
        Ok(sqlx::query_as(&format!(
            "SELECT {} FROM instances ORDER BY created_at DESC, id DESC",
            INSTANCE_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?)
    }

    async fn webapp_for_instance(&self, instance_id: Uuid) -> OrchestratorResult<WebApp> {
        let row: WebAppRow = sqlx::query_as(
            "SELECT w.*
             FROM instances i
             JOIN environments e ON e.id = i.environment_id
             JOIN webapps w ON w.id = e.webapp_id
             WHERE i.id = $1",
        )
        .bind(instance_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| OrchestratorError::not_found("instance", instance_id))?;
        row.try_into()
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

        let updated: Option<Instance> = sqlx::query_as(&format!(
            "UPDATE instances
             SET status = $3,
                 public_ip = COALESCE($4, public_ip),
                 updated_at = NOW()
             WHERE id = $1 AND status = $2
             RETURNING {}",
            INSTANCE_COLUMNS
        ))
        .bind(id)
        .bind(expected)
        .bind(status)
        .bind(public_ip)
        .fetch_optional(&self.db)
        .await?;

        match updated {
            Some(instance) => Ok(instance),
            None => match self.instance_status(id).await? {
                Some(current) => Err(OrchestratorError::InvalidTransition {
                    from: current,
                    to: status,
                }),
                None => Err(OrchestratorError::not_found("instance", id)),
            },
        }
    }

    async fn fail_instance(&self, id: Uuid) -> OrchestratorResult<bool> {
        let res = sqlx::query(
            "UPDATE instances
             SET status = 'failed', updated_at = NOW()
             WHERE id = $1 AND status IN ('pending', 'deploying', 'provisioning')",
        )
        .bind(id)
        .execute(&self.db)
        .await?;

        if res.rows_affected() > 0 {
            return Ok(true);
        }
        match self.instance_status(id).await? {
            Some(_) => Ok(false),
            None => Err(OrchestratorError::not_found("instance", id)),
        }
    }

    async fn append_log(&self, instance_id: Uuid, message: &str) -> OrchestratorResult<LogEntry> {
        // Clamp to the newest existing entry so timestamps never go backwards.
        sqlx::query_as(&format!(
            "INSERT INTO deployment_logs (id, instance_id, message, created_at)
             SELECT $1, i.id, $3, GREATEST(
                 clock_timestamp(),
                 COALESCE((SELECT MAX(l.created_at) FROM deployment_logs l WHERE l.instance_id = i.id),
                          '-infinity'::timestamptz))
             FROM instances i
             WHERE i.id = $2
             RETURNING {}",
            LOG_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(instance_id)
        .bind(message)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| OrchestratorError::not_found("instance", instance_id))
    }

    async fn list_logs(
        &self,
        instance_id: Uuid,
        order: LogOrder,
        limit: Option<usize>,
    ) -> OrchestratorResult<Vec<LogEntry>> {
        if self.instance_status(instance_id).await?.is_none() {
            return Err(OrchestratorError::not_found("instance", instance_id));
        }
        let direction = match order {
            LogOrder::Chronological => "ASC",
            LogOrder::Reverse => "DESC",
        };
        Ok(sqlx::query_as(&format!(
            "SELECT {cols} FROM deployment_logs
             WHERE instance_id = $1
             ORDER BY created_at {dir}, seq {dir}
             LIMIT $2",
            cols = LOG_COLUMNS,
            dir = direction
        ))
        .bind(instance_id)
        .bind(limit.map(clamp_limit))
        .fetch_all(&self.db)
        .await?)
    }

    async fn list_all_logs(&self, limit: Option<usize>) -> OrchestratorResult<Vec<LogEntry>> {
        Ok(sqlx::query_as(&format!(
            "SELECT {} FROM deployment_logs ORDER BY created_at DESC, seq DESC LIMIT $1",
            LOG_COLUMNS
        ))
        .bind(limit.map(clamp_limit))
        .fetch_all(&self.db)
        .await?)
    }
}
