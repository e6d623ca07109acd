use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::{DatabaseType, Framework, Plan, PlanResources, Region};

pub const MIN_PORT: i64 = 1024;
pub const MAX_PORT: i64 = 65535;

/// A creation request rejected before anything was written.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct EnvironmentRequest {
    pub port: Option<i64>,
    #[serde(default)]
    pub environment_variables: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct DatabaseConfigRequest {
    pub name: Option<String>,
    pub username: Option<String>,
}

/// Raw `POST /webapps` payload. Choice fields stay strings until validated.
#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CreateWebAppRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub template: String,
    #[serde(default)]
    pub plan: String,
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub branch: String,
    pub organization: Option<String>,
    #[serde(default)]
    pub database_enabled: bool,
    pub database_type: Option<String>,
    pub environment: Option<EnvironmentRequest>,
    pub database_config: Option<DatabaseConfigRequest>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDatabaseConfig {
    pub engine: DatabaseType,
    pub name: String,
    pub username: String,
}

/// A validated creation request, ready to be written in one go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWebApp {
    pub name: String,
    pub region: Region,
    pub template: Framework,
    pub plan: Plan,
    pub repo: String,
    pub branch: String,
    pub organization: Option<String>,
    pub database_enabled: bool,
    pub database_type: DatabaseType,
    pub port: i32,
    pub environment_variables: BTreeMap<String, String>,
    pub database_config: Option<NewDatabaseConfig>,
}

impl NewWebApp {
    pub fn resources(&self) -> PlanResources {
        self.plan.resources()
    }
}

fn parse_choice<T: FromStr>(field: &str, raw: &str, message: &str) -> Result<T, ValidationError> {
    raw.parse::<T>()
        .map_err(|_| ValidationError::new(field, message))
}

fn required(field: &str, raw: &str, message: &str) -> Result<String, ValidationError> {
    let v = raw.trim();
    if v.is_empty() {
        return Err(ValidationError::new(field, message));
    }
    Ok(v.to_string())
}

impl CreateWebAppRequest {
    /// Checks the request in the same order the dashboard wizard reports errors.
    pub fn validate(self) -> Result<NewWebApp, ValidationError> {
        let name = required("name", &self.name, "App name is required")?;
        let region: Region = parse_choice("region", &self.region, "Invalid region selected")?;
        let template: Framework = parse_choice("template", &self.template, "Invalid framework")?;
        let plan: Plan = parse_choice("plan", &self.plan, "Invalid plan type")?;
        let repo = required("repo", &self.repo, "Repository is required")?;
        let branch = required("branch", &self.branch, "Branch is required")?;

        let env = self
            .environment
            .ok_or_else(|| ValidationError::new("environment", "Environment is required"))?;

        let port = match env.port {
            Some(p) if (MIN_PORT..=MAX_PORT).contains(&p) => p as i32,
            _ => {
                return Err(ValidationError::new(
                    "environment",
                    format!("Port must be between {} and {}", MIN_PORT, MAX_PORT),
                ))
            }
        };

        for (key, value) in &env.environment_variables {
            if key.trim().is_empty() || value.is_empty() {
                return Err(ValidationError::new(
                    "environment",
                    format!("Invalid environment variable: {}={}", key, value),
                ));
            }
        }

        let database_type = match self.database_type.as_deref().map(str::trim) {
            None | Some("") if self.database_enabled => {
                return Err(ValidationError::new(
                    "database_type",
                    "Database type required when enabled",
                ))
            }
            None | Some("") => DatabaseType::None,
            Some(raw) => parse_choice("database_type", raw, "Invalid database type")?,
        };

        let database_config = match (self.database_enabled, self.database_config) {
            (true, Some(cfg)) if database_type != DatabaseType::None => Some(NewDatabaseConfig {
                engine: database_type,
                name: cfg
                    .name
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| format!("{}_db", name)),
                username: cfg
                    .username
                    .filter(|u| !u.trim().is_empty())
                    .unwrap_or_else(|| "db_user".to_string()),
            }),
            _ => None,
        };

        Ok(NewWebApp {
            name,
            region,
            template,
            plan,
            repo,
            branch,
            organization: self.organization.filter(|o| !o.trim().is_empty()),
            database_enabled: self.database_enabled,
            database_type,
            port,
            environment_variables: env.environment_variables,
            database_config,
        })
    }
}
