use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub mod bus;
pub mod validation;

pub use validation::{CreateWebAppRequest, NewDatabaseConfig, NewWebApp, ValidationError};

// --- Enums ---

#[derive(
    Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type, utoipa::ToSchema,
)]
#[sqlx(type_name = "instance_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Pending,      // Created with its environment, nothing started yet
    Deploying,    // Deployment task picked up
    Provisioning, // Provisioner call in flight
    Active,       // Address assigned, deployment done
    Failed,       // Terminal error state
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Pending => "pending",
            InstanceStatus::Deploying => "deploying",
            InstanceStatus::Provisioning => "provisioning",
            InstanceStatus::Active => "active",
            InstanceStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InstanceStatus::Active | InstanceStatus::Failed)
    }

    /// The only forward step allowed from this status (`failed` aside).
    pub fn next(&self) -> Option<InstanceStatus> {
        match self {
            InstanceStatus::Pending => Some(InstanceStatus::Deploying),
            InstanceStatus::Deploying => Some(InstanceStatus::Provisioning),
            InstanceStatus::Provisioning => Some(InstanceStatus::Active),
            InstanceStatus::Active | InstanceStatus::Failed => None,
        }
    }

    /// Forward-only, one step at a time; `failed` is reachable from any non-terminal status.
    pub fn can_transition_to(&self, to: InstanceStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == InstanceStatus::Failed || self.next() == Some(to)
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(InstanceStatus::Pending),
            "deploying" => Ok(InstanceStatus::Deploying),
            "provisioning" => Ok(InstanceStatus::Provisioning),
            "active" => Ok(InstanceStatus::Active),
            "failed" => Ok(InstanceStatus::Failed),
            other => Err(format!("unknown instance status '{}'", other)),
        }
    }
}

/// Declares a string-backed enum with a fixed set of (code, label) choices.
macro_rules! choice_enum {
    ($name:ident { $($variant:ident => ($code:literal, $label:literal)),+ $(,)? }) => {
        #[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, utoipa::ToSchema)]
        pub enum $name {
            $(#[serde(rename = $code)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $code),+
                }
            }

            pub fn label(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }

            /// `(code, label)` pairs, in declaration order.
            pub fn choices() -> Vec<(&'static str, &'static str)> {
                Self::ALL.iter().map(|c| (c.as_str(), c.label())).collect()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|c| c.as_str() == s.trim())
                    .ok_or_else(|| format!("unknown {} '{}'", stringify!($name), s))
            }
        }
    };
}

choice_enum!(Region {
    UsEast1 => ("us-east-1", "US East (N. Virginia)"),
    UsWest2 => ("us-west-2", "US West (Oregon)"),
    EuCentral1 => ("eu-central-1", "EU (Frankfurt)"),
});

choice_enum!(Framework {
    ReactJs => ("reactjs", "React.js"),
    NextJs => ("nextjs", "Next.js"),
    Vue => ("vue", "Vue"),
    Django => ("django", "Django"),
    Node => ("node", "Node.js"),
    Flask => ("flask", "Flask"),
    FastApi => ("fastapi", "FastAPI"),
});

choice_enum!(Plan {
    Starter => ("starter", "Starter"),
    Pro => ("pro", "Pro"),
});

choice_enum!(DatabaseType {
    None => ("none", "None"),
    Postgresql => ("postgresql", "PostgreSQL"),
    Mysql => ("mysql", "MySQL"),
});

/// Compute allocation an instance gets for its plan.
///
/// Values are kept as strings because that is how they are persisted and
/// handed to the provisioner.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, utoipa::ToSchema)]
pub struct PlanResources {
    pub cpu: String,
    pub ram: String,
    pub storage: String,
}

impl Plan {
    pub fn resources(&self) -> PlanResources {
        let (cpu, ram, storage) = match self {
            Plan::Starter => ("0.5", "512", "10GB"),
            Plan::Pro => ("2", "4096", "100GB"),
        };
        PlanResources {
            cpu: cpu.to_string(),
            ram: ram.to_string(),
            storage: storage.to_string(),
        }
    }

    /// Display details for the metadata endpoint.
    pub fn details(&self) -> PlanDetails {
        match self {
            Plan::Starter => PlanDetails {
                cpu: "0.5 vCPU".to_string(),
                ram: "512MB".to_string(),
                bandwidth: "10GB/mo".to_string(),
                price: "$10/mo".to_string(),
            },
            Plan::Pro => PlanDetails {
                cpu: "2 vCPU".to_string(),
                ram: "4GB".to_string(),
                bandwidth: "Unlimited".to_string(),
                price: "$50/mo".to_string(),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, utoipa::ToSchema)]
pub struct PlanDetails {
    pub cpu: String,
    pub ram: String,
    pub bandwidth: String,
    pub price: String,
}

// --- Entities ---

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, utoipa::ToSchema)]
pub struct WebApp {
    pub id: Uuid,
    pub name: String,
    pub region: Region,
    pub template: Framework,
    pub plan: Plan,
    pub repo: String,
    pub branch: String,
    pub organization: Option<String>,
    pub database_enabled: bool,
    pub database_type: DatabaseType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, utoipa::ToSchema)]
pub struct Environment {
    pub id: Uuid,
    pub webapp_id: Uuid,
    pub port: i32,
    pub environment_variables: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, utoipa::ToSchema)]
pub struct DatabaseConfig {
    pub id: Uuid,
    pub webapp_id: Uuid,
    pub engine: DatabaseType,
    pub name: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, sqlx::FromRow, utoipa::ToSchema)]
pub struct Instance {
    pub id: Uuid,
    pub environment_id: Uuid,
    pub cpu: String,
    pub ram: String,
    pub storage: String,
    pub status: InstanceStatus,
    pub public_ip: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Instance {
    pub fn resources(&self) -> PlanResources {
        PlanResources {
            cpu: self.cpu.clone(),
            ram: self.ram.clone(),
            storage: self.storage.clone(),
        }
    }
}

/// Append-only deployment log line.
///
/// `seq` is the insertion order and breaks ties between equal timestamps.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, sqlx::FromRow, utoipa::ToSchema)]
pub struct LogEntry {
    pub id: Uuid,
    pub instance_id: Uuid,
    pub seq: i64,
    #[serde(rename = "log_text")]
    pub message: String,
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOrder {
    #[default]
    Chronological,
    Reverse,
}

// --- Nested read models ---

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, utoipa::ToSchema)]
pub struct EnvironmentDetail {
    #[serde(flatten)]
    pub environment: Environment,
    pub instance: Instance,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, utoipa::ToSchema)]
pub struct WebAppDetail {
    #[serde(flatten)]
    pub webapp: WebApp,
    pub environment: EnvironmentDetail,
    pub database_config: Option<DatabaseConfig>,
}

impl WebAppDetail {
    pub fn instance(&self) -> &Instance {
        &self.environment.instance
    }
}
