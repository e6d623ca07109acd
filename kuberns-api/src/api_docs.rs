use crate::handlers::{environments, instances, logs, metadata, webapps};
use crate::services::{WebAppLogs, WebAppStatus};
use kuberns_common::validation::{DatabaseConfigRequest, EnvironmentRequest};
use kuberns_common::{
    CreateWebAppRequest, DatabaseConfig, DatabaseType, Environment, EnvironmentDetail, Framework,
    Instance, InstanceStatus, LogEntry, Plan, PlanDetails, Region, WebApp, WebAppDetail,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        webapps::create_webapp,
        webapps::list_webapps,
        webapps::get_webapp,
        webapps::delete_webapp,
        webapps::webapp_status,
        webapps::webapp_logs,
        environments::list_environments,
        environments::get_environment,
        instances::list_instances,
        instances::get_instance,
        logs::list_logs,
        metadata::metadata
    ),
    components(
        schemas(
            CreateWebAppRequest,
            EnvironmentRequest,
            DatabaseConfigRequest,
            webapps::CreateWebAppResponse,
            WebAppStatus,
            WebAppLogs,
            metadata::MetadataResponse,
            WebApp,
            WebAppDetail,
            Environment,
            EnvironmentDetail,
            DatabaseConfig,
            Instance,
            InstanceStatus,
            LogEntry,
            Region,
            Framework,
            Plan,
            PlanDetails,
            DatabaseType
        )
    ),
    tags(
        (name = "kuberns", description = "WebApp deployment API")
    )
)]
pub struct ApiDoc;
