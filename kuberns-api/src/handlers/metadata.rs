use std::collections::BTreeMap;

use axum::Json;
use kuberns_common::{DatabaseType, Framework, Plan, PlanDetails, Region};
use serde::Serialize;

/// Choice lists for the creation wizard. Each choice is a `[code, label]` pair.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct MetadataResponse {
    #[schema(value_type = Vec<Vec<String>>)]
    pub regions: Vec<(&'static str, &'static str)>,
    #[schema(value_type = Vec<Vec<String>>)]
    pub frameworks: Vec<(&'static str, &'static str)>,
    #[schema(value_type = Vec<Vec<String>>)]
    pub plans: Vec<(&'static str, &'static str)>,
    pub plan_details: BTreeMap<String, PlanDetails>,
    #[schema(value_type = Vec<Vec<String>>)]
    pub database_types: Vec<(&'static str, &'static str)>,
}

pub fn metadata_response() -> MetadataResponse {
    MetadataResponse {
        regions: Region::choices(),
        frameworks: Framework::choices(),
        plans: Plan::choices(),
        plan_details: Plan::ALL
            .iter()
            .map(|p| (p.as_str().to_string(), p.details()))
            .collect(),
        database_types: DatabaseType::choices(),
    }
}

#[utoipa::path(
    get,
    path = "/metadata",
    responses((status = 200, description = "Regions, frameworks, plans and database types", body = MetadataResponse))
)]
pub async fn metadata() -> Json<MetadataResponse> {
    Json(metadata_response())
}
