use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use kuberns_orchestrator::{bus, store, InstanceStore, JobOutcome, JobRunner, Settings};
use serde_json::json;

struct AppState {
    store: Arc<dyn InstanceStore>,
}

async fn root() -> &'static str {
    "Kuberns Orchestrator v0.1.0 Running"
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.list_instances().await {
        Ok(instances) => {
            let mut by_status: BTreeMap<&'static str, usize> = BTreeMap::new();
            for i in &instances {
                *by_status.entry(i.status.as_str()).or_default() += 1;
            }
            (
                axum::http::StatusCode::OK,
                Json(json!({"status": "ok", "instances": by_status})),
            )
        }
        Err(e) => (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "degraded", "error": e.to_string()})),
        ),
    }
}

fn log_reports(runner: &JobRunner) {
    let mut reports = runner.subscribe();
    tokio::spawn(async move {
        while let Ok(report) = reports.recv().await {
            if let JobOutcome::Crashed(reason) = &report.outcome {
                tracing::error!(instance_id = %report.instance_id, %reason, "job crashed, instance left in last persisted status");
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    dotenv::dotenv().ok();

    let settings = Settings::from_env()?;
    let store = store::connect(&settings).await?;
    let runner = kuberns_orchestrator::start_runner(store.clone(), &settings)?;
    log_reports(&runner);

    match settings.redis_url.as_deref() {
        Some(url) => {
            if settings.database_url.is_none() {
                tracing::warn!("REDIS_URL set without DATABASE_URL: the API and this process will not share state");
            }
            let client = redis::Client::open(url)?;
            let runner = runner.clone();
            tokio::spawn(async move {
                if let Err(e) = bus::listen(client, runner).await {
                    tracing::error!(error = %e, "command bus listener stopped");
                }
            });
        }
        None => tracing::warn!("REDIS_URL not set, no commands will be received"),
    }

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .with_state(Arc::new(AppState { store }));

    let listener = tokio::net::TcpListener::bind(settings.orchestrator_bind).await?;
    tracing::info!("Orchestrator listening on {}", settings.orchestrator_bind);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    runner.shutdown().await;
    Ok(())
}
