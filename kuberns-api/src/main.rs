use std::sync::Arc;

use kuberns_api::{build_app, AppState};
use kuberns_orchestrator::bus::RedisDispatcher;
use kuberns_orchestrator::{store, JobDispatcher, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    dotenv::dotenv().ok();

    let settings = Settings::from_env()?;
    let store = store::connect(&settings).await?;

    // With Redis the orchestrator process runs deployments; without it they run here.
    let mut local_runner = None;
    let dispatcher: Arc<dyn JobDispatcher> = match settings.redis_url.as_deref() {
        Some(url) => {
            let client = redis::Client::open(url)?;
            tracing::info!("📡 deployments dispatched over Redis");
            Arc::new(RedisDispatcher::new(client, "api"))
        }
        None => {
            let runner = kuberns_orchestrator::start_runner(store.clone(), &settings)?;
            tracing::info!("REDIS_URL not set, running deployments in-process");
            local_runner = Some(runner.clone());
            runner
        }
    };

    let app = build_app(AppState::new(store, dispatcher));

    let listener = tokio::net::TcpListener::bind(settings.api_bind).await?;
    tracing::info!("Backend listening on {}", settings.api_bind);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    if let Some(runner) = local_runner {
        runner.shutdown().await;
    }
    Ok(())
}
