use pictor_api::setup::{self, server};
use pictor_core::Config;
use pictor_worker::{WorkerConfig, WorkerPool};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = Config::from_env()?;
    pictor_api::telemetry::init_telemetry(config.log_json());

    let role = config.role();
    tracing::info!(role = %role, "Configuration loaded");

    let app = setup::initialize_app(&config).await?;

    let workers = role.runs_workers().then(|| {
        WorkerPool::start(
            app.queue.clone(),
            app.job_handler.clone(),
            WorkerConfig::from_config(&config),
        )
    });

    let served = if role.serves_http() {
        server::start_server(&config, app.router).await
    } else {
        server::shutdown_signal().await;
        Ok(())
    };

    if let Some(workers) = workers {
        workers.shutdown().await;
    }

    served
}
