use std::{sync::Arc, time::Duration};

use tokio::signal;

use lumindoc::{
    auth::jwt::JwtService, config::AppConfig, db, default_handlers, init_tracing, s3,
    state::AppState, summarizer::GeminiClient, Worker,
};

const POLL_INTERVAL: Duration = Duration::from_secs(2);
const STALE_JOB_AGE: Duration = Duration::from_secs(15 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "worker",
        database_url = %config.redacted_database_url(),
        s3_bucket = %config.s3_bucket,
        summarizer_configured = config.summarizer.api_key.is_some(),
        model = %config.summarizer.model,
        max_attempts = config.summarizer.max_attempts,
        "loaded configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, 2)?;
    let storage = Arc::new(s3::build_storage(&config).await?);
    let summarizer = Arc::new(GeminiClient::from_config(&config.summarizer)?);
    if !summarizer.is_configured() {
        tracing::warn!("GEMINI_API_KEY is not set; summary jobs will fail");
    }
    let jwt = JwtService::from_config(&config);

    let state = Arc::new(AppState::new(pool, config, storage, summarizer, jwt));
    let worker = Worker::new(state, default_handlers(), POLL_INTERVAL);
    worker.recover_stale_jobs(STALE_JOB_AGE)?;

    worker
        .run_until(async {
            match signal::ctrl_c().await {
                Ok(()) => tracing::info!("worker received shutdown signal"),
                Err(err) => {
                    tracing::error!(error = %err, "failed to listen for shutdown signal");
                    std::future::pending::<()>().await;
                }
            }
        })
        .await;

    Ok(())
}
