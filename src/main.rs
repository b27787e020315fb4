use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::{net::TcpListener, signal};
use tracing::info;

use lumindoc::{
    auth::jwt::JwtService, config::AppConfig, db, init_tracing, routes::create_router, s3,
    state::AppState, summarizer::GeminiClient,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    info!(
        component = "server",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        s3_bucket = %config.s3_bucket,
        summarizer_model = %config.summarizer.model,
        summarizer_configured = config.summarizer.api_key.is_some(),
        "loaded configuration"
    );

    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    let applied = db::run_migrations(&pool)?;
    info!(applied, "database migrations up to date");

    let storage = Arc::new(s3::build_storage(&config).await?);
    let summarizer = Arc::new(GeminiClient::from_config(&config.summarizer)?);
    let jwt = JwtService::from_config(&config);

    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port)
        .parse()
        .context("SERVER_HOST/SERVER_PORT do not form a valid socket address")?;

    let state = AppState::new(pool, config, storage, summarizer, jwt);
    let app = create_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = signal::ctrl_c().await;
            info!("server received shutdown signal");
        })
        .await
        .context("server error")?;

    Ok(())
}
