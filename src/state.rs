use std::sync::Arc;

use diesel::{
    pg::PgConnection,
    r2d2::{ConnectionManager, PooledConnection},
};

use crate::{
    auth::jwt::JwtService,
    config::AppConfig,
    db::PgPool,
    error::{AppError, AppResult},
    storage::ObjectStorage,
    summarizer::SummaryProvider,
    validation::UploadLimits,
};

pub type DbConnection = PooledConnection<ConnectionManager<PgConnection>>;

/// Shared by the HTTP handlers and the summary worker.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn ObjectStorage>,
    pub summarizer: Arc<dyn SummaryProvider>,
    pub jwt: JwtService,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        config: AppConfig,
        storage: Arc<dyn ObjectStorage>,
        summarizer: Arc<dyn SummaryProvider>,
        jwt: JwtService,
    ) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            storage,
            summarizer,
            jwt,
        }
    }

    pub fn db(&self) -> AppResult<DbConnection> {
        self.pool
            .get()
            .map_err(|err| AppError::internal(format!("database pool error: {err}")))
    }

    pub fn upload_limits(&self) -> UploadLimits {
        UploadLimits::from_config(&self.config)
    }
}
