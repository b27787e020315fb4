use std::collections::HashMap;
use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, ensure, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use http_body_util::BodyExt;
use lumindoc::auth::jwt::JwtService;
use lumindoc::auth::password::hash_password;
use lumindoc::config::{AppConfig, SummarizerConfig};
use lumindoc::db::{self, PgPool, MIGRATIONS};
use lumindoc::models::{Document, Job, NewUser};
use lumindoc::routes;
use lumindoc::state::AppState;
use lumindoc::storage::ObjectStorage;
use lumindoc::summarizer::{
    DetailedSummary, Difficulty, Importance, SummarizeError, SummaryProvider, SummarySection,
};
use lumindoc::{default_handlers, Worker};
use diesel_migrations::MigrationHarness;
use once_cell::sync::Lazy;
use serde::Serialize;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub const MAX_TEST_UPLOAD_BYTES: usize = 4 * 1024;
pub const MAX_TEST_FILES: usize = 3;
pub const MAX_TEST_ATTEMPTS: i32 = 2;

#[allow(dead_code)]
#[derive(Clone)]
pub struct StoredObject {
    pub key: String,
    pub bytes: Bytes,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
}

#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<HashMap<String, StoredObject>>,
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn put_object(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: Option<String>,
        content_disposition: Option<String>,
    ) -> Result<()> {
        let stored = StoredObject {
            key: key.to_string(),
            bytes,
            content_type,
            content_disposition,
        };
        let mut guard = self.objects.lock().await;
        guard.insert(stored.key.clone(), stored);
        Ok(())
    }

    async fn presign_get_object(&self, key: &str, expires_in: Duration) -> Result<String> {
        let guard = self.objects.lock().await;
        ensure!(guard.contains_key(key), "object {key} missing");
        Ok(format!(
            "https://fake-storage/{key}?expires_in={}",
            expires_in.as_secs()
        ))
    }

    async fn get_object(&self, key: &str) -> Result<Bytes> {
        let guard = self.objects.lock().await;
        guard
            .get(key)
            .map(|obj| obj.bytes.clone())
            .ok_or_else(|| anyhow!("object {key} missing"))
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let mut guard = self.objects.lock().await;
        guard.remove(key);
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("https://fake-storage/public/{key}")
    }
}

impl FakeStorage {
    #[allow(dead_code)]
    pub async fn get(&self, key: &str) -> Option<StoredObject> {
        let guard = self.objects.lock().await;
        guard.get(key).cloned()
    }

    #[allow(dead_code)]
    pub async fn object_count(&self) -> usize {
        let guard = self.objects.lock().await;
        guard.len()
    }
}

#[allow(dead_code)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SummarizerMode {
    Succeed,
    FailTransient,
    FailPermanent,
}

type CallHook = Box<dyn FnOnce() + Send>;

pub struct FakeSummarizer {
    mode: Mutex<SummarizerMode>,
    calls: AtomicUsize,
    before_next_call: Mutex<Option<CallHook>>,
}

impl Default for FakeSummarizer {
    fn default() -> Self {
        Self {
            mode: Mutex::new(SummarizerMode::Succeed),
            calls: AtomicUsize::new(0),
            before_next_call: Mutex::new(None),
        }
    }
}

impl FakeSummarizer {
    #[allow(dead_code)]
    pub async fn set_mode(&self, mode: SummarizerMode) {
        *self.mode.lock().await = mode;
    }

    #[allow(dead_code)]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Runs `hook` at the start of the next summarizer call, while the
    /// worker is mid-pipeline.
    #[allow(dead_code)]
    pub async fn before_next_call(&self, hook: impl FnOnce() + Send + 'static) {
        *self.before_next_call.lock().await = Some(Box::new(hook));
    }

    async fn outcome(&self) -> Result<(), SummarizeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let hook = self.before_next_call.lock().await.take();
        if let Some(hook) = hook {
            hook();
        }
        match *self.mode.lock().await {
            SummarizerMode::Succeed => Ok(()),
            SummarizerMode::FailTransient => Err(SummarizeError::Api {
                status: 503,
                body: "model overloaded".into(),
            }),
            SummarizerMode::FailPermanent => Err(SummarizeError::NotConfigured),
        }
    }
}

pub fn sample_summary(file_name: &str) -> DetailedSummary {
    DetailedSummary {
        overview: format!("Summary of {file_name}"),
        key_points: vec!["First point".into(), "Second point".into()],
        sections: vec![SummarySection {
            title: "Introduction".into(),
            content: "Opening remarks.".into(),
            importance: Importance::High,
            page: None,
        }],
        word_count: 1234,
        page_count: None,
        topics: vec!["testing".into()],
        difficulty: Difficulty::Beginner,
    }
}

#[async_trait]
impl SummaryProvider for FakeSummarizer {
    async fn generate_detailed_summary(
        &self,
        _content: &str,
        file_name: &str,
    ) -> Result<DetailedSummary, SummarizeError> {
        self.outcome().await?;
        Ok(sample_summary(file_name))
    }

    async fn generate_quick_summary(&self, content: &str) -> Result<String, SummarizeError> {
        self.outcome().await?;
        Ok(format!("Quick summary ({} chars)", content.chars().count()))
    }
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    storage: Arc<FakeStorage>,
    summarizer: Arc<FakeSummarizer>,
}

#[allow(dead_code)]
impl TestApp {
    /// Builds an app against `TEST_DATABASE_URL`, or `None` when it is unset.
    pub async fn new() -> Result<Option<Self>> {
        let Ok(database_url) = env::var("TEST_DATABASE_URL") else {
            eprintln!("TEST_DATABASE_URL not set; skipping integration test");
            return Ok(None);
        };

        let config = AppConfig {
            database_url: database_url.clone(),
            database_max_pool_size: 4,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            jwt_secret: "test-secret".to_string(),
            jwt_issuer: "test-issuer".to_string(),
            jwt_audience: "test-audience".to_string(),
            jwt_expiry_minutes: 60,
            cors_allowed_origin: None,
            aws_endpoint_url: None,
            aws_access_key_id: None,
            aws_secret_access_key: None,
            aws_region: "us-east-1".to_string(),
            s3_bucket: "test-bucket".to_string(),
            storage_public_base_url: None,
            max_upload_bytes: MAX_TEST_UPLOAD_BYTES,
            max_files_per_upload: MAX_TEST_FILES,
            summarizer: SummarizerConfig {
                max_attempts: MAX_TEST_ATTEMPTS,
                ..SummarizerConfig::default()
            },
        };

        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let storage = Arc::new(FakeStorage::default());
        let summarizer = Arc::new(FakeSummarizer::default());
        let storage_for_state: Arc<dyn ObjectStorage> = storage.clone();
        let summarizer_for_state: Arc<dyn SummaryProvider> = summarizer.clone();
        let jwt = JwtService::from_config(&config);
        let state = AppState::new(
            pool.clone(),
            config,
            storage_for_state,
            summarizer_for_state,
            jwt,
        );
        let router = routes::create_router(state.clone());

        Ok(Some(Self {
            state,
            router,
            storage,
            summarizer,
        }))
    }

    pub async fn cleanup(&self) -> Result<()> {
        self.with_conn(truncate_all).await
    }

    pub fn storage(&self) -> Arc<FakeStorage> {
        self.storage.clone()
    }

    pub fn summarizer(&self) -> Arc<FakeSummarizer> {
        self.summarizer.clone()
    }

    pub fn worker(&self) -> Worker {
        Worker::new(
            Arc::new(self.state.clone()),
            default_handlers(),
            Duration::from_millis(10),
        )
    }

    /// Executes at most one queued job the way the worker binary would.
    pub async fn run_worker_once(&self) -> Result<bool> {
        Ok(self.worker().run_once().await?)
    }

    pub async fn make_jobs_runnable(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.batch_execute("UPDATE jobs SET run_after = NOW() - INTERVAL '1 second';")
                .context("failed to reschedule jobs")?;
            Ok(())
        })
        .await
    }

    /// Makes every `from -> to` summary status write fail until
    /// `allow_status_changes` or `cleanup`.
    pub async fn block_status_change(&self, from: &str, to: &str) -> Result<()> {
        let sql = format!(
            "CREATE OR REPLACE FUNCTION reject_status_change() RETURNS trigger AS $$ \
             BEGIN \
               IF OLD.summary_status = TG_ARGV[0] AND NEW.summary_status = TG_ARGV[1] THEN \
                 RAISE EXCEPTION 'status change % -> % is blocked', TG_ARGV[0], TG_ARGV[1]; \
               END IF; \
               RETURN NEW; \
             END; $$ LANGUAGE plpgsql;\
             DROP TRIGGER IF EXISTS reject_status_change ON documents;\
             CREATE TRIGGER reject_status_change BEFORE UPDATE ON documents \
             FOR EACH ROW EXECUTE FUNCTION reject_status_change('{from}', '{to}');"
        );
        self.with_conn(move |conn| {
            conn.batch_execute(&sql)
                .context("failed to install status trigger")?;
            Ok(())
        })
        .await
    }

    pub async fn allow_status_changes(&self) -> Result<()> {
        self.with_conn(drop_status_trigger).await
    }

    pub async fn insert_user(&self, username: &str, password: &str, role: &str) -> Result<Uuid> {
        let username = username.to_string();
        let password = password.to_string();
        let role = role.to_string();
        self.with_conn(move |conn| {
            let password_hash = hash_password(&password)?;
            let user = NewUser {
                id: Uuid::new_v4(),
                username,
                password_hash,
                role,
            };
            diesel::insert_into(lumindoc::schema::users::table)
                .values(&user)
                .execute(conn)
                .context("failed to insert user")?;
            Ok(user.id)
        })
        .await
    }

    pub async fn login_token(&self, username: &str, password: &str) -> Result<String> {
        #[derive(Serialize)]
        struct LoginPayload<'a> {
            username: &'a str,
            password: &'a str,
        }

        let response = self
            .post_json(
                "/api/auth/login",
                &LoginPayload { username, password },
                None,
            )
            .await?;

        ensure!(
            response.status() == StatusCode::OK,
            "login failed with status {}",
            response.status()
        );

        let body = body_to_vec(response.into_body()).await?;
        #[derive(serde::Deserialize)]
        struct LoginResponse {
            access_token: String,
        }
        let parsed: LoginResponse = serde_json::from_slice(&body)?;
        Ok(parsed.access_token)
    }

    /// Creates a user and returns its bearer token.
    pub async fn user_token(&self, username: &str) -> Result<String> {
        let password = "correct-horse-battery";
        self.insert_user(username, password, "user").await?;
        self.login_token(username, password).await
    }

    pub async fn document(&self, id: Uuid) -> Result<Option<Document>> {
        self.with_conn(move |conn| {
            lumindoc::schema::documents::table
                .find(id)
                .first::<Document>(conn)
                .optional()
                .context("failed to load document")
        })
        .await
    }

    pub async fn jobs_by_type(&self, ty: &str) -> Result<Vec<Job>> {
        let ty = ty.to_string();
        self.with_conn(move |conn| {
            use lumindoc::schema::jobs::dsl::{job_type as job_type_col, jobs as jobs_table};
            let rows = jobs_table
                .filter(job_type_col.eq(&ty))
                .load::<Job>(conn)
                .context("failed to load jobs")?;
            Ok(rows)
        })
        .await
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        self.send(Method::POST, path, token, Some("application/json"), Body::from(body))
            .await
    }

    pub async fn patch_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        self.send(Method::PATCH, path, token, Some("application/json"), Body::from(body))
            .await
    }

    pub async fn post_empty(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        self.send(Method::POST, path, token, None, Body::empty()).await
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        self.send(Method::GET, path, token, None, Body::empty()).await
    }

    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        self.send(Method::DELETE, path, token, None, Body::empty()).await
    }

    /// Posts a multipart body with one `file` part per entry of
    /// `(filename, content_type, bytes)`.
    pub async fn upload_files(
        &self,
        path: &str,
        files: &[(&str, &str, &[u8])],
        token: &str,
    ) -> Result<hyper::Response<Body>> {
        let boundary = format!("boundary-{}", Uuid::new_v4());
        let mut body = Vec::new();
        for (filename, content_type, data) in files {
            body.extend(format!("--{boundary}\r\n").as_bytes());
            body.extend(
                format!(
                    "Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n"
                )
                .as_bytes(),
            );
            body.extend(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
            body.extend(*data);
            body.extend(b"\r\n");
        }
        body.extend(format!("--{boundary}--\r\n").as_bytes());

        let content_type = format!("multipart/form-data; boundary={boundary}");
        self.send(
            Method::POST,
            path,
            Some(token),
            Some(&content_type),
            Body::from(body),
        )
        .await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        content_type: Option<&str>,
        body: Body,
    ) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(content_type) = content_type {
            builder = builder.header("content-type", content_type);
        }
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(body)?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("connection task panicked")?
    }
}

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

#[allow(dead_code)]
pub async fn body_to_json(body: Body) -> Result<serde_json::Value> {
    let bytes = body_to_vec(body).await?;
    serde_json::from_slice(&bytes).context("response body is not JSON")
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|err| anyhow!("failed to run migrations: {err}"))?;
        truncate_all(&mut conn)?;
        Ok(())
    })
    .await
    .context("migration task panicked")?
}

fn drop_status_trigger(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute("DROP TRIGGER IF EXISTS reject_status_change ON documents;")
        .context("failed to drop status trigger")?;
    Ok(())
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    drop_status_trigger(conn)?;
    conn.batch_execute("TRUNCATE TABLE jobs, documents, users RESTART IDENTITY CASCADE;")
        .context("failed to truncate tables")?;
    Ok(())
}
