use std::{env, str::FromStr};

use anyhow::{Context, Result};
use url::Url;

use crate::db::DEFAULT_MAX_POOL_SIZE;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_MAX_FILES_PER_UPLOAD: usize = 5;
pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_pool_size: u32,
    pub server_host: String,
    pub server_port: u16,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub jwt_expiry_minutes: i64,
    pub cors_allowed_origin: Option<String>,
    pub aws_endpoint_url: Option<String>,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub aws_region: String,
    pub s3_bucket: String,
    pub storage_public_base_url: Option<String>,
    pub max_upload_bytes: usize,
    pub max_files_per_upload: usize,
    pub summarizer: SummarizerConfig,
}

#[derive(Clone, Debug)]
pub struct SummarizerConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
    pub timeout_seconds: u64,
    pub language: String,
    pub max_input_chars: usize,
    pub max_attempts: i32,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_GEMINI_MODEL.to_string(),
            endpoint: DEFAULT_GEMINI_ENDPOINT.to_string(),
            timeout_seconds: 120,
            language: "Japanese".to_string(),
            max_input_chars: 200_000,
            max_attempts: 3,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_pool_size = env::var("DATABASE_MAX_POOL_SIZE")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_POOL_SIZE);
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = parse_or("SERVER_PORT", 3000u16)?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        let jwt_issuer = env::var("JWT_ISSUER").unwrap_or_else(|_| "lumindoc".to_string());
        let jwt_audience =
            env::var("JWT_AUDIENCE").unwrap_or_else(|_| "lumindoc-clients".to_string());
        let jwt_expiry_minutes = parse_or("JWT_EXPIRY_MINUTES", 60i64)?;
        let cors_allowed_origin = env::var("CORS_ALLOWED_ORIGIN").ok();
        let aws_endpoint_url = env::var("AWS_ENDPOINT_URL").ok();
        let aws_access_key_id = env::var("AWS_ACCESS_KEY_ID").ok();
        let aws_secret_access_key = env::var("AWS_SECRET_ACCESS_KEY").ok();
        let aws_region = env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string());
        let s3_bucket = env::var("S3_BUCKET").context("S3_BUCKET must be set")?;
        let storage_public_base_url = env::var("STORAGE_PUBLIC_BASE_URL")
            .ok()
            .or_else(|| aws_endpoint_url.clone());
        let max_upload_bytes = parse_or("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?;
        let max_files_per_upload = parse_or("MAX_FILES_PER_UPLOAD", DEFAULT_MAX_FILES_PER_UPLOAD)?;

        let defaults = SummarizerConfig::default();
        let summarizer = SummarizerConfig {
            api_key: env::var("GEMINI_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
            model: env::var("GEMINI_MODEL").unwrap_or(defaults.model),
            endpoint: env::var("GEMINI_ENDPOINT").unwrap_or(defaults.endpoint),
            timeout_seconds: parse_or("GEMINI_TIMEOUT_SECONDS", defaults.timeout_seconds)?,
            language: env::var("SUMMARY_LANGUAGE").unwrap_or(defaults.language),
            max_input_chars: parse_or("SUMMARY_MAX_INPUT_CHARS", defaults.max_input_chars)?,
            max_attempts: parse_or("SUMMARY_MAX_ATTEMPTS", defaults.max_attempts)?,
        };

        Ok(Self {
            database_url,
            database_max_pool_size,
            server_host,
            server_port,
            jwt_secret,
            jwt_issuer,
            jwt_audience,
            jwt_expiry_minutes,
            cors_allowed_origin,
            aws_endpoint_url,
            aws_access_key_id,
            aws_secret_access_key,
            aws_region,
            s3_bucket,
            storage_public_base_url,
            max_upload_bytes,
            max_files_per_upload,
            summarizer,
        })
    }

    pub fn redacted_database_url(&self) -> String {
        redact_database_url(&self.database_url)
    }
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw}")),
        Err(_) => Ok(default),
    }
}

fn redact_database_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut parsed) => {
            let _ = parsed.set_password(Some("*****"));
            parsed.to_string()
        }
        Err(_) => "***".to_string(),
    }
}
