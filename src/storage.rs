use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use uuid::Uuid;

use crate::models::DocumentType;

#[async_trait]
pub trait ObjectStorage: Send + Sync + 'static {
    async fn put_object(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: Option<String>,
        content_disposition: Option<String>,
    ) -> Result<()>;

    async fn presign_get_object(&self, key: &str, expires_in: Duration) -> Result<String>;

    async fn get_object(&self, key: &str) -> Result<Bytes>;

    async fn delete_object(&self, key: &str) -> Result<()>;

    /// Unsigned URL of an object in a publicly readable bucket.
    fn public_url(&self, key: &str) -> String;
}

/// Builds `{owner}/{millis}-{random}.{ext}`; the client-supplied name never
/// reaches the key, so non-ASCII names need no escaping.
pub fn object_key_for(owner_id: Uuid, doc_type: DocumentType) -> String {
    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(13)
        .map(|ch| char::from(ch).to_ascii_lowercase())
        .collect();
    format!(
        "{owner_id}/{}-{random}.{}",
        Utc::now().timestamp_millis(),
        doc_type.extension()
    )
}

pub struct S3Storage {
    client: S3Client,
    bucket: String,
    public_base_url: String,
}

impl S3Storage {
    pub fn new(client: S3Client, bucket: impl Into<String>, public_base_url: Option<String>) -> Self {
        let bucket = bucket.into();
        let public_base_url = match public_base_url {
            Some(base) => format!("{}/{bucket}", base.trim_end_matches('/')),
            None => format!("https://{bucket}.s3.amazonaws.com"),
        };
        Self {
            client,
            bucket,
            public_base_url,
        }
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn put_object(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: Option<String>,
        content_disposition: Option<String>,
    ) -> Result<()> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes));

        if let Some(content_type) = content_type {
            request = request.content_type(content_type);
        }

        if let Some(content_disposition) = content_disposition {
            request = request.content_disposition(content_disposition);
        }

        request
            .send()
            .await
            .context("failed to upload object to S3")?;

        Ok(())
    }

    async fn presign_get_object(&self, key: &str, expires_in: Duration) -> Result<String> {
        let presign_config = PresigningConfig::builder()
            .expires_in(expires_in)
            .build()
            .context("failed to build S3 presigning config")?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .context("failed to generate presigned download URL")?;

        Ok(presigned.uri().to_string())
    }

    async fn get_object(&self, key: &str) -> Result<Bytes> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("failed to download object from S3")?;

        let bytes = response
            .body
            .collect()
            .await
            .context("failed to read object stream")?
            .into_bytes();

        Ok(bytes)
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("failed to delete object from S3")?;
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{key}", self.public_base_url)
    }
}
