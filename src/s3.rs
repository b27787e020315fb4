use anyhow::Result;
use aws_config::{meta::region::RegionProviderChain, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client as S3Client,
};
use tracing::debug;

use crate::{config::AppConfig, storage::S3Storage};

pub async fn build_client(config: &AppConfig) -> Result<S3Client> {
    let region_provider =
        RegionProviderChain::first_try(Some(Region::new(config.aws_region.clone())))
            .or_default_provider()
            .or_else("us-east-1");

    let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region_provider);

    if let Some(endpoint) = &config.aws_endpoint_url {
        debug!(%endpoint, "using custom S3 endpoint");
        loader = loader.endpoint_url(endpoint);
    }

    if let (Some(access_key), Some(secret_key)) = (
        config.aws_access_key_id.clone(),
        config.aws_secret_access_key.clone(),
    ) {
        loader = loader.credentials_provider(Credentials::new(
            access_key, secret_key, None, None, "static",
        ));
    }

    let shared = loader.load().await;
    // MinIO and most self-hosted stores only speak path-style addressing.
    let s3_config = S3ConfigBuilder::from(&shared).force_path_style(true).build();

    Ok(S3Client::from_conf(s3_config))
}

pub async fn build_storage(config: &AppConfig) -> Result<S3Storage> {
    let client = build_client(config).await?;
    Ok(S3Storage::new(
        client,
        config.s3_bucket.clone(),
        config.storage_public_base_url.clone(),
    ))
}
