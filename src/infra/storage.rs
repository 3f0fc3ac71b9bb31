use anyhow::{anyhow, Result};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use url::Url;

use crate::app::store::{ObjectBody, ObjectStore};
use crate::config::AppConfig;

#[derive(Clone)]
pub struct ObjectStorage {
    client: Client,
    public_base: Url,
}

impl ObjectStorage {
    pub async fn new(config: &AppConfig) -> Result<Self> {
        let region_provider = RegionProviderChain::first_try(Region::new(config.s3_region.clone()));
        let shared_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;

        let mut s3_builder = aws_sdk_s3::config::Builder::from(&shared_config)
            .region(shared_config.region().cloned())
            .endpoint_url(config.s3_endpoint.clone())
            .force_path_style(true);
        if let Some(provider) = shared_config.credentials_provider() {
            s3_builder = s3_builder.credentials_provider(provider);
        }
        let s3_config = s3_builder.build();

        let client = Client::from_conf(s3_config);
        let public_endpoint = config
            .s3_public_endpoint
            .as_deref()
            .unwrap_or(&config.s3_endpoint);

        Ok(Self {
            client,
            public_base: parse_endpoint(public_endpoint)?,
        })
    }
}

#[async_trait]
impl ObjectStore for ObjectStorage {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: ObjectBody,
        content_type: &str,
    ) -> Result<()> {
        let stream = match body {
            ObjectBody::Bytes(bytes) => ByteStream::from(bytes),
            ObjectBody::File(path) => ByteStream::from_path(&path)
                .await
                .map_err(|err| anyhow!("failed to open {}: {}", path.display(), err))?,
        };

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(stream)
            .send()
            .await?;
        Ok(())
    }

    fn public_url(&self, bucket: &str, key: &str) -> Result<String> {
        object_url(&self.public_base, bucket, key)
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await?;
        Ok(())
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Url> {
    let url = if endpoint.contains("://") {
        Url::parse(endpoint)?
    } else {
        Url::parse(&format!("http://{}", endpoint))?
    };
    if url.cannot_be_a_base() {
        return Err(anyhow!("invalid storage endpoint: {}", endpoint));
    }
    Ok(url)
}

fn object_url(base: &Url, bucket: &str, key: &str) -> Result<String> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| anyhow!("storage endpoint cannot be a base URL"))?
        .pop_if_empty()
        .push(bucket)
        .push(key);
    Ok(url.to_string())
}
