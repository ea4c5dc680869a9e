//! Object store holding one image per product, keyed by [`image_key`].

use async_trait::async_trait;
use aws_sdk_s3 as s3;
use mockall::automock;

use crate::{
    error::ImageError,
    models::{ImagePayload, image_key},
    services::image_url_service::{delete_single_object, get_object_url, object_exists, put_object},
};

#[automock]
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Stores the image of product `id`, replacing any previous one.
    async fn upload(&self, id: &str, payload: ImagePayload) -> Result<(), ImageError>;

    /// A download URL for the image of product `id`, or `None` if there is none.
    async fn resolve_url(&self, id: &str) -> Result<Option<String>, ImageError>;

    /// Deletes the image of product `id`. Fails with [`ImageError::NotFound`]
    /// when no image exists.
    async fn remove(&self, id: &str) -> Result<(), ImageError>;
}

#[derive(Debug, Clone)]
pub struct S3ImageStore {
    client: s3::Client,
    bucket: String,
    url_ttl_secs: u64,
}

impl S3ImageStore {
    pub fn new(client: s3::Client, bucket: impl Into<String>, url_ttl_secs: u64) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            url_ttl_secs,
        }
    }
}

#[async_trait]
impl ImageStore for S3ImageStore {
    async fn upload(&self, id: &str, payload: ImagePayload) -> Result<(), ImageError> {
        let key = image_key(id);
        let size = payload.len();

        put_object(&self.client, &self.bucket, &key, payload).await?;

        tracing::debug!("Uploaded {} ({} bytes) to bucket {}", key, size, self.bucket);

        Ok(())
    }

    async fn resolve_url(&self, id: &str) -> Result<Option<String>, ImageError> {
        let key = image_key(id);

        if !object_exists(&self.client, &self.bucket, &key).await? {
            return Ok(None);
        }

        let url = get_object_url(&self.client, &self.bucket, &key, self.url_ttl_secs).await?;

        Ok(Some(url))
    }

    async fn remove(&self, id: &str) -> Result<(), ImageError> {
        let key = image_key(id);

        // S3 deletes are idempotent, so absence has to be checked up front.
        if !object_exists(&self.client, &self.bucket, &key).await? {
            return Err(ImageError::NotFound);
        }

        delete_single_object(&self.client, &self.bucket, &key).await
    }
}
