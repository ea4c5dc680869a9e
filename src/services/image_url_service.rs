use aws_sdk_s3 as s3;
use aws_sdk_s3::{error::DisplayErrorContext, presigning::PresigningConfig, primitives::ByteStream};
use std::time::Duration;

use crate::{error::ImageError, models::ImagePayload};

const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

pub async fn put_object(
    client: &s3::Client,
    bucket: &str,
    object: &str,
    payload: ImagePayload,
) -> Result<(), ImageError> {
    let content_type = payload
        .content_type
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

    client
        .put_object()
        .bucket(bucket)
        .key(object)
        .content_type(content_type)
        .body(ByteStream::from(payload.bytes))
        .send()
        .await
        .map_err(|e| ImageError::backend(DisplayErrorContext(&e)))?;

    Ok(())
}

/// `Ok(false)` when the bucket has no object under `object`.
pub async fn object_exists(
    client: &s3::Client,
    bucket: &str,
    object: &str,
) -> Result<bool, ImageError> {
    match client.head_object().bucket(bucket).key(object).send().await {
        Ok(_) => Ok(true),
        Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(false),
        Err(e) => Err(ImageError::backend(DisplayErrorContext(&e))),
    }
}

pub async fn get_object_url(
    client: &s3::Client,
    bucket: &str,
    object: &str,
    expires_in: u64,
) -> Result<String, ImageError> {
    let expires_in = PresigningConfig::expires_in(Duration::from_secs(expires_in))
        .map_err(|e| ImageError::Presign(e.to_string()))?;

    let presigned_request = client
        .get_object()
        .bucket(bucket)
        .key(object)
        .presigned(expires_in)
        .await
        .map_err(|e| ImageError::Presign(DisplayErrorContext(&e).to_string()))?;

    Ok(presigned_request.uri().into())
}

pub async fn delete_single_object(
    client: &s3::Client,
    bucket: &str,
    object: &str,
) -> Result<(), ImageError> {
    client
        .delete_object()
        .bucket(bucket)
        .key(object)
        .send()
        .await
        .map_err(|e| ImageError::backend(DisplayErrorContext(&e)))?;

    Ok(())
}
