use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;

use super::{ObjectInfo, ObjectStore, PutObject, StorageError};

/// S3 client wrapper implementing [`ObjectStore`].
#[derive(Clone)]
pub struct S3Store {
    client: Client,
}

impl S3Store {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Creates a client from the environment (credentials chain, region).
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(Client::new(&config))
    }

    /// Creates a client with a custom endpoint (MinIO, LocalStack).
    pub async fn with_endpoint(endpoint: &str) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .endpoint_url(endpoint)
            .force_path_style(true)
            .build();
        Self::new(Client::from_conf(s3_config))
    }
}

fn backend(key: &str, err: impl std::error::Error) -> StorageError {
    StorageError::Backend {
        key: key.to_string(),
        message: DisplayErrorContext(err).to_string(),
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        tracing::debug!("s3: get s3://{}/{}", bucket, key);
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map(|se| se.is_no_such_key()) == Some(true) {
                    StorageError::NotFound {
                        key: key.to_string(),
                    }
                } else {
                    backend(key, e)
                }
            })?;

        let data = output.body.collect().await.map_err(|e| backend(key, e))?;
        let bytes = data.into_bytes().to_vec();
        tracing::debug!("s3: got {} bytes for {}", bytes.len(), key);
        Ok(bytes)
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        object: PutObject,
    ) -> Result<(), StorageError> {
        tracing::debug!(
            "s3: put s3://{}/{} ({} bytes, {})",
            bucket,
            key,
            object.body.len(),
            object.content_type
        );
        let len = object.body.len() as i64;
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(object.content_type)
            .set_cache_control(object.cache_control)
            .content_length(len)
            .body(ByteStream::from(object.body))
            .send()
            .await
            .map_err(|e| StorageError::Write {
                key: key.to_string(),
                message: DisplayErrorContext(e).to_string(),
            })?;
        Ok(())
    }

    async fn head_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<ObjectInfo>, StorageError> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(output) => Ok(Some(ObjectInfo {
                key: key.to_string(),
                size: output.content_length().unwrap_or(0).max(0) as u64,
                content_type: output.content_type().map(str::to_string),
                cache_control: output.cache_control().map(str::to_string),
            })),
            Err(e) if e.as_service_error().map(|se| se.is_not_found()) == Some(true) => Ok(None),
            Err(e) => Err(backend(key, e)),
        }
    }

    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, StorageError> {
        let presigning = PresigningConfig::expires_in(expires_in).map_err(|e| {
            StorageError::Presign {
                key: key.to_string(),
                message: e.to_string(),
            }
        })?;
        let presigned = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::Presign {
                key: key.to_string(),
                message: DisplayErrorContext(e).to_string(),
            })?;
        Ok(presigned.uri().to_string())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<ObjectInfo>, StorageError> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(bucket).prefix(prefix);
            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }
            let response = request.send().await.map_err(|e| backend(prefix, e))?;

            for object in response.contents() {
                if let Some(key) = object.key() {
                    objects.push(ObjectInfo {
                        key: key.to_string(),
                        size: object.size().unwrap_or(0).max(0) as u64,
                        content_type: None,
                        cache_control: None,
                    });
                }
            }

            if response.is_truncated() == Some(true) {
                continuation_token = response.next_continuation_token().map(str::to_string);
                if continuation_token.is_none() {
                    break;
                }
            } else {
                break;
            }
        }

        tracing::debug!(
            "s3: listed {} objects under s3://{}/{}",
            objects.len(),
            bucket,
            prefix
        );
        Ok(objects)
    }
}
