use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::{DisplayErrorContext, SdkError},
    operation::create_bucket::CreateBucketError,
    primitives::ByteStream,
    Client,
};
use futures::StreamExt;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, instrument};

use super::{
    config::StorageConfig, ObjectInfo, ObjectStore, ObjectStream, StorageError, StorageResult,
    UploadResult,
};

/// Object store backed by S3 or MinIO.
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
}

fn backend<E, R>(context: &str, err: SdkError<E, R>) -> StorageError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    StorageError::Backend(format!("{}: {}", context, DisplayErrorContext(&err)))
}

impl S3Storage {
    /// Build a client. No request is made until the first operation.
    pub fn new(config: StorageConfig) -> Self {
        debug!(endpoint = ?config.endpoint, region = %config.region, "Initializing S3 storage");

        let credentials =
            Credentials::new(&config.access_key, &config.secret_key, None, None, "demix-storage");

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        Self {
            client: Client::from_conf(s3_config_builder.build()),
        }
    }

    /// Start a download; the body has not been read yet.
    async fn open(&self, bucket: &str, key: &str) -> StorageResult<ByteStream> {
        match self.client.get_object().bucket(bucket).key(key).send().await {
            Ok(response) => Ok(response.body),
            Err(e) => {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    return Err(StorageError::not_found(bucket, key));
                }
                Err(backend(&format!("Failed to download {}", key), e))
            },
        }
    }

    async fn send_put(
        &self,
        bucket: &str,
        key: &str,
        body: ByteStream,
        size: i64,
        content_type: Option<&str>,
    ) -> StorageResult<UploadResult> {
        debug!("Uploading {} bytes to s3://{}/{}", size, bucket, key);

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .content_length(size)
            .set_content_type(content_type.map(str::to_string))
            .send()
            .await
            .map_err(|e| backend(&format!("Failed to upload {}", key), e))?;

        info!("Successfully uploaded to s3://{}/{}", bucket, key);

        Ok(UploadResult {
            key: key.to_string(),
            size,
        })
    }
}

#[async_trait]
impl ObjectStore for S3Storage {
    #[instrument(skip(self))]
    async fn ensure_bucket(&self, bucket: &str) -> StorageResult<bool> {
        if self.client.head_bucket().bucket(bucket).send().await.is_ok() {
            return Ok(false);
        }

        match self.client.create_bucket().bucket(bucket).send().await {
            Ok(_) => {
                info!("Bucket '{}' created successfully", bucket);
                Ok(true)
            },
            Err(e) => match e.as_service_error() {
                Some(CreateBucketError::BucketAlreadyOwnedByYou(_))
                | Some(CreateBucketError::BucketAlreadyExists(_)) => Ok(false),
                _ => Err(backend(&format!("Failed to create bucket {}", bucket), e)),
            },
        }
    }

    #[instrument(skip(self, data))]
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: Option<&str>,
    ) -> StorageResult<UploadResult> {
        let size = data.len() as i64;
        self.send_put(bucket, key, ByteStream::from(data), size, content_type)
            .await
    }

    #[instrument(skip(self))]
    async fn get(&self, bucket: &str, key: &str) -> StorageResult<Vec<u8>> {
        let data = self
            .open(bucket, key)
            .await?
            .collect()
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to read S3 response body: {}", e)))?
            .into_bytes()
            .to_vec();

        debug!("Downloaded {} bytes from s3://{}/{}", data.len(), bucket, key);

        Ok(data)
    }

    #[instrument(skip(self))]
    async fn get_stream(&self, bucket: &str, key: &str) -> StorageResult<ObjectStream> {
        let body = self.open(bucket, key).await?;
        Ok(ReaderStream::new(body.into_async_read()).boxed())
    }

    #[instrument(skip(self))]
    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        content_type: Option<&str>,
    ) -> StorageResult<UploadResult> {
        let size = tokio::fs::metadata(path).await?.len() as i64;
        let body = ByteStream::from_path(path).await.map_err(|e| {
            StorageError::Backend(format!("Failed to open {}: {}", path.display(), e))
        })?;

        self.send_put(bucket, key, body, size, content_type).await
    }

    #[instrument(skip(self))]
    async fn get_to_file(&self, bucket: &str, key: &str, path: &Path) -> StorageResult<u64> {
        let mut body = self.open(bucket, key).await?.into_async_read();
        let mut file = tokio::fs::File::create(path).await?;
        let size = tokio::io::copy(&mut body, &mut file).await?;
        file.flush().await?;

        debug!("Downloaded {} bytes from s3://{}/{} to {}", size, bucket, key, path.display());

        Ok(size)
    }

    #[instrument(skip(self))]
    async fn exists(&self, bucket: &str, key: &str) -> StorageResult<bool> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.as_service_error().is_some_and(|se| se.is_not_found()) {
                    Ok(false)
                } else {
                    Err(backend("Failed to check S3 object existence", e))
                }
            },
        }
    }

    #[instrument(skip(self))]
    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        // S3 treats deleting a missing key as success; callers need to know.
        if !self.exists(bucket, key).await? {
            return Err(StorageError::not_found(bucket, key));
        }

        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| backend(&format!("Failed to delete {}", key), e))?;

        info!("Successfully deleted s3://{}/{}", bucket, key);

        Ok(())
    }

    #[instrument(skip(self))]
    async fn list(&self, bucket: &str, prefix: Option<&str>) -> StorageResult<Vec<ObjectInfo>> {
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .set_prefix(prefix.map(str::to_string))
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| backend("Failed to list S3 objects", e))?;

            objects.extend(response.contents().iter().filter_map(|obj| {
                obj.key().map(|key| ObjectInfo {
                    key: key.to_string(),
                    size: obj.size().unwrap_or(0),
                })
            }));

            match (response.is_truncated(), response.next_continuation_token()) {
                (Some(true), Some(token)) => continuation = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(objects)
    }

    async fn ping(&self) -> StorageResult<()> {
        self.client
            .list_buckets()
            .send()
            .await
            .map_err(|e| backend("Failed to reach object store", e))?;
        Ok(())
    }
}
