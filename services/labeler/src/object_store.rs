use crate::config::S3Config;
use crate::error::{Error, Result};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use tracing::{debug, info, instrument};

/// Byte-level access to the image and thumbnail buckets.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object. `Ok(None)` means the key does not exist.
    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write an object, overwriting any previous version.
    async fn put(&self, bucket: &str, key: &str, data: Vec<u8>, content_type: &str) -> Result<()>;

    /// Delete an object. Deleting a missing key succeeds.
    async fn delete(&self, bucket: &str, key: &str) -> Result<()>;
}

/// Load the shared AWS configuration used by every SDK client.
pub async fn load_aws_config(region: &str) -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(aws_config::Region::new(region.to_string()))
        .load()
        .await
}

/// S3-backed object store
pub struct S3ObjectStore {
    client: S3Client,
}

impl S3ObjectStore {
    /// Create a new S3 object store from the shared SDK configuration
    pub fn new(aws_config: &SdkConfig, config: &S3Config) -> Self {
        let mut s3_config_builder = S3ConfigBuilder::from(aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            image_bucket = %config.image_bucket,
            thumbnail_bucket = %config.thumbnail_bucket,
            region = %config.region,
            "S3 object store initialized"
        );

        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self))]
    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let fetch_error = |message: String| Error::Fetch {
            bucket: bucket.to_string(),
            key: key.to_string(),
            message,
        };

        let output = match self.client.get_object().bucket(bucket).key(key).send().await {
            Ok(output) => output,
            Err(e) => {
                if e.as_service_error()
                    .map(|e| e.is_no_such_key())
                    .unwrap_or(false)
                {
                    return Ok(None);
                }
                return Err(fetch_error(DisplayErrorContext(&e).to_string()));
            }
        };

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| fetch_error(e.to_string()))?
            .into_bytes();

        debug!(size_bytes = data.len(), "Object downloaded");

        Ok(Some(data.to_vec()))
    }

    #[instrument(skip(self, data), fields(size_bytes = data.len()))]
    async fn put(&self, bucket: &str, key: &str, data: Vec<u8>, content_type: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| Error::StoreWrite {
                store: bucket.to_string(),
                key: key.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        debug!("Object uploaded");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Error::StoreDelete {
                store: bucket.to_string(),
                key: key.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        debug!("Object deleted");
        Ok(())
    }
}

/// Get content type for an image format extension
pub fn get_content_type(format: &str) -> &'static str {
    match format.to_lowercase().as_str() {
        "jpeg" | "jpg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "gif" => "image/gif",
        "tif" | "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
}
