use crate::config::LabelingConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_rekognition::config::Builder as RekognitionConfigBuilder;
use aws_sdk_rekognition::error::DisplayErrorContext;
use aws_sdk_rekognition::types::{Image, S3Object};
use aws_sdk_rekognition::Client as RekognitionClient;
use tracing::{debug, info, instrument};

/// A label returned by the vision service
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedLabel {
    pub name: String,
    /// Confidence in percent (0-100)
    pub confidence: f32,
}

impl DetectedLabel {
    pub fn new(name: impl Into<String>, confidence: f32) -> Self {
        Self {
            name: name.into(),
            confidence,
        }
    }
}

/// External vision-labeling service.
///
/// Implementations return labels ranked by descending confidence, already
/// filtered to `min_confidence` and capped at `max_labels`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LabelDetector: Send + Sync {
    async fn detect_labels(
        &self,
        bucket: &str,
        key: &str,
        max_labels: usize,
        min_confidence: f32,
    ) -> Result<Vec<DetectedLabel>>;
}

/// AWS Rekognition `DetectLabels` client
pub struct RekognitionDetector {
    client: RekognitionClient,
}

impl RekognitionDetector {
    pub fn new(aws_config: &SdkConfig, config: &LabelingConfig) -> Self {
        let mut builder = RekognitionConfigBuilder::from(aws_config);

        if let Some(ref endpoint_url) = config.rekognition_endpoint_url {
            builder = builder.endpoint_url(endpoint_url);
        }

        info!(
            region = ?aws_config.region(),
            endpoint = ?config.rekognition_endpoint_url,
            "Rekognition label detector initialized"
        );

        Self {
            client: RekognitionClient::from_conf(builder.build()),
        }
    }
}

#[async_trait]
impl LabelDetector for RekognitionDetector {
    #[instrument(skip(self))]
    async fn detect_labels(
        &self,
        bucket: &str,
        key: &str,
        max_labels: usize,
        min_confidence: f32,
    ) -> Result<Vec<DetectedLabel>> {
        let image = Image::builder()
            .s3_object(S3Object::builder().bucket(bucket).name(key).build())
            .build();

        let output = self
            .client
            .detect_labels()
            .image(image)
            .max_labels(i32::try_from(max_labels).unwrap_or(i32::MAX))
            .min_confidence(min_confidence)
            .send()
            .await
            .map_err(|e| Error::LabelService {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        let labels: Vec<DetectedLabel> = output
            .labels()
            .iter()
            .filter_map(|label| {
                let name = label.name()?;
                Some(DetectedLabel::new(name, label.confidence().unwrap_or_default()))
            })
            .collect();

        debug!(label_count = labels.len(), "Labels detected");

        Ok(labels)
    }
}
