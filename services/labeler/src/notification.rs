//! Bucket notification payloads.
//!
//! S3 and S3-compatible stores (MinIO publishes these to Kafka) deliver
//! object events as `{"Records": [...]}`; object keys inside are
//! form-encoded and must go through [`crate::image_key::decode_object_key`].

use serde::{Deserialize, Serialize};

/// One delivered batch of object notifications
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationBatch {
    #[serde(rename = "Records", default)]
    pub records: Vec<ObjectNotification>,
}

/// A single object event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectNotification {
    /// e.g. `ObjectCreated:Put`
    #[serde(default)]
    pub event_name: Option<String>,
    pub s3: S3Entity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Entity {
    pub bucket: S3Bucket,
    pub object: S3Object,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Bucket {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Object {
    /// Encoded object key
    pub key: String,
    #[serde(default)]
    pub size: Option<u64>,
}

impl ObjectNotification {
    pub fn new(bucket: impl Into<String>, encoded_key: impl Into<String>) -> Self {
        Self {
            event_name: Some("ObjectCreated:Put".to_string()),
            s3: S3Entity {
                bucket: S3Bucket {
                    name: bucket.into(),
                },
                object: S3Object {
                    key: encoded_key.into(),
                    size: None,
                },
            },
        }
    }

    pub fn bucket(&self) -> &str {
        &self.s3.bucket.name
    }

    /// The key exactly as delivered, still encoded
    pub fn encoded_key(&self) -> &str {
        &self.s3.object.key
    }

    /// Events without a name are treated as creations.
    pub fn is_object_created(&self) -> bool {
        self.event_name
            .as_deref()
            .map_or(true, |name| name.starts_with("ObjectCreated"))
    }
}

impl NotificationBatch {
    pub fn new(records: Vec<ObjectNotification>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
