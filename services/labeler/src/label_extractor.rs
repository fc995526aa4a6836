use crate::error::Result;
use crate::label_detector::{DetectedLabel, LabelDetector};
use crate::label_store::{LabelRecord, LabelStore};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Label extraction policy
#[derive(Debug, Clone, Copy)]
pub struct LabelPolicy {
    /// Maximum number of labels kept per image
    pub max_labels: usize,
    /// Minimum confidence, in percent
    pub min_confidence: f32,
}

impl Default for LabelPolicy {
    fn default() -> Self {
        Self {
            max_labels: 10,
            min_confidence: 50.0,
        }
    }
}

/// Asks the vision service for labels and persists them per image
pub struct LabelExtractor {
    detector: Arc<dyn LabelDetector>,
    label_store: Arc<dyn LabelStore>,
    policy: LabelPolicy,
}

impl LabelExtractor {
    pub fn new(
        detector: Arc<dyn LabelDetector>,
        label_store: Arc<dyn LabelStore>,
        policy: LabelPolicy,
    ) -> Self {
        Self {
            detector,
            label_store,
            policy,
        }
    }

    /// Detect labels for `key` and upsert its record.
    ///
    /// Returns `Ok(None)` without writing when the service found nothing.
    #[instrument(skip(self))]
    pub async fn extract(&self, source_bucket: &str, key: &str) -> Result<Option<LabelRecord>> {
        let detected = self
            .detector
            .detect_labels(
                source_bucket,
                key,
                self.policy.max_labels,
                self.policy.min_confidence,
            )
            .await?;

        let record = build_record(key, detected, &self.policy);
        if record.is_empty() {
            info!(key = %key, "No label result, skipping label store write");
            return Ok(None);
        }

        self.label_store.put(&record).await?;

        metrics::counter!("labeler.labels.written").increment(1);

        info!(
            key = %key,
            label_count = record.labels().len(),
            "Label record stored"
        );

        Ok(Some(record))
    }
}

/// Assign labels to ordinal slots in the order the service ranked them.
fn build_record(key: &str, detected: Vec<DetectedLabel>, policy: &LabelPolicy) -> LabelRecord {
    let labels = detected
        .into_iter()
        .filter(|label| label.confidence >= policy.min_confidence)
        .take(policy.max_labels)
        .map(|label| {
            debug!(label = %label.name, confidence = label.confidence, "Processing label");
            label.name
        })
        .collect();

    LabelRecord::new(key, labels)
}
