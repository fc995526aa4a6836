use crate::image_key::decode_object_key;
use crate::label_extractor::LabelExtractor;
use crate::notification::{NotificationBatch, ObjectNotification};
use crate::thumbnail::ThumbnailGenerator;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, instrument, warn};

/// Counters for one processed batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub records: usize,
    pub skipped: usize,
    pub thumbnails_written: usize,
    pub label_records_written: usize,
    pub failures: usize,
}

#[derive(Debug, Default)]
struct RecordOutcome {
    skipped: bool,
    thumbnail_written: bool,
    label_record_written: bool,
    failures: usize,
}

/// Runs thumbnail generation and label extraction for every notification of
/// a batch. Step failures are logged and counted, never returned.
pub struct IngestionPipeline {
    thumbnails: ThumbnailGenerator,
    labels: LabelExtractor,
    record_concurrency: usize,
}

impl IngestionPipeline {
    pub fn new(thumbnails: ThumbnailGenerator, labels: LabelExtractor) -> Self {
        Self {
            thumbnails,
            labels,
            record_concurrency: 1,
        }
    }

    /// Process up to `concurrency` records of a batch at once
    pub fn with_record_concurrency(mut self, concurrency: usize) -> Self {
        self.record_concurrency = concurrency.max(1);
        self
    }

    #[instrument(skip(self, batch), fields(records = batch.len()))]
    pub async fn process(&self, batch: &NotificationBatch) -> BatchSummary {
        let record_futures: Vec<_> = batch
            .records
            .iter()
            .map(|record| self.process_record(record))
            .collect();
        let outcomes: Vec<RecordOutcome> = stream::iter(record_futures)
            .buffer_unordered(self.record_concurrency)
            .collect()
            .await;

        let summary = outcomes
            .into_iter()
            .fold(BatchSummary::default(), |mut summary, outcome| {
                summary.records += 1;
                summary.skipped += usize::from(outcome.skipped);
                summary.thumbnails_written += usize::from(outcome.thumbnail_written);
                summary.label_records_written += usize::from(outcome.label_record_written);
                summary.failures += outcome.failures;
                summary
            });

        info!(
            records = summary.records,
            skipped = summary.skipped,
            thumbnails = summary.thumbnails_written,
            label_records = summary.label_records_written,
            failures = summary.failures,
            "Batch processed"
        );

        summary
    }

    async fn process_record(&self, record: &ObjectNotification) -> RecordOutcome {
        let mut outcome = RecordOutcome::default();

        if !record.is_object_created() {
            debug!(
                event_name = ?record.event_name,
                key = %record.encoded_key(),
                "Ignoring non-creation event"
            );
            outcome.skipped = true;
            return outcome;
        }

        let bucket = record.bucket();
        let key = match decode_object_key(record.encoded_key()) {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, bucket = %bucket, "Skipping record with undecodable key");
                metrics::counter!("labeler.records.failed", "step" => "decode").increment(1);
                outcome.skipped = true;
                outcome.failures += 1;
                return outcome;
            }
        };

        info!(bucket = %bucket, key = %key, "Processing image");

        // Independent side effects on independent stores: both always run.
        match self.thumbnails.generate(bucket, &key).await {
            Ok(()) => outcome.thumbnail_written = true,
            Err(e) => {
                warn!(error = %e, code = e.code(), bucket = %bucket, key = %key, "Thumbnail generation failed");
                metrics::counter!("labeler.records.failed", "step" => "thumbnail").increment(1);
                outcome.failures += 1;
            }
        }

        match self.labels.extract(bucket, &key).await {
            Ok(record) => outcome.label_record_written = record.is_some(),
            Err(e) => {
                warn!(error = %e, code = e.code(), bucket = %bucket, key = %key, "Label extraction failed");
                metrics::counter!("labeler.records.failed", "step" => "labels").increment(1);
                outcome.failures += 1;
            }
        }

        metrics::counter!("labeler.records.processed").increment(1);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::label_detector::{DetectedLabel, MockLabelDetector};
    use crate::label_extractor::LabelPolicy;
    use crate::label_store::MockLabelStore;
    use crate::object_store::MockObjectStore;
    use image::{DynamicImage, ImageFormat, RgbImage};
    use std::io::Cursor;
    use std::sync::Arc;

    fn jpeg_bytes() -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::new(400, 300))
            .write_to(&mut buffer, ImageFormat::Jpeg)
            .unwrap();
        buffer.into_inner()
    }

    fn pipeline(
        objects: MockObjectStore,
        detector: MockLabelDetector,
        labels: MockLabelStore,
    ) -> IngestionPipeline {
        let thumbnails = ThumbnailGenerator::new(Arc::new(objects), "thumbs", 250, 60);
        let extractor =
            LabelExtractor::new(Arc::new(detector), Arc::new(labels), LabelPolicy::default());
        IngestionPipeline::new(thumbnails, extractor)
    }

    #[tokio::test]
    async fn test_decodes_key_before_store_access() {
        let mut objects = MockObjectStore::new();
        objects
            .expect_get()
            .withf(|bucket, key| bucket == "images" && key == "a+b.jpg")
            .times(1)
            .returning(|_, _| Ok(Some(jpeg_bytes())));
        objects
            .expect_put()
            .withf(|_, key, _, _| key == "a+b.jpg")
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let mut detector = MockLabelDetector::new();
        detector
            .expect_detect_labels()
            .withf(|_, key, _, _| key == "a+b.jpg")
            .times(1)
            .returning(|_, _, _, _| Ok(vec![DetectedLabel::new("Text", 77.0)]));

        let mut labels = MockLabelStore::new();
        labels
            .expect_put()
            .withf(|record| record.image() == "a+b.jpg")
            .times(1)
            .returning(|_| Ok(()));

        let batch = NotificationBatch::new(vec![ObjectNotification::new("images", "a%2Bb.jpg")]);
        let summary = pipeline(objects, detector, labels).process(&batch).await;

        assert_eq!(
            summary,
            BatchSummary {
                records: 1,
                skipped: 0,
                thumbnails_written: 1,
                label_records_written: 1,
                failures: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_thumbnail_failure_does_not_block_labels() {
        let mut objects = MockObjectStore::new();
        objects.expect_get().returning(|bucket, key| {
            Err(Error::Fetch {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: "connection reset".to_string(),
            })
        });
        objects.expect_put().never();

        let mut detector = MockLabelDetector::new();
        detector
            .expect_detect_labels()
            .times(1)
            .returning(|_, _, _, _| Ok(vec![DetectedLabel::new("Cat", 98.0)]));

        let mut labels = MockLabelStore::new();
        labels.expect_put().times(1).returning(|_| Ok(()));

        let batch = NotificationBatch::new(vec![ObjectNotification::new("images", "cat.jpg")]);
        let summary = pipeline(objects, detector, labels).process(&batch).await;

        assert_eq!(summary.thumbnails_written, 0);
        assert_eq!(summary.label_records_written, 1);
        assert_eq!(summary.failures, 1);
    }

    #[tokio::test]
    async fn test_bad_record_does_not_block_batch() {
        let mut objects = MockObjectStore::new();
        objects
            .expect_get()
            .withf(|_, key| key == "missing.jpg")
            .returning(|_, _| Ok(None));
        objects
            .expect_get()
            .withf(|_, key| key == "dog.jpg")
            .returning(|_, _| Ok(Some(jpeg_bytes())));
        objects
            .expect_put()
            .withf(|_, key, _, _| key == "dog.jpg")
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let mut detector = MockLabelDetector::new();
        detector
            .expect_detect_labels()
            .withf(|_, key, _, _| key == "missing.jpg")
            .returning(|bucket, key, _, _| {
                Err(Error::LabelService {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    message: "InvalidS3ObjectException".to_string(),
                })
            });
        detector
            .expect_detect_labels()
            .withf(|_, key, _, _| key == "dog.jpg")
            .returning(|_, _, _, _| Ok(vec![DetectedLabel::new("Dog", 97.0)]));

        let mut labels = MockLabelStore::new();
        labels
            .expect_put()
            .withf(|record| record.image() == "dog.jpg")
            .times(1)
            .returning(|_| Ok(()));

        let batch = NotificationBatch::new(vec![
            ObjectNotification::new("images", "bad%FF.jpg"),
            ObjectNotification::new("images", "missing.jpg"),
            ObjectNotification::new("images", "dog.jpg"),
        ]);
        let summary = pipeline(objects, detector, labels)
            .with_record_concurrency(2)
            .process(&batch)
            .await;

        assert_eq!(summary.records, 3);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.thumbnails_written, 1);
        assert_eq!(summary.label_records_written, 1);
        assert_eq!(summary.failures, 3);
    }

    #[tokio::test]
    async fn test_removal_events_are_skipped() {
        let mut objects = MockObjectStore::new();
        objects.expect_get().never();
        let mut detector = MockLabelDetector::new();
        detector.expect_detect_labels().never();

        let mut record = ObjectNotification::new("images", "cat.jpg");
        record.event_name = Some("ObjectRemoved:Delete".to_string());

        let summary = pipeline(objects, detector, MockLabelStore::new())
            .process(&NotificationBatch::new(vec![record]))
            .await;

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failures, 0);
    }
}
