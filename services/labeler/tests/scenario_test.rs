//! End-to-end scenarios over in-memory stores: upload notification through
//! thumbnail and labels, then query and delete.

use async_trait::async_trait;
use image::{DynamicImage, GenericImageView, ImageFormat, RgbImage};
use labeler::{
    DetectedLabel, IngestionPipeline, LabelDetector, LabelExtractor, LabelPolicy, LabelRecord,
    LabelStore, NotificationBatch, ObjectNotification, ObjectStore, QueryService, Result,
    ServiceResponse, ThumbnailGenerator,
};
use serde_json::json;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

const IMAGES: &str = "images";
const THUMBNAILS: &str = "images-resized";

#[derive(Default)]
struct MemoryObjectStore {
    objects: Mutex<HashMap<(String, String), (Vec<u8>, String)>>,
}

impl MemoryObjectStore {
    fn insert(&self, bucket: &str, key: &str, data: Vec<u8>) {
        self.objects.lock().unwrap().insert(
            (bucket.to_string(), key.to_string()),
            (data, "application/octet-stream".to_string()),
        );
    }

    fn object(&self, bucket: &str, key: &str) -> Option<(Vec<u8>, String)> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.object(bucket, key).map(|(data, _)| data))
    }

    async fn put(&self, bucket: &str, key: &str, data: Vec<u8>, content_type: &str) -> Result<()> {
        self.objects.lock().unwrap().insert(
            (bucket.to_string(), key.to_string()),
            (data, content_type.to_string()),
        );
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.objects
            .lock()
            .unwrap()
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }
}

#[derive(Default)]
struct MemoryLabelStore {
    records: Mutex<HashMap<String, LabelRecord>>,
}

#[async_trait]
impl LabelStore for MemoryLabelStore {
    async fn put(&self, record: &LabelRecord) -> Result<()> {
        self.records
            .lock()
            .unwrap()
            .insert(record.image().to_string(), record.clone());
        Ok(())
    }

    async fn get(&self, image: &str) -> Result<Option<LabelRecord>> {
        Ok(self.records.lock().unwrap().get(image).cloned())
    }

    async fn delete(&self, image: &str) -> Result<()> {
        self.records.lock().unwrap().remove(image);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Returns a fixed, already ranked label list
struct FixedDetector {
    labels: Mutex<Vec<DetectedLabel>>,
}

impl FixedDetector {
    fn new(labels: Vec<DetectedLabel>) -> Self {
        Self {
            labels: Mutex::new(labels),
        }
    }

    fn replace(&self, labels: Vec<DetectedLabel>) {
        *self.labels.lock().unwrap() = labels;
    }
}

#[async_trait]
impl LabelDetector for FixedDetector {
    async fn detect_labels(
        &self,
        _bucket: &str,
        _key: &str,
        max_labels: usize,
        min_confidence: f32,
    ) -> Result<Vec<DetectedLabel>> {
        Ok(self
            .labels
            .lock()
            .unwrap()
            .iter()
            .filter(|label| label.confidence >= min_confidence)
            .take(max_labels)
            .cloned()
            .collect())
    }
}

struct Harness {
    objects: Arc<MemoryObjectStore>,
    labels: Arc<MemoryLabelStore>,
    detector: Arc<FixedDetector>,
    pipeline: IngestionPipeline,
    service: QueryService,
}

impl Harness {
    fn new(detected: Vec<DetectedLabel>) -> Self {
        let objects = Arc::new(MemoryObjectStore::default());
        let labels = Arc::new(MemoryLabelStore::default());
        let detector = Arc::new(FixedDetector::new(detected));

        let pipeline = IngestionPipeline::new(
            ThumbnailGenerator::new(objects.clone(), THUMBNAILS, 250, 60),
            LabelExtractor::new(detector.clone(), labels.clone(), LabelPolicy::default()),
        );
        let service = QueryService::new(labels.clone(), objects.clone(), IMAGES, THUMBNAILS);

        Self {
            objects,
            labels,
            detector,
            pipeline,
            service,
        }
    }
}

fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([200, 120, 40])))
        .write_to(&mut buffer, ImageFormat::Jpeg)
        .unwrap();
    buffer.into_inner()
}

fn upload(key: &str) -> NotificationBatch {
    NotificationBatch::new(vec![ObjectNotification::new(IMAGES, key)])
}

#[tokio::test]
async fn test_cat_upload_query_and_delete() {
    let harness = Harness::new(vec![
        DetectedLabel::new("Cat", 98.1),
        DetectedLabel::new("Animal", 97.5),
    ]);
    harness.objects.insert(IMAGES, "cat.jpg", jpeg_bytes(800, 600));

    let summary = harness.pipeline.process(&upload("cat.jpg")).await;
    assert_eq!(summary.thumbnails_written, 1);
    assert_eq!(summary.label_records_written, 1);
    assert_eq!(summary.failures, 0);

    let (thumbnail, content_type) = harness.objects.object(THUMBNAILS, "cat.jpg").unwrap();
    assert_eq!(content_type, "image/jpeg");
    let decoded = image::load_from_memory(&thumbnail).unwrap();
    assert_eq!(decoded.dimensions(), (250, 250));

    let response = harness.service.handle("getLabels", "cat.jpg").await.unwrap();
    assert_eq!(
        serde_json::to_value(&response).unwrap(),
        json!({"image": "cat.jpg", "object1": "Cat", "object2": "Animal"})
    );

    let response = harness.service.handle("deleteImage", "cat.jpg").await.unwrap();
    assert_eq!(response, ServiceResponse::Deleted);
    assert!(harness.objects.object(IMAGES, "cat.jpg").is_none());
    assert!(harness.objects.object(THUMBNAILS, "cat.jpg").is_none());

    let response = harness.service.handle("getLabels", "cat.jpg").await.unwrap();
    assert_eq!(serde_json::to_value(&response).unwrap(), json!("No results"));
}

#[tokio::test]
async fn test_reprocessing_overwrites_labels() {
    let harness = Harness::new(vec![DetectedLabel::new("Cat", 98.0)]);
    harness.objects.insert(IMAGES, "pet.jpg", jpeg_bytes(300, 300));
    harness.pipeline.process(&upload("pet.jpg")).await;

    harness.detector.replace(vec![
        DetectedLabel::new("Dog", 95.0),
        DetectedLabel::new("Pet", 90.0),
    ]);
    harness.pipeline.process(&upload("pet.jpg")).await;

    let record = harness.labels.get("pet.jpg").await.unwrap().unwrap();
    assert_eq!(record.labels(), ["Dog".to_string(), "Pet".to_string()]);
    assert_eq!(harness.labels.records.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_encoded_key_is_stored_decoded() {
    let harness = Harness::new(vec![DetectedLabel::new("Text", 80.0)]);
    harness
        .objects
        .insert(IMAGES, "holiday photos/a+b.jpg", jpeg_bytes(640, 480));

    let summary = harness
        .pipeline
        .process(&upload("holiday+photos%2Fa%2Bb.jpg"))
        .await;
    assert_eq!(summary.failures, 0);

    assert!(harness
        .objects
        .object(THUMBNAILS, "holiday photos/a+b.jpg")
        .is_some());
    let response = harness
        .service
        .handle("getLabels", "holiday photos/a+b.jpg")
        .await
        .unwrap();
    assert!(matches!(response, ServiceResponse::Labels(_)));
}

#[tokio::test]
async fn test_no_labels_writes_no_record() {
    let harness = Harness::new(vec![DetectedLabel::new("Blur", 20.0)]);
    harness.objects.insert(IMAGES, "blank.jpg", jpeg_bytes(100, 100));

    let summary = harness.pipeline.process(&upload("blank.jpg")).await;
    assert_eq!(summary.thumbnails_written, 1);
    assert_eq!(summary.label_records_written, 0);

    let response = harness.service.handle("getLabels", "blank.jpg").await.unwrap();
    assert_eq!(response, ServiceResponse::NoResults);
}

#[tokio::test]
async fn test_delete_of_absent_key_confirms() {
    let harness = Harness::new(Vec::new());

    let response = harness
        .service
        .handle("deleteImage", "never-uploaded.jpg")
        .await
        .unwrap();

    assert_eq!(
        serde_json::to_value(&response).unwrap(),
        json!("Delete request successfully processed")
    );
}
