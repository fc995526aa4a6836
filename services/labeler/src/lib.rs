//! Labeler Service
//!
//! Image labeling service for uploaded images. The service consumes object
//! creation notifications for the image bucket, writes a square thumbnail of
//! every new image to the thumbnail bucket, asks the vision label service for
//! labels and records them in PostgreSQL. A small HTTP API reads label records
//! back and deletes an image from all three stores.
//!
//! ## Features
//!
//! - **Thumbnails**: cover-resize to a fixed square, format preserved, JPEG
//!   re-encoded at reduced quality, same key as the original
//! - **Labels**: capped and confidence-filtered labels, stored as one record
//!   per image and overwritten on reprocessing
//! - **Query/Delete API**: `getLabels` and `deleteImage` actions with
//!   best-effort deletion
//!
//! ## Architecture
//!
//! ```text
//!  Image Bucket            Kafka                    Thumbnail Bucket
//! ┌──────────────┐  event ┌──────────────┐         ┌──────────────┐
//! │ {key}        │───────▶│ Notification │         │ {key}        │
//! └──────────────┘        │ Consumer     │         └──────────────┘
//!        ▲                └──────────────┘                ▲
//!        │                       │                        │
//!        │                       ▼                        │
//!        │                ┌──────────────┐         ┌──────────────┐
//!        ├────────────────│ Ingestion    │────────▶│ Thumbnail    │
//!        │                │ Pipeline     │         │ Generator    │
//!        │                └──────────────┘         └──────────────┘
//!        │                       │
//!        │                       ▼
//!        │                ┌──────────────┐         ┌──────────────┐
//!        │                │ Label        │────────▶│ Label Store  │
//!        │                │ Extractor    │         │ (PostgreSQL) │
//!        │                └──────────────┘         └──────────────┘
//!        │                                                ▲
//!        │                ┌──────────────┐                │
//!        └────────────────│ Query/Delete │────────────────┘
//!                         │ API          │
//!                         └──────────────┘
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod image_key;
pub mod label_detector;
pub mod label_extractor;
pub mod label_store;
pub mod notification;
pub mod notification_consumer;
pub mod object_store;
pub mod pipeline;
pub mod query_service;
pub mod thumbnail;

pub use api::{AppState, ErrorResponse, ServiceRequest};
pub use config::Config;
pub use error::{Error, Result};
pub use image_key::decode_object_key;
pub use label_detector::{DetectedLabel, LabelDetector, RekognitionDetector};
pub use label_extractor::{LabelExtractor, LabelPolicy};
pub use label_store::{LabelRecord, LabelStore, PgLabelStore};
pub use notification::{NotificationBatch, ObjectNotification};
pub use notification_consumer::NotificationConsumer;
pub use object_store::{ObjectStore, S3ObjectStore};
pub use pipeline::{BatchSummary, IngestionPipeline};
pub use query_service::{Action, QueryService, ServiceResponse};
pub use thumbnail::ThumbnailGenerator;
