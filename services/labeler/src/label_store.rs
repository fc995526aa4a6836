use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use tracing::{debug, info, instrument};

const LABEL_TABLE: &str = "image_labels";

/// Labels extracted for one image, in descending confidence order.
///
/// Serializes flat, the way clients consume it:
/// `{"image": "cat.jpg", "object1": "Cat", "object2": "Animal"}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelRecord {
    image: String,
    labels: Vec<String>,
}

impl LabelRecord {
    pub fn new(image: impl Into<String>, labels: Vec<String>) -> Self {
        Self {
            image: image.into(),
            labels,
        }
    }

    /// The image key this record belongs to
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Label names in slot order
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Label for an ordinal slot, starting at 1
    pub fn slot(&self, ordinal: usize) -> Option<&str> {
        ordinal
            .checked_sub(1)
            .and_then(|i| self.labels.get(i))
            .map(String::as_str)
    }
}

impl Serialize for LabelRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.labels.len() + 1))?;
        map.serialize_entry("image", &self.image)?;
        for (i, label) in self.labels.iter().enumerate() {
            map.serialize_entry(&format!("object{}", i + 1), label)?;
        }
        map.end()
    }
}

/// Keyed record store holding one [`LabelRecord`] per image.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LabelStore: Send + Sync {
    /// Insert or overwrite the record for `record.image()`.
    async fn put(&self, record: &LabelRecord) -> Result<()>;

    async fn get(&self, image: &str) -> Result<Option<LabelRecord>>;

    /// Remove the record. Removing a missing record succeeds.
    async fn delete(&self, image: &str) -> Result<()>;

    /// Check that the store is reachable (readiness probe)
    async fn ping(&self) -> Result<()>;
}

/// Stored label row
#[derive(Debug, Clone, FromRow)]
struct LabelRow {
    image: String,
    labels: Vec<String>,
    updated_at: DateTime<Utc>,
}

/// PostgreSQL-backed label store
pub struct PgLabelStore {
    pool: PgPool,
}

impl PgLabelStore {
    /// Create a new label store with connection pool
    pub async fn new(config: &DatabaseConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout())
            .idle_timeout(Some(config.idle_timeout()))
            .connect(&config.url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("Connected to PostgreSQL database");

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl LabelStore for PgLabelStore {
    #[instrument(skip(self, record), fields(image = %record.image(), label_count = record.labels().len()))]
    async fn put(&self, record: &LabelRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO image_labels (image, labels, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (image)
            DO UPDATE SET labels = EXCLUDED.labels, updated_at = NOW()
            "#,
        )
        .bind(record.image())
        .bind(&record.labels)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::StoreWrite {
            store: LABEL_TABLE.to_string(),
            key: record.image().to_string(),
            message: e.to_string(),
        })?;

        debug!("Label record upserted");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, image: &str) -> Result<Option<LabelRecord>> {
        let row = sqlx::query_as::<_, LabelRow>(
            r#"
            SELECT image, labels, updated_at
            FROM image_labels
            WHERE image = $1
            "#,
        )
        .bind(image)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::StoreRead {
            store: LABEL_TABLE.to_string(),
            key: image.to_string(),
            message: e.to_string(),
        })?;

        Ok(row.map(|row| {
            debug!(updated_at = %row.updated_at, "Label record found");
            LabelRecord::new(row.image, row.labels)
        }))
    }

    #[instrument(skip(self))]
    async fn delete(&self, image: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM image_labels WHERE image = $1")
            .bind(image)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::StoreDelete {
                store: LABEL_TABLE.to_string(),
                key: image.to_string(),
                message: e.to_string(),
            })?;

        debug!(rows = result.rows_affected(), "Label record deleted");
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::StoreRead {
                store: LABEL_TABLE.to_string(),
                key: String::new(),
                message: e.to_string(),
            })?;
        Ok(())
    }
}
