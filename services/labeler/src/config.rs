use serde::Deserialize;
use std::time::Duration;

/// Main configuration for the labeler service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    pub service: ServiceConfig,
    /// Kafka configuration
    pub kafka: KafkaConfig,
    /// S3 configuration
    pub s3: S3Config,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Thumbnail and label policy
    #[serde(default)]
    pub labeling: LabelingConfig,
    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// Kafka consumer configuration for bucket notifications
#[derive(Debug, Clone, Deserialize)]
pub struct KafkaConfig {
    /// Kafka bootstrap servers
    pub bootstrap_servers: String,
    /// Consumer group ID
    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,
    /// Topic the image bucket publishes object notifications to
    #[serde(default = "default_notifications_topic")]
    pub notifications_topic: String,
    /// Enable SSL
    #[serde(default)]
    pub ssl_enabled: bool,
    /// SSL CA certificate path
    pub ssl_ca_location: Option<String>,
    /// SASL username
    pub sasl_username: Option<String>,
    /// SASL password
    pub sasl_password: Option<String>,
    /// Auto offset reset policy
    #[serde(default = "default_auto_offset_reset")]
    pub auto_offset_reset: String,
    /// Session timeout in milliseconds
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u32,
    /// Max poll interval in milliseconds
    #[serde(default = "default_max_poll_interval_ms")]
    pub max_poll_interval_ms: u32,
}

/// S3 bucket configuration
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// Bucket holding the original uploads
    pub image_bucket: String,
    /// Bucket holding generated thumbnails
    pub thumbnail_bucket: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
}

/// Database configuration for the label store
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Run migrations on startup
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// Thumbnail, label and invocation policy
#[derive(Debug, Clone, Deserialize)]
pub struct LabelingConfig {
    /// Thumbnail edge length in pixels (thumbnails are square)
    #[serde(default = "default_thumbnail_size")]
    pub thumbnail_size: u32,
    /// JPEG quality for thumbnails (1-100)
    #[serde(default = "default_thumbnail_quality")]
    pub thumbnail_quality: u8,
    /// Maximum number of labels kept per image
    #[serde(default = "default_max_labels")]
    pub max_labels: usize,
    /// Minimum label confidence, in percent
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
    /// Wall-clock budget for one notification batch
    #[serde(default = "default_invocation_timeout_secs")]
    pub invocation_timeout_secs: u64,
    /// Records of one batch processed concurrently (1 = sequential)
    #[serde(default = "default_record_concurrency")]
    pub record_concurrency: usize,
    /// Parent directory for per-image scratch space; system temp dir if unset
    #[serde(default)]
    pub temp_dir: Option<String>,
    /// Custom Rekognition endpoint URL (LocalStack)
    #[serde(default)]
    pub rekognition_endpoint_url: Option<String>,
}

/// API configuration for the query/delete endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

// Default value functions
fn default_service_name() -> String {
    "labeler".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_consumer_group() -> String {
    "labeler".to_string()
}

fn default_notifications_topic() -> String {
    "images.object-created".to_string()
}

fn default_auto_offset_reset() -> String {
    "earliest".to_string()
}

fn default_session_timeout_ms() -> u32 {
    30000
}

fn default_max_poll_interval_ms() -> u32 {
    300000
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_true() -> bool {
    true
}

fn default_thumbnail_size() -> u32 {
    250
}

fn default_thumbnail_quality() -> u8 {
    60
}

fn default_max_labels() -> usize {
    10
}

fn default_min_confidence() -> f32 {
    50.0
}

fn default_invocation_timeout_secs() -> u64 {
    30
}

fn default_record_concurrency() -> usize {
    1
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .set_default("service.name", "labeler")?
            .set_default("service.log_level", "info")?
            .set_default("service.metrics_port", 9090)?
            .add_source(config::File::with_name("config/labeler").required(false))
            .add_source(config::File::with_name("/etc/labeler/labeler").required(false))
            // LABELER__S3__IMAGE_BUCKET -> s3.image_bucket
            .add_source(
                config::Environment::with_prefix("LABELER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }

    /// Get the per-batch processing budget as Duration
    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_secs(self.labeling.invocation_timeout_secs)
    }
}

impl DatabaseConfig {
    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Get idle timeout as Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for LabelingConfig {
    fn default() -> Self {
        Self {
            thumbnail_size: default_thumbnail_size(),
            thumbnail_quality: default_thumbnail_quality(),
            max_labels: default_max_labels(),
            min_confidence: default_min_confidence(),
            invocation_timeout_secs: default_invocation_timeout_secs(),
            record_concurrency: default_record_concurrency(),
            temp_dir: None,
            rekognition_endpoint_url: None,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
        }
    }
}
