use anyhow::{Context, Result};
use labeler::api::{start_api_server, AppState};
use labeler::config::Config;
use labeler::label_detector::RekognitionDetector;
use labeler::label_extractor::{LabelExtractor, LabelPolicy};
use labeler::label_store::{LabelStore, PgLabelStore};
use labeler::notification_consumer::NotificationConsumer;
use labeler::object_store::{load_aws_config, ObjectStore, S3ObjectStore};
use labeler::pipeline::IngestionPipeline;
use labeler::query_service::QueryService;
use labeler::thumbnail::ThumbnailGenerator;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        image_bucket = %config.s3.image_bucket,
        thumbnail_bucket = %config.s3.thumbnail_bucket,
        "Starting Labeler Service"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    // Initialize components
    let pg_store = PgLabelStore::new(&config.database)
        .await
        .context("Failed to initialize label store")?;

    // Run migrations if enabled
    if config.database.run_migrations {
        pg_store
            .run_migrations()
            .await
            .context("Failed to run database migrations")?;
    }

    let label_store: Arc<dyn LabelStore> = Arc::new(pg_store);

    let aws_config = load_aws_config(&config.s3.region).await;
    let object_store: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::new(&aws_config, &config.s3));
    let detector = Arc::new(RekognitionDetector::new(&aws_config, &config.labeling));

    let mut thumbnails = ThumbnailGenerator::new(
        object_store.clone(),
        config.s3.thumbnail_bucket.clone(),
        config.labeling.thumbnail_size,
        config.labeling.thumbnail_quality,
    );
    if let Some(ref temp_dir) = config.labeling.temp_dir {
        thumbnails = thumbnails.with_temp_root(temp_dir);
    }

    let extractor = LabelExtractor::new(
        detector,
        label_store.clone(),
        LabelPolicy {
            max_labels: config.labeling.max_labels,
            min_confidence: config.labeling.min_confidence,
        },
    );

    let pipeline = Arc::new(
        IngestionPipeline::new(thumbnails, extractor)
            .with_record_concurrency(config.labeling.record_concurrency),
    );

    // Create Kafka consumer
    let consumer = NotificationConsumer::new(&config.kafka, pipeline, config.invocation_timeout())
        .context("Failed to initialize notification consumer")?;

    // Create API state
    let api_state = AppState {
        query_service: Arc::new(QueryService::new(
            label_store.clone(),
            object_store,
            config.s3.image_bucket.clone(),
            config.s3.thumbnail_bucket.clone(),
        )),
        label_store,
    };

    let shutdown = CancellationToken::new();

    // Spawn Kafka consumer task; a consumer failure stops the whole service
    let consumer_shutdown = shutdown.clone();
    let consumer_handle = tokio::spawn(async move {
        let result = consumer.run(consumer_shutdown.clone()).await;
        if let Err(ref e) = result {
            error!(error = %e, "Notification consumer stopped");
            consumer_shutdown.cancel();
        }
        result
    });

    // Spawn API server task
    let api_config = config.api.clone();
    let api_shutdown = shutdown.clone();
    let api_handle = tokio::spawn(async move {
        let stop = async move { api_shutdown.cancelled().await };
        if let Err(e) = start_api_server(api_state, &api_config, stop).await {
            error!(error = %e, "API server error");
        }
    });

    info!("Labeler service started successfully");

    // Wait for shutdown signal or a failed consumer
    tokio::select! {
        _ = shutdown_signal() => {}
        _ = shutdown.cancelled() => {}
    }

    info!("Shutting down labeler service");
    shutdown.cancel();

    // An in-flight batch finishes or hits its budget before the consumer stops.
    let consumer_result = match consumer_handle.await {
        Ok(result) => result,
        Err(e) => {
            warn!(task = "consumer", error = %e, "Task did not stop cleanly");
            Ok(())
        }
    };
    if let Err(e) = api_handle.await {
        warn!(task = "api", error = %e, "Task did not stop cleanly");
    }

    info!("Labeler service stopped");

    consumer_result.context("Notification consumer failed")
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
