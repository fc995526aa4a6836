use crate::config::KafkaConfig;
use crate::notification::NotificationBatch;
use crate::pipeline::{BatchSummary, IngestionPipeline};
use anyhow::{Context, Result};
use futures::StreamExt;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::Offset;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

const SEEK_TIMEOUT: Duration = Duration::from_secs(10);

/// How handling a single message ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Payload was not a notification document
    Undecodable,
    /// Pipeline finished within budget
    Completed(BatchSummary),
    /// Budget elapsed before the pipeline finished
    TimedOut,
}

/// What to do with a message's offset after handling it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Commit past the message
    Commit,
    /// Seek the partition back to the message so it is fetched again
    Rewind,
}

/// Offset decision for a handled message.
///
/// Offset commits are cumulative per partition, so a timed-out batch must be
/// refetched before any later message on its partition is committed.
pub fn disposition(outcome: &BatchOutcome) -> Disposition {
    match outcome {
        BatchOutcome::Undecodable | BatchOutcome::Completed(_) => Disposition::Commit,
        BatchOutcome::TimedOut => Disposition::Rewind,
    }
}

/// Pending rewinds per topic partition.
///
/// After a seek, messages already fetched past the rewound offset may still be
/// buffered in the stream. They are skipped (neither handled nor committed)
/// until the rewound offset comes around again.
#[derive(Debug, Default)]
pub struct RewindTracker {
    pending: HashMap<(String, i32), i64>,
}

impl RewindTracker {
    pub fn rewind(&mut self, topic: &str, partition: i32, offset: i64) {
        self.pending.insert((topic.to_string(), partition), offset);
    }

    /// Whether a fetched message should be handled
    pub fn admit(&mut self, topic: &str, partition: i32, offset: i64) -> bool {
        let key = (topic.to_string(), partition);
        match self.pending.get(&key) {
            Some(&target) if offset > target => false,
            Some(_) => {
                self.pending.remove(&key);
                true
            }
            None => true,
        }
    }

    pub fn is_pending(&self, topic: &str, partition: i32) -> bool {
        self.pending.contains_key(&(topic.to_string(), partition))
    }
}

/// Decode one message payload and run it under the invocation budget.
pub async fn handle_payload(
    pipeline: &IngestionPipeline,
    payload: Option<&[u8]>,
    budget: Duration,
) -> BatchOutcome {
    let batch = match decode_batch(payload) {
        Ok(batch) => batch,
        Err(e) => {
            error!(error = %e, "Dropping undecodable notification");
            metrics::counter!("labeler.messages.invalid").increment(1);
            return BatchOutcome::Undecodable;
        }
    };

    debug!(records = batch.len(), "Received notification batch");
    process_with_budget(pipeline, &batch, budget).await
}

/// Run one batch under the invocation budget
pub async fn process_with_budget(
    pipeline: &IngestionPipeline,
    batch: &NotificationBatch,
    budget: Duration,
) -> BatchOutcome {
    let started = Instant::now();
    let result = tokio::time::timeout(budget, pipeline.process(batch)).await;
    metrics::histogram!("labeler.batch.duration_seconds").record(started.elapsed().as_secs_f64());

    match result {
        Ok(summary) => {
            metrics::counter!("labeler.batches.processed").increment(1);
            debug!(?summary, "Notification batch complete");
            BatchOutcome::Completed(summary)
        }
        Err(_) => {
            error!(
                timeout_secs = budget.as_secs(),
                "Notification batch exceeded its processing budget"
            );
            metrics::counter!("labeler.batches.timed_out").increment(1);
            BatchOutcome::TimedOut
        }
    }
}

/// Kafka consumer for bucket notifications
pub struct NotificationConsumer {
    consumer: StreamConsumer,
    pipeline: Arc<IngestionPipeline>,
    invocation_timeout: Duration,
}

impl NotificationConsumer {
    /// Create a new Kafka consumer for bucket notifications
    pub fn new(
        config: &KafkaConfig,
        pipeline: Arc<IngestionPipeline>,
        invocation_timeout: Duration,
    ) -> Result<Self> {
        let mut client_config = ClientConfig::new();

        client_config
            .set("bootstrap.servers", &config.bootstrap_servers)
            .set("group.id", &config.consumer_group)
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("enable.auto.commit", "false")
            .set("session.timeout.ms", config.session_timeout_ms.to_string())
            .set("max.poll.interval.ms", config.max_poll_interval_ms.to_string());

        // Configure SSL if enabled
        if config.ssl_enabled {
            client_config.set("security.protocol", "SASL_SSL");
            if let Some(ref ca_location) = config.ssl_ca_location {
                client_config.set("ssl.ca.location", ca_location);
            }
        }

        // Configure SASL if credentials provided
        if let (Some(ref username), Some(ref password)) =
            (&config.sasl_username, &config.sasl_password)
        {
            client_config
                .set("sasl.mechanisms", "PLAIN")
                .set("sasl.username", username)
                .set("sasl.password", password);
        }

        let consumer: StreamConsumer = client_config
            .create()
            .context("Failed to create Kafka consumer")?;

        consumer
            .subscribe(&[&config.notifications_topic])
            .context("Failed to subscribe to notifications topic")?;

        info!(
            topic = %config.notifications_topic,
            group = %config.consumer_group,
            "Subscribed to Kafka topic"
        );

        Ok(Self {
            consumer,
            pipeline,
            invocation_timeout,
        })
    }

    /// Consume notifications until `shutdown` is cancelled.
    ///
    /// Fails only when a timed-out batch cannot be rewound; the caller must
    /// then stop consuming so nothing past it is committed.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        info!("Starting notification consumer");

        let mut message_stream = self.consumer.stream();
        let mut rewinds = RewindTracker::default();

        loop {
            let message_result = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Notification consumer shutting down");
                    break;
                }
                next = message_stream.next() => match next {
                    Some(result) => result,
                    None => break,
                },
            };

            let message = match message_result {
                Ok(message) => message,
                Err(e) => {
                    error!(error = %e, "Kafka consumer error");
                    metrics::counter!("labeler.kafka.errors").increment(1);
                    continue;
                }
            };

            let (topic, partition, offset) = (message.topic(), message.partition(), message.offset());
            if !rewinds.admit(topic, partition, offset) {
                debug!(partition, offset, "Skipping message fetched ahead of a rewind");
                continue;
            }

            let outcome = self.handle_message(&message).await;
            match disposition(&outcome) {
                Disposition::Commit => {
                    if let Err(e) = self.consumer.commit_message(&message, CommitMode::Async) {
                        warn!(error = %e, "Failed to commit offset");
                    }
                }
                Disposition::Rewind => {
                    self.consumer
                        .seek(topic, partition, Offset::Offset(offset), SEEK_TIMEOUT)
                        .with_context(|| {
                            format!("Failed to rewind {topic}/{partition} to offset {offset}")
                        })?;
                    rewinds.rewind(topic, partition, offset);
                    warn!(partition, offset, "Rewound partition for redelivery");
                }
            }
        }

        Ok(())
    }

    /// Decode and process a single Kafka message
    #[instrument(
        skip(self, message),
        fields(partition = message.partition(), offset = message.offset(), batch_id = %Uuid::new_v4())
    )]
    async fn handle_message(&self, message: &BorrowedMessage<'_>) -> BatchOutcome {
        handle_payload(&self.pipeline, message.payload(), self.invocation_timeout).await
    }
}

/// Parse a Kafka payload into a notification batch
pub fn decode_batch(payload: Option<&[u8]>) -> Result<NotificationBatch> {
    let payload = payload.context("Message has no payload")?;
    serde_json::from_slice(payload).context("Failed to deserialize bucket notification")
}
