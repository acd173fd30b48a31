//! Kafka queue adapter (feature `kafka`).
//!
//! Wraps an rdkafka `StreamConsumer` with auto-commit disabled: `complete`
//! commits the message's offset, `abandon` seeks the partition back to the
//! message so the broker redelivers it.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::topic_partition_list::{Offset, TopicPartitionList};
use tracing::{debug, info, warn};

use crate::config::QueueDispatcherConfig;
use crate::error::QueueError;
use crate::queue::adapter::{parse_envelope, DeliveryToken, QueueAdapter, QueueMessage};

pub struct KafkaAdapter {
    config: QueueDispatcherConfig,
    consumer: Option<StreamConsumer>,
}

impl KafkaAdapter {
    pub fn new(config: QueueDispatcherConfig) -> Self {
        Self {
            config,
            consumer: None,
        }
    }

    fn consumer(&self) -> Result<&StreamConsumer, QueueError> {
        self.consumer
            .as_ref()
            .ok_or_else(|| QueueError::Adapter("kafka consumer not connected".to_string()))
    }

    fn commit_past(&self, token: &DeliveryToken) -> Result<(), QueueError> {
        let consumer = self.consumer()?;
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&token.topic, token.partition, Offset::Offset(token.offset + 1))
            .map_err(|e| QueueError::Adapter(e.to_string()))?;
        consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(|e| QueueError::Adapter(e.to_string()))
    }
}

#[async_trait]
impl QueueAdapter for KafkaAdapter {
    async fn connect(&mut self) -> Result<(), QueueError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.config.bootstrap_servers)
            .set("group.id", &self.config.group_id)
            .set("auto.offset.reset", &self.config.auto_offset_reset)
            .set("enable.auto.commit", "false")
            .create()
            .map_err(|e| QueueError::Adapter(e.to_string()))?;

        consumer
            .subscribe(&[self.config.topic.as_str()])
            .map_err(|e| QueueError::Adapter(e.to_string()))?;

        info!(
            topic = %self.config.topic,
            group_id = %self.config.group_id,
            "kafka consumer connected"
        );
        self.consumer = Some(consumer);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), QueueError> {
        if let Some(consumer) = self.consumer.take() {
            consumer.unsubscribe();
            info!("kafka consumer disconnected");
        }
        Ok(())
    }

    async fn next_message(&mut self) -> Result<Option<QueueMessage>, QueueError> {
        let consumer = self.consumer()?;
        let borrowed = consumer
            .recv()
            .await
            .map_err(|e| QueueError::Adapter(e.to_string()))?;

        let token = DeliveryToken {
            topic: borrowed.topic().to_string(),
            partition: borrowed.partition(),
            offset: borrowed.offset(),
        };
        debug!(
            topic = %token.topic,
            partition = token.partition,
            offset = token.offset,
            "received kafka message"
        );

        match parse_envelope(borrowed.payload().unwrap_or_default()) {
            Ok((handler_name, params, job_id)) => Ok(Some(QueueMessage {
                handler_name,
                params,
                job_id,
                token,
            })),
            Err(e) => {
                // Redelivering a payload that cannot decode would loop
                // forever; commit past it.
                warn!(error = %e, offset = token.offset, "dropping malformed kafka message");
                self.commit_past(&token)?;
                Ok(None)
            }
        }
    }

    async fn complete(&mut self, message: &QueueMessage) -> Result<(), QueueError> {
        self.commit_past(&message.token)
    }

    async fn abandon(&mut self, message: &QueueMessage) -> Result<(), QueueError> {
        let consumer = self.consumer()?;
        consumer
            .seek(
                &message.token.topic,
                message.token.partition,
                Offset::Offset(message.token.offset),
                Duration::from_secs(5),
            )
            .map_err(|e| QueueError::Adapter(e.to_string()))
    }
}
