//! Typed publishing: validate, serialize, send.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};

use crate::config::BusConfig;
use crate::error::BusError;
use crate::message::{Message, PaymentsHighValueTransferMessage};
use crate::names::TopicName;

/// Sends encoded payloads to a topic partition.
pub trait Publisher: Send + Sync {
    fn send(
        &self,
        topic: TopicName,
        partition: i32,
        payload: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<(), BusError>> + Send + '_>>;
}

pub struct KafkaPublisher {
    producer: FutureProducer,
    queue_timeout: Duration,
}

impl KafkaPublisher {
    pub fn new(config: &BusConfig) -> Result<Self, BusError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", config.address())
            .set("client.id", &config.client_id)
            .set("message.timeout.ms", config.connect_timeout_ms.to_string())
            .create()
            .map_err(|e| BusError::Config(format!("kafka producer: {e}")))?;
        Ok(Self {
            producer,
            queue_timeout: config.connect_timeout(),
        })
    }
}

impl Publisher for KafkaPublisher {
    fn send(
        &self,
        topic: TopicName,
        partition: i32,
        payload: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<(), BusError>> + Send + '_>> {
        Box::pin(async move {
            let record: FutureRecord<'_, (), [u8]> = FutureRecord::to(topic)
                .partition(partition)
                .payload(payload.as_slice());
            self.producer
                .send(record, self.queue_timeout)
                .await
                .map(|_| ())
                .map_err(|(e, _)| BusError::Publish {
                    topic,
                    detail: e.to_string(),
                })
        })
    }
}

/// Publishing side of one topic.
pub struct ProducerTopic<M: Message> {
    partition: i32,
    publisher: Arc<dyn Publisher>,
    _schema: PhantomData<fn(M)>,
}

impl<M: Message> std::fmt::Debug for ProducerTopic<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProducerTopic")
            .field("name", &M::TOPIC)
            .field("partition", &self.partition)
            .finish()
    }
}

impl<M: Message> ProducerTopic<M> {
    pub(crate) fn new(partition: i32, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            partition,
            publisher,
            _schema: PhantomData,
        }
    }

    pub fn name(&self) -> TopicName {
        M::TOPIC
    }

    /// Validate and send one message. Invalid messages never reach the broker.
    pub async fn publish(&self, message: &M) -> Result<(), BusError> {
        let topic = M::TOPIC;
        let payload = message
            .encode()
            .map_err(|source| BusError::Encode { topic, source })?;
        let len = payload.len();

        self.publisher.send(topic, self.partition, payload).await?;
        tracing::debug!(topic, partition = self.partition, len, "published message");
        Ok(())
    }
}

/// Fixed set of publishable topics.
#[derive(Debug)]
pub struct Topics {
    pub payments_high_value_transfer: ProducerTopic<PaymentsHighValueTransferMessage>,
}

impl Topics {
    pub fn new(publisher: Arc<dyn Publisher>) -> Self {
        Self {
            payments_high_value_transfer: ProducerTopic::new(0, publisher),
        }
    }
}
