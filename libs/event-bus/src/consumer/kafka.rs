//! Kafka-backed [`Connector`] built on librdkafka.
//!
//! Each connection is a dedicated consumer manually assigned to a single
//! topic partition. No consumer group is joined and no offsets are committed.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message as _;
use rdkafka::{Offset, TopicPartitionList};

use crate::config::{BusConfig, ReadStrategy, StartOffset};
use crate::consumer::connection::{Connection, Connector};
use crate::error::{BusError, ReadError};
use crate::names::TopicName;

pub struct KafkaConnector {
    client: ClientConfig,
    start_offset: StartOffset,
    read_timeout: Duration,
}

impl KafkaConnector {
    pub fn new(config: &BusConfig) -> Self {
        Self {
            client: client_config(config),
            start_offset: config.start_offset,
            read_timeout: config.read_timeout(),
        }
    }
}

/// librdkafka settings for one partition reader.
fn client_config(config: &BusConfig) -> ClientConfig {
    let mut client = ClientConfig::new();
    client
        .set("bootstrap.servers", config.address())
        .set("client.id", &config.client_id)
        .set("group.id", &config.client_id)
        .set("enable.auto.commit", "false")
        .set("enable.auto.offset.store", "false")
        .set("enable.partition.eof", "false");

    match config.read {
        ReadStrategy::Stream { max_bytes } => {
            client
                .set("fetch.min.bytes", "1")
                .set("fetch.wait.max.ms", "100")
                .set("queued.min.messages", "1")
                .set("max.partition.fetch.bytes", max_bytes.to_string())
                .set("fetch.max.bytes", max_bytes.to_string());
        }
        ReadStrategy::Batch { min_bytes, max_bytes, max_wait_ms } => {
            client
                .set("fetch.min.bytes", min_bytes.to_string())
                .set("fetch.wait.max.ms", max_wait_ms.to_string())
                .set("max.partition.fetch.bytes", max_bytes.to_string())
                .set("fetch.max.bytes", max_bytes.to_string());
        }
    }
    client
}

fn offset(start: StartOffset) -> Offset {
    match start {
        StartOffset::Beginning => Offset::Beginning,
        StartOffset::End => Offset::End,
    }
}

/// Resolve the leader broker of `topic`/`partition`. Blocks up to `timeout`.
fn find_leader(
    consumer: &StreamConsumer,
    topic: &str,
    partition: i32,
    timeout: Duration,
) -> Result<String, String> {
    let metadata = consumer
        .fetch_metadata(Some(topic), timeout)
        .map_err(|e| format!("metadata: {e}"))?;

    let meta_topic = metadata
        .topics()
        .iter()
        .find(|t| t.name() == topic)
        .ok_or_else(|| "topic missing from metadata".to_string())?;
    if let Some(err) = meta_topic.error() {
        return Err(format!("metadata: {err:?}"));
    }

    let meta_partition = meta_topic
        .partitions()
        .iter()
        .find(|p| p.id() == partition)
        .ok_or_else(|| format!("partition {partition} does not exist"))?;
    let leader = meta_partition.leader();
    if leader < 0 {
        return Err(format!("partition {partition} has no leader"));
    }

    Ok(metadata
        .brokers()
        .iter()
        .find(|b| b.id() == leader)
        .map(|b| format!("{}:{}", b.host(), b.port()))
        .unwrap_or_else(|| format!("broker {leader}")))
}

impl Connector for KafkaConnector {
    fn connect(
        &self,
        address: &str,
        topic: TopicName,
        partition: i32,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn Connection>, BusError>> + Send + '_>> {
        let mut client = self.client.clone();
        client.set("bootstrap.servers", address);

        Box::pin(async move {
            let fail = |detail: String| BusError::Connect { topic, partition, detail };

            let consumer: StreamConsumer = client.create().map_err(|e| fail(e.to_string()))?;

            // Metadata lookup is a blocking librdkafka call.
            let (consumer, leader) = tokio::task::spawn_blocking(move || {
                let leader = find_leader(&consumer, topic, partition, timeout);
                (consumer, leader)
            })
            .await
            .map_err(|e| fail(e.to_string()))?;
            let leader = leader.map_err(fail)?;

            let mut assignment = TopicPartitionList::new();
            assignment
                .add_partition_offset(topic, partition, offset(self.start_offset))
                .map_err(|e| fail(e.to_string()))?;
            consumer.assign(&assignment).map_err(|e| fail(e.to_string()))?;

            tracing::info!(topic, partition, %leader, "assigned partition");

            Ok(Box::new(KafkaConnection {
                consumer: Some(consumer),
                topic,
                read_timeout: self.read_timeout,
            }) as Box<dyn Connection>)
        })
    }
}

pub struct KafkaConnection {
    /// Taken on release.
    consumer: Option<StreamConsumer>,
    topic: TopicName,
    read_timeout: Duration,
}

impl Connection for KafkaConnection {
    fn read(&mut self) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, ReadError>> + Send + '_>> {
        Box::pin(async move {
            let Some(consumer) = self.consumer.as_ref() else {
                return Err(ReadError::Transport("connection released".into()));
            };
            match tokio::time::timeout(self.read_timeout, consumer.recv()).await {
                Err(_) => Err(ReadError::Timeout),
                Ok(Err(e)) => Err(ReadError::Transport(e.to_string())),
                // Tombstones carry no payload; they fail decoding downstream.
                Ok(Ok(message)) => Ok(message.payload().map(<[u8]>::to_vec).unwrap_or_default()),
            }
        })
    }

    fn close(mut self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<(), BusError>> + Send>> {
        let topic = self.topic;
        let consumer = self.consumer.take();
        Box::pin(async move {
            let Some(consumer) = consumer else {
                return Ok(());
            };
            // Destroying the librdkafka handle blocks until its threads exit.
            tokio::task::spawn_blocking(move || {
                let result = consumer.unassign();
                drop(consumer);
                result
            })
            .await
            .map_err(|e| BusError::Release { topic, detail: e.to_string() })?
            .map_err(|e| BusError::Release { topic, detail: e.to_string() })
        })
    }
}

impl Drop for KafkaConnection {
    fn drop(&mut self) {
        // Not released through close, e.g. a panicking reader.
        let Some(consumer) = self.consumer.take() else {
            return;
        };
        tracing::warn!(topic = self.topic, "connection dropped without release");
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn_blocking(move || drop(consumer));
        }
    }
}
