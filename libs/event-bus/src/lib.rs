//! Typed Kafka topics with lazily connected, concurrently dispatched handlers.
//!
//! `Consumer::new` pings the broker synchronously, so build it off the async
//! workers:
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use gw_event_bus::{BusConfig, Consumer};
//!
//! let config = BusConfig::load("bus.toml")?;
//! let consumer = tokio::task::spawn_blocking(move || Consumer::new(&config)).await??;
//!
//! consumer
//!     .topics
//!     .payments_high_value_transfer
//!     .handle(|msg| async move {
//!         tracing::info!(payment = %msg.payment_id, amount = msg.amount, "transfer");
//!     })
//!     .await?;
//!
//! consumer.topics.close_all().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod consumer;
pub mod error;
pub mod message;
pub mod names;
pub mod ping;
pub mod producer;
mod testing;

use std::sync::Arc;

pub use config::{BusConfig, ReadStrategy, StartOffset};
pub use consumer::{Topic, TopicState};
pub use error::{BusError, DecodeError, ReadError};
pub use message::Message;
pub use names::TopicName;
pub use ping::{BrokerInfo, ping};

/// Entry point for reading: verified broker plus the fixed topic set.
#[derive(Debug)]
pub struct Consumer {
    pub topics: consumer::Topics,
}

impl Consumer {
    /// Ping the broker, then build the (still disconnected) topics.
    ///
    /// Blocks for up to the ping timeout. A ping failure is returned and the
    /// process is expected to stop.
    pub fn new(config: &BusConfig) -> Result<Self, BusError> {
        config.validate()?;
        ping(config)?;
        Ok(Self::with_connector(
            config,
            Arc::new(consumer::KafkaConnector::new(config)),
        ))
    }

    /// Build topics over a custom connector without pinging.
    pub fn with_connector(config: &BusConfig, connector: Arc<dyn consumer::Connector>) -> Self {
        Self {
            topics: consumer::Topics::new(config, connector),
        }
    }
}

/// Entry point for writing.
#[derive(Debug)]
pub struct Producer {
    pub topics: producer::Topics,
}

impl Producer {
    pub fn new(config: &BusConfig) -> Result<Self, BusError> {
        config.validate()?;
        ping(config)?;
        let publisher = producer::KafkaPublisher::new(config)?;
        Ok(Self::with_publisher(Arc::new(publisher)))
    }

    pub fn with_publisher(publisher: Arc<dyn producer::Publisher>) -> Self {
        Self {
            topics: producer::Topics::new(publisher),
        }
    }
}
