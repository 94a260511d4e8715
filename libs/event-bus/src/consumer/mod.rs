pub mod connection;
mod dispatcher;
pub mod kafka;
mod reader;
mod topic;

use std::sync::Arc;

use crate::config::BusConfig;
use crate::error::BusError;
use crate::message::PaymentsHighValueTransferMessage;

pub use connection::{Connection, Connector};
pub use dispatcher::{HandleFn, handler_fn};
pub use kafka::KafkaConnector;
pub use topic::{Topic, TopicState};

use topic::TopicSettings;

/// Every topic in this crate starts out reading partition 0.
const DEFAULT_PARTITION: i32 = 0;

/// Fixed set of consumable topics, one field per (topic, schema) pair.
///
/// Building it performs no network I/O; each topic connects on its first handler.
#[derive(Debug)]
pub struct Topics {
    pub payments_high_value_transfer: Topic<PaymentsHighValueTransferMessage>,
}

impl Topics {
    pub fn new(config: &BusConfig, connector: Arc<dyn Connector>) -> Self {
        let settings = TopicSettings::from(config);
        Self {
            payments_high_value_transfer: Topic::new(DEFAULT_PARTITION, settings, connector),
        }
    }

    /// Close every topic. All topics are closed even if one fails; the first
    /// error is returned.
    pub async fn close_all(&self) -> Result<(), BusError> {
        let results = [self.payments_high_value_transfer.close().await];
        results.into_iter().collect()
    }
}
