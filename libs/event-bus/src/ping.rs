use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer};

use crate::config::BusConfig;
use crate::error::BusError;

/// A broker node reported by the cluster metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerInfo {
    pub id: i32,
    pub host: String,
    pub port: i32,
}

impl std::fmt::Display for BrokerInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}:{}", self.id, self.host, self.port)
    }
}

/// Blocking reachability check: dial the bootstrap broker and enumerate the cluster.
///
/// Callers treat an error as fatal; nothing else in this crate can work without it.
pub fn ping(config: &BusConfig) -> Result<Vec<BrokerInfo>, BusError> {
    let address = config.address();
    let fail = |detail: String| BusError::Ping {
        address: address.clone(),
        detail,
    };

    let consumer: BaseConsumer = ClientConfig::new()
        .set("bootstrap.servers", &address)
        .set("client.id", &config.client_id)
        .create()
        .map_err(|e| fail(e.to_string()))?;

    let metadata = consumer
        .fetch_metadata(None, config.ping_timeout())
        .map_err(|e| fail(e.to_string()))?;

    let brokers: Vec<BrokerInfo> = metadata
        .brokers()
        .iter()
        .map(|b| BrokerInfo {
            id: b.id(),
            host: b.host().to_string(),
            port: b.port(),
        })
        .collect();
    if brokers.is_empty() {
        return Err(fail("cluster reported no brokers".into()));
    }

    tracing::debug!(%address, ?brokers, "kafka ping successful");
    Ok(brokers)
}
