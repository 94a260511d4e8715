use crate::names::TopicName;

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("config error: {0}")]
    Config(String),

    #[error("kafka ping to {address} failed: {detail}")]
    Ping { address: String, detail: String },

    #[error("topic '{topic}' partition {partition}: connect failed: {detail}")]
    Connect {
        topic: TopicName,
        partition: i32,
        detail: String,
    },

    #[error("topic '{0}' is closed")]
    Closed(TopicName),

    #[error("topic '{topic}': release connection: {detail}")]
    Release { topic: TopicName, detail: String },

    #[error("topic '{topic}': reader task failed: {detail}")]
    Reader { topic: TopicName, detail: String },

    #[error("topic '{topic}': encode: {source}")]
    Encode {
        topic: TopicName,
        source: DecodeError,
    },

    #[error("topic '{topic}': publish failed: {detail}")]
    Publish { topic: TopicName, detail: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BusError {
    /// Topic the error belongs to, if any.
    pub fn topic(&self) -> Option<TopicName> {
        match self {
            BusError::Connect { topic, .. }
            | BusError::Closed(topic)
            | BusError::Release { topic, .. }
            | BusError::Reader { topic, .. }
            | BusError::Encode { topic, .. }
            | BusError::Publish { topic, .. } => Some(topic),
            BusError::Config(_) | BusError::Ping { .. } | BusError::Io(_) => None,
        }
    }
}

/// Failure of a single read from a broker connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReadError {
    /// No data arrived before the read deadline. Expected while a partition is idle.
    #[error("read timed out")]
    Timeout,

    #[error("transport: {0}")]
    Transport(String),
}

/// Payload could not be turned into a message schema.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid message: {0}")]
    Invalid(String),
}
