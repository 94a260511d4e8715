use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::error::{BusError, ReadError};
use crate::names::TopicName;

/// A live read connection to one topic partition.
///
/// Owned by exactly one reader loop; never shared.
pub trait Connection: Send {
    /// Pull the next message payload.
    ///
    /// Returns `ReadError::Timeout` when nothing arrived within the read deadline.
    fn read(&mut self) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, ReadError>> + Send + '_>>;

    /// Release the connection.
    fn close(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<(), BusError>> + Send>>;
}

/// Dials the leader of a topic partition.
pub trait Connector: Send + Sync {
    fn connect(
        &self,
        address: &str,
        topic: TopicName,
        partition: i32,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn Connection>, BusError>> + Send + '_>>;
}
