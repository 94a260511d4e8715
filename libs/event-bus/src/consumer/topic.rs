use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::BusConfig;
use crate::consumer::connection::{Connection, Connector};
use crate::consumer::dispatcher::{Dispatcher, Handlers, handler_fn};
use crate::consumer::reader::spawn_reader;
use crate::error::BusError;
use crate::message::Message;
use crate::names::TopicName;

/// Observable lifecycle of a [`Topic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicState {
    Disconnected,
    Connected,
    Closed,
}

/// Per-topic settings taken from [`BusConfig`].
#[derive(Debug, Clone)]
pub(crate) struct TopicSettings {
    pub address: String,
    pub connect_timeout: Duration,
    pub read_error_backoff: Duration,
    pub max_in_flight: Option<usize>,
}

impl From<&BusConfig> for TopicSettings {
    fn from(config: &BusConfig) -> Self {
        Self {
            address: config.address(),
            connect_timeout: config.connect_timeout(),
            read_error_backoff: config.read_error_backoff(),
            max_in_flight: config.in_flight_limit(),
        }
    }
}

enum State<M> {
    Disconnected,
    Connected(Running<M>),
    Closed,
}

/// Everything that exists only while a topic is connected.
struct Running<M> {
    token: CancellationToken,
    reader: JoinHandle<Box<dyn Connection>>,
    dispatcher: Arc<Dispatcher<M>>,
}

impl<M: Message> Running<M> {
    /// Stop reading, wait for handlers, then release the connection.
    async fn shutdown(self, topic: TopicName) -> Result<(), BusError> {
        self.token.cancel();
        let joined = self.reader.await;
        self.dispatcher.drain().await;

        let conn = joined.map_err(|e| BusError::Reader {
            topic,
            detail: e.to_string(),
        })?;
        conn.close().await
    }
}

/// A typed subscription point for one topic partition.
///
/// Created disconnected. The first [`handle`](Topic::handle) dials the
/// partition leader and starts a reader; [`close`](Topic::close) stops it for good.
pub struct Topic<M: Message> {
    partition: i32,
    settings: TopicSettings,
    connector: Arc<dyn Connector>,
    handlers: Arc<Handlers<M>>,
    state: Mutex<State<M>>,
}

impl<M: Message> std::fmt::Debug for Topic<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Topic")
            .field("name", &M::TOPIC)
            .field("partition", &self.partition)
            .field("address", &self.settings.address)
            .finish()
    }
}

impl<M: Message> Topic<M> {
    pub(crate) fn new(partition: i32, settings: TopicSettings, connector: Arc<dyn Connector>) -> Self {
        Self {
            partition,
            settings,
            connector,
            handlers: Arc::new(Handlers::new(M::TOPIC)),
            state: Mutex::new(State::Disconnected),
        }
    }

    pub fn name(&self) -> TopicName {
        M::TOPIC
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }

    pub fn address(&self) -> &str {
        &self.settings.address
    }

    pub async fn state(&self) -> TopicState {
        match *self.state.lock().await {
            State::Disconnected => TopicState::Disconnected,
            State::Connected(_) => TopicState::Connected,
            State::Closed => TopicState::Closed,
        }
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Handler invocations currently running.
    pub async fn in_flight(&self) -> usize {
        match &*self.state.lock().await {
            State::Connected(running) => running.dispatcher.in_flight(),
            _ => 0,
        }
    }

    /// Register a handler invoked for every message on this topic.
    ///
    /// The first call connects and starts the reader. Later calls only append
    /// the handler. If connecting fails the handler stays registered, the topic
    /// stays disconnected, and the next call tries again.
    pub async fn handle<F, Fut>(&self, handler: F) -> Result<(), BusError>
    where
        F: Fn(M) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let topic = M::TOPIC;
        let mut state = self.state.lock().await;

        match *state {
            State::Closed => return Err(BusError::Closed(topic)),
            State::Connected(_) => {
                self.handlers.push(handler_fn(handler));
                return Ok(());
            }
            State::Disconnected => self.handlers.push(handler_fn(handler)),
        }

        let conn = match self
            .connector
            .connect(&self.settings.address, topic, self.partition, self.settings.connect_timeout)
            .await
        {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!(topic, partition = self.partition, error = %e, "connect failed");
                return Err(e);
            }
        };

        let dispatcher = Arc::new(Dispatcher::new(
            topic,
            self.handlers.clone(),
            self.settings.max_in_flight,
        ));
        let token = CancellationToken::new();
        let reader = spawn_reader(
            conn,
            self.partition,
            dispatcher.clone(),
            self.settings.read_error_backoff,
            token.clone(),
        );

        *state = State::Connected(Running {
            token,
            reader,
            dispatcher,
        });
        tracing::info!(topic, partition = self.partition, address = %self.settings.address, "topic connected");
        Ok(())
    }

    /// Stop delivery and release the connection.
    ///
    /// Waits for every in-flight handler invocation before the connection is
    /// released, and returns the release error if any. The topic reports
    /// [`TopicState::Closed`] as soon as close starts, so handlers may still
    /// query it or call `handle` (which fails with [`BusError::Closed`]) while
    /// they are drained. Closing twice, or closing a topic that never
    /// connected, is a no-op. Calling `close` from one of the topic's own
    /// handlers while it is connected deadlocks.
    pub async fn close(&self) -> Result<(), BusError> {
        let topic = M::TOPIC;
        let previous = std::mem::replace(&mut *self.state.lock().await, State::Closed);

        match previous {
            State::Connected(running) => {
                let result = running.shutdown(topic).await;
                match &result {
                    Ok(()) => tracing::info!(topic, partition = self.partition, "topic closed"),
                    Err(e) => tracing::error!(topic, partition = self.partition, error = %e, "close failed"),
                }
                result
            }
            State::Disconnected | State::Closed => Ok(()),
        }
    }
}

impl<M: Message> Drop for Topic<M> {
    fn drop(&mut self) {
        let State::Connected(running) = std::mem::replace(self.state.get_mut(), State::Closed) else {
            return;
        };

        // Dropped without close: stop the reader, skip the drain, release in the background.
        running.token.cancel();
        let topic = M::TOPIC;
        let partition = self.partition;
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(topic, partition, "topic dropped outside a runtime, connection not released");
            return;
        };
        runtime.spawn(async move {
            let released = match running.reader.await {
                Ok(conn) => conn.close().await,
                Err(e) => Err(BusError::Reader { topic, detail: e.to_string() }),
            };
            if let Err(e) = released {
                tracing::warn!(topic, partition, error = %e, "release after drop failed");
            }
        });
    }
}
