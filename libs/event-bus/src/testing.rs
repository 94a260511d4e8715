//! Test doubles for the consumer path. Only compiled for tests.
//!
//! `MockConnector` hands out a single scripted connection whose reads are fed
//! from a channel, and records connects and releases in a shared [`Probe`].

#![cfg(test)]

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::consumer::connection::{Connection, Connector};
use crate::error::{BusError, DecodeError, ReadError};
use crate::message::Message;
use crate::names::TopicName;

// ═══════════════════════════════════════════════════════════════
//  Schema used by tests
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub amount: i64,
}

impl Order {
    pub fn new(id: &str, amount: i64) -> Self {
        Self { id: id.to_string(), amount }
    }
}

impl Message for Order {
    const TOPIC: TopicName = "orders.created.v1";

    fn validate(&self) -> Result<(), DecodeError> {
        if self.amount < 0 {
            return Err(DecodeError::Invalid(format!("negative amount {}", self.amount)));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════
//  Mock connector / connection
// ═══════════════════════════════════════════════════════════════

type Script = Result<Vec<u8>, ReadError>;

/// Counters shared by a mock connector and the connections it creates.
#[derive(Debug, Default)]
pub struct Probe {
    pub connects: AtomicUsize,
    /// Read results handed to the reader.
    pub reads: AtomicUsize,
    pub releases: AtomicUsize,
    /// Bumped by test handlers when they finish.
    pub completed: AtomicUsize,
    /// Value of `completed` observed when the connection was released.
    pub completed_at_release: AtomicUsize,
}

/// Sending half of a mock connection's read script.
pub struct Feed {
    tx: mpsc::UnboundedSender<Script>,
}

impl Feed {
    pub fn message<M: Message>(&self, message: &M) {
        self.raw(&serde_json::to_vec(message).unwrap());
    }

    pub fn raw(&self, bytes: &[u8]) {
        let _ = self.tx.send(Ok(bytes.to_vec()));
    }

    pub fn timeout(&self) {
        let _ = self.tx.send(Err(ReadError::Timeout));
    }

    pub fn transport_error(&self, detail: &str) {
        let _ = self.tx.send(Err(ReadError::Transport(detail.to_string())));
    }
}

pub struct MockConnector {
    probe: Arc<Probe>,
    script: Mutex<Option<mpsc::UnboundedReceiver<Script>>>,
    failures: AtomicUsize,
    connect_delay: Duration,
    release_error: bool,
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, Feed) {
        Self::build(0, Duration::ZERO, false)
    }

    /// Connector whose first `failures` connect attempts fail.
    pub fn failing(failures: usize) -> (Arc<Self>, Feed) {
        Self::build(failures, Duration::ZERO, false)
    }

    /// Connector that takes `delay` to connect.
    pub fn slow(delay: Duration) -> (Arc<Self>, Feed) {
        Self::build(0, delay, false)
    }

    /// Connector whose connections fail to release.
    pub fn release_fails() -> (Arc<Self>, Feed) {
        Self::build(0, Duration::ZERO, true)
    }

    fn build(failures: usize, connect_delay: Duration, release_error: bool) -> (Arc<Self>, Feed) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            probe: Arc::new(Probe::default()),
            script: Mutex::new(Some(rx)),
            failures: AtomicUsize::new(failures),
            connect_delay,
            release_error,
        });
        (connector, Feed { tx })
    }

    pub fn probe(&self) -> Arc<Probe> {
        self.probe.clone()
    }
}

impl Connector for MockConnector {
    fn connect(
        &self,
        _address: &str,
        topic: TopicName,
        partition: i32,
        _timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn Connection>, BusError>> + Send + '_>> {
        Box::pin(async move {
            self.probe.connects.fetch_add(1, Ordering::SeqCst);
            if !self.connect_delay.is_zero() {
                tokio::time::sleep(self.connect_delay).await;
            }

            let fail = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if fail {
                return Err(BusError::Connect {
                    topic,
                    partition,
                    detail: "connection refused".into(),
                });
            }

            let script = self.script.lock().unwrap().take().unwrap_or_else(|| {
                let (_tx, rx) = mpsc::unbounded_channel();
                rx
            });
            Ok(Box::new(MockConnection {
                topic,
                script,
                probe: self.probe.clone(),
                release_error: self.release_error,
            }) as Box<dyn Connection>)
        })
    }
}

struct MockConnection {
    topic: TopicName,
    script: mpsc::UnboundedReceiver<Script>,
    probe: Arc<Probe>,
    release_error: bool,
}

impl Connection for MockConnection {
    fn read(&mut self) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, ReadError>> + Send + '_>> {
        Box::pin(async move {
            match self.script.recv().await {
                Some(result) => {
                    self.probe.reads.fetch_add(1, Ordering::SeqCst);
                    result
                }
                // Script exhausted: behave like an idle partition that never delivers.
                None => std::future::pending().await,
            }
        })
    }

    fn close(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<(), BusError>> + Send>> {
        Box::pin(async move {
            let completed = self.probe.completed.load(Ordering::SeqCst);
            self.probe.completed_at_release.store(completed, Ordering::SeqCst);
            self.probe.releases.fetch_add(1, Ordering::SeqCst);
            if self.release_error {
                return Err(BusError::Release {
                    topic: self.topic,
                    detail: "broken pipe".into(),
                });
            }
            Ok(())
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  Helpers
// ═══════════════════════════════════════════════════════════════

/// Counts ERROR-level events.
struct ErrorCounter(Arc<AtomicUsize>);

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for ErrorCounter {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        if *event.metadata().level() == tracing::Level::ERROR {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Count error events emitted on this thread while the guard lives.
///
/// Only sees tasks polled on the current thread, so use it from the default
/// single-threaded `#[tokio::test]` runtime.
pub fn count_errors() -> (Arc<AtomicUsize>, tracing::subscriber::DefaultGuard) {
    let counter = Arc::new(AtomicUsize::new(0));
    let guard = tracing_subscriber::registry()
        .with(ErrorCounter(counter.clone()))
        .set_default();
    (counter, guard)
}

/// Poll `cond` until it holds. Panics after five seconds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not reached within 5s");
}
