use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::consumer::connection::Connection;
use crate::consumer::dispatcher::Dispatcher;
use crate::error::ReadError;
use crate::message::Message;

// ═══════════════════════════════════════════════════════════════
//  Reader loop — connection.read() → decode → dispatch
// ═══════════════════════════════════════════════════════════════

/// Start the pull loop for one topic partition.
///
/// Runs until `token` is cancelled, then hands the connection back so the
/// owner can release it after draining the dispatcher.
pub(crate) fn spawn_reader<M: Message>(
    mut conn: Box<dyn Connection>,
    partition: i32,
    dispatcher: Arc<Dispatcher<M>>,
    error_backoff: Duration,
    token: CancellationToken,
) -> JoinHandle<Box<dyn Connection>> {
    tokio::spawn(async move {
        let topic = M::TOPIC;
        tracing::debug!(topic, partition, "reader started");

        loop {
            let read = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                read = conn.read() => read,
            };

            let bytes = match read {
                Ok(bytes) => bytes,
                Err(ReadError::Timeout) => {
                    tracing::trace!(topic, partition, "read timed out, no data yet");
                    continue;
                }
                Err(ReadError::Transport(e)) => {
                    tracing::error!(topic, partition, error = %e, "read error");
                    if !error_backoff.is_zero() {
                        tokio::select! {
                            _ = token.cancelled() => break,
                            _ = tokio::time::sleep(error_backoff) => {}
                        }
                    }
                    continue;
                }
            };

            let message = match M::decode(&bytes) {
                Ok(message) => message,
                Err(e) => {
                    tracing::error!(topic, partition, len = bytes.len(), error = %e, "decode error, dropping message");
                    continue;
                }
            };

            tracing::debug!(topic, partition, len = bytes.len(), "received message");

            // Not cancellable: a message reaches all of its handlers or none.
            dispatcher.dispatch(message).await;
        }

        tracing::debug!(topic, partition, "reader stopped");
        conn
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::consumer::connection::Connector;
    use crate::consumer::dispatcher::{Handlers, handler_fn};
    use crate::testing::{Feed, MockConnector, Order, Probe, count_errors, wait_until};

    struct Harness {
        feed: Feed,
        probe: Arc<Probe>,
        seen: Arc<Mutex<Vec<Order>>>,
        token: CancellationToken,
        reader: JoinHandle<Box<dyn Connection>>,
    }

    impl Harness {
        async fn start(error_backoff: Duration) -> Self {
            let (connector, feed) = MockConnector::new();
            let probe = connector.probe();
            let conn = connector
                .connect("mock:9092", Order::TOPIC, 0, Duration::from_secs(1))
                .await
                .unwrap();

            let seen = Arc::new(Mutex::new(Vec::new()));
            let handlers = Arc::new(Handlers::new(Order::TOPIC));
            let s = seen.clone();
            handlers.push(handler_fn(move |msg: Order| {
                let s = s.clone();
                async move {
                    s.lock().unwrap().push(msg);
                }
            }));
            let dispatcher = Arc::new(Dispatcher::new(Order::TOPIC, handlers, None));
            let token = CancellationToken::new();
            let reader = spawn_reader(conn, 0, dispatcher, error_backoff, token.clone());
            Self { feed, probe, seen, token, reader }
        }

        async fn seen_len(&self, n: usize) {
            let seen = self.seen.clone();
            wait_until(move || seen.lock().unwrap().len() == n).await;
        }

        async fn stop(self) -> Box<dyn Connection> {
            self.token.cancel();
            self.reader.await.unwrap()
        }
    }

    #[tokio::test]
    async fn test_timeouts_are_not_errors_and_do_not_stop_the_loop() {
        let (errors, _guard) = count_errors();
        let h = Harness::start(Duration::ZERO).await;

        h.feed.timeout();
        h.feed.timeout();
        h.feed.timeout();
        h.feed.message(&Order::new("1", 10));

        h.seen_len(1).await;
        assert_eq!(errors.load(Ordering::SeqCst), 0);
        assert_eq!(h.probe.reads.load(Ordering::SeqCst), 4);
        h.stop().await;
    }

    #[tokio::test]
    async fn test_malformed_payload_is_dropped_and_logged() {
        let (errors, _guard) = count_errors();
        let h = Harness::start(Duration::ZERO).await;

        h.feed.raw(b"{\"id\":");
        h.feed.raw(br#"{"id":"2","amount":-1}"#);
        h.feed.message(&Order::new("3", 5));

        h.seen_len(1).await;
        assert_eq!(h.seen.lock().unwrap()[0], Order::new("3", 5));
        assert_eq!(errors.load(Ordering::SeqCst), 2);
        assert!(!h.reader.is_finished());
        h.stop().await;
    }

    #[tokio::test]
    async fn test_transport_errors_are_logged_and_skipped() {
        let (errors, _guard) = count_errors();
        let h = Harness::start(Duration::from_millis(5)).await;

        h.feed.transport_error("connection reset");
        h.feed.transport_error("connection reset");
        h.feed.message(&Order::new("1", 1));

        h.seen_len(1).await;
        assert_eq!(errors.load(Ordering::SeqCst), 2);
        h.stop().await;
    }

    #[tokio::test]
    async fn test_cancel_interrupts_blocked_read() {
        let h = Harness::start(Duration::ZERO).await;
        let probe = h.probe.clone();

        // Nothing is fed, so the reader sits in read().
        tokio::time::sleep(Duration::from_millis(20)).await;
        let conn = tokio::time::timeout(Duration::from_secs(1), h.stop())
            .await
            .expect("reader did not stop");

        conn.close().await.unwrap();
        assert_eq!(probe.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_during_fan_out_still_reaches_every_handler() {
        let (connector, feed) = MockConnector::new();
        let conn = connector
            .connect("mock:9092", Order::TOPIC, 0, Duration::from_secs(1))
            .await
            .unwrap();

        let started = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));
        let handlers = Arc::new(Handlers::new(Order::TOPIC));
        let (s, d) = (started.clone(), done.clone());
        handlers.push(handler_fn(move |_msg: Order| {
            let (s, d) = (s.clone(), d.clone());
            async move {
                s.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                d.fetch_add(1, Ordering::SeqCst);
            }
        }));
        let d = done.clone();
        handlers.push(handler_fn(move |_msg: Order| {
            let d = d.clone();
            async move {
                d.fetch_add(1, Ordering::SeqCst);
            }
        }));

        // One slot: the second handler waits for the first to finish.
        let dispatcher = Arc::new(Dispatcher::new(Order::TOPIC, handlers, Some(1)));
        let token = CancellationToken::new();
        let reader = spawn_reader(conn, 0, dispatcher.clone(), Duration::ZERO, token.clone());

        feed.message(&Order::new("1", 1));
        let s = started.clone();
        wait_until(move || s.load(Ordering::SeqCst) == 1).await;

        token.cancel();
        reader.await.unwrap();
        dispatcher.drain().await;

        assert_eq!(done.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_messages_arrive_in_partition_order() {
        let h = Harness::start(Duration::ZERO).await;

        for i in 0..5 {
            h.feed.message(&Order::new(&i.to_string(), i));
            h.seen_len(i as usize + 1).await;
        }

        let ids: Vec<String> = h.seen.lock().unwrap().iter().map(|o| o.id.clone()).collect();
        assert_eq!(ids, ["0", "1", "2", "3", "4"]);
        h.stop().await;
    }
}
