use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;

use crate::message::Message;
use crate::names::TopicName;

/// Type-erased handler stored per topic.
pub type HandleFn<M> = Arc<dyn Fn(M) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Box an async closure into a [`HandleFn`].
pub fn handler_fn<M, F, Fut>(f: F) -> HandleFn<M>
where
    M: Message,
    F: Fn(M) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |message: M| -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(f(message))
    })
}

/// Append-only handler list shared between `Topic::handle` and the dispatcher.
pub(crate) struct Handlers<M> {
    topic: TopicName,
    list: RwLock<Vec<HandleFn<M>>>,
}

impl<M: Message> Handlers<M> {
    pub fn new(topic: TopicName) -> Self {
        Self {
            topic,
            list: RwLock::new(Vec::new()),
        }
    }

    pub fn push(&self, handler: HandleFn<M>) {
        let mut guard = match self.list.write() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!(topic = self.topic, "handler list write lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        guard.push(handler);
    }

    /// Copy of the current list. Later appends do not affect it.
    pub fn snapshot(&self) -> Vec<HandleFn<M>> {
        let guard = match self.list.read() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!(topic = self.topic, "handler list read lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        guard.clone()
    }

    pub fn len(&self) -> usize {
        match self.list.read() {
            Ok(g) => g.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Dispatcher — one decoded message → every registered handler
// ═══════════════════════════════════════════════════════════════

/// Fans decoded messages out to handlers and tracks every invocation.
///
/// Each handler runs in its own task, so handlers never block each other or
/// the reader. A panicking handler is contained in its task and logged.
pub(crate) struct Dispatcher<M> {
    topic: TopicName,
    handlers: Arc<Handlers<M>>,
    tracker: TaskTracker,
    limit: Option<Arc<Semaphore>>,
}

impl<M: Message> Dispatcher<M> {
    pub fn new(topic: TopicName, handlers: Arc<Handlers<M>>, max_in_flight: Option<usize>) -> Self {
        Self {
            topic,
            handlers,
            tracker: TaskTracker::new(),
            limit: max_in_flight.map(|n| Arc::new(Semaphore::new(n))),
        }
    }

    /// Start one invocation per registered handler.
    ///
    /// Returns once every invocation is spawned, not when they finish. With a
    /// concurrency bound this waits for free slots.
    pub async fn dispatch(&self, message: M) {
        for handler in self.handlers.snapshot() {
            let permit = match &self.limit {
                Some(limit) => match limit.clone().acquire_owned().await {
                    Ok(permit) => Some(permit),
                    // Semaphore is never closed while the dispatcher lives.
                    Err(_) => return,
                },
                None => None,
            };

            let topic = self.topic;
            let message = message.clone();
            self.tracker.spawn(async move {
                let _permit = permit;
                // Both the call and its future run inside the contained task.
                if let Err(e) = tokio::spawn(async move { handler(message).await }).await {
                    if e.is_panic() {
                        tracing::error!(topic, error = %e, "handler panicked");
                    }
                }
            });
        }
    }

    /// Handler invocations spawned and not yet finished.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait for every outstanding invocation. No new invocations may start afterwards.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::testing::Order;

    fn counting_handler(counter: Arc<AtomicUsize>) -> HandleFn<Order> {
        handler_fn(move |_msg: Order| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
    }

    async fn explode(_msg: Order) {
        panic!("boom")
    }

    fn explode_before_future(msg: Order) -> std::future::Ready<()> {
        if msg.id == "boom" {
            panic!("boom before future");
        }
        std::future::ready(())
    }

    #[tokio::test]
    async fn test_dispatch_reaches_every_handler_once() {
        let handlers = Arc::new(Handlers::new(Order::TOPIC));
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            handlers.push(counting_handler(counter.clone()));
        }
        let dispatcher = Dispatcher::new(Order::TOPIC, handlers, None);

        dispatcher.dispatch(Order::new("1", 10)).await;
        dispatcher.drain().await;

        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_drain_waits_for_slow_handler() {
        let handlers = Arc::new(Handlers::new(Order::TOPIC));
        let done = Arc::new(AtomicUsize::new(0));
        let d = done.clone();
        handlers.push(handler_fn(move |_msg: Order| {
            let d = d.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                d.fetch_add(1, Ordering::SeqCst);
            }
        }));
        let dispatcher = Dispatcher::new(Order::TOPIC, handlers, None);

        dispatcher.dispatch(Order::new("1", 10)).await;
        assert_eq!(dispatcher.in_flight(), 1);
        dispatcher.drain().await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_handler_does_not_affect_others() {
        let handlers = Arc::new(Handlers::new(Order::TOPIC));
        handlers.push(handler_fn(explode));
        let counter = Arc::new(AtomicUsize::new(0));
        handlers.push(counting_handler(counter.clone()));
        let dispatcher = Dispatcher::new(Order::TOPIC, handlers, None);

        dispatcher.dispatch(Order::new("1", 10)).await;
        dispatcher.dispatch(Order::new("2", 20)).await;
        dispatcher.drain().await;

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_handler_panicking_before_returning_future_is_contained() {
        let handlers = Arc::new(Handlers::new(Order::TOPIC));
        let counter = Arc::new(AtomicUsize::new(0));
        handlers.push(counting_handler(counter.clone()));
        handlers.push(handler_fn(explode_before_future));
        let dispatcher = Dispatcher::new(Order::TOPIC, handlers, None);

        dispatcher.dispatch(Order::new("boom", 1)).await;
        dispatcher.dispatch(Order::new("after", 2)).await;
        dispatcher.drain().await;

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_in_flight_bound_is_respected() {
        let handlers = Arc::new(Handlers::new(Order::TOPIC));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (r, p) = (running.clone(), peak.clone());
        handlers.push(handler_fn(move |_msg: Order| {
            let (r, p) = (r.clone(), p.clone());
            async move {
                let now = r.fetch_add(1, Ordering::SeqCst) + 1;
                p.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                r.fetch_sub(1, Ordering::SeqCst);
            }
        }));
        let dispatcher = Dispatcher::new(Order::TOPIC, handlers, Some(2));

        for i in 0..6i64 {
            dispatcher.dispatch(Order::new(&i.to_string(), i)).await;
        }
        dispatcher.drain().await;

        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(running.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_snapshot_is_not_affected_by_later_appends() {
        let handlers = Handlers::new(Order::TOPIC);
        handlers.push(counting_handler(Arc::new(AtomicUsize::new(0))));
        let snapshot = handlers.snapshot();
        handlers.push(counting_handler(Arc::new(AtomicUsize::new(0))));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(handlers.len(), 2);
    }
}
