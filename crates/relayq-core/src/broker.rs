//! Broker - the explicit context object tying routing together
//!
//! Holds the exchange table, the binding table, and the queue registry.
//! No ambient globals: everything a publisher or consumer touches hangs
//! off one `Broker` created at startup. Each table is a `DashMap`, so
//! declares and binds serialize per entry rather than behind one broker
//! lock, and unrelated queues never contend.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use relayq_types::{
    Binding, Error, Exchange, ExchangeKind, Message, QueueInfo, QueueStats, Result,
};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::consumer::{self, ConsumerEvent, ConsumerHandle, ConsumerOptions};
use crate::queue::Queue;
use crate::routing;

/// In-memory message broker
pub struct Broker {
    /// Declared exchanges by name
    exchanges: DashMap<String, Exchange>,
    /// Bindings grouped by exchange, in declaration order
    bindings: DashMap<String, Vec<Binding>>,
    /// Declared queues by name
    queues: DashMap<String, Arc<Queue>>,
    /// Simulated backend accept latency, applied before routing.
    /// Zero by default; tests raise it to exercise publish deadlines.
    accept_latency: Mutex<Duration>,
    /// Messages routed to zero queues (dropped by design, but counted)
    unroutable: AtomicU64,
}

impl Broker {
    /// Create an empty broker
    pub fn new() -> Self {
        info!("Initializing RelayQ broker");
        Self {
            exchanges: DashMap::new(),
            bindings: DashMap::new(),
            queues: DashMap::new(),
            accept_latency: Mutex::new(Duration::ZERO),
            unroutable: AtomicU64::new(0),
        }
    }

    /// Set the simulated accept latency applied to every publish
    pub fn set_accept_latency(&self, latency: Duration) {
        *self.accept_latency.lock() = latency;
    }

    // ==================== Declarations ====================

    /// Declare an exchange. Idempotent: re-declaring with the same kind
    /// returns the existing exchange; a different kind is a conflict.
    pub fn declare_exchange(
        &self,
        name: impl Into<String>,
        kind: ExchangeKind,
        durable: bool,
    ) -> Result<Exchange> {
        let name = name.into();
        match self.exchanges.entry(name.clone()) {
            Entry::Occupied(existing) => {
                let existing = existing.get();
                if existing.kind == kind {
                    Ok(existing.clone())
                } else {
                    Err(Error::ExchangeKindConflict {
                        name,
                        existing: existing.kind.to_string(),
                        requested: kind.to_string(),
                    })
                }
            }
            Entry::Vacant(slot) => {
                let exchange = Exchange::new(name.clone(), kind, durable);
                slot.insert(exchange.clone());
                info!(exchange = %name, kind = %kind, "Exchange declared");
                Ok(exchange)
            }
        }
    }

    /// Declare a queue. Idempotent: an existing queue is returned as-is.
    pub fn declare_queue(&self, name: impl Into<String>, exclusive: bool) -> Result<Arc<Queue>> {
        let name = name.into();
        let entry = self.queues.entry(name.clone()).or_insert_with(|| {
            info!(queue = %name, "Queue declared");
            Arc::new(Queue::new(QueueInfo::new(name.clone(), exclusive)))
        });
        Ok(Arc::clone(entry.value()))
    }

    /// Bind a queue to an exchange under a binding key.
    ///
    /// Idempotent: re-declaring an identical `(exchange, queue, key)`
    /// tuple is a no-op. Both entities must already be declared. There is
    /// no unbind; bindings are additive for the broker's lifetime.
    pub fn bind(
        &self,
        queue: impl Into<String>,
        exchange: impl Into<String>,
        binding_key: impl Into<String>,
    ) -> Result<()> {
        let queue = queue.into();
        let exchange = exchange.into();

        if !self.exchanges.contains_key(&exchange) {
            return Err(Error::ExchangeNotFound(exchange));
        }
        if !self.queues.contains_key(&queue) {
            return Err(Error::QueueNotFound(queue));
        }

        let binding = Binding::new(exchange.clone(), queue, binding_key);
        let mut bindings = self.bindings.entry(exchange).or_default();
        if !bindings.contains(&binding) {
            debug!(
                exchange = %binding.exchange,
                queue = %binding.queue,
                binding_key = %binding.binding_key,
                "Queue bound"
            );
            bindings.push(binding);
        }
        Ok(())
    }

    /// Bindings declared on an exchange, in declaration order
    pub fn bindings_for(&self, exchange: &str) -> Result<Vec<Binding>> {
        if !self.exchanges.contains_key(exchange) {
            return Err(Error::ExchangeNotFound(exchange.to_string()));
        }
        Ok(self
            .bindings
            .get(exchange)
            .map(|bindings| bindings.clone())
            .unwrap_or_default())
    }

    // ==================== Publish path ====================

    /// Publish a message to an exchange under a deadline.
    ///
    /// The deadline covers the whole attempt; exceeding it returns
    /// `PublishTimeout`. Fan-out is atomic with respect to the deadline:
    /// the only await point is the accept gate before routing, and the
    /// enqueue loop itself never suspends, so a timed-out publish has
    /// delivered to zero queues.
    pub async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: Message,
        deadline: Duration,
    ) -> Result<()> {
        tokio::time::timeout(deadline, self.deliver(exchange, routing_key, message))
            .await
            .map_err(|_| Error::PublishTimeout(deadline))?
    }

    async fn deliver(&self, exchange: &str, routing_key: &str, message: Message) -> Result<()> {
        let kind = self
            .exchanges
            .get(exchange)
            .map(|e| e.kind)
            .ok_or_else(|| Error::ExchangeNotFound(exchange.to_string()))?;

        let accept_latency = *self.accept_latency.lock();
        if !accept_latency.is_zero() {
            tokio::time::sleep(accept_latency).await;
        }

        let bindings = self
            .bindings
            .get(exchange)
            .map(|bindings| bindings.clone())
            .unwrap_or_default();
        let targets = routing::route(kind, routing_key, &bindings);

        if targets.is_empty() {
            // Unbound publishes are lost on purpose; count them so the
            // loss is observable without being an error.
            self.unroutable.fetch_add(1, Ordering::Relaxed);
            debug!(
                exchange = %exchange,
                routing_key = %routing_key,
                message_id = %message.id,
                "No binding matched, message dropped"
            );
            return Ok(());
        }

        debug!(
            exchange = %exchange,
            routing_key = %routing_key,
            message_id = %message.id,
            queues = targets.len(),
            "Message routed"
        );
        for target in &targets {
            if let Some(queue) = self.queues.get(target) {
                queue.enqueue(message.clone());
            }
        }
        Ok(())
    }

    // ==================== Consumption ====================

    /// Attach a consumer loop to a queue with default options.
    ///
    /// Returns the loop's handle and its event stream. The stream is
    /// infinite and non-restartable: a second consume on the same queue
    /// fails with `ConsumerAlreadyAttached`.
    pub fn consume(
        &self,
        queue_name: &str,
    ) -> Result<(ConsumerHandle, mpsc::UnboundedReceiver<ConsumerEvent>)> {
        self.consume_with(queue_name, ConsumerOptions::default())
    }

    /// Attach a consumer loop with explicit options
    pub fn consume_with(
        &self,
        queue_name: &str,
        options: ConsumerOptions,
    ) -> Result<(ConsumerHandle, mpsc::UnboundedReceiver<ConsumerEvent>)> {
        let queue = self
            .queues
            .get(queue_name)
            .map(|queue| Arc::clone(&queue))
            .ok_or_else(|| Error::QueueNotFound(queue_name.to_string()))?;

        if !queue.try_attach_consumer() {
            return Err(Error::ConsumerAlreadyAttached(queue_name.to_string()));
        }

        Ok(consumer::spawn(queue, options))
    }

    // ==================== Introspection ====================

    /// Look up a declared queue
    pub fn queue(&self, name: &str) -> Result<Arc<Queue>> {
        self.queues
            .get(name)
            .map(|queue| Arc::clone(&queue))
            .ok_or_else(|| Error::QueueNotFound(name.to_string()))
    }

    /// Statistics for one queue
    pub fn queue_stats(&self, name: &str) -> Result<QueueStats> {
        Ok(self.queue(name)?.stats())
    }

    /// All declared exchanges
    pub fn list_exchanges(&self) -> Vec<Exchange> {
        self.exchanges.iter().map(|e| e.clone()).collect()
    }

    /// All declared queues
    pub fn list_queues(&self) -> Vec<QueueInfo> {
        self.queues.iter().map(|q| q.info().clone()).collect()
    }

    /// All declared bindings across exchanges
    pub fn list_bindings(&self) -> Vec<Binding> {
        self.bindings
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect()
    }

    /// Messages dropped because no binding matched
    pub fn unroutable_count(&self) -> u64 {
        self.unroutable.load(Ordering::Relaxed)
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEADLINE: Duration = Duration::from_secs(5);

    async fn publish(broker: &Broker, exchange: &str, key: &str, body: &str) -> Result<()> {
        broker
            .publish(exchange, key, Message::new(body.to_string()), DEADLINE)
            .await
    }

    #[tokio::test]
    async fn test_fanout_reaches_all_bound_queues() {
        let broker = Broker::new();
        broker
            .declare_exchange("logs", ExchangeKind::Fanout, true)
            .unwrap();
        for name in ["q1", "q2"] {
            broker.declare_queue(name, true).unwrap();
            broker.bind(name, "logs", "").unwrap();
        }
        broker.declare_queue("unbound", false).unwrap();

        publish(&broker, "logs", "", "broadcast").await.unwrap();

        for name in ["q1", "q2"] {
            let queue = broker.queue(name).unwrap();
            assert_eq!(queue.depth(), 1, "{name} should hold exactly one copy");
            assert_eq!(queue.try_dequeue().unwrap().body_as_str(), Some("broadcast"));
        }
        assert_eq!(broker.queue("unbound").unwrap().depth(), 0);
    }

    #[tokio::test]
    async fn test_fanout_copies_are_distinct() {
        let broker = Broker::new();
        broker
            .declare_exchange("logs", ExchangeKind::Fanout, false)
            .unwrap();
        broker.declare_queue("q1", false).unwrap();
        broker.declare_queue("q2", false).unwrap();
        broker.bind("q1", "logs", "").unwrap();
        broker.bind("q2", "logs", "").unwrap();

        publish(&broker, "logs", "", "copy").await.unwrap();

        let a = broker.queue("q1").unwrap().try_dequeue().unwrap();
        let b = broker.queue("q2").unwrap().try_dequeue().unwrap();
        // Same published message, one independent copy per queue.
        assert_eq!(a.id, b.id);
        assert_eq!(a.body, b.body);
    }

    #[tokio::test]
    async fn test_direct_routes_by_exact_key() {
        let broker = Broker::new();
        broker
            .declare_exchange("logs_direct", ExchangeKind::Direct, true)
            .unwrap();
        broker.declare_queue("errors", false).unwrap();
        broker.declare_queue("warnings", false).unwrap();
        broker.bind("errors", "logs_direct", "error").unwrap();
        broker.bind("warnings", "logs_direct", "warning").unwrap();

        publish(&broker, "logs_direct", "error", "disk on fire")
            .await
            .unwrap();

        assert_eq!(broker.queue("errors").unwrap().depth(), 1);
        assert_eq!(broker.queue("warnings").unwrap().depth(), 0);
    }

    #[tokio::test]
    async fn test_unrouted_message_is_dropped_and_counted() {
        let broker = Broker::new();
        broker
            .declare_exchange("logs_direct", ExchangeKind::Direct, true)
            .unwrap();
        broker.declare_queue("errors", false).unwrap();
        broker.bind("errors", "logs_direct", "error").unwrap();

        // No binding for "debug": silent drop, not an error.
        publish(&broker, "logs_direct", "debug", "noise")
            .await
            .unwrap();

        assert_eq!(broker.queue("errors").unwrap().depth(), 0);
        assert_eq!(broker.unroutable_count(), 1);
    }

    #[tokio::test]
    async fn test_fifo_order_through_publish() {
        let broker = Broker::new();
        broker
            .declare_exchange("work", ExchangeKind::Direct, false)
            .unwrap();
        broker.declare_queue("tasks", false).unwrap();
        broker.bind("tasks", "work", "task").unwrap();

        publish(&broker, "work", "task", "first").await.unwrap();
        publish(&broker, "work", "task", "second").await.unwrap();

        let queue = broker.queue("tasks").unwrap();
        assert_eq!(queue.try_dequeue().unwrap().body_as_str(), Some("first"));
        assert_eq!(queue.try_dequeue().unwrap().body_as_str(), Some("second"));
    }

    #[tokio::test]
    async fn test_publish_to_unknown_exchange_fails() {
        let broker = Broker::new();
        let err = publish(&broker, "missing", "", "x").await.unwrap_err();
        assert!(matches!(err, Error::ExchangeNotFound(_)));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_declare_exchange_idempotent() {
        let broker = Broker::new();
        broker
            .declare_exchange("logs", ExchangeKind::Fanout, true)
            .unwrap();
        broker
            .declare_exchange("logs", ExchangeKind::Fanout, true)
            .unwrap();
        assert_eq!(broker.list_exchanges().len(), 1);
    }

    #[test]
    fn test_declare_exchange_kind_conflict() {
        let broker = Broker::new();
        broker
            .declare_exchange("logs", ExchangeKind::Fanout, true)
            .unwrap();
        let err = broker
            .declare_exchange("logs", ExchangeKind::Direct, true)
            .unwrap_err();
        assert!(matches!(err, Error::ExchangeKindConflict { .. }));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_declare_queue_idempotent() {
        let broker = Broker::new();
        let first = broker.declare_queue("hello", false).unwrap();
        let second = broker.declare_queue("hello", false).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(broker.list_queues().len(), 1);
    }

    #[test]
    fn test_duplicate_bind_is_noop() {
        let broker = Broker::new();
        broker
            .declare_exchange("logs", ExchangeKind::Fanout, true)
            .unwrap();
        broker.declare_queue("q1", false).unwrap();
        broker.bind("q1", "logs", "").unwrap();
        broker.bind("q1", "logs", "").unwrap();
        assert_eq!(broker.bindings_for("logs").unwrap().len(), 1);
    }

    #[test]
    fn test_bind_requires_declared_entities() {
        let broker = Broker::new();
        let err = broker.bind("q1", "logs", "").unwrap_err();
        assert!(matches!(err, Error::ExchangeNotFound(_)));

        broker
            .declare_exchange("logs", ExchangeKind::Fanout, true)
            .unwrap();
        let err = broker.bind("q1", "logs", "").unwrap_err();
        assert!(matches!(err, Error::QueueNotFound(_)));
    }

    #[test]
    fn test_bindings_for_preserves_declaration_order() {
        let broker = Broker::new();
        broker
            .declare_exchange("logs_direct", ExchangeKind::Direct, true)
            .unwrap();
        for (queue, key) in [("q1", "error"), ("q2", "warning"), ("q3", "info")] {
            broker.declare_queue(queue, false).unwrap();
            broker.bind(queue, "logs_direct", key).unwrap();
        }
        let keys: Vec<_> = broker
            .bindings_for("logs_direct")
            .unwrap()
            .into_iter()
            .map(|b| b.binding_key)
            .collect();
        assert_eq!(keys, vec!["error", "warning", "info"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_deadline_enforced_with_no_partial_fanout() {
        let broker = Broker::new();
        broker
            .declare_exchange("logs", ExchangeKind::Fanout, true)
            .unwrap();
        broker.declare_queue("q1", false).unwrap();
        broker.bind("q1", "logs", "").unwrap();

        broker.set_accept_latency(Duration::from_secs(10));

        let err = broker
            .publish("logs", "", Message::new("slow"), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PublishTimeout(_)));
        assert!(!err.is_configuration());

        // Timed out before the accept gate cleared: nothing delivered.
        assert_eq!(broker.queue("q1").unwrap().depth(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_within_deadline_succeeds() {
        let broker = Broker::new();
        broker
            .declare_exchange("logs", ExchangeKind::Fanout, true)
            .unwrap();
        broker.declare_queue("q1", false).unwrap();
        broker.bind("q1", "logs", "").unwrap();

        broker.set_accept_latency(Duration::from_secs(2));

        broker
            .publish("logs", "", Message::new("ok"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(broker.queue("q1").unwrap().depth(), 1);
    }

    #[tokio::test]
    async fn test_consume_delivers_published_messages() {
        let broker = Broker::new();
        broker
            .declare_exchange("logs", ExchangeKind::Fanout, true)
            .unwrap();
        broker.declare_queue("q1", true).unwrap();
        broker.bind("q1", "logs", "").unwrap();

        let (handle, mut events) = broker.consume("q1").unwrap();

        publish(&broker, "logs", "", "hello").await.unwrap();

        let received = events.recv().await.unwrap();
        assert!(matches!(received, ConsumerEvent::Received { .. }));

        handle.stop();
        handle.join().await;
    }

    #[tokio::test]
    async fn test_second_consume_on_same_queue_fails() {
        let broker = Broker::new();
        broker.declare_queue("q1", false).unwrap();

        let (handle, _events) = broker.consume("q1").unwrap();
        let err = broker.consume("q1").unwrap_err();
        assert!(matches!(err, Error::ConsumerAlreadyAttached(_)));

        handle.stop();
        handle.join().await;
    }

    #[tokio::test]
    async fn test_consume_unknown_queue_fails() {
        let broker = Broker::new();
        let err = broker.consume("missing").unwrap_err();
        assert!(matches!(err, Error::QueueNotFound(_)));
    }

    #[tokio::test]
    async fn test_publish_timeout_does_not_disturb_consumers() {
        let broker = Arc::new(Broker::new());
        broker
            .declare_exchange("logs", ExchangeKind::Fanout, true)
            .unwrap();
        broker.declare_queue("q1", false).unwrap();
        broker.bind("q1", "logs", "").unwrap();

        let (handle, mut events) = broker.consume("q1").unwrap();

        // A publish that times out immediately.
        broker.set_accept_latency(Duration::from_secs(60));
        let err = broker
            .publish("logs", "", Message::new("never"), Duration::from_millis(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PublishTimeout(_)));

        // The consumer is still live and picks up a later publish.
        broker.set_accept_latency(Duration::ZERO);
        publish(&broker, "logs", "", "after").await.unwrap();
        let received = events.recv().await.unwrap();
        assert!(matches!(received, ConsumerEvent::Received { .. }));

        handle.stop();
        handle.join().await;
    }
}
