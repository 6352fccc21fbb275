//! RelayQ Core - Routing and dispatch logic for the message broker
//!
//! This crate contains the broker implementation:
//! - Broker: the explicit context object (exchanges, bindings, queues)
//! - Routing engine: fanout and direct target selection
//! - Queue: FIFO buffer with blocking dequeue
//! - Consumer loop: auto-ack dispatch with simulated processing latency
//! - Publisher: deadline-bounded publish path

pub mod broker;
pub mod consumer;
pub mod publisher;
pub mod queue;
pub mod routing;

// Re-exports
pub use broker::Broker;
pub use consumer::{ConsumerEvent, ConsumerHandle, ConsumerOptions, PROCESSING_MARKER};
pub use publisher::{Publisher, DEFAULT_PUBLISH_DEADLINE};
pub use queue::Queue;
