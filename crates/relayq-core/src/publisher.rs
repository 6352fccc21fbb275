//! Publisher - builds messages and hands them to the broker under a
//! time budget
//!
//! The publisher never retries: a deadline overrun is reported once and
//! the attempt is abandoned, bounding how long a caller blocks on an
//! unresponsive backend.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use relayq_types::{Message, MessageId, Result};
use tracing::info;

use crate::broker::Broker;

/// Default publish time budget. Five seconds bounds how long a caller
/// blocks when the backend is slow to accept.
pub const DEFAULT_PUBLISH_DEADLINE: Duration = Duration::from_secs(5);

/// Deadline-bounded publisher over one broker
pub struct Publisher {
    broker: Arc<Broker>,
    deadline: Duration,
}

impl Publisher {
    /// Create a publisher with the default 5-second deadline
    pub fn new(broker: Arc<Broker>) -> Self {
        Self {
            broker,
            deadline: DEFAULT_PUBLISH_DEADLINE,
        }
    }

    /// Override the per-publish deadline
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Build a `text/plain` message from `body` and publish it
    pub async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: impl Into<Bytes>,
    ) -> Result<MessageId> {
        self.publish_message(exchange, routing_key, Message::new(body))
            .await
    }

    /// Publish an already-built message
    pub async fn publish_message(
        &self,
        exchange: &str,
        routing_key: &str,
        message: Message,
    ) -> Result<MessageId> {
        let message_id = message.id;
        self.broker
            .publish(exchange, routing_key, message, self.deadline)
            .await?;
        info!(
            exchange = %exchange,
            routing_key = %routing_key,
            message_id = %message_id,
            "Sent message"
        );
        Ok(message_id)
    }
}
