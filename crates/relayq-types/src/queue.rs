//! Queue types for RelayQ
//!
//! Defines queue declaration metadata and statistics. The runtime queue
//! (the FIFO buffer consumers block on) lives in `relayq-core`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Queue declaration metadata
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QueueInfo {
    /// Queue name (unique within the broker)
    pub name: String,

    /// Exclusivity flag from the AMQP-shaped surface. Accepted for
    /// declaration compatibility; single-process, so semantically inert.
    #[serde(default)]
    pub exclusive: bool,

    /// When the queue was declared
    pub created_at: DateTime<Utc>,
}

impl QueueInfo {
    /// Create metadata for a newly declared queue
    pub fn new(name: impl Into<String>, exclusive: bool) -> Self {
        Self {
            name: name.into(),
            exclusive,
            created_at: Utc::now(),
        }
    }
}

/// Queue statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct QueueStats {
    /// Messages currently waiting in the queue
    pub depth: u64,

    /// Total messages enqueued since declaration
    pub enqueued_total: u64,

    /// Total messages dequeued (and therefore auto-acked) since declaration
    pub dequeued_total: u64,

    /// Whether a consumer is attached
    pub consumer_attached: bool,
}
