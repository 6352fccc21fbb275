//! Exchange and binding types for RelayQ
//!
//! An exchange receives published messages and forwards them to queues
//! according to its kind. Bindings are the declared exchange-to-queue
//! relationships the routing engine matches against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Routing behavior of an exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    /// Deliver every message to all bound queues, ignoring the routing key
    Fanout,
    /// Deliver only to queues whose binding key exactly equals the routing key
    Direct,
}

impl std::fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExchangeKind::Fanout => write!(f, "fanout"),
            ExchangeKind::Direct => write!(f, "direct"),
        }
    }
}

/// A declared exchange
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Exchange {
    /// Exchange name (unique)
    pub name: String,

    /// Routing kind
    pub kind: ExchangeKind,

    /// Durability flag from the AMQP-shaped surface. Accepted for
    /// declaration compatibility; an in-memory broker never persists.
    #[serde(default)]
    pub durable: bool,

    /// When the exchange was declared
    pub created_at: DateTime<Utc>,
}

impl Exchange {
    /// Create a new exchange declaration
    pub fn new(name: impl Into<String>, kind: ExchangeKind, durable: bool) -> Self {
        Self {
            name: name.into(),
            kind,
            durable,
            created_at: Utc::now(),
        }
    }
}

/// A declared exchange-to-queue binding.
///
/// The `(exchange, queue, binding_key)` tuple is unique; re-declaring it
/// is a no-op. For fanout exchanges the key is carried but never matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Binding {
    /// Source exchange name
    pub exchange: String,

    /// Target queue name
    pub queue: String,

    /// Key matched against the routing key on direct exchanges
    pub binding_key: String,
}

impl Binding {
    /// Create a new binding
    pub fn new(
        exchange: impl Into<String>,
        queue: impl Into<String>,
        binding_key: impl Into<String>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            queue: queue.into(),
            binding_key: binding_key.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&ExchangeKind::Fanout).unwrap(),
            "\"fanout\""
        );
        let kind: ExchangeKind = serde_json::from_str("\"direct\"").unwrap();
        assert_eq!(kind, ExchangeKind::Direct);
    }

    #[test]
    fn test_exchange_creation() {
        let exchange = Exchange::new("logs", ExchangeKind::Fanout, true);
        assert_eq!(exchange.name, "logs");
        assert_eq!(exchange.kind, ExchangeKind::Fanout);
        assert!(exchange.durable);
    }

    #[test]
    fn test_binding_equality() {
        let a = Binding::new("logs_direct", "errors", "error");
        let b = Binding::new("logs_direct", "errors", "error");
        let c = Binding::new("logs_direct", "errors", "warning");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
