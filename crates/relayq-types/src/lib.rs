//! RelayQ Types - Core domain types for the message broker
//!
//! This crate contains all shared types used across RelayQ components.

pub mod error;
pub mod exchange;
pub mod message;
pub mod queue;

// Re-export commonly used types
pub use error::{Error, Result};
pub use exchange::{Binding, Exchange, ExchangeKind};
pub use message::{Message, MessageId};
pub use queue::{QueueInfo, QueueStats};
