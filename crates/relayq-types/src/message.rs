//! Message types for RelayQ
//!
//! Defines the core Message struct and related types.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Unique identifier for a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct MessageId(pub Uuid);

impl MessageId {
    /// Create a new random MessageId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A published message: a content type and an opaque body.
///
/// Immutable once constructed. The routing engine clones it once per
/// matched queue at publish time; after that a copy is owned by exactly
/// one queue and then one consumer, never shared.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Message {
    /// Unique message identifier
    pub id: MessageId,

    /// Content type (e.g., "text/plain")
    pub content_type: String,

    /// Message body (raw bytes)
    #[serde(with = "bytes_serde")]
    #[schema(value_type = String)]
    pub body: Bytes,

    /// When the message was created
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a new `text/plain` message with the given body
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            id: MessageId::new(),
            content_type: "text/plain".to_string(),
            body: body.into(),
            created_at: Utc::now(),
        }
    }

    /// Create a new message with JSON content
    pub fn json<T: Serialize>(data: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(data)?;
        let mut msg = Self::new(body);
        msg.content_type = "application/json".to_string();
        Ok(msg)
    }

    /// Set content type
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Get the body as a string (if valid UTF-8)
    pub fn body_as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Count of occurrences of `marker` in the body.
    ///
    /// Consumers interpret the count of the `.` marker as whole units of
    /// simulated processing work.
    pub fn marker_count(&self, marker: u8) -> usize {
        self.body.iter().filter(|&&b| b == marker).count()
    }
}

/// Custom serialization for Bytes (as string or base64)
mod bytes_serde {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // For JSON, we serialize as string if it's valid UTF-8, otherwise base64
        if let Ok(s) = std::str::from_utf8(bytes) {
            s.serialize(serializer)
        } else {
            use base64::Engine;
            let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
            encoded.serialize(serializer)
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Bytes::from(s))
    }
}
