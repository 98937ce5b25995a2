//! Correlation ID for request/reply matching.
//!
//! Uses UUID v4: 122 random bits, so collisions between outstanding
//! requests are negligible.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Correlation ID linking a request to its eventual reply.
///
/// On the wire it travels as the UTF-8 bytes of the hyphenated UUID string
/// in the message's `correlation_data` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate a new random correlation ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse from string
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }

    /// Decode from `correlation_data` bytes.
    ///
    /// Returns `None` for anything that is not a UTF-8 UUID string; such
    /// data cannot belong to a request issued here.
    pub fn from_correlation_data(data: &[u8]) -> Option<Self> {
        let s = std::str::from_utf8(data).ok()?;
        Self::parse(s).ok()
    }

    /// Encode as `correlation_data` bytes.
    pub fn to_correlation_data(&self) -> Bytes {
        Bytes::from(self.to_string())
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl From<Uuid> for CorrelationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<CorrelationId> for Uuid {
    fn from(id: CorrelationId) -> Self {
        id.0
    }
}
