//! Dead letter envelope for messages that exhausted their retry budget.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::time::now_ms;

/// Wrapper written to a dead letter topic when a message cannot be
/// delivered or persisted.
///
/// Carries the original payload verbatim so an operator can inspect or
/// replay it, the reason it failed, and when it was parked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    /// The original message payload, as it appeared on the source topic.
    pub payload: String,
    /// Human readable description of the terminal failure.
    pub reason: String,
    /// When the message was dead-lettered, in epoch milliseconds.
    pub timestamp_ms: i64,
}

impl DeadLetter {
    /// Build an envelope stamped with the current time.
    pub fn new(payload: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            reason: reason.into(),
            timestamp_ms: now_ms(),
        }
    }

    /// Serialize to the JSON wire format used on dead letter topics.
    pub fn to_bytes(&self) -> Result<Bytes, serde_json::Error> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    /// Decode an envelope from its JSON wire format.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_round_trip() {
        let letter = DeadLetter::new("{\"station_id\":\"s1\"}", "store unavailable");
        let bytes = letter.to_bytes().unwrap();
        let decoded = DeadLetter::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, letter);
        assert_eq!(decoded.payload, "{\"station_id\":\"s1\"}");
        assert_eq!(decoded.reason, "store unavailable");
    }

    #[test]
    fn test_envelope_is_timestamped() {
        let before = now_ms();
        let letter = DeadLetter::new("payload", "reason");
        let after = now_ms();
        assert!(letter.timestamp_ms >= before);
        assert!(letter.timestamp_ms <= after);
    }
}
