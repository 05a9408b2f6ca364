//! Error taxonomy of the sync engine.
//!
//! Nothing here is fatal to the process: scan failures are swallowed at the
//! state-machine boundary, transport failures feed the backoff policy, and
//! malformed payloads are discarded with a logged warning.

use thiserror::Error;

/// Radio-layer failure while sampling proximity. A zero-result scan is a
/// normal outcome, not an error.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("radio layer failure: {0}")]
    Radio(String),
    #[error("scan exceeded its {0:?} budget")]
    Timeout(std::time::Duration),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("not connected to broker")]
    NotConnected,
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },
}

/// A received payload or topic that fails schema validation. Discarded by
/// the coordinator, never retried.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("malformed payload on {topic}: {source}")]
    MalformedPayload {
        topic: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("unrecognized topic: {0}")]
    UnknownTopic(String),
}
