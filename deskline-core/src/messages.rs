//! Wire contracts carried over MQTT.
//!
//! Topics are versioned like the rest of the Deskline bus:
//! - `deskline/desks/status@v1/{endpoint_id}`   desk -> hub, edge-triggered
//! - `deskline/desks/requests@v1/{endpoint_id}` hub -> desk, create + update
//!
//! Field names follow the snake_case wire format of the original central
//! system so payloads stay greppable across both sides.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::MessageError;

pub const STATUS_TOPIC_PREFIX: &str = "deskline/desks/status@v1";
pub const REQUESTS_TOPIC_PREFIX: &str = "deskline/desks/requests@v1";
pub const HUB_HEALTH_TOPIC: &str = "deskline/hub/health@v1";

/// Wildcard subscription covering every desk's status topic.
pub const STATUS_TOPIC_ALL: &str = "deskline/desks/status@v1/+";

pub fn status_topic(endpoint_id: u32) -> String {
    format!("{STATUS_TOPIC_PREFIX}/{endpoint_id}")
}

pub fn requests_topic(endpoint_id: u32) -> String {
    format!("{REQUESTS_TOPIC_PREFIX}/{endpoint_id}")
}

/// Extracts the endpoint id from the trailing topic segment.
pub fn endpoint_from_topic(topic: &str) -> Result<u32, MessageError> {
    topic
        .rsplit('/')
        .next()
        .and_then(|seg| seg.parse::<u32>().ok())
        .ok_or_else(|| MessageError::UnknownTopic(topic.to_string()))
}

/// Wire representation of one presence transition. One per edge, not one
/// per scan; the receiver applies it idempotently (latest value wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub endpoint_id: u32,
    pub available: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Completed,
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestStatus::Pending => write!(f, "pending"),
            RequestStatus::Accepted => write!(f, "accepted"),
            RequestStatus::Completed => write!(f, "completed"),
        }
    }
}

/// A consultation request as carried on the bus. Hub-assigned `id` is the
/// identity: re-delivery of a known id is an update-in-place at the desk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsultationRequest {
    pub id: u64,
    pub requester_name: String,
    pub details: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_code: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub requested_at: OffsetDateTime,
    pub status: RequestStatus,
}

/// Schema-validated decode of an inbound payload. Anything that does not
/// parse is a `MalformedPayload`, logged and dropped by the caller.
pub fn decode<T: DeserializeOwned>(topic: &str, payload: &[u8]) -> Result<T, MessageError> {
    serde_json::from_slice(payload).map_err(|source| MessageError::MalformedPayload {
        topic: topic.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_round_trip() {
        assert_eq!(status_topic(7), "deskline/desks/status@v1/7");
        assert_eq!(endpoint_from_topic(&requests_topic(42)).unwrap(), 42);
        assert!(endpoint_from_topic("deskline/desks/status@v1/not-a-number").is_err());
    }

    #[test]
    fn request_accepts_missing_course_code() {
        let raw = br#"{
            "id": 7,
            "requester_name": "A",
            "details": "question about grading",
            "requested_at": "2026-08-30T10:00:00Z",
            "status": "pending"
        }"#;
        let req: ConsultationRequest = decode("deskline/desks/requests@v1/1", raw).unwrap();
        assert_eq!(req.id, 7);
        assert_eq!(req.course_code, None);
        assert_eq!(req.status, RequestStatus::Pending);
    }

    #[test]
    fn malformed_payload_is_rejected() {
        let err = decode::<ConsultationRequest>("deskline/desks/requests@v1/1", b"{\"id\": true}")
            .unwrap_err();
        assert!(matches!(err, MessageError::MalformedPayload { .. }));
    }

    #[test]
    fn status_wire_format_is_stable() {
        let msg = StatusMessage { endpoint_id: 3, available: true };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, serde_json::json!({"endpoint_id": 3, "available": true}));
    }
}
