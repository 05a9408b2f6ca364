//! Bridges internal state to wire messages - the only place allowed to
//! translate between the two.
//!
//! Presence path: a state-machine edge becomes one latched StatusMessage
//! publish. Inbound path: a request payload is validated, applied to the
//! queue, and only then announced on the notification channel, so a
//! consumer reacting to the event always finds the entry it describes.

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{info, warn};

use crate::error::{MessageError, TransportError};
use crate::messages::{self, ConsultationRequest, StatusMessage};
use crate::presence::PresenceChange;
use crate::queue::{QueueUpdate, RequestQueue};
use crate::state::{new_state, Shared};
use crate::transport::{DeliveryMode, InboundMessage, Publisher};

/// Raised strictly after the queue already contains the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueEvent {
    Inserted { id: u64 },
    Updated { id: u64 },
}

pub struct SyncCoordinator<P: Publisher> {
    endpoint_id: u32,
    publisher: P,
    queue: Shared<RequestQueue>,
    events: UnboundedSender<QueueEvent>,
}

impl<P: Publisher> SyncCoordinator<P> {
    pub fn new(
        endpoint_id: u32,
        publisher: P,
        queue_capacity: usize,
    ) -> (Self, UnboundedReceiver<QueueEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let coordinator = Self {
            endpoint_id,
            publisher,
            queue: new_state(RequestQueue::new(queue_capacity)),
            events,
        };
        (coordinator, rx)
    }

    pub fn endpoint_id(&self) -> u32 {
        self.endpoint_id
    }

    /// Handle for the display consumer (`snapshot` / `consume_freshness`).
    pub fn queue(&self) -> Shared<RequestQueue> {
        self.queue.clone()
    }

    /// Publishes one availability edge, at-least-once and latched so the
    /// hub's view becomes authoritative again after any outage.
    pub async fn publish_presence(&self, change: PresenceChange) -> Result<(), TransportError> {
        self.publish_status(change.available()).await
    }

    pub async fn publish_status(&self, available: bool) -> Result<(), TransportError> {
        let msg = StatusMessage {
            endpoint_id: self.endpoint_id,
            available,
        };
        let topic = messages::status_topic(self.endpoint_id);
        let payload = serde_json::to_vec(&msg).map_err(|e| TransportError::Publish {
            topic: topic.clone(),
            reason: e.to_string(),
        })?;
        self.publisher
            .publish_latched(&topic, payload, DeliveryMode::AtLeastOnce)
            .await
    }

    /// Applies one inbound request message: schema validation, then
    /// insert-or-update, then the notification. Malformed input is the
    /// caller's to log; the queue is untouched in that case.
    pub fn handle_inbound(&self, msg: &InboundMessage) -> Result<QueueEvent, MessageError> {
        let for_endpoint = messages::endpoint_from_topic(&msg.topic)?;
        if for_endpoint != self.endpoint_id {
            return Err(MessageError::UnknownTopic(msg.topic.clone()));
        }
        let request: ConsultationRequest = messages::decode(&msg.topic, &msg.payload)?;
        let id = request.id;
        let update = self.queue.lock().insert_or_update(request);
        let event = match update {
            QueueUpdate::Inserted => QueueEvent::Inserted { id },
            QueueUpdate::Updated => QueueEvent::Updated { id },
        };
        // The event only leaves once the queue holds the entry.
        let _ = self.events.send(event);
        Ok(event)
    }

    /// Drains the transport subscription until the channel closes. Runs as
    /// its own task so the transport read loop is never blocked.
    pub async fn run_inbound(&self, mut rx: UnboundedReceiver<InboundMessage>) {
        while let Some(msg) = rx.recv().await {
            match self.handle_inbound(&msg) {
                Ok(QueueEvent::Inserted { id }) => info!(id, "consultation request queued"),
                Ok(QueueEvent::Updated { id }) => info!(id, "consultation request updated"),
                Err(e) => warn!(topic = %msg.topic, error = %e, "discarding inbound message"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::RequestStatus;
    use crate::transport::DeliveryMode;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Minimal recording publisher; the full-featured mock lives in the
    /// devkit crate.
    #[derive(Clone, Default)]
    struct RecordingPublisher {
        published: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    }

    impl Publisher for RecordingPublisher {
        async fn publish(
            &self,
            topic: &str,
            payload: Vec<u8>,
            _mode: DeliveryMode,
        ) -> Result<(), TransportError> {
            self.published.lock().push((topic.to_string(), payload));
            Ok(())
        }

        async fn publish_latched(
            &self,
            topic: &str,
            payload: Vec<u8>,
            mode: DeliveryMode,
        ) -> Result<(), TransportError> {
            self.publish(topic, payload, mode).await
        }
    }

    fn request_payload(id: u64, name: &str, status: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "id": id,
            "requester_name": name,
            "details": "needs help",
            "requested_at": "2026-08-30T10:00:00Z",
            "status": status,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn presence_edge_becomes_one_status_publish() {
        let publisher = RecordingPublisher::default();
        let (coordinator, _events) = SyncCoordinator::new(3, publisher.clone(), 5);

        coordinator.publish_presence(PresenceChange::Present).await.unwrap();

        let published = publisher.published.lock();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "deskline/desks/status@v1/3");
        let msg: StatusMessage = serde_json::from_slice(&published[0].1).unwrap();
        assert_eq!(msg, StatusMessage { endpoint_id: 3, available: true });
    }

    #[tokio::test]
    async fn inbound_request_is_queued_before_the_event_fires() {
        let (coordinator, mut events) = SyncCoordinator::new(1, RecordingPublisher::default(), 5);
        let msg = InboundMessage {
            topic: messages::requests_topic(1),
            payload: request_payload(7, "A", "pending"),
        };
        coordinator.handle_inbound(&msg).unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(event, QueueEvent::Inserted { id: 7 });
        // By the time the event is observable the queue holds the entry.
        let queue = coordinator.queue();
        let snap = queue.lock().snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].request.id, 7);
    }

    #[tokio::test]
    async fn status_update_for_known_id_is_update_in_place() {
        let (coordinator, mut events) = SyncCoordinator::new(1, RecordingPublisher::default(), 5);
        let topic = messages::requests_topic(1);
        coordinator
            .handle_inbound(&InboundMessage { topic: topic.clone(), payload: request_payload(7, "A", "pending") })
            .unwrap();
        coordinator
            .handle_inbound(&InboundMessage { topic, payload: request_payload(7, "A", "accepted") })
            .unwrap();

        assert_eq!(events.recv().await.unwrap(), QueueEvent::Inserted { id: 7 });
        assert_eq!(events.recv().await.unwrap(), QueueEvent::Updated { id: 7 });

        let queue = coordinator.queue();
        let snap = queue.lock().snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].request.status, RequestStatus::Accepted);
    }

    #[tokio::test]
    async fn malformed_payload_leaves_the_queue_untouched() {
        let (coordinator, _events) = SyncCoordinator::new(1, RecordingPublisher::default(), 5);
        let err = coordinator
            .handle_inbound(&InboundMessage {
                topic: messages::requests_topic(1),
                payload: b"not json at all".to_vec(),
            })
            .unwrap_err();
        assert!(matches!(err, MessageError::MalformedPayload { .. }));
        assert!(coordinator.queue().lock().is_empty());
    }

    #[tokio::test]
    async fn message_for_another_endpoint_is_rejected() {
        let (coordinator, _events) = SyncCoordinator::new(1, RecordingPublisher::default(), 5);
        let err = coordinator
            .handle_inbound(&InboundMessage {
                topic: messages::requests_topic(2),
                payload: request_payload(7, "A", "pending"),
            })
            .unwrap_err();
        assert!(matches!(err, MessageError::UnknownTopic(_)));
    }
}
