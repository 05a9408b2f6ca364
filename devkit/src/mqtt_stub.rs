/*!
Mock MQTT Client pour développement sans broker

Enregistre toutes les publications, simule la réception de messages, et
implémente le trait `Publisher` du moteur pour brancher le coordinateur
directement dessus dans les tests.
*/

use deskline_core::transport::{DeliveryMode, Publisher};
use deskline_core::TransportError;
use rumqttc::QoS;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use anyhow::Result;

#[derive(Debug, Clone)]
pub struct MockMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

/// Mock MQTT Client qui simule rumqttc::AsyncClient
#[derive(Clone)]
pub struct MockMqttClient {
    published_messages: Arc<Mutex<Vec<MockMessage>>>,
    subscriptions: Arc<Mutex<Vec<String>>>,
    latched: Arc<Mutex<Option<MockMessage>>>,
    message_sender: Arc<Mutex<Option<mpsc::UnboundedSender<MockMessage>>>>,
}

impl MockMqttClient {
    pub fn new() -> Self {
        Self {
            published_messages: Arc::new(Mutex::new(Vec::new())),
            subscriptions: Arc::new(Mutex::new(Vec::new())),
            latched: Arc::new(Mutex::new(None)),
            message_sender: Arc::new(Mutex::new(None)),
        }
    }

    /// Configuration d'un channel pour recevoir les messages simulés
    pub fn setup_receiver(&self) -> mpsc::UnboundedReceiver<MockMessage> {
        let (sender, receiver) = mpsc::unbounded_channel();
        *self.message_sender.lock().unwrap() = Some(sender);
        receiver
    }

    fn record(&self, topic: &str, payload: Vec<u8>, mode: DeliveryMode, retain: bool) -> MockMessage {
        let message = MockMessage {
            topic: topic.to_string(),
            payload,
            qos: mode.qos(),
            retain,
        };
        self.published_messages.lock().unwrap().push(message.clone());
        log::info!("[MOCK] Published to {}: {} bytes", message.topic, message.payload.len());
        message
    }

    /// Simule l'abonnement à un topic
    pub async fn subscribe<S: Into<String>>(&self, topic: S, _qos: QoS) -> Result<()> {
        let topic = topic.into();
        self.subscriptions.lock().unwrap().push(topic.clone());
        log::info!("[MOCK] Subscribed to {}", topic);
        Ok(())
    }

    /// Simule la réception d'un message (pour tests)
    pub async fn simulate_incoming<S, V>(&self, topic: S, payload: V) -> Result<()>
    where
        S: Into<String>,
        V: Into<Vec<u8>>,
    {
        let message = MockMessage {
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::AtLeastOnce,
            retain: false,
        };

        if let Some(sender) = self.message_sender.lock().unwrap().as_ref() {
            sender.send(message.clone()).map_err(|e| anyhow::anyhow!("Send error: {}", e))?;
        }

        log::info!("[MOCK] Simulated incoming: {}", message.topic);
        Ok(())
    }

    /// Récupère tous les messages publiés (pour assertions de tests)
    pub fn get_published_messages(&self) -> Vec<MockMessage> {
        self.published_messages.lock().unwrap().clone()
    }

    /// Récupère les abonnements (pour assertions de tests)
    pub fn get_subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().clone()
    }

    /// Dernier message retenu via publish_latched
    pub fn get_latched(&self) -> Option<MockMessage> {
        self.latched.lock().unwrap().clone()
    }

    /// Trouve les messages publiés sur un topic donné
    pub fn find_messages_by_topic(&self, topic: &str) -> Vec<MockMessage> {
        self.published_messages
            .lock()
            .unwrap()
            .iter()
            .filter(|msg| msg.topic == topic)
            .cloned()
            .collect()
    }

    /// Parse le dernier message d'un topic en JSON
    pub fn get_last_json_message<T>(&self, topic: &str) -> Result<Option<T>>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        let messages = self.find_messages_by_topic(topic);
        if let Some(last_msg) = messages.last() {
            let parsed: T = serde_json::from_slice(&last_msg.payload)?;
            Ok(Some(parsed))
        } else {
            Ok(None)
        }
    }

    /// Reset tous les messages enregistrés
    pub fn clear(&self) {
        self.published_messages.lock().unwrap().clear();
        self.subscriptions.lock().unwrap().clear();
        *self.latched.lock().unwrap() = None;
    }
}

impl Default for MockMqttClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Publisher for MockMqttClient {
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        mode: DeliveryMode,
    ) -> Result<(), TransportError> {
        self.record(topic, payload, mode, false);
        Ok(())
    }

    // Latched = broker-retained, comme le vrai transport
    async fn publish_latched(
        &self,
        topic: &str,
        payload: Vec<u8>,
        mode: DeliveryMode,
    ) -> Result<(), TransportError> {
        let message = self.record(topic, payload, mode, true);
        *self.latched.lock().unwrap() = Some(message);
        Ok(())
    }
}

/// Helper pour créer des messages de test conformes aux contrats Deskline
pub struct DesklineMessageBuilder;

impl DesklineMessageBuilder {
    /// Crée un message status v1 (desk -> hub)
    pub fn status_v1(endpoint_id: u32, available: bool) -> serde_json::Value {
        serde_json::json!({
            "endpoint_id": endpoint_id,
            "available": available,
        })
    }

    /// Crée un message request v1 (hub -> desk)
    pub fn request_v1(
        id: u64,
        requester_name: &str,
        details: &str,
        course_code: Option<&str>,
        status: &str,
    ) -> serde_json::Value {
        let mut msg = serde_json::json!({
            "id": id,
            "requester_name": requester_name,
            "details": details,
            "requested_at": chrono::Utc::now().to_rfc3339(),
            "status": status,
        });
        if let Some(code) = course_code {
            msg["course_code"] = serde_json::Value::String(code.to_string());
        }
        msg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_client_publish_subscribe() {
        let client = MockMqttClient::new();

        // Test abonnement
        client.subscribe("deskline/desks/requests@v1/1", QoS::AtLeastOnce).await.unwrap();
        assert_eq!(client.get_subscriptions(), vec!["deskline/desks/requests@v1/1"]);

        // Test publication via le trait Publisher
        let payload = b"test message".to_vec();
        client
            .publish("deskline/desks/status@v1/1", payload.clone(), DeliveryMode::AtLeastOnce)
            .await
            .unwrap();

        let messages = client.get_published_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].topic, "deskline/desks/status@v1/1");
        assert_eq!(messages[0].payload, payload);
        assert_eq!(messages[0].qos, QoS::AtLeastOnce);
    }

    #[tokio::test]
    async fn test_latched_publish_is_retained() {
        let client = MockMqttClient::new();
        let payload = serde_json::to_vec(&DesklineMessageBuilder::status_v1(2, false)).unwrap();
        client
            .publish_latched("deskline/desks/status@v1/2", payload, DeliveryMode::AtLeastOnce)
            .await
            .unwrap();

        let latched = client.get_latched().unwrap();
        assert_eq!(latched.topic, "deskline/desks/status@v1/2");
    }

    #[test]
    fn test_message_builders() {
        let status = DesklineMessageBuilder::status_v1(3, true);
        assert_eq!(status["endpoint_id"], 3);
        assert_eq!(status["available"], true);

        let request = DesklineMessageBuilder::request_v1(7, "A", "grading question", Some("CS101"), "pending");
        assert_eq!(request["id"], 7);
        assert_eq!(request["course_code"], "CS101");
        assert_eq!(request["status"], "pending");

        let without_course = DesklineMessageBuilder::request_v1(8, "B", "quick chat", None, "pending");
        assert!(without_course.get("course_code").is_none());
    }
}
