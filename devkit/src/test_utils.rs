/*!
Test Harness pour le bus Deskline

Facilite l'écriture de tests avec:
- Setup automatique du mock MQTT
- Injection de messages status/requests conformes aux contrats
- Assertions sur les messages échangés
*/

use crate::mqtt_stub::{DesklineMessageBuilder, MockMqttClient};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use anyhow::Result;

/// Harness de test complet pour composants Deskline
pub struct TestHarness {
    pub mqtt_client: MockMqttClient,
    expectations: Vec<Expectation>,
}

#[derive(Debug)]
struct Expectation {
    topic: String,
    expected_count: usize,
}

impl TestHarness {
    /// Crée un nouveau harness de test
    pub fn new() -> Self {
        env_logger::try_init().ok(); // Init logging pour tests

        Self {
            mqtt_client: MockMqttClient::new(),
            expectations: Vec::new(),
        }
    }

    /// Ajoute une expectation: on s'attend à N messages sur un topic
    pub fn expect_messages(&mut self, topic: &str, count: usize) -> &mut Self {
        self.expectations.push(Expectation {
            topic: topic.to_string(),
            expected_count: count,
        });
        self
    }

    /// Simule un message status entrant (desk -> hub)
    pub async fn send_status(&self, endpoint_id: u32, available: bool) -> Result<()> {
        let payload = DesklineMessageBuilder::status_v1(endpoint_id, available);
        let topic = deskline_core::messages::status_topic(endpoint_id);
        self.mqtt_client
            .simulate_incoming(topic, serde_json::to_vec(&payload)?)
            .await?;
        log::info!("Sent status for endpoint {}: {}", endpoint_id, available);
        Ok(())
    }

    /// Simule une demande de consultation entrante (hub -> desk)
    pub async fn send_request(
        &self,
        endpoint_id: u32,
        id: u64,
        requester_name: &str,
        status: &str,
    ) -> Result<()> {
        let payload = DesklineMessageBuilder::request_v1(id, requester_name, "test request", None, status);
        let topic = deskline_core::messages::requests_topic(endpoint_id);
        self.mqtt_client
            .simulate_incoming(topic, serde_json::to_vec(&payload)?)
            .await?;
        log::info!("Sent request {} for endpoint {}", id, endpoint_id);
        Ok(())
    }

    /// Attend qu'un message soit publié sur un topic
    pub async fn wait_for_message(&self, topic: &str, timeout_ms: u64) -> Result<Option<Value>> {
        let start = std::time::Instant::now();

        while start.elapsed() < Duration::from_millis(timeout_ms) {
            if let Some(msg) = self.mqtt_client.get_last_json_message::<Value>(topic)? {
                return Ok(Some(msg));
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        log::warn!("Timeout waiting for message on {}", topic);
        Ok(None)
    }

    /// Vérifie toutes les expectations configurées
    pub fn verify_expectations(&self) -> Result<()> {
        for expectation in &self.expectations {
            let messages = self.mqtt_client.find_messages_by_topic(&expectation.topic);
            let actual_count = messages.len();

            if actual_count != expectation.expected_count {
                anyhow::bail!(
                    "Expectation failed for topic '{}': expected {} messages, got {}",
                    expectation.topic, expectation.expected_count, actual_count
                );
            }
        }
        Ok(())
    }

    /// Assert qu'un champ a une valeur spécifique dans le dernier message
    pub fn assert_field_equals(&self, topic: &str, field_path: &str, expected: &Value) -> Result<()> {
        if let Some(msg) = self.mqtt_client.get_last_json_message::<Value>(topic)? {
            if let Some(actual) = get_nested_field(&msg, field_path) {
                if actual == expected {
                    return Ok(());
                }
                anyhow::bail!(
                    "Field '{}' mismatch: expected {:?}, got {:?}",
                    field_path, expected, actual
                );
            }
        }

        anyhow::bail!("Field '{}' not found for comparison in {}", field_path, topic);
    }

    /// Stats sur les messages collectés
    pub fn get_stats(&self) -> TestStats {
        let messages = self.mqtt_client.get_published_messages();
        let mut topic_counts = HashMap::new();

        for msg in &messages {
            *topic_counts.entry(msg.topic.clone()).or_insert(0) += 1;
        }

        TestStats {
            total_messages: messages.len(),
            topic_counts,
            subscriptions: self.mqtt_client.get_subscriptions(),
        }
    }

    /// Reset le harness pour un nouveau test
    pub fn reset(&mut self) {
        self.mqtt_client.clear();
        self.expectations.clear();
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

fn get_nested_field<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for part in path.split('.') {
        match current {
            Value::Object(obj) => {
                current = obj.get(part)?;
            }
            _ => return None,
        }
    }
    Some(current)
}

#[derive(Debug)]
pub struct TestStats {
    pub total_messages: usize,
    pub topic_counts: HashMap<String, usize>,
    pub subscriptions: Vec<String>,
}
