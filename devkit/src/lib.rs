/*!
# Deskline DevKit - Stubs et utilitaires de test

Bibliothèque facilitant les tests du bus Deskline sans broker réel:
- Stub MQTT enregistrant publications et abonnements
- Builders de messages conformes aux contrats status/requests
- Harness de test avec expectations et assertions
*/

pub mod mqtt_stub;
pub mod test_utils;

pub use mqtt_stub::{DesklineMessageBuilder, MockMqttClient};
pub use test_utils::TestHarness;
