/**
 * STATUS LISTENER - Miroir MQTT des disponibilités
 *
 * RÔLE : S'abonne au wildcard des topics status de tous les desks et
 * applique chaque message à la table de disponibilité partagée.
 *
 * FONCTIONNEMENT : Une seule task consommatrice, donc l'ordre d'application
 * par desk égale l'ordre de réception ; l'apply est idempotent
 * (last-write-wins) et absorbe les doublons de l'at-least-once. Un payload
 * malformé est jeté avec un warning, jamais retenté.
 */

use deskline_core::messages::{self, StatusMessage};
use deskline_core::transport::MqttTransport;
use deskline_core::AvailabilityTable;
use tokio::task;

pub fn spawn_status_listener(transport: MqttTransport, table: AvailabilityTable) {
    task::spawn(async move {
        let mut inbound = transport.subscribe(messages::STATUS_TOPIC_ALL).await;
        while let Some(msg) = inbound.recv().await {
            let endpoint_id = match messages::endpoint_from_topic(&msg.topic) {
                Ok(id) => id,
                Err(e) => {
                    eprintln!("[hub] status topic invalide: {e}");
                    continue;
                }
            };
            match messages::decode::<StatusMessage>(&msg.topic, &msg.payload) {
                Ok(status) if status.endpoint_id == endpoint_id => {
                    table.apply(&status);
                    println!(
                        "[hub] desk {} -> {}",
                        status.endpoint_id,
                        if status.available { "available" } else { "unavailable" }
                    );
                }
                Ok(status) => {
                    eprintln!(
                        "[hub] status endpoint mismatch: topic {} vs payload {}",
                        endpoint_id, status.endpoint_id
                    );
                }
                Err(e) => eprintln!("[hub] status payload invalide: {e}"),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskline_core::messages::decode;

    // Le chemin complet transport->table passe par un broker ; ici on
    // vérifie la validation qui garde la table propre.
    #[test]
    fn mismatched_endpoint_is_detected() {
        let topic = messages::status_topic(1);
        let payload = br#"{"endpoint_id": 2, "available": true}"#;
        let status: StatusMessage = decode(&topic, payload).unwrap();
        let from_topic = messages::endpoint_from_topic(&topic).unwrap();
        assert_ne!(status.endpoint_id, from_topic);
    }
}
