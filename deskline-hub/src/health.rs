/**
 * HUB HEALTH - Rapport de santé périodique du hub
 *
 * RÔLE : Expose l'état du hub (uptime, desks suivis, demandes ouvertes,
 * état MQTT) via l'API REST et le publie sur le bus toutes les 30s.
 *
 * FONCTIONNEMENT : Télémétrie jetable, publiée en at-most-once ; un rapport
 * perdu est simplement remplacé par le suivant.
 */

use std::sync::Arc;
use std::time::{Duration, Instant};

use deskline_core::messages::HUB_HEALTH_TOPIC;
use deskline_core::transport::{ConnectionState, DeliveryMode, MqttTransport, Publisher};
use deskline_core::AvailabilityTable;
use serde::Serialize;
use tokio::task;

use crate::requests::RequestRegistry;

#[derive(Debug, Serialize)]
pub struct HubHealth {
    pub uptime_seconds: u64,
    pub desks_tracked: u32,
    pub requests_open: u32,
    pub mqtt_state: String,
    pub mqtt_reconnects: u32,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }

    pub fn get_health(
        &self,
        table: &AvailabilityTable,
        registry: &RequestRegistry<MqttTransport>,
        transport: &MqttTransport,
    ) -> HubHealth {
        HubHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            desks_tracked: table.len() as u32,
            requests_open: registry.open_count() as u32,
            mqtt_state: state_label(transport.state()).to_string(),
            mqtt_reconnects: transport.reconnect_count(),
        }
    }

    /// Démarre la publication auto du health toutes les 30s.
    pub fn spawn_health_publisher(
        &self,
        transport: MqttTransport,
        table: AvailabilityTable,
        registry: Arc<RequestRegistry<MqttTransport>>,
    ) {
        let tracker = self.clone();

        task::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            loop {
                interval.tick().await;
                let health = tracker.get_health(&table, &registry, &transport);
                let Ok(payload) = serde_json::to_vec(&health) else {
                    continue;
                };
                if let Err(e) = transport
                    .publish(HUB_HEALTH_TOPIC, payload, DeliveryMode::AtMostOnce)
                    .await
                {
                    eprintln!("[health] failed to publish: {e}");
                } else {
                    println!(
                        "[health] published hub health (uptime: {}s, desks: {})",
                        health.uptime_seconds, health.desks_tracked
                    );
                }
            }
        });
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn state_label(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Disconnected => "disconnected",
        ConnectionState::Connecting => "connecting",
        ConnectionState::Connected => "connected",
    }
}
