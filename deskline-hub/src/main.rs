/**
 * DESKLINE HUB - Point d'entrée du serveur central
 *
 * RÔLE : Orchestration des modules : config, transport MQTT, miroir de
 * disponibilité, registre des demandes, API REST, health.
 *
 * ARCHITECTURE : Event-driven via MQTT (statuts entrants, demandes
 * sortantes) + API REST pour l'origination et le dashboard.
 */

mod health;
mod http;
mod mqtt;
mod requests;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use deskline_core::config;
use deskline_core::transport::MqttTransport;
use deskline_core::AvailabilityTable;
use tokio::net::TcpListener;

use crate::health::HealthTracker;
use crate::http::AppState;
use crate::requests::RequestRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().init();

    let cfg = config::load_hub_config().await;

    // Connexion broker partagée par tous les modules du hub
    let transport = MqttTransport::new(&cfg.transport());
    transport.connect();

    // Miroir de disponibilité rempli par le listener MQTT
    let table = AvailabilityTable::new();
    mqtt::spawn_status_listener(transport.clone(), table.clone());

    // Registre des demandes de consultation
    let registry = Arc::new(RequestRegistry::new(transport.clone()));

    // Publication auto du health toutes les 30s
    let health_tracker = HealthTracker::new();
    health_tracker.spawn_health_publisher(transport.clone(), table.clone(), registry.clone());

    let app_state = AppState {
        table,
        registry,
        health_tracker,
        transport,
    };

    let app = http::build_router(app_state);
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.http_port));
    println!("[hub] listening on http://{addr}");
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await.context("http server failed")?;
    Ok(())
}
