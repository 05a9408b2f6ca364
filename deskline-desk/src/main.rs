//! Deskline Desk - desk-side endpoint unit
//!
//! One presence scanner, one broker connection, one bounded request queue:
//! - Scans for the configured beacon on a fixed cadence and feeds the
//!   debounced presence state machine
//! - Publishes availability edges to the hub (latched across outages)
//! - Receives consultation requests into the local queue and logs them
//!   the way a desk display would render them

mod scanner;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use deskline_core::config::{self, DeskConfig};
use deskline_core::coordinator::{QueueEvent, SyncCoordinator};
use deskline_core::messages;
use deskline_core::presence::{PresenceConfig, PresenceStateMachine};
use deskline_core::scanner::ProximityScanner;
use deskline_core::transport::MqttTransport;
use deskline_core::{RequestQueue, Shared, TransportError};
use scanner::CommandScanner;
use tokio::time::interval;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    let cfg = config::load_desk_config().await;
    if cfg.scan.beacon_id.is_empty() {
        warn!("scan.beacon_id not configured; this desk will never report presence");
    }
    info!(
        endpoint_id = cfg.endpoint_id,
        broker = %cfg.mqtt.host,
        "deskline desk starting"
    );

    let transport = MqttTransport::new(&cfg.transport());
    transport.connect();

    let (coordinator, queue_events) =
        SyncCoordinator::new(cfg.endpoint_id, transport.clone(), cfg.queue_capacity);
    let coordinator = Arc::new(coordinator);

    // Inbound requests for this desk only.
    let inbound = transport.subscribe(&messages::requests_topic(cfg.endpoint_id)).await;
    {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.run_inbound(inbound).await });
    }

    // Queue consumer standing in for the desk display.
    spawn_display_consumer(coordinator.queue(), queue_events);

    // Prime the status latch so the hub sees an authoritative Absent as
    // soon as the first connection comes up.
    if let Err(e) = coordinator.publish_status(false).await {
        log_publish_failure(&e);
    }

    run_scan_loop(&cfg, &coordinator).await
}

/// Scan cadence and timeout ticks, interleaved with transport servicing by
/// the runtime. Scan failures are logged and swallowed; only the timeout
/// window moves the state to Absent.
async fn run_scan_loop(
    cfg: &DeskConfig,
    coordinator: &SyncCoordinator<MqttTransport>,
) -> Result<()> {
    let mut machine = PresenceStateMachine::new(PresenceConfig {
        target_identity: cfg.scan.beacon_id.clone(),
        rssi_threshold: cfg.scan.rssi_threshold,
        timeout_window: Duration::from_secs(cfg.scan.timeout_secs),
    });
    let mut scanner = CommandScanner::new(
        &cfg.scan.scan_command,
        Duration::from_secs(cfg.scan.duration_secs),
    )
    .context("scanner setup failed")?;

    let mut scan_timer = interval(Duration::from_secs(cfg.scan.interval_secs));
    let mut tick_timer = interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = scan_timer.tick() => {
                match scanner.sample_once().await {
                    Ok(samples) => {
                        if let Some(change) = machine.observe_all(&samples) {
                            info!(?change, "presence edge");
                            if let Err(e) = coordinator.publish_presence(change).await {
                                log_publish_failure(&e);
                            }
                        }
                    }
                    // Presence must not flap on a failed scan; absence is
                    // governed by the timeout alone.
                    Err(e) => warn!(error = %e, "scan failed, skipping cycle"),
                }
            }
            _ = tick_timer.tick() => {
                if let Some(change) = machine.tick(Instant::now()) {
                    info!(?change, "presence timed out");
                    if let Err(e) = coordinator.publish_presence(change).await {
                        log_publish_failure(&e);
                    }
                }
            }
        }
    }
}

/// Plays the display role: acknowledges the "new" marker once per event and
/// logs the queue as it would be rendered, most recent first.
fn spawn_display_consumer(
    queue: Shared<RequestQueue>,
    mut events: tokio::sync::mpsc::UnboundedReceiver<QueueEvent>,
) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let id = match event {
                QueueEvent::Inserted { id } | QueueEvent::Updated { id } => id,
            };
            let mut queue = queue.lock();
            queue.consume_freshness(id);
            for entry in queue.snapshot() {
                info!(
                    id = entry.request.id,
                    requester = %entry.request.requester_name,
                    status = %entry.request.status,
                    "queue"
                );
            }
        }
    });
}

fn log_publish_failure(e: &TransportError) {
    match e {
        // The latched status goes out on its own once we reconnect.
        TransportError::NotConnected => warn!("status publish deferred: not connected"),
        other => error!(error = %other, "status publish failed"),
    }
}
