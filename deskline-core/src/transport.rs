//! MQTT transport discipline: connection lifecycle, reconnect with capped
//! backoff, subscription replay and the latched status re-publish.
//!
//! The event loop runs in one background task; inbound publishes are fanned
//! out to subscribers over unbounded channels so handlers never block the
//! read loop. A publish attempted while disconnected fails immediately,
//! except the latched slot (the most recent status message) which is
//! retained and re-sent after every successful (re)connect - stale
//! presence after an outage is actively misleading.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use crate::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// At-most-once for disposable telemetry, at-least-once for anything whose
/// loss matters. Receivers are idempotent, so duplicates are harmless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    AtMostOnce,
    AtLeastOnce,
}

impl DeliveryMode {
    pub fn qos(self) -> QoS {
        match self {
            DeliveryMode::AtMostOnce => QoS::AtMostOnce,
            DeliveryMode::AtLeastOnce => QoS::AtLeastOnce,
        }
    }
}

/// The seam between the coordinator and the wire. The devkit mock
/// implements this too, so the whole engine runs broker-less in tests.
pub trait Publisher: Send + Sync {
    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        mode: DeliveryMode,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;

    /// Like `publish`, but the payload is retained locally and re-sent on
    /// every successful (re)connect, even when the attempt itself fails.
    fn publish_latched(
        &self,
        topic: &str,
        payload: Vec<u8>,
        mode: DeliveryMode,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;
}

/// Reconnect delay policy: starts at `base`, grows by half per consecutive
/// failure up to `max`, and resets to `base` once a connection has stayed
/// up for `dwell`.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
    pub dwell: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(2),
            max: Duration::from_secs(60),
            dwell: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
pub struct Backoff {
    policy: BackoffPolicy,
    current: Duration,
    connected_at: Option<Instant>,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        let current = policy.base;
        Self {
            policy,
            current,
            connected_at: None,
        }
    }

    /// Call on every successful connect.
    pub fn on_connected(&mut self, now: Instant) {
        self.connected_at = Some(now);
    }

    /// Delay before the next attempt. Monotonically non-decreasing across
    /// consecutive failures; a connection that survived the dwell period
    /// resets the sequence to the base interval.
    pub fn next_delay(&mut self, now: Instant) -> Duration {
        if let Some(up_since) = self.connected_at.take() {
            if now.duration_since(up_since) >= self.policy.dwell {
                self.current = self.policy.base;
            }
        }
        let delay = self.current;
        self.current = self.current.mul_f32(1.5).min(self.policy.max);
        delay
    }
}

/// Inbound message as handed to subscribers.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

struct Subscription {
    pattern: String,
    tx: UnboundedSender<InboundMessage>,
}

struct TransportShared {
    state: Mutex<ConnectionState>,
    subscriptions: Mutex<Vec<Subscription>>,
    latched: Mutex<Option<(String, Vec<u8>, DeliveryMode)>>,
    reconnects: AtomicU32,
    started: AtomicBool,
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub client_id: String,
    pub host: String,
    pub port: u16,
    pub keep_alive: Duration,
    pub backoff: BackoffPolicy,
}

/// Persistent broker connection shared by everything on one process.
/// Cheap to clone; all clones drive the same underlying client.
#[derive(Clone)]
pub struct MqttTransport {
    client: AsyncClient,
    shared: Arc<TransportShared>,
    event_loop: Arc<Mutex<Option<EventLoop>>>,
    backoff_policy: BackoffPolicy,
}

impl MqttTransport {
    pub fn new(config: &TransportConfig) -> Self {
        let mut opts = MqttOptions::new(&config.client_id, &config.host, config.port);
        opts.set_keep_alive(config.keep_alive);
        opts.set_clean_session(true);
        let (client, event_loop) = AsyncClient::new(opts, 10);

        Self {
            client,
            shared: Arc::new(TransportShared {
                state: Mutex::new(ConnectionState::Disconnected),
                subscriptions: Mutex::new(Vec::new()),
                latched: Mutex::new(None),
                reconnects: AtomicU32::new(0),
                started: AtomicBool::new(false),
            }),
            event_loop: Arc::new(Mutex::new(Some(event_loop))),
            backoff_policy: config.backoff.clone(),
        }
    }

    /// Starts the event-loop task. Idempotent: calling while already
    /// running (or connected) is a no-op.
    pub fn connect(&self) -> ConnectionState {
        if !self.shared.started.swap(true, Ordering::SeqCst) {
            if let Some(event_loop) = self.event_loop.lock().take() {
                *self.shared.state.lock() = ConnectionState::Connecting;
                let client = self.client.clone();
                let shared = self.shared.clone();
                let backoff = Backoff::new(self.backoff_policy.clone());
                tokio::spawn(run_event_loop(client, event_loop, shared, backoff));
            }
        }
        self.state()
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    /// Consecutive-failure counter, exposed for the hub health report.
    pub fn reconnect_count(&self) -> u32 {
        self.shared.reconnects.load(Ordering::Relaxed)
    }

    /// Registers a subscription and returns the channel its messages arrive
    /// on. Replayed automatically after every (re)connect.
    pub async fn subscribe(&self, pattern: &str) -> UnboundedReceiver<InboundMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.subscriptions.lock().push(Subscription {
            pattern: pattern.to_string(),
            tx,
        });
        // Best effort; the ConnAck handler re-issues everything anyway.
        if let Err(e) = self.client.subscribe(pattern, QoS::AtLeastOnce).await {
            debug!(pattern, error = %e, "subscribe deferred until connect");
        }
        rx
    }

    async fn send(
        &self,
        topic: &str,
        payload: Vec<u8>,
        mode: DeliveryMode,
        retain: bool,
    ) -> Result<(), TransportError> {
        if self.state() != ConnectionState::Connected {
            return Err(TransportError::NotConnected);
        }
        self.client
            .publish(topic, mode.qos(), retain, payload)
            .await
            .map_err(|e| TransportError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }
}

impl Publisher for MqttTransport {
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        mode: DeliveryMode,
    ) -> Result<(), TransportError> {
        self.send(topic, payload, mode, false).await
    }

    /// Latched messages are also broker-retained, so late subscribers get
    /// the current status without waiting for the next edge.
    async fn publish_latched(
        &self,
        topic: &str,
        payload: Vec<u8>,
        mode: DeliveryMode,
    ) -> Result<(), TransportError> {
        *self.shared.latched.lock() = Some((topic.to_string(), payload.clone(), mode));
        self.send(topic, payload, mode, true).await
    }
}

async fn run_event_loop(
    client: AsyncClient,
    mut event_loop: EventLoop,
    shared: Arc<TransportShared>,
    mut backoff: Backoff,
) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                *shared.state.lock() = ConnectionState::Connected;
                backoff.on_connected(Instant::now());
                debug!("broker connection established");
                replay_subscriptions(&client, &shared).await;
                resend_latched(&client, &shared).await;
            }
            Ok(Event::Incoming(Incoming::Publish(publish))) => {
                dispatch(&shared, publish.topic, publish.payload.to_vec());
            }
            Ok(_) => {}
            Err(e) => {
                *shared.state.lock() = ConnectionState::Disconnected;
                shared.reconnects.fetch_add(1, Ordering::Relaxed);
                let delay = backoff.next_delay(Instant::now());
                warn!(error = %e, retry_in = ?delay, "broker connection lost");
                tokio::time::sleep(delay).await;
                *shared.state.lock() = ConnectionState::Connecting;
            }
        }
    }
}

async fn replay_subscriptions(client: &AsyncClient, shared: &TransportShared) {
    let patterns: Vec<String> = shared
        .subscriptions
        .lock()
        .iter()
        .map(|s| s.pattern.clone())
        .collect();
    for pattern in patterns {
        if let Err(e) = client.subscribe(&pattern, QoS::AtLeastOnce).await {
            warn!(%pattern, error = %e, "failed to replay subscription");
        }
    }
}

async fn resend_latched(client: &AsyncClient, shared: &TransportShared) {
    let latched = shared.latched.lock().clone();
    if let Some((topic, payload, mode)) = latched {
        if let Err(e) = client.publish(&topic, mode.qos(), true, payload).await {
            warn!(%topic, error = %e, "failed to re-send latched message");
        } else {
            debug!(%topic, "re-sent latched message after reconnect");
        }
    }
}

fn dispatch(shared: &TransportShared, topic: String, payload: Vec<u8>) {
    let subscriptions = shared.subscriptions.lock();
    for sub in subscriptions.iter() {
        if topic_matches(&sub.pattern, &topic) {
            // Unbounded send never blocks the read loop; a closed receiver
            // just means that consumer is gone.
            let _ = sub.tx.send(InboundMessage {
                topic: topic.clone(),
                payload: payload.clone(),
            });
        }
    }
}

/// MQTT wildcard matching: `+` spans one level, a trailing `#` the rest.
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    let mut pattern_parts = pattern.split('/');
    let mut topic_parts = topic.split('/');
    loop {
        match (pattern_parts.next(), topic_parts.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(p), Some(t)) if p == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_secs(2),
            max: Duration::from_secs(60),
            dwell: Duration::from_secs(30),
        }
    }

    #[test]
    fn backoff_grows_monotonically_to_the_cap() {
        let mut backoff = Backoff::new(policy());
        let now = Instant::now();
        let mut previous = Duration::ZERO;
        for _ in 0..20 {
            let delay = backoff.next_delay(now);
            assert!(delay >= previous);
            assert!(delay <= Duration::from_secs(60));
            previous = delay;
        }
        assert_eq!(previous, Duration::from_secs(60));
    }

    #[test]
    fn backoff_resets_after_dwell_time() {
        let mut backoff = Backoff::new(policy());
        let t0 = Instant::now();
        // A few failures grow the delay.
        backoff.next_delay(t0);
        backoff.next_delay(t0);
        let grown = backoff.next_delay(t0);
        assert!(grown > Duration::from_secs(2));

        // Connection survives past the dwell window: next failure starts over.
        backoff.on_connected(t0);
        assert_eq!(backoff.next_delay(t0 + Duration::from_secs(31)), Duration::from_secs(2));
    }

    #[test]
    fn backoff_keeps_growing_when_connection_dies_young() {
        let mut backoff = Backoff::new(policy());
        let t0 = Instant::now();
        backoff.next_delay(t0);
        let before = backoff.next_delay(t0);

        // Up for less than the dwell period: no reset.
        backoff.on_connected(t0);
        let after = backoff.next_delay(t0 + Duration::from_secs(5));
        assert!(after > before);
    }

    #[test]
    fn delivery_modes_map_to_qos() {
        assert_eq!(DeliveryMode::AtMostOnce.qos(), QoS::AtMostOnce);
        assert_eq!(DeliveryMode::AtLeastOnce.qos(), QoS::AtLeastOnce);
    }

    #[test]
    fn wildcard_matching() {
        assert!(topic_matches("deskline/desks/status@v1/+", "deskline/desks/status@v1/3"));
        assert!(!topic_matches("deskline/desks/status@v1/+", "deskline/desks/requests@v1/3"));
        assert!(!topic_matches("deskline/desks/status@v1/+", "deskline/desks/status@v1/3/extra"));
        assert!(topic_matches("deskline/#", "deskline/desks/status@v1/3"));
        assert!(topic_matches("a/b/c", "a/b/c"));
        assert!(!topic_matches("a/b/c", "a/b"));
    }

    #[tokio::test]
    async fn publish_while_disconnected_fails_but_latches() {
        let transport = MqttTransport::new(&TransportConfig {
            client_id: "test".into(),
            host: "localhost".into(),
            port: 1883,
            keep_alive: Duration::from_secs(15),
            backoff: policy(),
        });
        // No connect(): the transport stays Disconnected.
        let err = transport
            .publish_latched("deskline/desks/status@v1/1", b"{}".to_vec(), DeliveryMode::AtLeastOnce)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));

        // The payload is retained for the next successful connect.
        let latched = transport.shared.latched.lock().clone();
        let (topic, payload, _) = latched.expect("latch retained");
        assert_eq!(topic, "deskline/desks/status@v1/1");
        assert_eq!(payload, b"{}");
    }

    #[tokio::test]
    async fn plain_publish_while_disconnected_does_not_latch() {
        let transport = MqttTransport::new(&TransportConfig {
            client_id: "test".into(),
            host: "localhost".into(),
            port: 1883,
            keep_alive: Duration::from_secs(15),
            backoff: policy(),
        });
        let err = transport
            .publish("deskline/desks/requests@v1/1", b"{}".to_vec(), DeliveryMode::AtLeastOnce)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));
        assert!(transport.shared.latched.lock().is_none());
    }
}
