//! YAML configuration for both binaries.
//!
//! Path comes from an environment variable with a file-next-to-binary
//! default; a missing or unparseable file falls back to defaults with a
//! logged complaint rather than refusing to start.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::warn;

use crate::transport::{BackoffPolicy, TransportConfig};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MqttConf {
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

impl Default for MqttConf {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            keep_alive_secs: default_keep_alive_secs(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BackoffConf {
    #[serde(default = "default_backoff_base_secs")]
    pub base_secs: u64,
    #[serde(default = "default_backoff_max_secs")]
    pub max_secs: u64,
    #[serde(default = "default_backoff_dwell_secs")]
    pub dwell_secs: u64,
}

impl Default for BackoffConf {
    fn default() -> Self {
        Self {
            base_secs: default_backoff_base_secs(),
            max_secs: default_backoff_max_secs(),
            dwell_secs: default_backoff_dwell_secs(),
        }
    }
}

impl BackoffConf {
    pub fn policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_secs(self.base_secs),
            max: Duration::from_secs(self.max_secs),
            dwell: Duration::from_secs(self.dwell_secs),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ScanConf {
    /// Beacon identity the desk watches for (BLE MAC).
    #[serde(default)]
    pub beacon_id: String,
    #[serde(default = "default_rssi_threshold")]
    pub rssi_threshold: i16,
    #[serde(default = "default_scan_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_scan_duration_secs")]
    pub duration_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// External scan helper; stdout lines are `identity rssi`.
    #[serde(default = "default_scan_command")]
    pub scan_command: String,
}

impl Default for ScanConf {
    fn default() -> Self {
        Self {
            beacon_id: String::new(),
            rssi_threshold: default_rssi_threshold(),
            interval_secs: default_scan_interval_secs(),
            duration_secs: default_scan_duration_secs(),
            timeout_secs: default_timeout_secs(),
            scan_command: default_scan_command(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DeskConfig {
    #[serde(default)]
    pub endpoint_id: u32,
    #[serde(default)]
    pub mqtt: MqttConf,
    #[serde(default)]
    pub scan: ScanConf,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default)]
    pub backoff: BackoffConf,
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            endpoint_id: 0,
            mqtt: MqttConf::default(),
            scan: ScanConf::default(),
            queue_capacity: default_queue_capacity(),
            backoff: BackoffConf::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HubConfig {
    #[serde(default)]
    pub mqtt: MqttConf,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default)]
    pub backoff: BackoffConf,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            mqtt: MqttConf::default(),
            http_port: default_http_port(),
            backoff: BackoffConf::default(),
        }
    }
}

impl DeskConfig {
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            client_id: format!("deskline-desk-{}", self.endpoint_id),
            host: self.mqtt.host.clone(),
            port: self.mqtt.port,
            keep_alive: Duration::from_secs(self.mqtt.keep_alive_secs),
            backoff: self.backoff.policy(),
        }
    }
}

impl HubConfig {
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            client_id: "deskline-hub".to_string(),
            host: self.mqtt.host.clone(),
            port: self.mqtt.port,
            keep_alive: Duration::from_secs(self.mqtt.keep_alive_secs),
            backoff: self.backoff.policy(),
        }
    }
}

pub async fn load_desk_config() -> DeskConfig {
    load_yaml("DESKLINE_DESK_CONFIG", "desk.yaml").await
}

pub async fn load_hub_config() -> HubConfig {
    load_yaml("DESKLINE_HUB_CONFIG", "hub.yaml").await
}

async fn load_yaml<T>(env_var: &str, default_path: &str) -> T
where
    T: serde::de::DeserializeOwned + Default,
{
    let path = std::env::var(env_var).unwrap_or_else(|_| default_path.into());
    if !Path::new(&path).exists() {
        warn!(%path, "no config file, using defaults");
        return T::default();
    }
    let txt = fs::read_to_string(&path).await.unwrap_or_default();
    if txt.trim().is_empty() {
        return T::default();
    }
    serde_yaml::from_str(&txt).unwrap_or_else(|e| {
        warn!(%path, error = %e, "invalid config, using defaults");
        T::default()
    })
}

fn default_mqtt_host() -> String {
    "localhost".into()
}
fn default_mqtt_port() -> u16 {
    1883
}
fn default_keep_alive_secs() -> u64 {
    15
}
fn default_backoff_base_secs() -> u64 {
    2
}
fn default_backoff_max_secs() -> u64 {
    60
}
fn default_backoff_dwell_secs() -> u64 {
    30
}
fn default_rssi_threshold() -> i16 {
    -75
}
fn default_scan_interval_secs() -> u64 {
    5
}
fn default_scan_duration_secs() -> u64 {
    3
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_scan_command() -> String {
    "deskline-ble-scan".into()
}
fn default_queue_capacity() -> usize {
    crate::queue::DEFAULT_CAPACITY
}
fn default_http_port() -> u16 {
    8080
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn desk_config_fills_defaults_from_partial_yaml() {
        let cfg: DeskConfig = serde_yaml::from_str(
            r#"
endpoint_id: 3
scan:
  beacon_id: "aa:bb:cc:dd:ee:ff"
  rssi_threshold: -70
"#,
        )
        .unwrap();
        assert_eq!(cfg.endpoint_id, 3);
        assert_eq!(cfg.scan.beacon_id, "aa:bb:cc:dd:ee:ff");
        assert_eq!(cfg.scan.rssi_threshold, -70);
        assert_eq!(cfg.scan.interval_secs, 5);
        assert_eq!(cfg.queue_capacity, 5);
        assert_eq!(cfg.mqtt.host, "localhost");
        assert_eq!(cfg.backoff.policy().max, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn unparseable_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, ": not yaml [").unwrap();
        std::env::set_var("DESKLINE_TEST_CONFIG", file.path());
        let cfg: HubConfig =
            load_yaml("DESKLINE_TEST_CONFIG", "nonexistent.yaml").await;
        assert_eq!(cfg.http_port, 8080);
        std::env::remove_var("DESKLINE_TEST_CONFIG");
    }
}
