//! Command-driven proximity scanner.
//!
//! The radio layer stays outside the process: a configured helper command
//! (typically a BLE scan wrapper) is run under the scan-duration budget and
//! prints one `identity rssi` pair per stdout line. Lines that do not parse
//! are skipped; an empty scan is a normal result.

use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use deskline_core::error::ScanError;
use deskline_core::presence::PresenceSample;
use deskline_core::scanner::ProximityScanner;
use tokio::process::Command;
use tracing::debug;

pub struct CommandScanner {
    argv: Vec<String>,
    budget: Duration,
}

impl CommandScanner {
    pub fn new(scan_command: &str, budget: Duration) -> Result<Self> {
        let argv = shell_words::split(scan_command)
            .with_context(|| format!("invalid scan command: {scan_command}"))?;
        if argv.is_empty() {
            bail!("scan command is empty");
        }
        Ok(Self { argv, budget })
    }

    fn parse_output(&self, stdout: &str) -> Vec<PresenceSample> {
        let observed_at = Instant::now();
        stdout
            .lines()
            .filter_map(|line| {
                let mut parts = line.split_whitespace();
                let identity = parts.next()?;
                let rssi = parts.next()?.parse::<i16>().ok()?;
                Some(PresenceSample {
                    identity: identity.to_string(),
                    rssi,
                    observed_at,
                })
            })
            .collect()
    }
}

impl ProximityScanner for CommandScanner {
    async fn sample_once(&mut self) -> Result<Vec<PresenceSample>, ScanError> {
        let mut command = Command::new(&self.argv[0]);
        command.args(&self.argv[1..]).kill_on_drop(true);

        let output = tokio::time::timeout(self.budget, command.output())
            .await
            .map_err(|_| ScanError::Timeout(self.budget))?
            .map_err(|e| ScanError::Radio(format!("{}: {e}", self.argv[0])))?;

        if !output.status.success() {
            return Err(ScanError::Radio(format!(
                "{} exited with {}: {}",
                self.argv[0],
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let samples = self.parse_output(&stdout);
        debug!(count = samples.len(), "scan completed");
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanner() -> CommandScanner {
        CommandScanner::new("true", Duration::from_secs(3)).unwrap()
    }

    #[test]
    fn rejects_empty_command() {
        assert!(CommandScanner::new("", Duration::from_secs(3)).is_err());
        assert!(CommandScanner::new("   ", Duration::from_secs(3)).is_err());
    }

    #[test]
    fn parses_identity_rssi_lines_and_skips_noise() {
        let s = scanner();
        let samples = s.parse_output(
            "aa:bb:cc:dd:ee:ff -60\n\
             garbage line without rssi\n\
             11:22:33:44:55:66 notanumber\n\
             11:22:33:44:55:66 -82\n",
        );
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].identity, "aa:bb:cc:dd:ee:ff");
        assert_eq!(samples[0].rssi, -60);
        assert_eq!(samples[1].rssi, -82);
    }

    #[test]
    fn empty_output_is_a_normal_zero_result() {
        let s = scanner();
        assert!(s.parse_output("").is_empty());
    }

    #[tokio::test]
    async fn command_failure_is_a_radio_error() {
        let mut s = CommandScanner::new("false", Duration::from_secs(3)).unwrap();
        let err = s.sample_once().await.unwrap_err();
        assert!(matches!(err, ScanError::Radio(_)));
    }

    #[tokio::test]
    async fn echo_command_round_trips_samples() {
        let mut s =
            CommandScanner::new("echo aa:bb:cc:dd:ee:ff -61", Duration::from_secs(3)).unwrap();
        let samples = s.sample_once().await.unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].identity, "aa:bb:cc:dd:ee:ff");
    }
}
