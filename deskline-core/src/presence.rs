//! Debounced presence detection.
//!
//! Noisy RSSI samples in, stable edge-triggered availability out. A matching
//! sample at or above the threshold makes the state Present immediately; the
//! transition back to Absent happens only from elapsed time (the timeout
//! window), never from a single missed or failed scan.

use std::time::{Duration, Instant};

/// One proximity observation from the radio. Consumed once, never stored.
#[derive(Debug, Clone)]
pub struct PresenceSample {
    /// Opaque beacon identity (a MAC address in the BLE driver).
    pub identity: String,
    /// Received signal strength, dBm.
    pub rssi: i16,
    pub observed_at: Instant,
}

#[derive(Debug, Clone)]
pub struct PresenceConfig {
    pub target_identity: String,
    pub rssi_threshold: i16,
    pub timeout_window: Duration,
}

/// Emitted on state edges only, never per sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceChange {
    Present,
    Absent,
}

impl PresenceChange {
    pub fn available(self) -> bool {
        matches!(self, PresenceChange::Present)
    }
}

/// Two-state machine, initial state Absent.
///
/// Invariant: while Present, `now - last_seen <= timeout_window` holds at
/// every `tick`; the tick that first observes the window exceeded flips the
/// state and emits exactly one `Absent`.
#[derive(Debug)]
pub struct PresenceStateMachine {
    config: PresenceConfig,
    present: bool,
    last_seen: Option<Instant>,
}

impl PresenceStateMachine {
    pub fn new(config: PresenceConfig) -> Self {
        Self {
            config,
            present: false,
            last_seen: None,
        }
    }

    pub fn is_present(&self) -> bool {
        self.present
    }

    pub fn last_seen(&self) -> Option<Instant> {
        self.last_seen
    }

    /// Feeds one sample through the threshold filter. Returns a change only
    /// on the Absent -> Present edge; matching samples while already Present
    /// refresh `last_seen` silently.
    pub fn observe(&mut self, sample: &PresenceSample) -> Option<PresenceChange> {
        if !self.matches(sample) {
            return None;
        }
        self.last_seen = Some(sample.observed_at);
        if self.present {
            None
        } else {
            self.present = true;
            Some(PresenceChange::Present)
        }
    }

    /// Feeds a whole scan result. At most one edge can fall out of a batch.
    pub fn observe_all(&mut self, samples: &[PresenceSample]) -> Option<PresenceChange> {
        samples.iter().find_map(|s| self.observe(s))
    }

    /// Scheduler tick, independent of scanning. The only transition driven
    /// purely by elapsed time.
    pub fn tick(&mut self, now: Instant) -> Option<PresenceChange> {
        if !self.present {
            return None;
        }
        let expired = match self.last_seen {
            Some(seen) => now.duration_since(seen) > self.config.timeout_window,
            None => true,
        };
        if expired {
            self.present = false;
            Some(PresenceChange::Absent)
        } else {
            None
        }
    }

    fn matches(&self, sample: &PresenceSample) -> bool {
        // MAC-style identities compare case-insensitively.
        sample.identity.eq_ignore_ascii_case(&self.config.target_identity)
            && sample.rssi >= self.config.rssi_threshold
    }
}
