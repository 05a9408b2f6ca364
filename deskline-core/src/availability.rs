//! Hub-side mirror of every desk's availability.
//!
//! Status messages carry only the current value, no sequence number, so the
//! apply is last-write-wins and idempotent; duplicates from at-least-once
//! delivery land harmlessly. The hub feeds the table from a single consumer
//! task, which is what keeps per-endpoint apply order equal to receive
//! order. Cross-endpoint writes need no coordination.

use std::collections::HashMap;

use serde::Serialize;
use time::OffsetDateTime;

use crate::messages::StatusMessage;
use crate::state::SharedRw;

#[derive(Debug, Clone, Serialize)]
pub struct EndpointAvailability {
    pub endpoint_id: u32,
    pub available: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub last_update: OffsetDateTime,
}

#[derive(Default)]
pub struct AvailabilityTable {
    entries: SharedRw<HashMap<u32, EndpointAvailability>>,
}

impl AvailabilityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last-write-wins apply. Applying the same message twice leaves the
    /// table in the same availability state as applying it once.
    pub fn apply(&self, msg: &StatusMessage) {
        let mut entries = self.entries.write();
        entries.insert(
            msg.endpoint_id,
            EndpointAvailability {
                endpoint_id: msg.endpoint_id,
                available: msg.available,
                last_update: OffsetDateTime::now_utc(),
            },
        );
    }

    pub fn get(&self, endpoint_id: u32) -> Option<EndpointAvailability> {
        self.entries.read().get(&endpoint_id).cloned()
    }

    /// Ordered copy for the dashboard view.
    pub fn snapshot(&self) -> Vec<EndpointAvailability> {
        let mut list: Vec<_> = self.entries.read().values().cloned().collect();
        list.sort_by_key(|e| e.endpoint_id);
        list
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Clone for AvailabilityTable {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}
