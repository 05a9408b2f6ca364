//! Proximity scanner seam.
//!
//! The radio driver is an opaque capability owned by the desk binary; the
//! engine only needs `sample_once`. Scans run on a fixed interval with a
//! bounded duration so they interleave with transport servicing instead of
//! running to exclusion.

use std::time::Duration;

use crate::error::ScanError;
use crate::presence::PresenceSample;

#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Cadence between scans.
    pub interval: Duration,
    /// Hard budget for one scan; `sample_once` must not block past it.
    pub duration: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            duration: Duration::from_secs(3),
        }
    }
}

pub trait ProximityScanner: Send {
    /// One bounded scan. An empty result (nothing in range) is a normal
    /// outcome, not an error.
    fn sample_once(
        &mut self,
    ) -> impl std::future::Future<Output = Result<Vec<PresenceSample>, ScanError>> + Send;
}
