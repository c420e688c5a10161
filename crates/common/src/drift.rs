//! Clock-drift estimation against the service's reported time.
//!
//! A signature's `created`/`expires` window is only as good as the local
//! clock. The estimator keeps a single offset (remote minus local, in
//! milliseconds) learned from server responses, and applies it when the
//! signer asks for the current time. A hysteresis band absorbs network
//! jitter: the offset only moves when an observed discrepancy exceeds the
//! tolerance. This is a single-sample corrector, not an NTP-style filter.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};

/// Minimum observed discrepancy, in milliseconds, before the offset is updated.
pub const DEFAULT_TOLERANCE_MS: i64 = 5_000;

/// Process-wide drift state, shared by all in-flight calls of one client.
#[derive(Debug)]
pub struct ClockDrift {
    /// Remote-minus-local correction in milliseconds.
    offset_ms: Mutex<i64>,
    tolerance_ms: i64,
}

impl ClockDrift {
    #[must_use]
    pub fn new() -> Self {
        Self::with_tolerance(DEFAULT_TOLERANCE_MS)
    }

    #[must_use]
    pub fn with_tolerance(tolerance_ms: i64) -> Self {
        Self {
            offset_ms: Mutex::new(0),
            tolerance_ms,
        }
    }

    /// Local wall-clock time adjusted by the current offset.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        Utc::now() + Duration::milliseconds(self.offset_ms())
    }

    /// Drift-adjusted time truncated to whole seconds since the epoch.
    #[must_use]
    pub fn unix_seconds(&self) -> i64 {
        self.now().timestamp()
    }

    #[must_use]
    pub fn offset_ms(&self) -> i64 {
        *self
            .offset_ms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Feed one remote timestamp into the estimator.
    ///
    /// Returns `true` when the observation moved the offset (drift detected
    /// and corrected), `false` when it fell inside the tolerance band.
    pub fn observe(&self, remote: DateTime<Utc>) -> bool {
        self.observe_at(remote.timestamp_millis(), Utc::now().timestamp_millis())
    }

    // Read-modify-write of the offset happens under one lock so concurrent
    // unauthorized responses racing to correct the clock cannot lose updates.
    fn observe_at(&self, remote_ms: i64, local_ms: i64) -> bool {
        let candidate = remote_ms - local_ms;

        let mut offset = self
            .offset_ms
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if (candidate - *offset).abs() > self.tolerance_ms {
            log::debug!("clock drift corrected: {} ms -> {} ms", *offset, candidate);
            *offset = candidate;
            true
        } else {
            false
        }
    }
}

impl Default for ClockDrift {
    fn default() -> Self {
        Self::new()
    }
}
