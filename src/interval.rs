//! Exponential moving average of the inter-block time.
//!
//! The estimate paces idle waits only; it never affects which blocks are fetched.

use crate::config::DEFAULT_SENSITIVITY;

#[derive(Debug, Clone)]
pub(crate) struct BlockIntervalEstimator {
    average_ms: f64,
    sensitivity: f64,
}

impl BlockIntervalEstimator {
    /// Seeds the average with the configured block interval. Sensitivity outside the
    /// exclusive `(0, 1)` range falls back to the default.
    pub(crate) fn new(initial_ms: u64, sensitivity: f64) -> Self {
        let sensitivity = if sensitivity <= 0.0 || sensitivity >= 1.0 {
            DEFAULT_SENSITIVITY
        } else {
            sensitivity
        };
        Self { average_ms: initial_ms as f64, sensitivity }
    }

    /// Folds one tip advance into the average: `observed = 1000 * Δtimestamp / Δheight`.
    ///
    /// Callers only invoke this on a strictly advancing tip, so `delta_height > 0`.
    pub(crate) fn observe(&mut self, delta_height: u64, delta_timestamp_secs: u64) {
        if delta_height == 0 {
            return;
        }
        let observed = 1_000.0 * delta_timestamp_secs as f64 / delta_height as f64;
        self.average_ms =
            self.average_ms * (1.0 - self.sensitivity) + observed * self.sensitivity;
    }

    pub(crate) fn average_ms(&self) -> u64 {
        self.average_ms as u64
    }
}
