//! Scanner configuration.
//!
//! All recognized options live in one [`ScanConfig`] struct with defaults, built via
//! [`ScanConfig::builder`]. Out-of-range values are normalized at build time rather than
//! rejected, mirroring how the scanner treats its collaborators: degraded inputs degrade
//! timeliness, never correctness.

/// Default expected block interval, in milliseconds (Ethereum mainnet pace).
pub const DEFAULT_BLOCK_INTERVAL_MS: u64 = 12_000;

/// Default EMA sensitivity for the block-interval estimator.
pub const DEFAULT_SENSITIVITY: f64 = 0.25;

/// Default retry sleep between fetch attempts, in milliseconds.
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 1_000;

/// Default parallelism for pending-hash batch resolution.
pub const DEFAULT_PENDING_PARALLELISM: usize = 3;

/// Default batch size for poll-mode pending resolution.
pub const DEFAULT_PENDING_BATCH_SIZE: usize = 50;

/// Scanner options. See [`ScanConfigBuilder`] for the semantics of each field.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub block_interval_ms: u64,
    pub pending_check_interval_ms: i64,
    pub pending_max_delay_ms: u64,
    pub pending_parallelism: usize,
    pub pending_batch_size: usize,
    pub max_retry: u32,
    pub retry_interval_ms: u64,
    pub sensitivity: f64,
    pub fixed_step: Option<u64>,
    pub log_from_tx: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfigBuilder::default().build()
    }
}

impl ScanConfig {
    #[must_use]
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }

    /// Whether pending-transaction discovery is enabled at all.
    #[must_use]
    pub fn pending_enabled(&self) -> bool {
        self.pending_check_interval_ms >= 0
    }

    /// Whether the push-mode pending feed should be spawned.
    #[must_use]
    pub fn push_enabled(&self) -> bool {
        self.pending_check_interval_ms > 0
    }
}

/// Builder for [`ScanConfig`].
#[derive(Debug, Clone)]
pub struct ScanConfigBuilder {
    block_interval_ms: u64,
    pending_check_interval_ms: i64,
    pending_max_delay_ms: u64,
    pending_parallelism: usize,
    pending_batch_size: usize,
    max_retry: u32,
    retry_interval_ms: u64,
    sensitivity: f64,
    fixed_step: Option<u64>,
    log_from_tx: bool,
}

impl Default for ScanConfigBuilder {
    fn default() -> Self {
        Self {
            block_interval_ms: DEFAULT_BLOCK_INTERVAL_MS,
            pending_check_interval_ms: -1,
            pending_max_delay_ms: 0,
            pending_parallelism: 0,
            pending_batch_size: 0,
            max_retry: 0,
            retry_interval_ms: DEFAULT_RETRY_INTERVAL_MS,
            sensitivity: DEFAULT_SENSITIVITY,
            fixed_step: None,
            log_from_tx: false,
        }
    }
}

impl ScanConfigBuilder {
    /// Expected time between blocks, in milliseconds. Paces idle waits only.
    #[must_use]
    pub fn block_interval_ms(mut self, ms: u64) -> Self {
        self.block_interval_ms = ms;
        self
    }

    /// Pending-transaction discovery cadence: `< 0` disables pending discovery entirely,
    /// `0` polls on every idle tick, `> 0` additionally spawns the push feed.
    #[must_use]
    pub fn pending_check_interval_ms(mut self, ms: i64) -> Self {
        self.pending_check_interval_ms = ms;
        self
    }

    /// Budget for extra pending drains past the next-block ETA. `0` defaults to the block
    /// interval.
    #[must_use]
    pub fn pending_max_delay_ms(mut self, ms: u64) -> Self {
        self.pending_max_delay_ms = ms;
        self
    }

    /// How many resolution batches may be in flight at once. `0` defaults to
    /// [`DEFAULT_PENDING_PARALLELISM`].
    #[must_use]
    pub fn pending_parallelism(mut self, parallelism: usize) -> Self {
        self.pending_parallelism = parallelism;
        self
    }

    /// Hashes per poll-mode resolution batch. `0` defaults to
    /// [`DEFAULT_PENDING_BATCH_SIZE`].
    #[must_use]
    pub fn pending_batch_size(mut self, batch_size: usize) -> Self {
        self.pending_batch_size = batch_size;
        self
    }

    /// Retries for an empty window before it is accepted as genuinely empty. Fetch errors
    /// always get at least one retry regardless of this setting.
    #[must_use]
    pub fn max_retry(mut self, retries: u32) -> Self {
        self.max_retry = retries;
        self
    }

    /// Sleep between fetch retries, in milliseconds.
    #[must_use]
    pub fn retry_interval_ms(mut self, ms: u64) -> Self {
        self.retry_interval_ms = ms;
        self
    }

    /// EMA sensitivity for the block-interval estimator. Values outside the exclusive
    /// range `(0, 1)` are normalized to [`DEFAULT_SENSITIVITY`].
    #[must_use]
    pub fn sensitivity(mut self, sensitivity: f64) -> Self {
        self.sensitivity = sensitivity;
        self
    }

    /// Pins the window width and disables step adaptation. `0` re-enables adaptation.
    #[must_use]
    pub fn fixed_step(mut self, step: u64) -> Self {
        self.fixed_step = (step > 0).then_some(step);
        self
    }

    /// Extract logs by enumerating transaction receipts per block instead of a range filter.
    #[must_use]
    pub fn log_from_tx(mut self, enabled: bool) -> Self {
        self.log_from_tx = enabled;
        self
    }

    /// Normalizes out-of-range options and produces the final configuration.
    #[must_use]
    pub fn build(self) -> ScanConfig {
        let sensitivity = if self.sensitivity <= 0.0 || self.sensitivity >= 1.0 {
            DEFAULT_SENSITIVITY
        } else {
            self.sensitivity
        };
        ScanConfig {
            block_interval_ms: self.block_interval_ms,
            pending_check_interval_ms: self.pending_check_interval_ms,
            pending_max_delay_ms: if self.pending_max_delay_ms == 0 {
                self.block_interval_ms
            } else {
                self.pending_max_delay_ms
            },
            pending_parallelism: if self.pending_parallelism == 0 {
                DEFAULT_PENDING_PARALLELISM
            } else {
                self.pending_parallelism
            },
            pending_batch_size: if self.pending_batch_size == 0 {
                DEFAULT_PENDING_BATCH_SIZE
            } else {
                self.pending_batch_size
            },
            max_retry: self.max_retry,
            retry_interval_ms: self.retry_interval_ms,
            sensitivity,
            fixed_step: self.fixed_step,
            log_from_tx: self.log_from_tx,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let config = ScanConfig::default();

        assert_eq!(config.block_interval_ms, DEFAULT_BLOCK_INTERVAL_MS);
        assert_eq!(config.pending_check_interval_ms, -1);
        assert!(!config.pending_enabled());
        assert!(!config.push_enabled());
        assert_eq!(config.pending_max_delay_ms, DEFAULT_BLOCK_INTERVAL_MS);
        assert_eq!(config.pending_parallelism, DEFAULT_PENDING_PARALLELISM);
        assert_eq!(config.pending_batch_size, DEFAULT_PENDING_BATCH_SIZE);
        assert_eq!(config.max_retry, 0);
        assert_eq!(config.sensitivity, DEFAULT_SENSITIVITY);
        assert_eq!(config.fixed_step, None);
    }

    #[test]
    fn sensitivity_outside_unit_interval_is_normalized() {
        for bad in [-0.5, 0.0, 1.0, 3.0] {
            let config = ScanConfig::builder().sensitivity(bad).build();
            assert_eq!(config.sensitivity, DEFAULT_SENSITIVITY, "sensitivity {bad}");
        }
        let config = ScanConfig::builder().sensitivity(0.5).build();
        assert_eq!(config.sensitivity, 0.5);
    }

    #[test]
    fn pending_max_delay_defaults_to_block_interval() {
        let config = ScanConfig::builder().block_interval_ms(2_000).build();
        assert_eq!(config.pending_max_delay_ms, 2_000);

        let config =
            ScanConfig::builder().block_interval_ms(2_000).pending_max_delay_ms(500).build();
        assert_eq!(config.pending_max_delay_ms, 500);
    }

    #[test]
    fn zero_fixed_step_keeps_adaptation() {
        let config = ScanConfig::builder().fixed_step(0).build();
        assert_eq!(config.fixed_step, None);

        let config = ScanConfig::builder().fixed_step(64).build();
        assert_eq!(config.fixed_step, Some(64));
    }

    #[test]
    fn pending_cadence_flags() {
        let poll = ScanConfig::builder().pending_check_interval_ms(0).build();
        assert!(poll.pending_enabled());
        assert!(!poll.push_enabled());

        let push = ScanConfig::builder().pending_check_interval_ms(100).build();
        assert!(push.pending_enabled());
        assert!(push.push_enabled());
    }
}
