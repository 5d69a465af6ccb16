//! Adaptive window-width controller.
//!
//! A proportional controller aims each window at [`TARGET_LOGS_PER_WINDOW`] records, blending
//! the proportional estimate with the previous width to damp oscillation. Empty windows grow
//! the width by one; fetch errors and reaching the tip reset it to one. A configured fixed
//! step pins the width and disables adaptation entirely.

/// Upper clamp for the window width, in blocks.
pub const MAX_STEP: u64 = 1024;

/// Records per window the controller steers toward.
const TARGET_LOGS_PER_WINDOW: u64 = 4096;

/// Weight of the proportional estimate in the blend, in percent.
const BLEND_PERCENT: u64 = 60;

#[derive(Debug, Clone)]
pub(crate) struct StepController {
    step: u64,
    fixed: Option<u64>,
}

impl StepController {
    pub(crate) fn new(fixed: Option<u64>) -> Self {
        Self { step: 1, fixed: fixed.map(|s| s.clamp(1, MAX_STEP)) }
    }

    /// Width for the next window.
    pub(crate) fn current(&self) -> u64 {
        self.fixed.unwrap_or(self.step)
    }

    /// Folds one completed window into the width. No-op when pinned.
    pub(crate) fn record(&mut self, log_count: u64) {
        if self.fixed.is_some() {
            return;
        }
        let step = self.step;
        let next = if log_count > 0 {
            (step * TARGET_LOGS_PER_WINDOW / log_count * BLEND_PERCENT
                + step * (100 - BLEND_PERCENT))
                / 100
        } else {
            step + 1
        };
        self.step = next.clamp(1, MAX_STEP);
    }

    /// Drops the adaptive width back to one (fetch error, tip reached). Pinned widths are
    /// unaffected.
    pub(crate) fn reset(&mut self) {
        self.step = 1;
    }
}
