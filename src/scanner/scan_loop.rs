//! The scan worker: windowed log fetching, retries, idle pacing and tip tracking.

use std::{
    sync::{atomic::Ordering, Arc},
    time::Duration,
};

use alloy::primitives::{Address, U256};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    config::ScanConfig,
    interval::BlockIntervalEstimator,
    listener::ScanControls,
    scanner::{pending_feed, ScannerShared},
    source::{HeightOracle, LogSource},
    step::StepController,
    types::{broadcast, now_ms, ChainTip, EventDefinition, PendingTransaction, ScanEvent},
};

/// One scanner run. Owned by the spawned task; all cross-task coordination goes through
/// `shared` and the cancellation token.
pub(crate) struct ScanLoop {
    pub(crate) config: ScanConfig,
    pub(crate) oracle: Arc<dyn HeightOracle>,
    pub(crate) source: Arc<dyn LogSource>,
    pub(crate) controls: Arc<dyn ScanControls>,
    pub(crate) senders: Vec<mpsc::Sender<ScanEvent>>,
    pub(crate) shared: Arc<ScannerShared>,
    pub(crate) cancel: CancellationToken,
    pub(crate) events: Vec<Arc<EventDefinition>>,
    pub(crate) contracts: Vec<Address>,
    pub(crate) tip: ChainTip,
    pub(crate) from: u64,
    pub(crate) step: StepController,
    pub(crate) interval: BlockIntervalEstimator,
    pub(crate) filter_id: Option<U256>,
}

impl ScanLoop {
    pub(crate) async fn run(mut self) {
        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let step = self.step.current();
            let to = self.from.saturating_add(step - 1).min(self.tip.height);
            if self.from <= to {
                self.scan_window(self.from, to).await;
            } else {
                broadcast(&mut self.senders, ScanEvent::ReachedTip { tip: self.tip.height })
                    .await;
                self.step.reset();
            }

            if self.cancel.is_cancelled() {
                break;
            }
            self.idle_phase().await;
            self.refresh_tip().await;
        }
        debug!("scan loop stopped");
    }

    /// Fetches one window, retrying per configuration.
    ///
    /// An empty result is retried up to `max_retry` times before it is accepted as genuinely
    /// empty. A fetch error raises the retry floor to one, emits an [`ScanEvent::Error`] for
    /// the attempt and resets the adaptive width. Only when some attempt succeeded is the
    /// batch delivered and the cursor advanced; a window that never fetched stays put and is
    /// re-attempted by the outer loop at width one.
    async fn scan_window(&mut self, from: u64, to: u64) {
        let mut max_retry = self.config.max_retry;
        let mut attempts: u32 = 0;
        let mut errored = false;
        let mut fetched = None;

        loop {
            let result = self
                .source
                .fetch_range(from, to, &self.events, &self.contracts, self.config.log_from_tx)
                .await;
            match result {
                Ok(batch) => {
                    if !batch.is_empty() {
                        if attempts > 0 {
                            info!(from, to, attempts, "window recovered after retries");
                        }
                        fetched = Some(batch);
                        break;
                    }
                    attempts += 1;
                    fetched = Some(batch);
                    if attempts > max_retry {
                        break;
                    }
                }
                Err(err) => {
                    attempts += 1;
                    max_retry = self.config.max_retry.max(1);
                    errored = true;
                    error!(from, to, attempt = attempts, %err, "log fetch failed");
                    broadcast(
                        &mut self.senders,
                        ScanEvent::Error {
                            error: err,
                            from,
                            to,
                            tip: self.tip.height,
                            tip_timestamp: self.tip.timestamp,
                        },
                    )
                    .await;
                    self.step.reset();
                    if attempts > max_retry {
                        break;
                    }
                }
            }
            if self.sleep_cancellable(self.config.retry_interval_ms).await {
                return;
            }
        }

        let Some(records) = fetched else {
            return;
        };
        let count = records.len() as u64;
        let records = if count > 0 && self.controls.reverse() {
            records.into_iter().rev().collect()
        } else {
            records
        };
        broadcast(
            &mut self.senders,
            ScanEvent::Logs {
                records,
                from,
                to,
                tip: self.tip.height,
                tip_timestamp: self.tip.timestamp,
            },
        )
        .await;
        broadcast(
            &mut self.senders,
            ScanEvent::WindowComplete {
                from,
                to,
                tip: self.tip.height,
                tip_timestamp: self.tip.timestamp,
                count,
            },
        )
        .await;
        self.from = to + 1;
        if !errored {
            self.step.record(count);
        }
    }

    /// Waits out the estimated arrival of the next block.
    ///
    /// With pending discovery enabled, the wait is interleaved with pending drains: the phase
    /// drains at least once, and keeps draining each time the wake gate fires, until the
    /// configured delay budget past the next-block ETA is spent.
    async fn idle_phase(&mut self) {
        let next = self
            .tip
            .timestamp
            .saturating_mul(1_000)
            .saturating_add(self.config.block_interval_ms);

        if self.config.pending_enabled() {
            loop {
                let txs = self.drain_pending().await;
                if !txs.is_empty() {
                    broadcast(
                        &mut self.senders,
                        ScanEvent::Pending {
                            txs,
                            tip: self.tip.height,
                            tip_timestamp: self.tip.timestamp,
                        },
                    )
                    .await;
                }
                let now = now_ms();
                if now < next {
                    self.wait_for_wake(next - now).await;
                }
                if self.cancel.is_cancelled() {
                    return;
                }
                let budget = next.saturating_add(self.config.pending_max_delay_ms);
                if now_ms().saturating_add(self.config.block_interval_ms) >= budget {
                    break;
                }
            }
        }

        let now = now_ms();
        if next > now {
            self.wait_for_wake(next - now).await;
        }
    }

    /// Drains one pending batch. While the push feed is up, its queue is the source of
    /// hashes; whenever it is down (never configured, broken, not yet reconnected) the drain
    /// falls back to filter-based polling so discovery keeps going.
    async fn drain_pending(&mut self) -> Vec<PendingTransaction> {
        let Some(source) = self.shared.current_pending_source() else {
            return Vec::new();
        };
        if self.shared.push_active.load(Ordering::SeqCst) {
            let drained: Vec<_> = {
                let mut queue = self.shared.queue.lock().expect("pending queue lock poisoned");
                queue.drain(..).collect()
            };
            if drained.is_empty() {
                return Vec::new();
            }
            pending_feed::resolve_pushed(
                source.as_ref(),
                drained,
                self.config.pending_parallelism,
            )
            .await
        } else {
            pending_feed::poll_pending(
                source.as_ref(),
                &mut self.filter_id,
                self.config.pending_parallelism,
                self.config.pending_batch_size,
            )
            .await
        }
    }

    /// Sleeps until woken by a queued pending hash, cancelled, or `ms` elapsed.
    async fn wait_for_wake(&self, ms: u64) {
        tokio::select! {
            () = self.cancel.cancelled() => {}
            () = self.shared.wake.notified() => {}
            () = tokio::time::sleep(Duration::from_millis(ms)) => {}
        }
    }

    /// Returns `true` when the sleep was cut short by cancellation.
    async fn sleep_cancellable(&self, ms: u64) -> bool {
        tokio::select! {
            () = self.cancel.cancelled() => true,
            () = tokio::time::sleep(Duration::from_millis(ms)) => false,
        }
    }

    /// Re-reads the chain tip. The tracked tip only ever moves forward; a regressed reading
    /// (reorg, lagging replica) is logged and ignored. Oracle failures never stop the loop.
    async fn refresh_tip(&mut self) {
        match self.oracle.current_tip().await {
            Ok(tip) if tip.height > self.tip.height => {
                self.interval.observe(
                    tip.height - self.tip.height,
                    tip.timestamp.saturating_sub(self.tip.timestamp),
                );
                self.shared.store_average_interval(self.interval.average_ms());
                self.tip = tip;
                self.shared.store_tip(tip);
            }
            Ok(tip) if tip.height < self.tip.height => {
                debug!(
                    observed = tip.height,
                    tracked = self.tip.height,
                    "chain tip regressed; keeping tracked height"
                );
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            Ok(_) => {}
            Err(err) if err.is_broken() => {
                error!(%err, "chain tip fetch failed");
                broadcast(
                    &mut self.senders,
                    ScanEvent::TransportBroken {
                        error: err,
                        tip: self.tip.height,
                        tip_timestamp: self.tip.timestamp,
                    },
                )
                .await;
            }
            Err(err) => {
                error!(%err, "chain tip fetch failed");
            }
        }
    }
}
