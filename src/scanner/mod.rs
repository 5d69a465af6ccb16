//! Scanner control surface and shared worker state.

mod pending_feed;
mod scan_loop;

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use alloy::primitives::Address;
use tokio::sync::{mpsc, Notify};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    config::ScanConfig,
    interval::BlockIntervalEstimator,
    listener::{DefaultControls, ScanControls},
    scanner::scan_loop::ScanLoop,
    source::{HeightOracle, LogSource, PendingTxSource},
    step::StepController,
    types::{ChainTip, EventDefinition, PendingHash, ScanEvent, StartHeight},
    ScanError,
};

/// Buffered events per subscriber before the producing worker backpressures.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// State shared between the scan loop, the push feed and the control surface.
pub(crate) struct ScannerShared {
    pub(crate) running: AtomicBool,
    pub(crate) push_active: AtomicBool,
    /// Single-permit wake gate: a queued pending hash wakes an idling scan loop early.
    pub(crate) wake: Notify,
    /// FIFO of observed pending hashes, drained (and deduplicated) by the scan loop.
    pub(crate) queue: Mutex<VecDeque<PendingHash>>,
    tip_height: AtomicU64,
    tip_timestamp: AtomicU64,
    average_interval_ms: AtomicU64,
    /// Replaced on every `start`; `stop` cancels the current one.
    cancel: Mutex<CancellationToken>,
    pub(crate) pending_source: Mutex<Option<Arc<dyn PendingTxSource>>>,
}

impl ScannerShared {
    fn new(pending_source: Option<Arc<dyn PendingTxSource>>, block_interval_ms: u64) -> Self {
        Self {
            running: AtomicBool::new(false),
            push_active: AtomicBool::new(false),
            wake: Notify::new(),
            queue: Mutex::new(VecDeque::new()),
            tip_height: AtomicU64::new(0),
            tip_timestamp: AtomicU64::new(0),
            average_interval_ms: AtomicU64::new(block_interval_ms),
            cancel: Mutex::new(CancellationToken::new()),
            pending_source: Mutex::new(pending_source),
        }
    }

    pub(crate) fn tip(&self) -> ChainTip {
        ChainTip {
            height: self.tip_height.load(Ordering::Relaxed),
            timestamp: self.tip_timestamp.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn store_tip(&self, tip: ChainTip) {
        self.tip_height.store(tip.height, Ordering::Relaxed);
        self.tip_timestamp.store(tip.timestamp, Ordering::Relaxed);
    }

    pub(crate) fn store_average_interval(&self, ms: u64) {
        self.average_interval_ms.store(ms, Ordering::Relaxed);
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel.lock().expect("cancel lock poisoned").clone()
    }

    pub(crate) fn current_pending_source(&self) -> Option<Arc<dyn PendingTxSource>> {
        self.pending_source.lock().expect("pending source lock poisoned").clone()
    }
}

/// Adaptive log scanner.
///
/// Built via [`ScannerBuilder`]; subscribe with [`subscribe`](LogScanner::subscribe) **before**
/// calling [`start`](LogScanner::start), then consume the returned stream of
/// [`ScanEvent`]s.
///
/// ```no_run
/// # use std::sync::Arc;
/// # use eth_log_scanner::{eth::EthNodeClient, EventDefinition, LogScanner, ScanConfig, StartHeight};
/// # async fn example(client: Arc<EthNodeClient>) -> Result<(), eth_log_scanner::ScanError> {
/// let mut scanner = LogScanner::builder(client.clone(), client.clone())
///     .pending_source(client)
///     .config(ScanConfig::builder().block_interval_ms(12_000).build())
///     .build();
///
/// let mut events = scanner.subscribe();
/// let transfer = EventDefinition::from_signature("Transfer(address,address,uint256)");
/// scanner.start(StartHeight::Latest, vec![transfer], vec![]).await?;
/// # Ok(())
/// # }
/// ```
pub struct LogScanner {
    config: ScanConfig,
    oracle: Arc<dyn HeightOracle>,
    source: Arc<dyn LogSource>,
    controls: Arc<dyn ScanControls>,
    listeners: Vec<mpsc::Sender<ScanEvent>>,
    shared: Arc<ScannerShared>,
}

impl LogScanner {
    /// Starts a builder over the two required collaborators.
    #[must_use]
    pub fn builder(oracle: Arc<dyn HeightOracle>, source: Arc<dyn LogSource>) -> ScannerBuilder {
        ScannerBuilder {
            oracle,
            source,
            pending_source: None,
            controls: Arc::new(DefaultControls),
            config: ScanConfig::default(),
        }
    }

    /// Registers an event subscriber. Every subscriber receives every event.
    ///
    /// Must be called before [`start`](LogScanner::start); subscribers added later are not
    /// seen by an already-running worker. A subscriber that hangs up is pruned without
    /// stopping the scan.
    #[must_use]
    pub fn subscribe(&mut self) -> ReceiverStream<ScanEvent> {
        let (sender, receiver) = mpsc::channel(DEFAULT_EVENT_BUFFER);
        self.listeners.push(sender);
        ReceiverStream::new(receiver)
    }

    /// Starts the scan loop and, when configured, the push pending feed.
    ///
    /// Returns `Ok(false)` without side effects when already running. The initial chain-tip
    /// fetch is the only fatal failure: on error the loop is never spawned and `Err` is
    /// returned. All later failures are recoverable and surface as events.
    pub async fn start(
        &self,
        from: StartHeight,
        events: Vec<EventDefinition>,
        contracts: Vec<Address>,
    ) -> Result<bool, ScanError> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            debug!("start called while already running");
            return Ok(false);
        }

        let tip = match self.oracle.current_tip().await {
            Ok(tip) => tip,
            Err(err) => {
                self.shared.running.store(false, Ordering::SeqCst);
                return Err(err);
            }
        };
        self.shared.store_tip(tip);

        let cancel = CancellationToken::new();
        *self.shared.cancel.lock().expect("cancel lock poisoned") = cancel.clone();

        let start_from = match from {
            StartHeight::Latest => tip.height,
            StartHeight::Height(height) => height,
        };
        info!(from = start_from, tip = tip.height, "starting scan loop");

        let scan_loop = ScanLoop {
            config: self.config.clone(),
            oracle: Arc::clone(&self.oracle),
            source: Arc::clone(&self.source),
            controls: Arc::clone(&self.controls),
            senders: self.listeners.clone(),
            shared: Arc::clone(&self.shared),
            cancel: cancel.clone(),
            events: events.into_iter().map(Arc::new).collect(),
            contracts,
            tip,
            from: start_from,
            step: StepController::new(self.config.fixed_step),
            interval: BlockIntervalEstimator::new(
                self.config.block_interval_ms,
                self.config.sensitivity,
            ),
            filter_id: None,
        };
        tokio::spawn(scan_loop.run());

        if self.config.push_enabled() && self.shared.current_pending_source().is_some() {
            pending_feed::spawn_push_feed(
                Arc::clone(&self.shared),
                Arc::clone(&self.controls),
                self.listeners.clone(),
                cancel,
            );
        }

        Ok(true)
    }

    /// Stops both workers. Idempotent; in-flight RPC results are discarded once the workers
    /// observe the cancellation.
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.push_active.store(false, Ordering::SeqCst);
        self.shared.cancel.lock().expect("cancel lock poisoned").cancel();
        self.shared.wake.notify_one();
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Replaces the pending-transaction source and restarts the push feed.
    ///
    /// Push mode is never retried automatically after a transport break; this is the explicit
    /// recovery path. No-op when the scanner is stopped or push mode is still active.
    pub fn reconnect(&self, source: Arc<dyn PendingTxSource>) {
        *self.shared.pending_source.lock().expect("pending source lock poisoned") =
            Some(source);
        if self.is_running() && !self.shared.push_active.load(Ordering::SeqCst) {
            pending_feed::spawn_push_feed(
                Arc::clone(&self.shared),
                Arc::clone(&self.controls),
                self.listeners.clone(),
                self.shared.cancel_token(),
            );
        }
    }

    /// Last observed chain-tip height.
    #[must_use]
    pub fn current_height(&self) -> u64 {
        self.shared.tip().height
    }

    /// Timestamp of the last observed chain tip, in seconds.
    #[must_use]
    pub fn current_timestamp(&self) -> u64 {
        self.shared.tip().timestamp
    }

    /// Smoothed inter-block interval estimate, in milliseconds.
    #[must_use]
    pub fn average_block_interval_ms(&self) -> u64 {
        self.shared.average_interval_ms.load(Ordering::Relaxed)
    }
}

impl Drop for LogScanner {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Builder for [`LogScanner`]: collaborators first, options afterwards.
pub struct ScannerBuilder {
    oracle: Arc<dyn HeightOracle>,
    source: Arc<dyn LogSource>,
    pending_source: Option<Arc<dyn PendingTxSource>>,
    controls: Arc<dyn ScanControls>,
    config: ScanConfig,
}

impl ScannerBuilder {
    /// Collaborator for pending-transaction discovery. Without one, pending options are
    /// inert.
    #[must_use]
    pub fn pending_source(mut self, source: Arc<dyn PendingTxSource>) -> Self {
        self.pending_source = Some(source);
        self
    }

    /// Consumer-side control queries. Defaults to [`DefaultControls`].
    #[must_use]
    pub fn controls(mut self, controls: Arc<dyn ScanControls>) -> Self {
        self.controls = controls;
        self
    }

    #[must_use]
    pub fn config(mut self, config: ScanConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn build(self) -> LogScanner {
        let shared =
            Arc::new(ScannerShared::new(self.pending_source, self.config.block_interval_ms));
        LogScanner {
            config: self.config,
            oracle: self.oracle,
            source: self.source,
            controls: self.controls,
            listeners: Vec::new(),
            shared,
        }
    }
}
