//! Scripted collaborators and stream helpers shared by the integration tests.

#![allow(dead_code)]

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use alloy::{
    primitives::{Address, TxHash, U256},
    rpc::types::Transaction,
};
use async_trait::async_trait;
use eth_log_scanner::{
    ChainTip, EventDefinition, HeightOracle, LogRecord, LogSource, PendingTxSource,
    ScanControls, ScanError, ScanEvent,
};
use futures::{stream::BoxStream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, UnboundedReceiverStream};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("clock before epoch").as_secs()
}

pub fn now_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("clock before epoch").as_millis() as u64
}

/// A height oracle that replays a script of readings, then repeats the last `Ok` forever.
pub struct ScriptedOracle {
    script: Mutex<VecDeque<Result<ChainTip, ScanError>>>,
    last: Mutex<Option<ChainTip>>,
}

impl ScriptedOracle {
    /// Always reports the same tip.
    pub fn fixed(height: u64, timestamp: u64) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            last: Mutex::new(Some(ChainTip { height, timestamp })),
        })
    }

    /// Replays `script` in order; after it is exhausted, the last successful reading repeats.
    pub fn script(script: Vec<Result<ChainTip, ScanError>>) -> Arc<Self> {
        Arc::new(Self { script: Mutex::new(script.into()), last: Mutex::new(None) })
    }
}

#[async_trait]
impl HeightOracle for ScriptedOracle {
    async fn current_tip(&self) -> Result<ChainTip, ScanError> {
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(tip)) => {
                *self.last.lock().unwrap() = Some(tip);
                Ok(tip)
            }
            Some(Err(err)) => Err(err),
            None => self.last.lock().unwrap().ok_or(ScanError::TipUnavailable),
        }
    }
}

/// A log source that replays scripted fetch outcomes, then falls back to a default outcome.
/// Every call is recorded as its `(from, to)` window.
pub struct ScriptedLogSource {
    script: Mutex<VecDeque<Result<Vec<LogRecord>, ScanError>>>,
    fallback: Result<Vec<LogRecord>, ScanError>,
    pub calls: Mutex<Vec<(u64, u64)>>,
    delay: Duration,
}

impl ScriptedLogSource {
    /// Every fetch succeeds with no records.
    pub fn empty() -> Arc<Self> {
        Self::with_script(Vec::new(), Ok(Vec::new()))
    }

    /// Like [`empty`](Self::empty), but every fetch takes `delay_ms`. Keeps the scan loop
    /// busy while a test stages pending hashes.
    pub fn empty_delayed(delay_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Ok(Vec::new()),
            calls: Mutex::new(Vec::new()),
            delay: Duration::from_millis(delay_ms),
        })
    }

    /// Every fetch fails.
    pub fn failing() -> Arc<Self> {
        Self::with_script(Vec::new(), Err(ScanError::Decode("scripted failure".into())))
    }

    pub fn with_script(
        script: Vec<Result<Vec<LogRecord>, ScanError>>,
        fallback: Result<Vec<LogRecord>, ScanError>,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        })
    }

    pub fn windows(&self) -> Vec<(u64, u64)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LogSource for ScriptedLogSource {
    async fn fetch_range(
        &self,
        from: u64,
        to: u64,
        _events: &[Arc<EventDefinition>],
        _contracts: &[Address],
        _log_from_tx: bool,
    ) -> Result<Vec<LogRecord>, ScanError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.calls.lock().unwrap().push((from, to));
        self.script.lock().unwrap().pop_front().unwrap_or_else(|| self.fallback.clone())
    }
}

/// A log source backed by a fixed block-to-records map.
pub struct MappedLogSource {
    by_block: BTreeMap<u64, Vec<LogRecord>>,
}

impl MappedLogSource {
    pub fn new(records: Vec<LogRecord>) -> Arc<Self> {
        let mut by_block: BTreeMap<u64, Vec<LogRecord>> = BTreeMap::new();
        for record in records {
            by_block.entry(record.block_number).or_default().push(record);
        }
        Arc::new(Self { by_block })
    }
}

#[async_trait]
impl LogSource for MappedLogSource {
    async fn fetch_range(
        &self,
        from: u64,
        to: u64,
        _events: &[Arc<EventDefinition>],
        _contracts: &[Address],
        _log_from_tx: bool,
    ) -> Result<Vec<LogRecord>, ScanError> {
        Ok(self.by_block.range(from..=to).flat_map(|(_, records)| records.clone()).collect())
    }
}

/// A pending source with scripted subscriptions, poll outcomes and a resolvable-hash map.
pub struct ScriptedPendingSource {
    subscriptions: Mutex<VecDeque<mpsc::UnboundedReceiver<Result<TxHash, ScanError>>>>,
    resolvable: Mutex<HashMap<TxHash, Transaction>>,
    pub resolve_calls: Mutex<Vec<Vec<TxHash>>>,
    pub new_filter_calls: AtomicU64,
    poll_script: Mutex<VecDeque<Result<Vec<TxHash>, ScanError>>>,
}

impl ScriptedPendingSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            subscriptions: Mutex::new(VecDeque::new()),
            resolvable: Mutex::new(HashMap::new()),
            resolve_calls: Mutex::new(Vec::new()),
            new_filter_calls: AtomicU64::new(0),
            poll_script: Mutex::new(VecDeque::new()),
        })
    }

    /// Queues one push subscription; the returned sender feeds it.
    pub fn add_subscription(&self) -> mpsc::UnboundedSender<Result<TxHash, ScanError>> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscriptions.lock().unwrap().push_back(receiver);
        sender
    }

    pub fn add_resolvable(&self, tx: Transaction) {
        use alloy::network::TransactionResponse;
        self.resolvable.lock().unwrap().insert(tx.tx_hash(), tx);
    }

    pub fn push_poll(&self, outcome: Result<Vec<TxHash>, ScanError>) {
        self.poll_script.lock().unwrap().push_back(outcome);
    }

    pub fn recorded_resolves(&self) -> Vec<Vec<TxHash>> {
        self.resolve_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PendingTxSource for ScriptedPendingSource {
    async fn subscribe_hashes(
        &self,
    ) -> Result<BoxStream<'static, Result<TxHash, ScanError>>, ScanError> {
        match self.subscriptions.lock().unwrap().pop_front() {
            Some(receiver) => Ok(UnboundedReceiverStream::new(receiver).boxed()),
            None => Err(ScanError::SubscriptionClosed),
        }
    }

    async fn resolve_batch(&self, hashes: &[TxHash]) -> Result<Vec<Transaction>, ScanError> {
        let mut sorted = hashes.to_vec();
        sorted.sort();
        self.resolve_calls.lock().unwrap().push(sorted);

        let resolvable = self.resolvable.lock().unwrap();
        Ok(hashes.iter().filter_map(|hash| resolvable.get(hash).cloned()).collect())
    }

    async fn new_filter(&self) -> Result<U256, ScanError> {
        let id = self.new_filter_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(U256::from(id))
    }

    async fn poll_hashes(&self, _filter_id: U256) -> Result<Vec<TxHash>, ScanError> {
        self.poll_script.lock().unwrap().pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Controls with a fixed reverse/suppress answer, recording every offered hash.
pub struct RecordingControls {
    pub reverse: bool,
    pub suppress: bool,
    pub seen: Mutex<Vec<TxHash>>,
}

impl RecordingControls {
    pub fn reversing() -> Arc<Self> {
        Arc::new(Self { reverse: true, suppress: false, seen: Mutex::new(Vec::new()) })
    }

    pub fn suppressing() -> Arc<Self> {
        Arc::new(Self { reverse: false, suppress: true, seen: Mutex::new(Vec::new()) })
    }
}

impl ScanControls for RecordingControls {
    fn reverse(&self) -> bool {
        self.reverse
    }

    fn on_pending_hash(&self, hash: TxHash, _tip: u64, _tip_timestamp: u64) -> bool {
        self.seen.lock().unwrap().push(hash);
        self.suppress
    }
}

/// A minimal legacy transaction with the given hash, shaped like a node RPC response.
pub fn pending_tx(hash: TxHash) -> Transaction {
    serde_json::from_value(serde_json::json!({
        "hash": hash,
        "nonce": "0x0",
        "blockHash": null,
        "blockNumber": null,
        "transactionIndex": null,
        "from": "0x0000000000000000000000000000000000000001",
        "to": "0x0000000000000000000000000000000000000002",
        "value": "0x0",
        "gasPrice": "0x1",
        "gas": "0x5208",
        "input": "0x",
        "v": "0x1b",
        "r": "0x1",
        "s": "0x1",
        "type": "0x0",
    }))
    .expect("valid legacy transaction json")
}

/// A synthetic log record for `block`.
pub fn record(block: u64, log_index: u64) -> LogRecord {
    LogRecord {
        contract: Address::repeat_byte(0xAA),
        event: Arc::new(EventDefinition::from_signature("Transfer(address,address,uint256)")),
        tx_hash: TxHash::repeat_byte(0x11),
        block_number: block,
        block_timestamp: 0,
        log_index,
        indexed_values: Vec::new(),
        non_indexed_data: alloy::primitives::Bytes::new(),
    }
}

/// Waits up to five seconds for the first event matching `pred`, discarding the rest.
pub async fn next_matching<F>(events: &mut ReceiverStream<ScanEvent>, mut pred: F) -> ScanEvent
where
    F: FnMut(&ScanEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = events.next().await {
            if pred(&event) {
                return event;
            }
        }
        panic!("event stream ended before a matching event arrived");
    })
    .await
    .expect("timed out waiting for a matching event")
}

/// Collects `(from, to, count)` for every completed window until the tip is reached.
pub async fn windows_until_tip(events: &mut ReceiverStream<ScanEvent>) -> Vec<(u64, u64, u64)> {
    let mut windows = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = events.next().await {
            match event {
                ScanEvent::WindowComplete { from, to, count, .. } => {
                    windows.push((from, to, count));
                }
                ScanEvent::ReachedTip { .. } => break,
                _ => {}
            }
        }
    })
    .await
    .expect("timed out waiting for the tip");
    windows
}
