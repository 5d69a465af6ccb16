use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use alloy::{
    primitives::{keccak256, Address, Bytes, TxHash, B256},
    rpc::types::Transaction,
};
use tokio::sync::mpsc;
use tracing::debug;

use crate::ScanError;

/// Latest chain-tip reading from the height oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainTip {
    /// Block height of the tip.
    pub height: u64,
    /// Block timestamp of the tip, in seconds.
    pub timestamp: u64,
}

/// Abstract reference to an event signature, matched by its topic0 hash.
///
/// The scanner is decode-agnostic: a definition carries just enough to recognize matching logs.
/// Decoding indexed/non-indexed parameters is left to downstream consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDefinition {
    /// Human-readable event name, e.g. `Transfer`.
    pub name: String,
    /// Topic0 hash identifying the event signature.
    pub topic: B256,
}

impl EventDefinition {
    #[must_use]
    pub fn new(name: impl Into<String>, topic: B256) -> Self {
        Self { name: name.into(), topic }
    }

    /// Builds a definition from a canonical signature such as
    /// `Transfer(address,address,uint256)`.
    #[must_use]
    pub fn from_signature(signature: &str) -> Self {
        let name = signature.split('(').next().unwrap_or(signature).to_owned();
        Self { name, topic: keccak256(signature.as_bytes()) }
    }
}

/// One extracted log, produced by a [`LogSource`](crate::LogSource) and handed to subscribers.
///
/// Records are immutable and never retained by the scanner. `indexed_values` holds the raw
/// topics after topic0; `non_indexed_data` holds the undecoded data payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub contract: Address,
    pub event: Arc<EventDefinition>,
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub block_timestamp: u64,
    pub log_index: u64,
    pub indexed_values: Vec<B256>,
    pub non_indexed_data: Bytes,
}

/// A pending-transaction hash observation, queued between the push feed and the scan loop.
#[derive(Debug, Clone, Copy)]
pub struct PendingHash {
    pub hash: TxHash,
    /// Wall-clock time of the observation, unix ms.
    pub first_seen_ms: u64,
    /// Whether the hash arrived via the push subscription (vs the poll filter).
    pub from_push: bool,
}

/// A resolved pending transaction, paired with its observation metadata.
#[derive(Debug, Clone)]
pub struct PendingTransaction {
    pub tx: Transaction,
    pub first_seen_ms: u64,
    pub from_push: bool,
}

/// Where the scan should start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartHeight {
    /// Start at the chain tip observed at startup.
    Latest,
    /// Start at a specific block height.
    Height(u64),
}

impl From<u64> for StartHeight {
    fn from(height: u64) -> Self {
        StartHeight::Height(height)
    }
}

/// Tagged events delivered to subscribers over the event channel.
///
/// Within one subscriber stream, events are delivered strictly in the order the workers
/// produced them: `Logs` for window `[from, to]` always precedes its `WindowComplete`, and
/// windows arrive in increasing `from` order with no gap or overlap.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// A batch of log records for one scan window. Empty batches are delivered too.
    Logs { records: Vec<LogRecord>, from: u64, to: u64, tip: u64, tip_timestamp: u64 },
    /// A scan window finished; `count` is the (unreversed) batch size.
    WindowComplete { from: u64, to: u64, tip: u64, tip_timestamp: u64, count: u64 },
    /// The scanner caught up with the chain tip.
    ReachedTip { tip: u64 },
    /// A batch of resolved pending transactions, deduplicated by hash.
    Pending { txs: Vec<PendingTransaction>, tip: u64, tip_timestamp: u64 },
    /// A log fetch attempt for `[from, to]` failed. The loop keeps running.
    Error { error: ScanError, from: u64, to: u64, tip: u64, tip_timestamp: u64 },
    /// The pending feed failed with a recoverable error; push mode is disabled.
    PendingError { error: ScanError, tip: u64, tip_timestamp: u64 },
    /// The push transport dropped permanently; call
    /// [`reconnect`](crate::LogScanner::reconnect) to restart it.
    TransportBroken { error: ScanError, tip: u64, tip_timestamp: u64 },
}

/// Sends an event to every subscriber, pruning the ones that hung up.
///
/// A closed subscriber never stops the scanner; only [`stop`](crate::LogScanner::stop) does.
pub(crate) async fn broadcast(senders: &mut Vec<mpsc::Sender<ScanEvent>>, event: ScanEvent) {
    let mut any_closed = false;
    for sender in senders.iter() {
        if sender.send(event.clone()).await.is_err() {
            any_closed = true;
        }
    }
    if any_closed {
        senders.retain(|sender| !sender.is_closed());
        debug!(remaining = senders.len(), "dropped closed event subscriber");
    }
}

/// Wall clock in unix milliseconds.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_millis() as u64)
}
