//! Collaborator contracts.
//!
//! The scanner core is transport-agnostic: it drives these traits and never talks to a node
//! directly. [`crate::eth::EthNodeClient`] implements all of them over an alloy provider;
//! tests script them.

use std::sync::Arc;

use alloy::{
    primitives::{Address, TxHash, U256},
    rpc::types::Transaction,
};
use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::{
    types::{ChainTip, EventDefinition, LogRecord},
    ScanError,
};

/// Reports the chain tip.
#[async_trait]
pub trait HeightOracle: Send + Sync {
    /// Returns the current tip height and timestamp.
    async fn current_tip(&self) -> Result<ChainTip, ScanError>;
}

/// Produces decoded-enough log records for a block range.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Fetches matching logs for the inclusive range `[from, to]`.
    ///
    /// Records must be in ascending `(block_number, log_index)` order. When `log_from_tx` is
    /// set, the source must enumerate every transaction receipt in each block of the range,
    /// extract matching logs, merge and sort them before returning.
    async fn fetch_range(
        &self,
        from: u64,
        to: u64,
        events: &[Arc<EventDefinition>],
        contracts: &[Address],
        log_from_tx: bool,
    ) -> Result<Vec<LogRecord>, ScanError>;
}

/// Discovers and resolves unconfirmed transactions.
///
/// Push and poll mode are mutually exclusive per scanner run; batch fan-out (parallelism,
/// chunking) is the scanner's job, so `resolve_batch` handles exactly one batch.
#[async_trait]
pub trait PendingTxSource: Send + Sync {
    /// Opens a push subscription yielding pending-transaction hashes.
    ///
    /// The stream ending, or yielding an error for which [`ScanError::is_broken`] holds,
    /// permanently disables push mode until [`reconnect`](crate::LogScanner::reconnect).
    async fn subscribe_hashes(&self)
        -> Result<BoxStream<'static, Result<TxHash, ScanError>>, ScanError>;

    /// Resolves one batch of hashes to transactions. Partial results are allowed; hashes that
    /// no longer resolve are simply absent from the output.
    async fn resolve_batch(&self, hashes: &[TxHash]) -> Result<Vec<Transaction>, ScanError>;

    /// Installs a platform-side pending-transaction filter and returns its id.
    async fn new_filter(&self) -> Result<U256, ScanError>;

    /// Fetches the hash delta accumulated by the filter since the last poll.
    async fn poll_hashes(&self, filter_id: U256) -> Result<Vec<TxHash>, ScanError>;
}
