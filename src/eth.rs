//! Alloy-backed collaborators: one client implementing every scanner trait over a node RPC
//! endpoint.

use std::sync::Arc;

use alloy::{
    eips::{BlockId, BlockNumberOrTag},
    network::Ethereum,
    primitives::{Address, TxHash, B256, U256},
    providers::{Provider, RootProvider},
    rpc::types::{Filter, Log, Transaction},
};
use async_trait::async_trait;
use futures::{future, stream::BoxStream, StreamExt};
use tracing::debug;

use crate::{
    source::{HeightOracle, LogSource, PendingTxSource},
    types::{ChainTip, EventDefinition, LogRecord},
    ScanError,
};

/// Ethereum mainnet chain id.
pub const ETH_MAINNET_CHAIN_ID: u64 = 1;

/// Node client over an alloy [`RootProvider`].
///
/// Push-mode pending discovery requires a pubsub transport (WebSocket or IPC); every other
/// operation works over plain HTTP.
pub struct EthNodeClient {
    provider: RootProvider<Ethereum>,
}

impl EthNodeClient {
    #[must_use]
    pub fn new(provider: RootProvider<Ethereum>) -> Self {
        Self { provider }
    }

    /// Connects to an `http(s)://`, `ws(s)://` or IPC-path endpoint.
    pub async fn connect(endpoint: &str) -> Result<Self, ScanError> {
        let provider = RootProvider::connect(endpoint).await?;
        Ok(Self { provider })
    }

    pub async fn chain_id(&self) -> Result<u64, ScanError> {
        Ok(self.provider.get_chain_id().await?)
    }

    pub async fn is_eth_mainnet(&self) -> Result<bool, ScanError> {
        Ok(self.chain_id().await? == ETH_MAINNET_CHAIN_ID)
    }

    /// Receipt-based extraction: enumerates every receipt of every block in the range.
    ///
    /// Slower than a range filter but immune to node-side log-index gaps; selected via
    /// [`log_from_tx`](crate::ScanConfigBuilder::log_from_tx).
    async fn fetch_from_receipts(
        &self,
        from: u64,
        to: u64,
        events: &[Arc<EventDefinition>],
        contracts: &[Address],
    ) -> Result<Vec<LogRecord>, ScanError> {
        let mut records = Vec::new();
        for number in from..=to {
            let block = self
                .provider
                .get_block_by_number(BlockNumberOrTag::Number(number))
                .await?
                .ok_or(ScanError::TipUnavailable)?;
            let timestamp = block.header.timestamp;

            let receipts = self
                .provider
                .get_block_receipts(BlockId::from(number))
                .await?
                .unwrap_or_default();
            for receipt in receipts {
                for log in receipt.inner.logs() {
                    let Some(mut record) = record_from_rpc_log(log, events) else {
                        continue;
                    };
                    if !contracts.is_empty() && !contracts.contains(&record.contract) {
                        continue;
                    }
                    record.block_number = number;
                    record.block_timestamp = timestamp;
                    record.tx_hash = receipt.transaction_hash;
                    records.push(record);
                }
            }
        }
        records.sort_by_key(|record| (record.block_number, record.log_index));
        Ok(records)
    }
}

#[async_trait]
impl HeightOracle for EthNodeClient {
    async fn current_tip(&self) -> Result<ChainTip, ScanError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await?
            .ok_or(ScanError::TipUnavailable)?;
        Ok(ChainTip { height: block.header.number, timestamp: block.header.timestamp })
    }
}

#[async_trait]
impl LogSource for EthNodeClient {
    async fn fetch_range(
        &self,
        from: u64,
        to: u64,
        events: &[Arc<EventDefinition>],
        contracts: &[Address],
        log_from_tx: bool,
    ) -> Result<Vec<LogRecord>, ScanError> {
        if log_from_tx {
            return self.fetch_from_receipts(from, to, events, contracts).await;
        }

        let mut filter = Filter::new().from_block(from).to_block(to);
        if !contracts.is_empty() {
            filter = filter.address(contracts.to_vec());
        }
        if !events.is_empty() {
            let topics: Vec<B256> = events.iter().map(|event| event.topic).collect();
            filter = filter.event_signature(topics);
        }

        let logs = self.provider.get_logs(&filter).await?;
        let mut records: Vec<LogRecord> =
            logs.iter().filter_map(|log| record_from_rpc_log(log, events)).collect();
        records.sort_by_key(|record| (record.block_number, record.log_index));
        Ok(records)
    }
}

#[async_trait]
impl PendingTxSource for EthNodeClient {
    async fn subscribe_hashes(
        &self,
    ) -> Result<BoxStream<'static, Result<TxHash, ScanError>>, ScanError> {
        let subscription = self.provider.subscribe_pending_transactions().await?;
        Ok(subscription.into_stream().map(Ok).boxed())
    }

    async fn resolve_batch(&self, hashes: &[TxHash]) -> Result<Vec<Transaction>, ScanError> {
        let lookups = hashes.iter().map(|hash| self.provider.get_transaction_by_hash(*hash));
        let mut txs = Vec::with_capacity(hashes.len());
        for result in future::join_all(lookups).await {
            match result {
                Ok(Some(tx)) => txs.push(tx),
                // mined or evicted between observation and lookup
                Ok(None) => {}
                Err(err) => debug!(%err, "pending transaction lookup failed"),
            }
        }
        Ok(txs)
    }

    async fn new_filter(&self) -> Result<U256, ScanError> {
        Ok(self.provider.new_pending_transactions_filter(false).await?)
    }

    async fn poll_hashes(&self, filter_id: U256) -> Result<Vec<TxHash>, ScanError> {
        Ok(self.provider.get_filter_changes(filter_id).await?)
    }
}

/// Maps an RPC log to a [`LogRecord`] when its topic0 matches a registered definition.
/// Non-matching logs (anonymous events, unrelated signatures) are dropped silently.
fn record_from_rpc_log(log: &Log, events: &[Arc<EventDefinition>]) -> Option<LogRecord> {
    let topics = log.inner.data.topics();
    let topic0 = topics.first()?;
    let event = events.iter().find(|event| event.topic == *topic0)?.clone();
    Some(LogRecord {
        contract: log.inner.address,
        event,
        tx_hash: log.transaction_hash.unwrap_or_default(),
        block_number: log.block_number.unwrap_or_default(),
        block_timestamp: log.block_timestamp.unwrap_or_default(),
        log_index: log.log_index.unwrap_or_default(),
        indexed_values: topics[1..].to_vec(),
        non_indexed_data: log.inner.data.data.clone(),
    })
}
