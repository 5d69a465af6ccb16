//! Pending-transaction discovery: the push feed task and the resolution helpers.

use std::{
    collections::HashMap,
    sync::{atomic::Ordering, Arc},
};

use alloy::{
    network::TransactionResponse,
    primitives::{TxHash, U256},
    rpc::types::Transaction,
};
use futures::{stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    listener::ScanControls,
    scanner::ScannerShared,
    source::PendingTxSource,
    types::{broadcast, now_ms, PendingHash, PendingTransaction, ScanEvent},
    ScanError,
};

/// Spawns the push feed task: subscribes to pending-transaction hashes and queues them for
/// the scan loop, waking it on every arrival.
///
/// At most one feed runs at a time; the `push_active` flag is the guard. Any feed failure
/// clears the flag and ends the task. The feed is never restarted automatically; only
/// [`reconnect`](crate::LogScanner::reconnect) spawns a new one.
pub(crate) fn spawn_push_feed(
    shared: Arc<ScannerShared>,
    controls: Arc<dyn ScanControls>,
    mut senders: Vec<mpsc::Sender<ScanEvent>>,
    cancel: CancellationToken,
) {
    if shared.push_active.swap(true, Ordering::SeqCst) {
        debug!("push feed already active");
        return;
    }

    tokio::spawn(async move {
        let Some(source) = shared.current_pending_source() else {
            shared.push_active.store(false, Ordering::SeqCst);
            return;
        };

        let mut hashes = match source.subscribe_hashes().await {
            Ok(stream) => stream,
            Err(err) => {
                shared.push_active.store(false, Ordering::SeqCst);
                error!(%err, "pending hash subscription failed");
                let tip = shared.tip();
                let event = if err.is_broken() {
                    ScanEvent::TransportBroken {
                        error: err,
                        tip: tip.height,
                        tip_timestamp: tip.timestamp,
                    }
                } else {
                    ScanEvent::PendingError {
                        error: err,
                        tip: tip.height,
                        tip_timestamp: tip.timestamp,
                    }
                };
                broadcast(&mut senders, event).await;
                return;
            }
        };
        info!("pending push feed subscribed");

        loop {
            let item = tokio::select! {
                () = cancel.cancelled() => break,
                item = hashes.next() => item,
            };
            let tip = shared.tip();
            match item {
                Some(Ok(hash)) => {
                    if controls.on_pending_hash(hash, tip.height, tip.timestamp) {
                        continue;
                    }
                    {
                        let mut queue =
                            shared.queue.lock().expect("pending queue lock poisoned");
                        queue.push_back(PendingHash {
                            hash,
                            first_seen_ms: now_ms(),
                            from_push: true,
                        });
                    }
                    shared.wake.notify_one();
                }
                Some(Err(err)) => {
                    shared.push_active.store(false, Ordering::SeqCst);
                    error!(%err, "pending push feed failed");
                    let event = if err.is_broken() {
                        ScanEvent::TransportBroken {
                            error: err,
                            tip: tip.height,
                            tip_timestamp: tip.timestamp,
                        }
                    } else {
                        ScanEvent::PendingError {
                            error: err,
                            tip: tip.height,
                            tip_timestamp: tip.timestamp,
                        }
                    };
                    broadcast(&mut senders, event).await;
                    return;
                }
                None => {
                    shared.push_active.store(false, Ordering::SeqCst);
                    warn!("pending push subscription ended");
                    broadcast(
                        &mut senders,
                        ScanEvent::TransportBroken {
                            error: ScanError::SubscriptionClosed,
                            tip: tip.height,
                            tip_timestamp: tip.timestamp,
                        },
                    )
                    .await;
                    return;
                }
            }
        }
        shared.push_active.store(false, Ordering::SeqCst);
    });
}

/// Resolves hashes drained from the push queue, one lookup per hash.
///
/// Duplicate observations of the same hash collapse to the latest one before resolution.
/// Hashes that no longer resolve (already mined, evicted) are dropped silently.
pub(crate) async fn resolve_pushed(
    source: &dyn PendingTxSource,
    drained: Vec<PendingHash>,
    parallelism: usize,
) -> Vec<PendingTransaction> {
    let mut observed: HashMap<TxHash, PendingHash> = HashMap::with_capacity(drained.len());
    for seen in drained {
        observed.insert(seen.hash, seen);
    }
    let hashes: Vec<TxHash> = observed.keys().copied().collect();
    let requested = hashes.len();

    let resolved = resolve_in_batches(source, hashes, parallelism, 1).await;
    if resolved.len() != requested {
        debug!(requested, resolved = resolved.len(), "some pending hashes did not resolve");
    }

    let mut txs = Vec::with_capacity(resolved.len());
    for tx in resolved {
        let hash = tx.tx_hash();
        if let Some(seen) = observed.get(&hash) {
            txs.push(PendingTransaction {
                first_seen_ms: seen.first_seen_ms,
                from_push: seen.from_push,
                tx,
            });
        }
    }
    txs
}

/// Polls the platform-side pending filter and resolves the hash delta in batches.
///
/// The filter is installed lazily on first use. Any filter error drops the id so the next
/// drain installs a fresh one; the drain itself yields nothing in that case.
pub(crate) async fn poll_pending(
    source: &dyn PendingTxSource,
    filter_id: &mut Option<U256>,
    parallelism: usize,
    batch_size: usize,
) -> Vec<PendingTransaction> {
    let id = match *filter_id {
        Some(id) => id,
        None => match source.new_filter().await {
            Ok(id) => {
                *filter_id = Some(id);
                id
            }
            Err(err) => {
                error!(%err, "failed to install pending filter");
                return Vec::new();
            }
        },
    };

    let hashes = match source.poll_hashes(id).await {
        Ok(hashes) => hashes,
        Err(err) => {
            error!(%err, "pending filter poll failed; filter will be reinstalled");
            *filter_id = None;
            return Vec::new();
        }
    };
    if hashes.is_empty() {
        return Vec::new();
    }

    let first_seen_ms = now_ms();
    resolve_in_batches(source, hashes, parallelism, batch_size)
        .await
        .into_iter()
        .map(|tx| PendingTransaction { tx, first_seen_ms, from_push: false })
        .collect()
}

/// Chunks `hashes` and resolves the chunks with bounded concurrency. A failed chunk is logged
/// and contributes nothing; the rest still resolve.
async fn resolve_in_batches(
    source: &dyn PendingTxSource,
    hashes: Vec<TxHash>,
    parallelism: usize,
    batch_size: usize,
) -> Vec<Transaction> {
    let batches: Vec<Vec<TxHash>> =
        hashes.chunks(batch_size.max(1)).map(<[TxHash]>::to_vec).collect();
    stream::iter(batches)
        .map(|batch| async move {
            match source.resolve_batch(&batch).await {
                Ok(txs) => txs,
                Err(err) => {
                    warn!(%err, batch = batch.len(), "pending batch resolution failed");
                    Vec::new()
                }
            }
        })
        .buffer_unordered(parallelism.max(1))
        .concat()
        .await
}
