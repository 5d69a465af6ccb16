use alloy::primitives::TxHash;

/// Control queries the workers put to the consumer synchronously.
///
/// Data delivery goes through the [`ScanEvent`](crate::ScanEvent) channel; this trait carries
/// only the two decisions that must be answered inline by whichever worker asks:
///
/// * [`reverse`](ScanControls::reverse): whether each window batch should be delivered in
///   descending order.
/// * [`on_pending_hash`](ScanControls::on_pending_hash): early suppression of pending hashes
///   in push mode.
///
/// Implementations must not block for long; they run on the producing worker.
pub trait ScanControls: Send + Sync {
    /// When `true`, every window batch is reversed before delivery (the whole batch, not just
    /// the sort key). Window boundaries are reported unreversed.
    fn reverse(&self) -> bool {
        false
    }

    /// Offered every push-mode pending hash before it is queued. Returning `true` means the
    /// hash is already handled and is dropped without resolution.
    ///
    /// Poll mode has no equivalent; deltas are resolved directly.
    fn on_pending_hash(&self, _hash: TxHash, _tip: u64, _tip_timestamp: u64) -> bool {
        false
    }
}

/// Controls that never reverse and never suppress.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultControls;

impl ScanControls for DefaultControls {}
