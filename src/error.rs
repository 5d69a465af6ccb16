use std::{mem::discriminant, sync::Arc};

use alloy::transports::{RpcError, TransportErrorKind};
use thiserror::Error;

/// Errors emitted by the scanner and its collaborators.
///
/// `ScanError` values are returned by [`LogScanner::start`](crate::LogScanner::start) when the
/// initial chain-tip fetch fails (the only fatal error) and are otherwise carried inside
/// [`ScanEvent`](crate::ScanEvent) variants while the workers keep running.
///
/// All variants are cheap to clone; underlying error sources are `Arc`-wrapped.
#[derive(Error, Debug, Clone)]
pub enum ScanError {
    /// The underlying RPC transport failed.
    #[error("transport error: {0}")]
    Transport(Arc<dyn std::error::Error + Send + Sync>),

    /// A log could not be matched against the registered event definitions.
    ///
    /// Sources treat this as a data-quality signal and filter such logs silently; the variant
    /// exists for implementations that want to surface the condition explicitly.
    #[error("log decode error: {0}")]
    Decode(String),

    /// The pending-transaction push transport dropped permanently.
    ///
    /// Push mode is disabled when this occurs and is only restarted by an explicit
    /// [`reconnect`](crate::LogScanner::reconnect).
    #[error("pending transport broken: {0}")]
    TransportBroken(Arc<dyn std::error::Error + Send + Sync>),

    /// The pending-transaction push subscription ended.
    #[error("pending subscription closed")]
    SubscriptionClosed,

    /// The latest block could not be resolved while reading the chain tip.
    #[error("latest block unavailable")]
    TipUnavailable,
}

impl ScanError {
    /// Wraps an arbitrary error source as a [`ScanError::Transport`].
    pub fn transport<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ScanError::Transport(Arc::new(err))
    }

    /// Wraps an arbitrary error source as a [`ScanError::TransportBroken`].
    pub fn broken<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ScanError::TransportBroken(Arc::new(err))
    }

    /// Whether the error means the push transport is gone for good.
    #[must_use]
    pub fn is_broken(&self) -> bool {
        matches!(self, ScanError::TransportBroken(_) | ScanError::SubscriptionClosed)
    }

    /// Variant-level equality, ignoring the wrapped sources. Useful in tests.
    #[must_use]
    pub fn same_kind(&self, other: &ScanError) -> bool {
        discriminant(self) == discriminant(other)
    }
}

impl From<RpcError<TransportErrorKind>> for ScanError {
    fn from(error: RpcError<TransportErrorKind>) -> Self {
        ScanError::Transport(Arc::new(error))
    }
}
