//! # eth-log-scanner
//!
//! An adaptive EVM event-log scanner. It walks the chain in inclusive block windows, sizing
//! each window from the density of the previous one, paces itself against an estimate of the
//! chain's block interval, and keeps running through RPC failures by retrying and surfacing
//! errors as events rather than stopping.
//!
//! ## Features
//!
//! - **Adaptive windowing**: window width grows while windows come back empty and contracts
//!   when they come back dense, steering toward a fixed per-window record target. A fixed
//!   width can be pinned instead.
//! - **Tip tracking**: the chain tip is re-read every cycle and only ever moves forward; an
//!   exponential moving average of the inter-block time paces idle waits.
//! - **Pending discovery**: optional pending-transaction resolution, either pushed over a
//!   pubsub subscription or polled through a node-side filter, deduplicated and delivered in
//!   batches.
//! - **Failure containment**: the only fatal error is the initial chain-tip fetch at start.
//!   Everything later is retried or reported through the event stream.
//!
//! ## Usage
//!
//! Build a [`LogScanner`] over an [`eth::EthNodeClient`] (or your own implementations of the
//! [`HeightOracle`], [`LogSource`] and [`PendingTxSource`] traits), subscribe, then start:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use eth_log_scanner::{
//!     eth::EthNodeClient, EventDefinition, LogScanner, ScanConfig, ScanEvent, StartHeight,
//! };
//! use tokio_stream::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(EthNodeClient::connect("wss://example.org").await?);
//!
//! let mut scanner = LogScanner::builder(client.clone(), client.clone())
//!     .pending_source(client)
//!     .config(ScanConfig::builder().pending_check_interval_ms(100).build())
//!     .build();
//!
//! let mut events = scanner.subscribe();
//! let transfer = EventDefinition::from_signature("Transfer(address,address,uint256)");
//! scanner.start(StartHeight::Latest, vec![transfer], vec![]).await?;
//!
//! while let Some(event) = events.next().await {
//!     match event {
//!         ScanEvent::Logs { records, from, to, .. } => {
//!             println!("{} records in [{from}, {to}]", records.len());
//!         }
//!         ScanEvent::ReachedTip { tip } => println!("caught up at {tip}"),
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod eth;
mod interval;
pub mod listener;
pub mod scanner;
pub mod source;
mod step;
pub mod types;

pub use config::{ScanConfig, ScanConfigBuilder};
pub use error::ScanError;
pub use listener::{DefaultControls, ScanControls};
pub use scanner::{LogScanner, ScannerBuilder, DEFAULT_EVENT_BUFFER};
pub use source::{HeightOracle, LogSource, PendingTxSource};
pub use step::MAX_STEP;
pub use types::{
    ChainTip, EventDefinition, LogRecord, PendingHash, PendingTransaction, ScanEvent,
    StartHeight,
};
