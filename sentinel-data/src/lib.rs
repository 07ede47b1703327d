#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms,
    rust_2024_compatibility
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments, type_alias_bounds)]

//! # Sentinel-Data
//! Resilient acquisition of crypto futures market data for a single symbol.
//!
//! * **Relay tolerant**: every upstream request is routed through a rotating pool of public
//!   forwarding services, with bounded retries, linear backoff and jitter.
//! * **All or nothing**: a [`MarketAggregate`] is only produced when candles for every
//!   timeframe, the order book and the 24h ticker were all acquired.
//! * **Derived analytics**: EMA, RSI, MACD and Bollinger Bands per timeframe, plus a heuristic
//!   buy/sell [`FlowEstimate`].
//!
//! ## Example
//! ```rust,no_run
//! use sentinel_data::{
//!     assembler::{AcquisitionConfig, SnapshotAssembler},
//!     relay::{RelayConfig, ReqwestTransport},
//! };
//!
//! # async fn run() -> Result<(), sentinel_data::error::DataError> {
//! let assembler = SnapshotAssembler::bybit(ReqwestTransport::new()?, RelayConfig::default())?;
//! let aggregate = assembler
//!     .acquire(&AcquisitionConfig::new("BTCUSDT"), None)
//!     .await?;
//!
//! println!("{} @ {}", aggregate.symbol, aggregate.latest_price());
//! # Ok(())
//! # }
//! ```

/// All [`Error`](std::error::Error)s generated in Sentinel-Data.
pub mod error;

/// Normalised market data types: [`Candle`](model::Candle), [`TimeframeSnapshot`],
/// [`OrderBook`](model::OrderBook) and the [`MarketAggregate`].
pub mod model;

/// Stateless technical indicator calculations over closing price series.
pub mod indicator;

/// Heuristic buy/sell volume split derived from 24h price change.
pub mod flow;

/// Proxy-rotating [`RelayFetcher`](relay::RelayFetcher) with retry, backoff and jitter.
pub mod relay;

/// Exchange endpoint definitions and payload normalisers.
pub mod exchange;

/// [`SnapshotAssembler`](assembler::SnapshotAssembler) orchestrating one acquisition cycle.
pub mod assembler;

pub use flow::FlowEstimate;
pub use model::{MarketAggregate, Timeframe, TimeframeSnapshot};
