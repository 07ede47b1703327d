//! Normalised market data types produced by one acquisition cycle.
//!
//! Every value here is created fresh per cycle, owned by the
//! [`SnapshotAssembler`](crate::assembler::SnapshotAssembler) until it is returned, and
//! serialised as-is for the reasoning step.

use crate::{error::DataError, flow::FlowEstimate, indicator::compute_indicators};
use derive_more::Constructor;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// OHLCV bar for one fixed time bucket.
#[derive(Clone, Copy, PartialEq, PartialOrd, Debug, Deserialize, Serialize, Constructor)]
pub struct Candle {
    /// Bucket open time in epoch milliseconds.
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Candle bucket width.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
pub enum Timeframe {
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    /// Default acquisition order, shortest bucket first.
    pub const ALL: [Timeframe; 4] = [Timeframe::M15, Timeframe::H1, Timeframe::H4, Timeframe::D1];

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// MACD line, (approximated) signal line and histogram.
#[derive(Clone, Copy, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct Macd {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Bollinger envelope around the trailing mean.
#[derive(Clone, Copy, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct Bollinger {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Indicators derived from one timeframe's closing prices.
#[derive(Clone, Copy, PartialEq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorSet {
    /// In `[0, 100]`. Exactly 50 when history is too short to compute a reading.
    pub rsi: f64,
    pub ema20: f64,
    pub ema50: f64,
    pub macd: Macd,
    pub bollinger: Bollinger,
}

/// Normalised candles for one timeframe plus their derived indicators.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct TimeframeSnapshot {
    pub timeframe: Timeframe,
    /// Close of the most recent candle.
    pub price: f64,
    /// Strictly increasing by timestamp, oldest first.
    pub candles: Vec<Candle>,
    pub indicators: IndicatorSet,
}

impl TimeframeSnapshot {
    /// Build a snapshot from oldest-first candles, validating the ordering invariant.
    pub fn from_candles(timeframe: Timeframe, candles: Vec<Candle>) -> Result<Self, DataError> {
        let Some(last) = candles.last() else {
            return Err(DataError::MalformedUpstreamPayload(format!(
                "no candles returned for timeframe {timeframe}"
            )));
        };

        if let Some(pair) = candles
            .windows(2)
            .find(|pair| pair[0].timestamp >= pair[1].timestamp)
        {
            return Err(DataError::MalformedUpstreamPayload(format!(
                "candles for timeframe {timeframe} are not strictly increasing: {} then {}",
                pair[0].timestamp, pair[1].timestamp
            )));
        }

        let price = last.close;
        let indicators = compute_indicators(&candles);

        Ok(Self {
            timeframe,
            price,
            candles,
            indicators,
        })
    }
}

/// Price level in an order book.
///
/// Prices and quantities stay decimal (serialised as strings) so exchange tick sizes are
/// never subject to floating point round-off.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize, Constructor)]
pub struct OrderBookLevel {
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub quantity: Decimal,
}

/// Order book depth snapshot, best levels first.
#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize, Serialize, Constructor)]
pub struct OrderBook {
    pub bids: Vec<OrderBookLevel>,
    pub asks: Vec<OrderBookLevel>,
}

impl OrderBook {
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Best ask minus best bid.
    pub fn spread(&self) -> Option<Decimal> {
        match (self.bids.first(), self.asks.first()) {
            (Some(bid), Some(ask)) => Some(ask.price - bid.price),
            _ => None,
        }
    }
}

/// 24h ticker statistics.
#[derive(Clone, Copy, PartialEq, Debug, Deserialize, Serialize, Constructor)]
#[serde(rename_all = "camelCase")]
pub struct TickerSummary {
    pub last_price: f64,
    /// Percentage change over 24h, eg/ `1.5` for +1.5%.
    pub price_change_percent: f64,
    /// Traded volume over 24h in base units.
    pub volume_24h: f64,
    /// Traded volume over 24h in quote units.
    pub turnover_24h: f64,
}

/// Everything acquired for one symbol in one cycle. This is the sole input of the reasoning
/// step.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketAggregate {
    pub symbol: String,
    /// One snapshot per configured timeframe, in configured order.
    pub snapshots: Vec<TimeframeSnapshot>,
    pub order_book: OrderBook,
    pub flow: FlowEstimate,
    pub ticker: TickerSummary,
    /// Epoch milliseconds at which assembly completed.
    pub captured_at: i64,
}

impl MarketAggregate {
    pub fn snapshot(&self, timeframe: Timeframe) -> Option<&TimeframeSnapshot> {
        self.snapshots
            .iter()
            .find(|snapshot| snapshot.timeframe == timeframe)
    }

    /// Most recent traded price, preferring the 24h ticker over candle closes.
    pub fn latest_price(&self) -> f64 {
        if self.ticker.last_price > 0.0 {
            self.ticker.last_price
        } else {
            self.snapshots
                .first()
                .map(|snapshot| snapshot.price)
                .unwrap_or_default()
        }
    }
}
