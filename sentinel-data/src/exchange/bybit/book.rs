use crate::{
    error::DataError,
    model::{OrderBook, OrderBookLevel},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, de::Error as _};
use serde_json::Value;
use std::str::FromStr;

/// Bybit order book `result` payload.
///
/// ### Raw Payload Examples
/// See docs: <https://bybit-exchange.github.io/docs/v5/market/orderbook>
/// ```json
/// {
///     "s": "BTCUSDT",
///     "a": [["65485.47", "47.081829"]],
///     "b": [["65485.46", "0.392201"]],
///     "ts": 1716863719031,
///     "u": 230704,
///     "seq": 1432604333,
///     "cts": 1716863718905
/// }
/// ```
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct BybitOrderBookResult {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "b")]
    pub bids: Vec<BybitLevel>,
    #[serde(rename = "a")]
    pub asks: Vec<BybitLevel>,
    #[serde(rename = "ts", default)]
    pub timestamp: Option<i64>,
}

/// Bybit order book level: `["price", "size"]`.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct BybitLevel {
    pub price: Decimal,
    pub amount: Decimal,
}

impl<'de> Deserialize<'de> for BybitLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let arr: Vec<String> = Deserialize::deserialize(deserializer)?;
        if arr.len() < 2 {
            return Err(D::Error::custom("expected 2 elements in level array"));
        }

        Ok(BybitLevel {
            price: Decimal::from_str(&arr[0]).map_err(D::Error::custom)?,
            amount: Decimal::from_str(&arr[1]).map_err(D::Error::custom)?,
        })
    }
}

impl From<BybitLevel> for OrderBookLevel {
    fn from(level: BybitLevel) -> Self {
        Self {
            price: level.price,
            quantity: level.amount,
        }
    }
}

impl From<BybitOrderBookResult> for OrderBook {
    fn from(result: BybitOrderBookResult) -> Self {
        Self {
            bids: result.bids.into_iter().map(OrderBookLevel::from).collect(),
            asks: result.asks.into_iter().map(OrderBookLevel::from).collect(),
        }
    }
}

/// Normalise an order book `result`, keeping levels as exact decimals.
pub fn normalise_order_book(result: Value) -> Result<OrderBook, DataError> {
    serde_json::from_value::<BybitOrderBookResult>(result)
        .map(OrderBook::from)
        .map_err(|error| DataError::MalformedUpstreamPayload(format!("order book result: {error}")))
}
