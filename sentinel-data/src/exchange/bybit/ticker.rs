use super::de_str_f64;
use crate::{error::DataError, model::TickerSummary};
use serde::Deserialize;
use serde_json::Value;

/// Bybit tickers `result` payload.
///
/// ### Raw Payload Examples
/// See docs: <https://bybit-exchange.github.io/docs/v5/market/tickers>
/// ```json
/// {
///     "category": "linear",
///     "list": [{
///         "symbol": "BTCUSDT",
///         "lastPrice": "16597.00",
///         "price24hPcnt": "0.079323",
///         "volume24h": "49337318",
///         "turnover24h": "2352.94950046",
///         ...
///     }]
/// }
/// ```
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct BybitTickerResult {
    pub list: Vec<BybitTicker>,
}

/// Subset of ticker fields required to build a [`TickerSummary`].
#[derive(Clone, PartialEq, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BybitTicker {
    pub symbol: String,
    #[serde(deserialize_with = "de_str_f64")]
    pub last_price: f64,
    /// 24h change as a fraction, eg/ `0.079323` for +7.9323%.
    #[serde(rename = "price24hPcnt", deserialize_with = "de_str_f64")]
    pub price_24h_pcnt: f64,
    #[serde(rename = "volume24h", deserialize_with = "de_str_f64")]
    pub volume_24h: f64,
    #[serde(rename = "turnover24h", deserialize_with = "de_str_f64")]
    pub turnover_24h: f64,
}

impl From<BybitTicker> for TickerSummary {
    fn from(ticker: BybitTicker) -> Self {
        Self {
            last_price: ticker.last_price,
            price_change_percent: ticker.price_24h_pcnt * 100.0,
            volume_24h: ticker.volume_24h,
            turnover_24h: ticker.turnover_24h,
        }
    }
}

/// Normalise a tickers `result` into the [`TickerSummary`] for `symbol`.
pub fn normalise_ticker(result: Value, symbol: &str) -> Result<TickerSummary, DataError> {
    let result = serde_json::from_value::<BybitTickerResult>(result)
        .map_err(|error| DataError::MalformedUpstreamPayload(format!("ticker result: {error}")))?;

    result
        .list
        .into_iter()
        .find(|ticker| ticker.symbol.eq_ignore_ascii_case(symbol))
        .map(TickerSummary::from)
        .ok_or_else(|| {
            DataError::MalformedUpstreamPayload(format!("ticker result has no entry for {symbol}"))
        })
}
