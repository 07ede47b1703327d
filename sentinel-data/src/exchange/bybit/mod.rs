use crate::{error::FetchFailure, model::Timeframe, relay::UpstreamEnvelope};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Order book types and normaliser.
pub mod book;

/// Kline (candle) types and normaliser.
pub mod kline;

/// 24h ticker types and normaliser.
pub mod ticker;

/// [`Bybit`](self) public REST base URL.
pub const BASE_URL: &str = "https://api.bybit.com";

/// Product category for USDT-margined perpetual futures.
pub const CATEGORY_LINEAR: &str = "linear";

/// Kline endpoint path.
///
/// See docs: <https://bybit-exchange.github.io/docs/v5/market/kline>
pub const PATH_KLINE: &str = "/v5/market/kline";

/// Order book endpoint path.
///
/// See docs: <https://bybit-exchange.github.io/docs/v5/market/orderbook>
pub const PATH_ORDER_BOOK: &str = "/v5/market/orderbook";

/// Tickers endpoint path.
///
/// See docs: <https://bybit-exchange.github.io/docs/v5/market/tickers>
pub const PATH_TICKERS: &str = "/v5/market/tickers";

/// Kline interval token expected by Bybit for a [`Timeframe`].
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize)]
pub struct BybitInterval(pub &'static str);

impl BybitInterval {
    pub const MINUTES_15: Self = Self("15");
    pub const HOUR_1: Self = Self("60");
    pub const HOUR_4: Self = Self("240");
    pub const DAY_1: Self = Self("D");
}

impl From<Timeframe> for BybitInterval {
    fn from(timeframe: Timeframe) -> Self {
        match timeframe {
            Timeframe::M15 => Self::MINUTES_15,
            Timeframe::H1 => Self::HOUR_1,
            Timeframe::H4 => Self::HOUR_4,
            Timeframe::D1 => Self::DAY_1,
        }
    }
}

impl AsRef<str> for BybitInterval {
    fn as_ref(&self) -> &str {
        self.0
    }
}

/// Relative path + query for the kline endpoint.
pub fn kline_path(symbol: &str, timeframe: Timeframe, limit: usize) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("category", CATEGORY_LINEAR)
        .append_pair("symbol", symbol)
        .append_pair("interval", BybitInterval::from(timeframe).as_ref())
        .append_pair("limit", &limit.to_string())
        .finish();
    format!("{PATH_KLINE}?{query}")
}

/// Relative path + query for the order book endpoint.
pub fn order_book_path(symbol: &str, depth: usize) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("category", CATEGORY_LINEAR)
        .append_pair("symbol", symbol)
        .append_pair("limit", &depth.to_string())
        .finish();
    format!("{PATH_ORDER_BOOK}?{query}")
}

/// Relative path + query for the tickers endpoint.
pub fn ticker_path(symbol: &str) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("category", CATEGORY_LINEAR)
        .append_pair("symbol", symbol)
        .finish();
    format!("{PATH_TICKERS}?{query}")
}

/// Bybit v5 response envelope.
///
/// ```json
/// { "retCode": 0, "retMsg": "OK", "result": { ... }, "retExtInfo": {}, "time": 1672376496682 }
/// ```
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct BybitResponse {
    #[serde(rename = "retCode")]
    pub ret_code: i64,
    #[serde(rename = "retMsg", default)]
    pub ret_msg: String,
    #[serde(default)]
    pub result: Value,
}

/// [`UpstreamEnvelope`] rejecting non-zero `retCode` payloads and yielding `result`.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub struct BybitEnvelope;

impl UpstreamEnvelope for BybitEnvelope {
    fn unwrap_payload(&self, payload: Value) -> Result<Value, FetchFailure> {
        let response = serde_json::from_value::<BybitResponse>(payload)
            .map_err(|error| FetchFailure::InvalidJson(format!("not a Bybit envelope: {error}")))?;

        if response.ret_code != 0 {
            return Err(FetchFailure::UpstreamApi {
                code: response.ret_code,
                message: response.ret_msg,
            });
        }

        Ok(response.result)
    }
}

/// Deserialize a decimal string (eg/ `"65000.5"`) into an `f64`.
pub(crate) fn de_str_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: String = Deserialize::deserialize(deserializer)?;
    if raw.trim().is_empty() {
        return Ok(0.0);
    }
    raw.trim().parse::<f64>().map_err(serde::de::Error::custom)
}
