use crate::error::AdvisorError;
use sentinel_data::MarketAggregate;

/// System instruction describing the analyst role and the exact output schema expected by
/// [`Recommendation::parse`](crate::recommendation::Recommendation::parse).
pub const SYSTEM_INSTRUCTION: &str = r#"You are a senior crypto derivatives analyst.
You receive one JSON market snapshot for a USDT-margined perpetual futures contract containing:
- snapshots: per timeframe (15m, 1h, 4h, 1d) candles (oldest first) with RSI(14), EMA20, EMA50, MACD(12,26) and Bollinger Bands(20, 2)
- orderBook: top bid and ask levels (price, quantity as decimal strings)
- flow: estimated buy and sell volume over 24h (heuristic, not real trade-side data)
- ticker: last price, 24h change percent, 24h volume and turnover

Weigh higher timeframes for bias and lower timeframes for timing. Be concrete about price levels.
If signals conflict or risk is unclear, recommend WAIT.

Respond with a single JSON object and nothing else, using exactly this schema:
{
  "sentiment": "Bullish" | "Bearish" | "Neutral",
  "analysis": "concise reasoning referencing the indicators and order book",
  "strategy": {
    "action": "LONG" | "SHORT" | "WAIT",
    "leverage": "eg. 3x",
    "entry": "entry price or zone",
    "tp": "take profit price",
    "sl": "stop loss price",
    "validity": "how long this setup stays valid"
  }
}"#;

/// User message embedding the serialised aggregate.
pub fn user_message(aggregate: &MarketAggregate) -> Result<String, AdvisorError> {
    let payload = serde_json::to_string(aggregate)
        .map_err(|error| AdvisorError::AiRequest(format!("failed to serialise aggregate: {error}")))?;

    Ok(format!(
        "Market snapshot for {} captured at {} (epoch ms):\n{payload}",
        aggregate.symbol, aggregate.captured_at
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_data::{
        FlowEstimate,
        model::{OrderBook, TickerSummary},
    };

    #[test]
    fn test_user_message_embeds_camel_case_aggregate() {
        let aggregate = MarketAggregate {
            symbol: "BTCUSDT".to_string(),
            snapshots: vec![],
            order_book: OrderBook::default(),
            flow: FlowEstimate::from_ticker(100.0, 0.0),
            ticker: TickerSummary::new(65000.0, 1.5, 100.0, 6_500_000.0),
            captured_at: 1_700_000_000_000,
        };

        let actual = user_message(&aggregate).unwrap();

        assert!(actual.starts_with("Market snapshot for BTCUSDT captured at 1700000000000"));
        assert!(actual.contains(r#""orderBook":{"bids":[],"asks":[]}"#));
        assert!(actual.contains(r#""capturedAt":1700000000000"#));
        assert!(actual.contains(r#""buyVolume":50.0"#));
    }

    #[test]
    fn test_system_instruction_names_every_field() {
        for field in ["sentiment", "analysis", "action", "leverage", "entry", "tp", "sl", "validity"] {
            assert!(SYSTEM_INSTRUCTION.contains(&format!("\"{field}\"")), "{field}");
        }
    }
}
