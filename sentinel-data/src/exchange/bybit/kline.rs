use crate::{error::DataError, model::Candle};
use serde::{Deserialize, Deserializer, de::Error as _};
use serde_json::Value;

/// Bybit kline `result` payload.
///
/// ### Raw Payload Examples
/// See docs: <https://bybit-exchange.github.io/docs/v5/market/kline>
/// ```json
/// {
///     "category": "linear",
///     "symbol": "BTCUSDT",
///     "list": [
///         ["1670608800000", "17071", "17073", "17027", "17055.5", "268611", "15.74462667"],
///         ["1670605200000", "17071.5", "17071.5", "17061", "17071", "4177", "0.24469757"]
///     ]
/// }
/// ```
/// Rows arrive newest first.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct BybitKlineResult {
    #[serde(default)]
    pub symbol: String,
    pub list: Vec<BybitKline>,
}

/// One kline row `[startTime, open, high, low, close, volume, turnover]`.
///
/// Fields may arrive as strings or numbers; trailing fields past `volume` are ignored.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct BybitKline(pub Candle);

impl<'de> Deserialize<'de> for BybitKline {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let row: Vec<Value> = Deserialize::deserialize(deserializer)?;
        if row.len() < 6 {
            return Err(D::Error::custom(format!(
                "expected at least 6 elements in kline row, got {}",
                row.len()
            )));
        }

        let timestamp = value_as_i64(&row[0])
            .ok_or_else(|| D::Error::custom(format!("invalid kline start time: {}", row[0])))?;

        let field = |index: usize, name: &str| -> Result<f64, D::Error> {
            value_as_f64(&row[index])
                .filter(|value| value.is_finite())
                .ok_or_else(|| D::Error::custom(format!("invalid kline {name}: {}", row[index])))
        };

        Ok(Self(Candle {
            timestamp,
            open: field(1, "open")?,
            high: field(2, "high")?,
            low: field(3, "low")?,
            close: field(4, "close")?,
            volume: field(5, "volume")?,
        }))
    }
}

impl From<BybitKline> for Candle {
    fn from(kline: BybitKline) -> Self {
        kline.0
    }
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::String(raw) => raw.trim().parse().ok(),
        Value::Number(number) => number.as_f64(),
        _ => None,
    }
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::String(raw) => raw.trim().parse().ok(),
        Value::Number(number) => number.as_i64(),
        _ => None,
    }
}

/// Normalise a kline `result` into oldest-first candles with strictly increasing timestamps.
///
/// Bybit returns rows newest first; duplicate start times keep the first occurrence.
pub fn normalise_klines(result: Value) -> Result<Vec<Candle>, DataError> {
    let result = serde_json::from_value::<BybitKlineResult>(result)
        .map_err(|error| DataError::MalformedUpstreamPayload(format!("kline result: {error}")))?;

    let mut candles = result
        .list
        .into_iter()
        .map(Candle::from)
        .collect::<Vec<_>>();

    candles.sort_by_key(|candle| candle.timestamp);
    candles.dedup_by_key(|candle| candle.timestamp);

    Ok(candles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bybit_kline_row() {
        struct TestCase {
            input: &'static str,
            expected: Option<Candle>,
        }

        let tests = vec![
            TestCase {
                // TC0: mixed numeric timestamp and string fields
                input: r#"[1700000000000,"100.0","105.0","95.0","102.0","10.5"]"#,
                expected: Some(Candle {
                    timestamp: 1700000000000,
                    open: 100.0,
                    high: 105.0,
                    low: 95.0,
                    close: 102.0,
                    volume: 10.5,
                }),
            },
            TestCase {
                // TC1: all strings with trailing turnover
                input: r#"["1670608800000","17071","17073","17027","17055.5","268611","15.74462667"]"#,
                expected: Some(Candle {
                    timestamp: 1670608800000,
                    open: 17071.0,
                    high: 17073.0,
                    low: 17027.0,
                    close: 17055.5,
                    volume: 268611.0,
                }),
            },
            TestCase {
                // TC2: all numeric
                input: r#"[1, 2.5, 3, 1.5, 2, 0]"#,
                expected: Some(Candle::new(1, 2.5, 3.0, 1.5, 2.0, 0.0)),
            },
            TestCase {
                // TC3: too few elements
                input: r#"["1670608800000","17071","17073","17027","17055.5"]"#,
                expected: None,
            },
            TestCase {
                // TC4: unparseable price
                input: r#"["1670608800000","abc","17073","17027","17055.5","1"]"#,
                expected: None,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = serde_json::from_str::<BybitKline>(test.input).ok().map(Candle::from);
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_normalise_klines_reverses_to_oldest_first() {
        let result = serde_json::json!({
            "category": "linear",
            "symbol": "BTCUSDT",
            "list": [
                ["1670612400000", "3", "3", "3", "3", "1", "0"],
                ["1670608800000", "2", "2", "2", "2", "1", "0"],
                ["1670608800000", "2", "2", "2", "2", "1", "0"],
                ["1670605200000", "1", "1", "1", "1", "1", "0"]
            ]
        });

        let actual = normalise_klines(result).unwrap();

        assert_eq!(
            actual.iter().map(|c| c.timestamp).collect::<Vec<_>>(),
            vec![1670605200000, 1670608800000, 1670612400000]
        );
        assert_eq!(actual.last().unwrap().close, 3.0);
    }

    #[test]
    fn test_normalise_klines_rejects_unexpected_shape() {
        let actual = normalise_klines(serde_json::json!({ "rows": [] }));
        assert!(matches!(actual, Err(DataError::MalformedUpstreamPayload(_))));
    }
}
