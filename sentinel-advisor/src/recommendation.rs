use crate::error::AdvisorError;
use derive_more::Display;
use serde::{Deserialize, Deserializer, Serialize};

/// Overall market bias reported by the model.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, Display, Deserialize, Serialize)]
pub enum Sentiment {
    #[serde(alias = "bullish", alias = "BULLISH")]
    Bullish,
    #[serde(alias = "bearish", alias = "BEARISH")]
    Bearish,
    #[serde(alias = "neutral", alias = "NEUTRAL")]
    Neutral,
}

/// Suggested position.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, Display, Deserialize, Serialize)]
pub enum Action {
    #[display("LONG")]
    #[serde(rename = "LONG", alias = "Long", alias = "long")]
    Long,
    #[display("SHORT")]
    #[serde(rename = "SHORT", alias = "Short", alias = "short")]
    Short,
    #[display("WAIT")]
    #[serde(rename = "WAIT", alias = "Wait", alias = "wait")]
    Wait,
}

/// Trade plan attached to a [`Recommendation`]. Levels are free text, eg/ `"64,200 - 64,500"`.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Deserialize, Serialize)]
pub struct Strategy {
    pub action: Action,
    #[serde(deserialize_with = "de_text")]
    pub leverage: String,
    #[serde(deserialize_with = "de_text")]
    pub entry: String,
    #[serde(deserialize_with = "de_text")]
    pub tp: String,
    #[serde(deserialize_with = "de_text")]
    pub sl: String,
    #[serde(deserialize_with = "de_text")]
    pub validity: String,
}

/// Structured result of the reasoning step.
///
/// ### Raw Payload Examples
/// ```json
/// {
///     "sentiment": "Bullish",
///     "analysis": "4h EMA20 reclaimed with RSI 58 ...",
///     "strategy": {
///         "action": "LONG",
///         "leverage": "5x",
///         "entry": "64200",
///         "tp": "66000",
///         "sl": "63400",
///         "validity": "next 4 hours"
///     }
/// }
/// ```
#[derive(Clone, Eq, PartialEq, Hash, Debug, Deserialize, Serialize)]
pub struct Recommendation {
    pub sentiment: Sentiment,
    pub analysis: String,
    pub strategy: Strategy,
}

impl Recommendation {
    /// Parse and validate raw model output.
    ///
    /// Tolerates Markdown code fences and prose around the JSON object.
    pub fn parse(raw: &str) -> Result<Self, AdvisorError> {
        let json = extract_json_object(raw).ok_or_else(|| {
            AdvisorError::AiResponseInvalid(format!(
                "no JSON object found in model output: {}",
                snippet(raw)
            ))
        })?;

        let recommendation = serde_json::from_str::<Recommendation>(json)
            .map_err(|error| AdvisorError::AiResponseInvalid(error.to_string()))?;

        recommendation.validate()?;
        Ok(recommendation)
    }

    fn validate(&self) -> Result<(), AdvisorError> {
        if self.analysis.trim().is_empty() {
            return Err(AdvisorError::AiResponseInvalid(
                "analysis is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Locate the outermost `{ ... }` in `raw`, after stripping a fenced code block if present.
fn extract_json_object(raw: &str) -> Option<&str> {
    let mut text = raw.trim();

    if let Some(start) = text.find("```") {
        let fenced = &text[start + 3..];
        // Skip the info string, eg/ ```json
        let body_start = fenced.find('\n').map(|index| index + 1).unwrap_or(0);
        let body = &fenced[body_start..];
        text = match body.find("```") {
            Some(end) => &body[..end],
            None => body,
        };
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn snippet(raw: &str) -> String {
    raw.trim().chars().take(80).collect()
}

/// Accept a string, number or boolean and keep it as text.
fn de_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(text) => Ok(text),
        serde_json::Value::Null => Ok(String::new()),
        other @ (serde_json::Value::Number(_) | serde_json::Value::Bool(_)) => Ok(other.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected text, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "sentiment": "Bullish",
        "analysis": "Trend intact across 1h and 4h.",
        "strategy": {
            "action": "LONG",
            "leverage": "5x",
            "entry": "64200",
            "tp": "66000",
            "sl": "63400",
            "validity": "4h"
        }
    }"#;

    fn expected() -> Recommendation {
        Recommendation {
            sentiment: Sentiment::Bullish,
            analysis: "Trend intact across 1h and 4h.".to_string(),
            strategy: Strategy {
                action: Action::Long,
                leverage: "5x".to_string(),
                entry: "64200".to_string(),
                tp: "66000".to_string(),
                sl: "63400".to_string(),
                validity: "4h".to_string(),
            },
        }
    }

    #[test]
    fn test_recommendation_parse() {
        struct TestCase {
            input: String,
            expected: Result<Recommendation, ()>,
        }

        let tests = vec![
            TestCase {
                // TC0: bare JSON
                input: VALID.to_string(),
                expected: Ok(expected()),
            },
            TestCase {
                // TC1: fenced JSON with info string and surrounding prose
                input: format!("Here is my analysis:\n```json\n{VALID}\n```\nGood luck."),
                expected: Ok(expected()),
            },
            TestCase {
                // TC2: unfenced JSON preceded by prose
                input: format!("Sure. {VALID}"),
                expected: Ok(expected()),
            },
            TestCase {
                // TC3: no JSON at all
                input: "I cannot help with that.".to_string(),
                expected: Err(()),
            },
            TestCase {
                // TC4: unknown sentiment
                input: VALID.replace("Bullish", "Euphoric"),
                expected: Err(()),
            },
            TestCase {
                // TC5: missing strategy
                input: r#"{"sentiment":"Neutral","analysis":"flat"}"#.to_string(),
                expected: Err(()),
            },
            TestCase {
                // TC6: empty analysis
                input: VALID.replace("Trend intact across 1h and 4h.", "  "),
                expected: Err(()),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = Recommendation::parse(&test.input);
            match (actual, test.expected) {
                (Ok(actual), Ok(expected)) => assert_eq!(actual, expected, "TC{} failed", index),
                (Err(AdvisorError::AiResponseInvalid(_)), Err(())) => {}
                (actual, expected) => {
                    panic!("TC{index} failed. \nActual: {actual:?}\nExpected: {expected:?}\n")
                }
            }
        }
    }

    #[test]
    fn test_recommendation_parse_is_lenient_on_case_and_numbers() {
        let input = r#"{
            "sentiment": "bearish",
            "analysis": "Lower highs.",
            "strategy": {"action": "short", "leverage": 3, "entry": 65000.5, "tp": "63000", "sl": "66000", "validity": null}
        }"#;

        let actual = Recommendation::parse(input).unwrap();

        assert_eq!(actual.sentiment, Sentiment::Bearish);
        assert_eq!(actual.strategy.action, Action::Short);
        assert_eq!(actual.strategy.leverage, "3");
        assert_eq!(actual.strategy.entry, "65000.5");
        assert_eq!(actual.strategy.validity, "");
    }

    #[test]
    fn test_recommendation_serialises_canonical_labels() {
        let actual = serde_json::to_value(expected()).unwrap();
        assert_eq!(actual["sentiment"], "Bullish");
        assert_eq!(actual["strategy"]["action"], "LONG");
        assert_eq!(Action::Wait.to_string(), "WAIT");
        assert_eq!(Sentiment::Neutral.to_string(), "Neutral");
    }
}
