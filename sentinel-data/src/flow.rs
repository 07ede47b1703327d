use serde::{Deserialize, Serialize};

/// Lower bound of the buy share of 24h volume.
pub const MIN_BUY_RATIO: f64 = 0.3;

/// Upper bound of the buy share of 24h volume.
pub const MAX_BUY_RATIO: f64 = 0.7;

/// Heuristic buy/sell decomposition of 24h traded volume.
///
/// This is NOT measured trade-side attribution: the buy share is an even split perturbed by
/// the 24h percentage price change and clamped to `[0.3, 0.7]`. Treat it as a placeholder
/// until a trade tape source is available.
#[derive(Clone, Copy, PartialEq, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowEstimate {
    /// `buy_volume - sell_volume`.
    pub net_inflow: f64,
    pub buy_volume: f64,
    pub sell_volume: f64,
}

impl FlowEstimate {
    /// Estimate flow from total 24h volume and the 24h price change in percent (eg/ `2.5`).
    pub fn from_ticker(total_volume: f64, price_change_percent: f64) -> Self {
        let ratio = (0.5 + price_change_percent / 100.0).clamp(MIN_BUY_RATIO, MAX_BUY_RATIO);
        let buy_volume = total_volume * ratio;
        let sell_volume = total_volume - buy_volume;

        Self {
            net_inflow: buy_volume - sell_volume,
            buy_volume,
            sell_volume,
        }
    }

    pub fn total_volume(&self) -> f64 {
        self.buy_volume + self.sell_volume
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_estimate_from_ticker() {
        struct TestCase {
            total_volume: f64,
            price_change_percent: f64,
            expected: FlowEstimate,
        }

        let tests = vec![
            TestCase {
                // TC0: flat day splits evenly
                total_volume: 1000.0,
                price_change_percent: 0.0,
                expected: FlowEstimate {
                    net_inflow: 0.0,
                    buy_volume: 500.0,
                    sell_volume: 500.0,
                },
            },
            TestCase {
                // TC1: large rally clamps to 0.7
                total_volume: 1000.0,
                price_change_percent: 50.0,
                expected: FlowEstimate {
                    net_inflow: 400.0,
                    buy_volume: 700.0,
                    sell_volume: 300.0,
                },
            },
            TestCase {
                // TC2: large sell-off clamps to 0.3
                total_volume: 1000.0,
                price_change_percent: -35.0,
                expected: FlowEstimate {
                    net_inflow: -400.0,
                    buy_volume: 300.0,
                    sell_volume: 700.0,
                },
            },
            TestCase {
                // TC3: moderate move inside the clamp
                total_volume: 200.0,
                price_change_percent: 10.0,
                expected: FlowEstimate {
                    net_inflow: 40.0,
                    buy_volume: 120.0,
                    sell_volume: 80.0,
                },
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = FlowEstimate::from_ticker(test.total_volume, test.price_change_percent);
            assert!((actual.buy_volume - test.expected.buy_volume).abs() < 1e-9, "TC{} failed", index);
            assert!((actual.sell_volume - test.expected.sell_volume).abs() < 1e-9, "TC{} failed", index);
            assert!((actual.net_inflow - test.expected.net_inflow).abs() < 1e-9, "TC{} failed", index);
            assert!((actual.total_volume() - test.total_volume).abs() < 1e-9, "TC{} failed", index);
        }
    }
}
