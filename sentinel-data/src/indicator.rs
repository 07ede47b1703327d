//! Technical indicators over closing prices.
//!
//! Pure, deterministic and total over any numeric series. Short histories degrade to
//! documented fallbacks instead of erroring:
//! - [`ema`] returns the latest value when `series.len() < period`.
//! - [`rsi`] returns the neutral sentinel `50` when fewer than `period + 1` points exist.
//! - [`bollinger`] uses every available point when fewer than `period` exist.

use crate::model::{Bollinger, Candle, IndicatorSet, Macd};

pub const RSI_PERIOD: usize = 14;
pub const BOLLINGER_PERIOD: usize = 20;
pub const BOLLINGER_STD_DEV_MULTIPLIER: f64 = 2.0;
pub const MACD_FAST_PERIOD: usize = 12;
pub const MACD_SLOW_PERIOD: usize = 26;

/// RSI reported when history is too short; a sentinel, not a reading.
pub const RSI_NEUTRAL: f64 = 50.0;

/// Signal line as a fraction of the MACD line.
///
/// Approximation used in lieu of an EMA over MACD history, which the single aggregate call
/// site does not keep. Replacing it changes published outputs.
pub const MACD_SIGNAL_APPROXIMATION: f64 = 0.9;

/// Exponential Moving Average with smoothing factor `k = 2 / (period + 1)`.
///
/// Seeded with the first element and applied left to right across the entire series.
pub fn ema(series: &[f64], period: usize) -> f64 {
    let Some(&last) = series.last() else {
        return 0.0;
    };

    if series.len() < period {
        return last;
    }

    let k = 2.0 / (period as f64 + 1.0);
    series[1..]
        .iter()
        .fold(series[0], |ema, price| price * k + ema * (1.0 - k))
}

/// Relative Strength Index over the trailing `period` differences only.
pub fn rsi(series: &[f64], period: usize) -> f64 {
    if period == 0 || series.len() < period + 1 {
        return RSI_NEUTRAL;
    }

    let window = &series[series.len() - (period + 1)..];
    let (gains, losses) = window
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .fold((0.0, 0.0), |(gains, losses), change| {
            if change > 0.0 {
                (gains + change, losses)
            } else {
                (gains, losses - change)
            }
        });

    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;

    // Zero-loss guard
    if avg_loss == 0.0 {
        return 100.0;
    }

    let rs = avg_gain / avg_loss;
    (100.0 - 100.0 / (1.0 + rs)).clamp(0.0, 100.0)
}

/// Simplified MACD: `EMA12 - EMA26`, signal approximated by [`MACD_SIGNAL_APPROXIMATION`].
pub fn macd(series: &[f64]) -> Macd {
    let macd = ema(series, MACD_FAST_PERIOD) - ema(series, MACD_SLOW_PERIOD);
    let signal = macd * MACD_SIGNAL_APPROXIMATION;

    Macd {
        macd,
        signal,
        histogram: macd - signal,
    }
}

/// Bollinger Bands at mean ± 2 population standard deviations of the trailing window.
pub fn bollinger(series: &[f64], period: usize) -> Bollinger {
    let window = &series[series.len().saturating_sub(period)..];
    if window.is_empty() {
        return Bollinger::default();
    }

    let n = window.len() as f64;
    let middle = window.iter().sum::<f64>() / n;
    let variance = window
        .iter()
        .map(|price| (price - middle).powi(2))
        .sum::<f64>()
        / n;
    let band = BOLLINGER_STD_DEV_MULTIPLIER * variance.sqrt();

    Bollinger {
        upper: middle + band,
        middle,
        lower: middle - band,
    }
}

/// Compute the full [`IndicatorSet`] from oldest-first candles using default periods.
pub fn compute_indicators(candles: &[Candle]) -> IndicatorSet {
    let closes = candles
        .iter()
        .map(|candle| candle.close)
        .collect::<Vec<_>>();

    IndicatorSet {
        rsi: rsi(&closes, RSI_PERIOD),
        ema20: ema(&closes, 20),
        ema50: ema(&closes, 50),
        macd: macd(&closes),
        bollinger: bollinger(&closes, BOLLINGER_PERIOD),
    }
}
