//! Technical indicators powered by the `ta` crate
//!
//! Thin wrappers that feed a close-price series through `ta` indicators and
//! return per-bar series with `None` during the warm-up window. Only the
//! indicators the signal rules need: RSI, MACD, EMA/SMA, Bollinger Bands.

use ta::indicators::{
    BollingerBands, ExponentialMovingAverage, MovingAverageConvergenceDivergence,
    RelativeStrengthIndex, SimpleMovingAverage,
};
use ta::Next;

/// Series triple for band- and MACD-style indicators
pub type TripleOutput = (Vec<Option<f64>>, Vec<Option<f64>>, Vec<Option<f64>>);

/// Calculate Simple Moving Average
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![];
    }

    let mut indicator = match SimpleMovingAverage::new(period) {
        Ok(i) => i,
        Err(_) => return vec![None; values.len()],
    };

    let mut result = Vec::with_capacity(values.len());
    for (i, &value) in values.iter().enumerate() {
        let out = indicator.next(value);
        result.push(if i + 1 >= period { Some(out) } else { None });
    }
    result
}

/// Calculate Exponential Moving Average
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![];
    }

    let mut indicator = match ExponentialMovingAverage::new(period) {
        Ok(i) => i,
        Err(_) => return vec![None; values.len()],
    };

    let mut result = Vec::with_capacity(values.len());
    for (i, &value) in values.iter().enumerate() {
        let out = indicator.next(value);
        result.push(if i + 1 >= period { Some(out) } else { None });
    }
    result
}

/// Calculate Relative Strength Index (0..100)
pub fn rsi(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![];
    }

    let mut indicator = match RelativeStrengthIndex::new(period) {
        Ok(i) => i,
        Err(_) => return vec![None; values.len()],
    };

    let mut result = Vec::with_capacity(values.len());
    for (i, &value) in values.iter().enumerate() {
        let out = indicator.next(value);
        result.push(if i + 1 >= period { Some(out) } else { None });
    }
    result
}

/// Calculate MACD: (macd line, signal line, histogram)
pub fn macd(
    values: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> TripleOutput {
    if values.is_empty() {
        return (vec![], vec![], vec![]);
    }

    let mut indicator =
        match MovingAverageConvergenceDivergence::new(fast_period, slow_period, signal_period) {
            Ok(i) => i,
            Err(_) => {
                return (
                    vec![None; values.len()],
                    vec![None; values.len()],
                    vec![None; values.len()],
                )
            }
        };

    let warmup = slow_period;
    let mut macd_line = Vec::with_capacity(values.len());
    let mut signal_line = Vec::with_capacity(values.len());
    let mut histogram = Vec::with_capacity(values.len());

    for (i, &value) in values.iter().enumerate() {
        let out = indicator.next(value);
        if i + 1 >= warmup {
            macd_line.push(Some(out.macd));
            signal_line.push(Some(out.signal));
            histogram.push(Some(out.histogram));
        } else {
            macd_line.push(None);
            signal_line.push(None);
            histogram.push(None);
        }
    }

    (macd_line, signal_line, histogram)
}

/// Calculate Bollinger Bands: (upper, middle, lower)
pub fn bollinger_bands(values: &[f64], period: usize, num_std: f64) -> TripleOutput {
    if values.is_empty() || period == 0 {
        return (vec![], vec![], vec![]);
    }

    let mut indicator = match BollingerBands::new(period, num_std) {
        Ok(i) => i,
        Err(_) => {
            return (
                vec![None; values.len()],
                vec![None; values.len()],
                vec![None; values.len()],
            )
        }
    };

    let mut upper = Vec::with_capacity(values.len());
    let mut middle = Vec::with_capacity(values.len());
    let mut lower = Vec::with_capacity(values.len());

    for (i, &value) in values.iter().enumerate() {
        let out = indicator.next(value);
        if i + 1 >= period {
            upper.push(Some(out.upper));
            middle.push(Some(out.average));
            lower.push(Some(out.lower));
        } else {
            upper.push(None);
            middle.push(None);
            lower.push(None);
        }
    }

    (upper, middle, lower)
}
