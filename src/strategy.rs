//! RSI + MACD signal rules
//!
//! Computes an indicator snapshot over a kline window and turns it into a
//! [`Signal`]. Every buy condition must hold at once: RSI oversold, a
//! bullish MACD cross below the zero line, price under the long EMA
//! filter, volume above its recent average. Sells mirror it on the
//! overbought side. Anything else is Hold.

use chrono::{Timelike, Utc};
use tracing::debug;

use crate::binance::types::Kline;
use crate::config::StrategyParams;
use crate::indicators;
use crate::types::Signal;

/// Latest indicator values for one symbol, computed over a kline window
#[derive(Debug, Clone)]
pub struct IndicatorSnapshot {
    pub close: f64,
    pub rsi: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub macd_hist: f64,
    pub prev_macd: f64,
    pub prev_macd_signal: f64,
    pub ema_filter: f64,
    pub bb_upper: f64,
    pub bb_lower: f64,
    pub volume: f64,
    pub avg_volume: f64,
}

impl IndicatorSnapshot {
    /// Compute a snapshot from klines, most recent last. Returns `None`
    /// when the window is too short for every indicator to warm up.
    pub fn compute(klines: &[Kline], params: &StrategyParams) -> Option<IndicatorSnapshot> {
        if klines.len() < params.min_candles {
            return None;
        }

        let closes: Vec<f64> = klines.iter().map(|k| k.close).collect();
        let volumes: Vec<f64> = klines.iter().map(|k| k.volume).collect();

        let rsi_series = indicators::rsi(&closes, params.rsi_period);
        let (macd_line, signal_line, hist) = indicators::macd(
            &closes,
            params.macd_fast,
            params.macd_slow,
            params.macd_signal,
        );
        let ema_series = indicators::ema(&closes, params.ema_filter_period);
        let (bb_upper, _, bb_lower) =
            indicators::bollinger_bands(&closes, params.bollinger_period, params.bollinger_std);

        let last = closes.len() - 1;
        let prev = last.checked_sub(1)?;

        Some(IndicatorSnapshot {
            close: closes[last],
            rsi: rsi_series[last]?,
            macd: macd_line[last]?,
            macd_signal: signal_line[last]?,
            macd_hist: hist[last]?,
            prev_macd: macd_line[prev]?,
            prev_macd_signal: signal_line[prev]?,
            ema_filter: ema_series[last]?,
            bb_upper: bb_upper[last]?,
            bb_lower: bb_lower[last]?,
            volume: volumes[last],
            avg_volume: average(&volumes[volumes.len().saturating_sub(params.volume_lookback)..]),
        })
    }

    /// MACD line crossed above its signal line on the latest bar
    pub fn bullish_cross(&self) -> bool {
        self.prev_macd <= self.prev_macd_signal && self.macd > self.macd_signal
    }

    /// MACD line crossed below its signal line on the latest bar
    pub fn bearish_cross(&self) -> bool {
        self.prev_macd >= self.prev_macd_signal && self.macd < self.macd_signal
    }
}

/// The signal engine. Holds the tuned parameters and evaluates snapshots.
#[derive(Debug, Clone)]
pub struct Strategy {
    params: StrategyParams,
}

impl Strategy {
    pub fn new(params: StrategyParams) -> Self {
        Strategy { params }
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    /// Evaluate the signal rules for one symbol
    pub fn generate_signal(&self, symbol: &str, klines: &[Kline]) -> Signal {
        let Some(snapshot) = IndicatorSnapshot::compute(klines, &self.params) else {
            debug!(symbol, candles = klines.len(), "Not enough data for a signal");
            return Signal::Hold;
        };
        self.evaluate(symbol, &snapshot)
    }

    /// Apply the buy/sell rules to an already computed snapshot
    pub fn evaluate(&self, symbol: &str, s: &IndicatorSnapshot) -> Signal {
        let volume_ok = s.volume > s.avg_volume;

        // oversold dip: bullish cross while MACD is still below zero and
        // price sits under the long EMA
        let buy = s.rsi < self.params.rsi_oversold
            && s.bullish_cross()
            && s.macd < 0.0
            && s.close < s.ema_filter
            && volume_ok;

        let sell = s.rsi > self.params.rsi_overbought
            && s.bearish_cross()
            && s.macd > 0.0
            && s.close > s.ema_filter
            && volume_ok;

        debug!(
            symbol,
            close = s.close,
            rsi = s.rsi,
            macd = s.macd,
            macd_signal = s.macd_signal,
            ema = s.ema_filter,
            bb_upper = s.bb_upper,
            bb_lower = s.bb_lower,
            volume_ok,
            "Indicator snapshot"
        );

        if buy {
            Signal::Buy
        } else if sell {
            Signal::Sell
        } else {
            Signal::Hold
        }
    }

    /// RSI blown far past overbought is an emergency exit regardless of
    /// the other conditions
    pub fn emergency_exit(&self, s: &IndicatorSnapshot) -> bool {
        s.rsi > self.params.rsi_emergency_exit
    }
}

/// Whether the current UTC hour falls inside the configured trading window.
/// `start == 0 && end == 23` means always on.
pub fn within_trading_hours(start_hour: u32, end_hour: u32) -> bool {
    let hour = Utc::now().hour();
    if start_hour <= end_hour {
        hour >= start_hour && hour <= end_hour
    } else {
        // window wraps midnight
        hour >= start_hour || hour <= end_hour
    }
}

fn average(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kline(close: f64, volume: f64) -> Kline {
        Kline {
            open_time: 0,
            open: close,
            high: close,
            low: close,
            close,
            volume,
            close_time: 0,
        }
    }

    fn snapshot() -> IndicatorSnapshot {
        IndicatorSnapshot {
            close: 100.0,
            rsi: 50.0,
            macd: 0.0,
            macd_signal: 0.0,
            macd_hist: 0.0,
            prev_macd: 0.0,
            prev_macd_signal: 0.0,
            ema_filter: 90.0,
            bb_upper: 110.0,
            bb_lower: 90.0,
            volume: 100.0,
            avg_volume: 50.0,
        }
    }

    fn params() -> StrategyParams {
        StrategyParams::default()
    }

    #[test]
    fn test_buy_requires_all_conditions() {
        let strategy = Strategy::new(params());

        // oversold dip: bullish cross below zero, price under the EMA
        let mut s = snapshot();
        s.rsi = 25.0;
        s.prev_macd = -2.0;
        s.prev_macd_signal = -1.0;
        s.macd = -0.5;
        s.macd_signal = -1.0;
        s.ema_filter = 120.0;
        assert_eq!(strategy.evaluate("BTCUSDT", &s), Signal::Buy);

        // break each condition in turn
        let mut broken = s.clone();
        broken.rsi = 45.0;
        assert_eq!(strategy.evaluate("BTCUSDT", &broken), Signal::Hold);

        let mut broken = s.clone();
        broken.prev_macd = -0.8; // no cross on the latest bar
        assert_eq!(strategy.evaluate("BTCUSDT", &broken), Signal::Hold);

        let mut broken = s.clone();
        broken.macd = 0.5; // cross happened above the zero line
        assert_eq!(strategy.evaluate("BTCUSDT", &broken), Signal::Hold);

        let mut broken = s.clone();
        broken.ema_filter = 90.0; // price already above the trend filter
        assert_eq!(strategy.evaluate("BTCUSDT", &broken), Signal::Hold);

        let mut broken = s.clone();
        broken.volume = 10.0;
        assert_eq!(strategy.evaluate("BTCUSDT", &broken), Signal::Hold);
    }

    #[test]
    fn test_sell_requires_all_conditions() {
        let strategy = Strategy::new(params());

        // overbought top: bearish cross above zero, price over the EMA
        let mut s = snapshot();
        s.rsi = 75.0;
        s.prev_macd = 2.0;
        s.prev_macd_signal = 1.0;
        s.macd = 0.5;
        s.macd_signal = 1.0;
        s.ema_filter = 90.0;
        assert_eq!(strategy.evaluate("BTCUSDT", &s), Signal::Sell);

        let mut broken = s.clone();
        broken.ema_filter = 120.0;
        assert_eq!(strategy.evaluate("BTCUSDT", &broken), Signal::Hold);

        let mut broken = s.clone();
        broken.macd = -0.5; // cross happened below the zero line
        assert_eq!(strategy.evaluate("BTCUSDT", &broken), Signal::Hold);
    }

    #[test]
    fn test_neutral_snapshot_holds() {
        let strategy = Strategy::new(params());
        assert_eq!(strategy.evaluate("BTCUSDT", &snapshot()), Signal::Hold);
    }

    #[test]
    fn test_emergency_exit_threshold() {
        let strategy = Strategy::new(params());
        let mut s = snapshot();
        s.rsi = 85.0;
        assert!(strategy.emergency_exit(&s));
        s.rsi = 75.0;
        assert!(!strategy.emergency_exit(&s));
    }

    #[test]
    fn test_short_window_yields_hold() {
        let strategy = Strategy::new(params());
        let klines: Vec<Kline> = (0..10).map(|i| kline(100.0 + i as f64, 50.0)).collect();
        assert_eq!(strategy.generate_signal("BTCUSDT", &klines), Signal::Hold);
    }

    #[test]
    fn test_snapshot_compute_on_long_window() {
        let klines: Vec<Kline> = (0..250)
            .map(|i| kline(100.0 + (i as f64 * 0.1).sin() * 5.0, 50.0 + (i % 7) as f64))
            .collect();
        let snapshot = IndicatorSnapshot::compute(&klines, &params());
        let s = snapshot.unwrap();
        assert!(s.rsi > 0.0 && s.rsi < 100.0);
        assert!(s.bb_upper > s.bb_lower);
        assert!(s.avg_volume > 0.0);
    }

    #[test]
    fn test_trading_hours_full_day() {
        assert!(within_trading_hours(0, 23));
    }
}
