//! MACD (Moving Average Convergence Divergence) indicator.
//!
//! MACD Line = EMA(fast) - EMA(slow)
//! Signal Line = EMA(signal) of MACD Line
//! Histogram = MACD Line - Signal Line
//!
//! Default parameters: fast=12, slow=26, signal=9
//! Warmup: max(fast, slow) - 1 + signal - 1 values

use crate::domain::indicator::{
    IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue, calculate_ema,
};

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

pub fn calculate_macd(
    values: &[f64],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> IndicatorSeries {
    let indicator_type = IndicatorType::Macd {
        fast,
        slow,
        signal: signal_period,
    };
    if fast == 0 || slow == 0 || signal_period == 0 {
        return IndicatorSeries::all_invalid(indicator_type, values.len());
    }

    let ema_fast = calculate_ema(values, fast);
    let ema_slow = calculate_ema(values, slow);

    let macd_warmup = fast.max(slow) - 1;
    let macd_line: Vec<f64> = (0..values.len())
        .map(|i| match (ema_fast.simple(i), ema_slow.simple(i)) {
            (Some(f), Some(s)) => f - s,
            _ => 0.0,
        })
        .collect();

    let k = 2.0 / (signal_period as f64 + 1.0);
    let mut signal_line: Vec<f64> = vec![0.0; values.len()];
    let signal_warmup = macd_warmup + signal_period - 1;

    if signal_warmup < values.len() {
        let seed: f64 = macd_line[macd_warmup..=signal_warmup].iter().sum();
        let mut signal_ema = seed / signal_period as f64;
        signal_line[signal_warmup] = signal_ema;

        for i in (signal_warmup + 1)..values.len() {
            signal_ema = macd_line[i] * k + signal_ema * (1.0 - k);
            signal_line[i] = signal_ema;
        }
    }

    let points = macd_line
        .iter()
        .zip(&signal_line)
        .enumerate()
        .map(|(i, (&line, &signal))| IndicatorPoint {
            valid: i >= signal_warmup,
            value: IndicatorValue::Macd {
                line,
                signal,
                histogram: line - signal,
            },
        })
        .collect();

    IndicatorSeries {
        indicator_type,
        values: points,
    }
}

pub fn calculate_macd_default(values: &[f64]) -> IndicatorSeries {
    calculate_macd(values, DEFAULT_FAST, DEFAULT_SLOW, DEFAULT_SIGNAL)
}
