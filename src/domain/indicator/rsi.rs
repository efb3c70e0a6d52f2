//! RSI (Relative Strength Index) indicator implementation.
//!
//! Uses Wilder's smoothing for average gain/loss calculation:
//! - First average: simple mean of gains/losses over first n changes
//! - Subsequent: avg = (prev_avg * (n-1) + current) / n
//!
//! Formula: RSI = 100 - (100 / (1 + avg_gain / avg_loss))
//! If avg_loss == 0: RSI = 100
//!
//! Warmup: first n values are invalid (need n price changes to compute initial average).

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};

pub fn calculate_rsi(values: &[f64], period: usize) -> IndicatorSeries {
    if period == 0 || values.len() <= period {
        return IndicatorSeries::all_invalid(IndicatorType::Rsi(period), values.len());
    }

    let changes: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
    let gain = |c: f64| if c > 0.0 { c } else { 0.0 };
    let loss = |c: f64| if c < 0.0 { -c } else { 0.0 };

    let mut points = vec![IndicatorPoint::invalid(); period];

    let mut avg_gain = changes[..period].iter().map(|&c| gain(c)).sum::<f64>() / period as f64;
    let mut avg_loss = changes[..period].iter().map(|&c| loss(c)).sum::<f64>() / period as f64;
    points.push(IndicatorPoint::simple(rsi_from(avg_gain, avg_loss)));

    for &change in &changes[period..] {
        avg_gain = (avg_gain * (period - 1) as f64 + gain(change)) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + loss(change)) / period as f64;
        points.push(IndicatorPoint::simple(rsi_from(avg_gain, avg_loss)));
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Rsi(period),
        values: points,
    }
}

fn rsi_from(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
    }
}
