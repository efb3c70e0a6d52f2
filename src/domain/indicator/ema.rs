//! Exponential Moving Average indicator.
//!
//! k = 2/(n+1), seed with first SMA, then EMA[i] = V[i]*k + EMA[i-1]*(1-k).
//! Warmup: first (n-1) values are invalid.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};

pub fn calculate_ema(values: &[f64], period: usize) -> IndicatorSeries {
    if period == 0 {
        return IndicatorSeries::all_invalid(IndicatorType::Ema(period), values.len());
    }

    let mut points = Vec::with_capacity(values.len());
    let k = 2.0 / (period as f64 + 1.0);
    let mut ema = 0.0;
    let mut sum = 0.0;

    for (i, &v) in values.iter().enumerate() {
        if i < period - 1 {
            sum += v;
            points.push(IndicatorPoint::invalid());
        } else if i == period - 1 {
            sum += v;
            ema = sum / period as f64;
            points.push(IndicatorPoint::simple(ema));
        } else {
            ema = v * k + ema * (1.0 - k);
            points.push(IndicatorPoint::simple(ema));
        }
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Ema(period),
        values: points,
    }
}
