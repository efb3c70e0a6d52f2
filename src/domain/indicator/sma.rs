//! Simple Moving Average.
//!
//! SMA(n)[i] = mean(V[i-n+1..=i]). Warmup: first (n-1) values are invalid.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};

pub fn calculate_sma(values: &[f64], period: usize) -> IndicatorSeries {
    if period == 0 {
        return IndicatorSeries::all_invalid(IndicatorType::Sma(period), values.len());
    }

    let mut points = Vec::with_capacity(values.len());
    let mut sum = 0.0;

    for (i, &v) in values.iter().enumerate() {
        sum += v;
        if i >= period {
            sum -= values[i - period];
        }
        if i + 1 < period {
            points.push(IndicatorPoint::invalid());
        } else {
            points.push(IndicatorPoint::simple(sum / period as f64));
        }
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Sma(period),
        values: points,
    }
}
