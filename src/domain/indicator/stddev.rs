//! Standard Deviation indicator.
//!
//! Population standard deviation over n values.
//! STDDEV(n)[i] = sqrt(sum((V[i-j] - SMA(n)[i])^2 for j in 0..n-1) / n)
//! Warmup: first (n-1) values are invalid.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};

pub fn calculate_stddev(values: &[f64], period: usize) -> IndicatorSeries {
    if period == 0 {
        return IndicatorSeries::all_invalid(IndicatorType::Stddev(period), values.len());
    }

    let mut points = Vec::with_capacity(values.len());

    for i in 0..values.len() {
        if i + 1 < period {
            points.push(IndicatorPoint::invalid());
            continue;
        }

        let window = &values[i + 1 - period..=i];
        let mean: f64 = window.iter().sum::<f64>() / period as f64;
        let variance: f64 = window
            .iter()
            .map(|v| {
                let diff = v - mean;
                diff * diff
            })
            .sum::<f64>()
            / period as f64;

        points.push(IndicatorPoint::simple(variance.sqrt()));
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Stddev(period),
        values: points,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stddev_warmup() {
        let series = calculate_stddev(&[1.0, 2.0, 3.0, 4.0], 3);
        assert!(!series.values[0].valid);
        assert!(!series.values[1].valid);
        assert!(series.values[2].valid);
    }

    #[test]
    fn stddev_constant_values_is_zero() {
        let series = calculate_stddev(&[5.0; 6], 4);
        for i in 3..6 {
            assert_eq!(series.simple(i), Some(0.0));
        }
    }

    #[test]
    fn stddev_known_values() {
        // population stddev of 2,4,4,4,5,5,7,9 is 2
        let series = calculate_stddev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0], 8);
        assert!((series.simple(7).unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn stddev_period_0() {
        let series = calculate_stddev(&[1.0, 2.0], 0);
        assert!(series.values.iter().all(|p| !p.valid));
    }

    #[test]
    fn stddev_indicator_type() {
        let series = calculate_stddev(&[1.0], 10);
        assert_eq!(series.indicator_type, IndicatorType::Stddev(10));
        assert_eq!(series.first_valid(), 1);
    }
}
