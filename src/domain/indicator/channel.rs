//! Donchian channel lines.
//!
//! PRIOR_MAX(n)[i] = max(V[i-n..i]), PRIOR_MIN(n)[i] = min(V[i-n..i]).
//! The window ends one value before i, so a bar never sees its own value.
//! Warmup: first n values are invalid.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};

pub fn calculate_prior_max(values: &[f64], period: usize) -> IndicatorSeries {
    prior_extreme(values, period, IndicatorType::PriorMax(period), f64::max)
}

pub fn calculate_prior_min(values: &[f64], period: usize) -> IndicatorSeries {
    prior_extreme(values, period, IndicatorType::PriorMin(period), f64::min)
}

fn prior_extreme(
    values: &[f64],
    period: usize,
    indicator_type: IndicatorType,
    pick: fn(f64, f64) -> f64,
) -> IndicatorSeries {
    if period == 0 {
        return IndicatorSeries::all_invalid(indicator_type, values.len());
    }

    let points = (0..values.len())
        .map(|i| {
            if i < period {
                IndicatorPoint::invalid()
            } else {
                let window = &values[i - period..i];
                let extreme = window[1..].iter().copied().fold(window[0], pick);
                IndicatorPoint::simple(extreme)
            }
        })
        .collect();

    IndicatorSeries {
        indicator_type,
        values: points,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prior_max_excludes_current_value() {
        let series = calculate_prior_max(&[1.0, 3.0, 2.0, 10.0], 2);
        assert_eq!(series.simple(0), None);
        assert_eq!(series.simple(1), None);
        assert_eq!(series.simple(2), Some(3.0));
        // The 10.0 at index 3 is not part of its own window.
        assert_eq!(series.simple(3), Some(3.0));
    }

    #[test]
    fn prior_min_excludes_current_value() {
        let series = calculate_prior_min(&[5.0, 4.0, 6.0, 1.0, 7.0], 3);
        assert_eq!(series.first_valid(), 3);
        assert_eq!(series.simple(3), Some(4.0));
        assert_eq!(series.simple(4), Some(1.0));
    }

    #[test]
    fn channel_period_0() {
        let series = calculate_prior_max(&[1.0, 2.0], 0);
        assert!(series.values.iter().all(|p| !p.valid));
    }

    #[test]
    fn channel_shorter_than_window() {
        let series = calculate_prior_min(&[1.0, 2.0], 5);
        assert_eq!(series.len(), 2);
        assert_eq!(series.first_valid(), 2);
    }
}
