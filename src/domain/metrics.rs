//! Performance metrics over an equity curve, its returns and positions.

use super::portfolio::ReturnSeries;
use super::signal::Signal;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Relative tolerance under which a return stdev counts as zero.
const ZERO_VARIANCE_TOLERANCE: f64 = 1e-12;

/// Why a ratio metric has no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum UndefinedMetric {
    #[error("returns have zero variance")]
    ZeroVariance,
    #[error("need at least 2 returns, have {have}")]
    InsufficientReturns { have: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub total_return: f64,
    pub annualized_return: f64,
    pub sharpe_ratio: Result<f64, UndefinedMetric>,
    /// Deepest peak-to-trough decline, `<= 0`.
    pub max_drawdown: f64,
    /// Longest run of bars spent below a previous peak.
    pub max_drawdown_duration: usize,
    /// Sum of absolute position changes. A reversal counts twice.
    pub trade_count: u64,
    pub round_trips: usize,
    pub winning_trips: usize,
    /// Share of closed round trips with a positive return.
    pub win_rate: Option<f64>,
}

impl Metrics {
    pub fn compute(returns: &ReturnSeries, positions: &[Signal]) -> Self {
        let equity = &returns.equity;
        let (max_drawdown, max_drawdown_duration) = compute_drawdown(equity);
        let trips = round_trips(positions, &returns.strategy_returns);
        let closed: Vec<&RoundTrip> = trips.iter().filter(|t| t.exit_bar.is_some()).collect();
        let winning_trips = closed.iter().filter(|t| t.return_pct > 0.0).count();
        let win_rate = if closed.is_empty() {
            None
        } else {
            Some(winning_trips as f64 / closed.len() as f64)
        };

        Metrics {
            total_return: total_return(equity),
            annualized_return: annualized_return(equity),
            sharpe_ratio: sharpe_ratio(&returns.strategy_returns),
            max_drawdown,
            max_drawdown_duration,
            trade_count: trade_count(positions),
            round_trips: closed.len(),
            winning_trips,
            win_rate,
        }
    }

    /// Sharpe with undefined values reported as NaN.
    pub fn sharpe_or_nan(&self) -> f64 {
        self.sharpe_ratio.unwrap_or(f64::NAN)
    }
}

/// `equity[last] - 1`; 0 for an empty curve.
pub fn total_return(equity: &[f64]) -> f64 {
    equity.last().map_or(0.0, |last| last - 1.0)
}

/// Geometric annual rate over `len - 1` return periods.
pub fn annualized_return(equity: &[f64]) -> f64 {
    let periods = equity.len().saturating_sub(1);
    let Some(&last) = equity.last() else {
        return 0.0;
    };
    if periods == 0 {
        return 0.0;
    }
    if last <= 0.0 {
        return -1.0;
    }
    last.powf(TRADING_DAYS_PER_YEAR / periods as f64) - 1.0
}

/// `sqrt(252) * mean / stdev` over the defined returns, sample stdev.
pub fn sharpe_ratio(returns: &[Option<f64>]) -> Result<f64, UndefinedMetric> {
    let defined: Vec<f64> = returns.iter().flatten().copied().collect();
    let n = defined.len();
    if n < 2 {
        return Err(UndefinedMetric::InsufficientReturns { have: n });
    }

    let mean = defined.iter().sum::<f64>() / n as f64;
    let variance = defined.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    let std_dev = variance.sqrt();
    if std_dev == 0.0 || std_dev <= ZERO_VARIANCE_TOLERANCE * mean.abs() {
        return Err(UndefinedMetric::ZeroVariance);
    }

    Ok(TRADING_DAYS_PER_YEAR.sqrt() * mean / std_dev)
}

/// `min(equity / running_peak - 1)` and the longest underwater stretch in bars.
pub fn compute_drawdown(equity: &[f64]) -> (f64, usize) {
    let Some(&first) = equity.first() else {
        return (0.0, 0);
    };

    let mut peak = first;
    let mut max_dd = 0.0_f64;
    let mut underwater = 0usize;
    let mut max_duration = 0usize;

    for &value in equity {
        if value >= peak {
            peak = value;
            underwater = 0;
        } else {
            underwater += 1;
            if underwater > max_duration {
                max_duration = underwater;
            }
        }

        if peak > 0.0 {
            let dd = value / peak - 1.0;
            if dd < max_dd {
                max_dd = dd;
            }
        }
    }

    (max_dd, max_duration)
}

pub fn max_drawdown(equity: &[f64]) -> f64 {
    compute_drawdown(equity).0
}

/// `sum |position[t] - position[t-1]|`.
pub fn trade_count(positions: &[Signal]) -> u64 {
    positions
        .windows(2)
        .map(|w| (w[1].value() - w[0].value()).unsigned_abs())
        .sum()
}

/// A bar where the held position changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub bar: usize,
    pub from: Signal,
    pub to: Signal,
}

pub fn transitions(positions: &[Signal]) -> Vec<Transition> {
    positions
        .windows(2)
        .enumerate()
        .filter(|(_, w)| w[0] != w[1])
        .map(|(i, w)| Transition {
            bar: i + 1,
            from: w[0],
            to: w[1],
        })
        .collect()
}

/// Bars where exposure increases (Flat to Long, Short to Flat, Short to Long).
pub fn buy_events(positions: &[Signal]) -> Vec<usize> {
    transitions(positions)
        .into_iter()
        .filter(|t| t.to.value() > t.from.value())
        .map(|t| t.bar)
        .collect()
}

pub fn sell_events(positions: &[Signal]) -> Vec<usize> {
    transitions(positions)
        .into_iter()
        .filter(|t| t.to.value() < t.from.value())
        .map(|t| t.bar)
        .collect()
}

/// One holding period from entry to exit.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundTrip {
    pub direction: Signal,
    pub entry_bar: usize,
    /// First bar no longer in this direction; `None` while still open.
    pub exit_bar: Option<usize>,
    /// Compounded strategy return over the bars held.
    pub return_pct: f64,
}

/// Pair each entry with the next change of position. A reversal closes one
/// trip and opens the next on the same bar.
pub fn round_trips(positions: &[Signal], strategy_returns: &[Option<f64>]) -> Vec<RoundTrip> {
    let compounded = |from: usize, to: usize| -> f64 {
        strategy_returns
            .get(from..to.min(strategy_returns.len()))
            .unwrap_or(&[])
            .iter()
            .map(|r| 1.0 + r.unwrap_or(0.0))
            .product::<f64>()
            - 1.0
    };

    let mut trips = Vec::new();
    let mut open: Option<(usize, Signal)> = None;

    for (t, &position) in positions.iter().enumerate() {
        let previous = if t == 0 {
            Signal::Flat
        } else {
            positions[t - 1]
        };
        if position == previous {
            continue;
        }
        if let Some((entry_bar, direction)) = open.take() {
            trips.push(RoundTrip {
                direction,
                entry_bar,
                exit_bar: Some(t),
                return_pct: compounded(entry_bar, t),
            });
        }
        if !position.is_flat() {
            open = Some((t, position));
        }
    }

    if let Some((entry_bar, direction)) = open {
        trips.push(RoundTrip {
            direction,
            entry_bar,
            exit_bar: None,
            return_pct: compounded(entry_bar, positions.len()),
        });
    }

    trips
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::portfolio::{account_single, compound};
    use approx::assert_relative_eq;

    use Signal::{Flat, Long, Short};

    #[test]
    fn total_return_from_equity() {
        assert_relative_eq!(total_return(&[1.0, 1.1, 1.25]), 0.25, epsilon = 1e-12);
        assert!((total_return(&[]) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn annualized_return_one_year() {
        let mut equity = vec![1.0; 253];
        equity[252] = 1.1;
        assert_relative_eq!(annualized_return(&equity), 0.1, epsilon = 1e-12);
    }

    #[test]
    fn annualized_return_degenerate() {
        assert!((annualized_return(&[]) - 0.0).abs() < f64::EPSILON);
        assert!((annualized_return(&[1.0]) - 0.0).abs() < f64::EPSILON);
        assert!((annualized_return(&[1.0, 0.0]) - (-1.0)).abs() < f64::EPSILON);
    }

    #[test]
    fn sharpe_known_value() {
        let returns = [None, Some(0.01), Some(0.03), Some(-0.01)];
        // mean 0.01, sample std 0.02
        let sharpe = sharpe_ratio(&returns).unwrap();
        assert_relative_eq!(sharpe, 252f64.sqrt() * 0.5, epsilon = 1e-9);
    }

    #[test]
    fn sharpe_zero_variance() {
        let returns = [None, Some(0.0), Some(0.0), Some(0.0)];
        assert_eq!(sharpe_ratio(&returns), Err(UndefinedMetric::ZeroVariance));
    }

    #[test]
    fn sharpe_constant_nonzero_returns_zero_variance() {
        let returns = vec![Some(0.001); 50];
        assert_eq!(sharpe_ratio(&returns), Err(UndefinedMetric::ZeroVariance));
    }

    #[test]
    fn sharpe_insufficient_returns() {
        assert_eq!(
            sharpe_ratio(&[None, Some(0.02)]),
            Err(UndefinedMetric::InsufficientReturns { have: 1 })
        );
        assert_eq!(
            sharpe_ratio(&[]),
            Err(UndefinedMetric::InsufficientReturns { have: 0 })
        );
    }

    #[test]
    fn max_drawdown_basic() {
        let (dd, duration) = compute_drawdown(&[1.0, 1.2, 0.9, 1.0, 1.3, 1.17]);
        assert_relative_eq!(dd, -0.25, epsilon = 1e-12);
        assert_eq!(duration, 2);
    }

    #[test]
    fn max_drawdown_never_below_peak() {
        assert!((max_drawdown(&[1.0, 1.0, 1.1, 1.2]) - 0.0).abs() < f64::EPSILON);
        assert!((max_drawdown(&[]) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn trade_count_counts_reversal_twice() {
        let positions = [Flat, Long, Long, Short, Flat];
        // 1 + 0 + 2 + 1
        assert_eq!(trade_count(&positions), 4);
        assert_eq!(trade_count(&[]), 0);
        assert_eq!(trade_count(&[Flat]), 0);
    }

    #[test]
    fn transitions_and_events() {
        let positions = [Flat, Long, Long, Flat, Short, Long];
        let t = transitions(&positions);
        assert_eq!(t.len(), 4);
        assert_eq!(
            t[0],
            Transition {
                bar: 1,
                from: Flat,
                to: Long
            }
        );
        assert_eq!(buy_events(&positions), vec![1, 5]);
        assert_eq!(sell_events(&positions), vec![3, 4]);
    }

    #[test]
    fn round_trips_with_reversal_and_open_trip() {
        let positions = [Flat, Long, Long, Short, Short];
        let returns = [None, Some(0.1), Some(0.1), Some(0.05), Some(-0.02)];
        let trips = round_trips(&positions, &returns);

        assert_eq!(trips.len(), 2);
        assert_eq!(trips[0].direction, Long);
        assert_eq!(trips[0].entry_bar, 1);
        assert_eq!(trips[0].exit_bar, Some(3));
        assert_relative_eq!(trips[0].return_pct, 0.21, epsilon = 1e-12);

        assert_eq!(trips[1].direction, Short);
        assert_eq!(trips[1].exit_bar, None);
        assert_relative_eq!(trips[1].return_pct, 1.05 * 0.98 - 1.0, epsilon = 1e-12);
    }

    #[test]
    fn compute_combines_metrics() {
        let closes = [100.0, 110.0, 121.0, 110.0, 110.0];
        let positions = [Flat, Long, Long, Flat, Flat];
        let returns = account_single(&positions, &closes);
        let metrics = Metrics::compute(&returns, &positions);

        assert_relative_eq!(metrics.total_return, 0.21, epsilon = 1e-12);
        assert_eq!(metrics.trade_count, 2);
        assert_eq!(metrics.round_trips, 1);
        assert_eq!(metrics.winning_trips, 1);
        assert_eq!(metrics.win_rate, Some(1.0));
        assert!(metrics.sharpe_ratio.is_ok());
        assert!((metrics.max_drawdown - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn compute_flat_equity() {
        let returns = ReturnSeries {
            market_returns: vec![None, Some(0.0), Some(0.0)],
            strategy_returns: vec![None, Some(0.0), Some(0.0)],
            equity: compound(&[None, Some(0.0), Some(0.0)]),
        };
        let metrics = Metrics::compute(&returns, &[Flat, Flat, Flat]);
        assert!((metrics.total_return - 0.0).abs() < f64::EPSILON);
        assert_eq!(metrics.sharpe_ratio, Err(UndefinedMetric::ZeroVariance));
        assert!(metrics.sharpe_or_nan().is_nan());
        assert_eq!(metrics.win_rate, None);
    }
}
