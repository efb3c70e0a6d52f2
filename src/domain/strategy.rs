//! Strategy variants and signal generation.
//!
//! Every variant is one arm of [`StrategyConfig`] and produces its whole
//! [`SignalSeries`] in a single pass over the closes. A signal at bar t only
//! reads inputs at bars `0..=t`.

use chrono::NaiveDate;
use std::collections::HashMap;
use std::fmt;

use super::error::VectraderError;
use super::indicator::{
    IndicatorSeries, calculate_ema, calculate_macd, calculate_prior_max, calculate_prior_min,
    calculate_rsi, calculate_sma, calculate_stddev,
};
use super::price_series::PriceSeries;
use super::signal::{Signal, SignalSeries};

/// A rolling standard deviation at or below this fraction of the window mean
/// (or of 1.0 for small means) counts as zero variance.
pub const ZERO_STD_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MovingAverageKind {
    Simple,
    Exponential,
}

impl fmt::Display for MovingAverageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MovingAverageKind::Simple => write!(f, "sma"),
            MovingAverageKind::Exponential => write!(f, "ema"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrendParams {
    pub fast_window: usize,
    pub slow_window: usize,
    pub kind: MovingAverageKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DonchianParams {
    pub entry_window: usize,
    pub exit_window: usize,
    pub long_only: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RsiParams {
    pub period: usize,
    pub oversold: f64,
    pub overbought: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacdParams {
    pub fast_period: usize,
    pub slow_period: usize,
    pub signal_period: usize,
}

/// Coefficient applied to leg B when building the spread.
#[derive(Debug, Clone, PartialEq)]
pub enum HedgeRatio {
    Fixed(f64),
    /// Externally estimated ratio per bar (for example a rolling regression
    /// beta). `None` where the estimate is not yet available.
    Series(Vec<Option<f64>>),
}

impl HedgeRatio {
    pub fn at(&self, index: usize) -> Option<f64> {
        match self {
            HedgeRatio::Fixed(h) => Some(*h),
            HedgeRatio::Series(values) => values.get(index).copied().flatten(),
        }
    }

    /// Per-bar series for `dates` from dated estimates. Bars without a
    /// finite estimate stay `None`.
    pub fn from_dated(dates: &[NaiveDate], estimates: &[(NaiveDate, f64)]) -> HedgeRatio {
        let by_date: HashMap<NaiveDate, f64> = estimates.iter().copied().collect();
        HedgeRatio::Series(
            dates
                .iter()
                .map(|d| by_date.get(d).copied().filter(|h| h.is_finite()))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairsParams {
    pub window: usize,
    pub entry_threshold: f64,
    pub exit_threshold: f64,
    pub hedge_ratio: HedgeRatio,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StrategyConfig {
    Trend(TrendParams),
    Donchian(DonchianParams),
    Rsi(RsiParams),
    Macd(MacdParams),
    BuyHold,
    Pairs(PairsParams),
}

/// Market inputs a strategy runs against.
#[derive(Debug, Clone, Copy)]
pub enum Instruments<'a> {
    Single(&'a PriceSeries),
    Pair {
        a: &'a PriceSeries,
        b: &'a PriceSeries,
    },
}

impl Instruments<'_> {
    pub fn len(&self) -> usize {
        match self {
            Instruments::Single(series) => series.len(),
            Instruments::Pair { a, .. } => a.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Produces one signal per bar from market inputs.
pub trait SignalGenerator {
    /// Number of leading bars whose signal is undefined.
    fn warmup(&self) -> usize;

    fn generate(&self, instruments: &Instruments<'_>) -> Result<SignalSeries, VectraderError>;
}

impl StrategyConfig {
    pub fn kind_name(&self) -> &'static str {
        match self {
            StrategyConfig::Trend(_) => "trend",
            StrategyConfig::Donchian(_) => "donchian",
            StrategyConfig::Rsi(_) => "rsi",
            StrategyConfig::Macd(_) => "macd",
            StrategyConfig::BuyHold => "buy_hold",
            StrategyConfig::Pairs(_) => "pairs",
        }
    }

    pub fn is_pairs(&self) -> bool {
        matches!(self, StrategyConfig::Pairs(_))
    }

    pub fn validate(&self) -> Result<(), VectraderError> {
        self.validate_in("strategy")
    }

    /// Reject parameter combinations that cannot produce a meaningful run.
    /// `section` names the config section in the error.
    pub fn validate_in(&self, section: &str) -> Result<(), VectraderError> {
        match self {
            StrategyConfig::Trend(p) => {
                require_positive(section, "fast_window", p.fast_window)?;
                require_positive(section, "slow_window", p.slow_window)?;
                if p.fast_window >= p.slow_window {
                    return Err(VectraderError::invalid(
                        section,
                        "fast_window",
                        "fast_window must be less than slow_window",
                    ));
                }
            }
            StrategyConfig::Donchian(p) => {
                require_positive(section, "entry_window", p.entry_window)?;
                require_positive(section, "exit_window", p.exit_window)?;
            }
            StrategyConfig::Rsi(p) => {
                require_positive(section, "period", p.period)?;
                require_threshold(section, "oversold", p.oversold)?;
                require_threshold(section, "overbought", p.overbought)?;
                if p.overbought > 100.0 {
                    return Err(VectraderError::invalid(
                        section,
                        "overbought",
                        "overbought must not exceed 100",
                    ));
                }
                if p.oversold >= p.overbought {
                    return Err(VectraderError::invalid(
                        section,
                        "oversold",
                        "oversold must be less than overbought",
                    ));
                }
            }
            StrategyConfig::Macd(p) => {
                require_positive(section, "fast_period", p.fast_period)?;
                require_positive(section, "slow_period", p.slow_period)?;
                require_positive(section, "signal_period", p.signal_period)?;
                if p.fast_period >= p.slow_period {
                    return Err(VectraderError::invalid(
                        section,
                        "fast_period",
                        "fast_period must be less than slow_period",
                    ));
                }
            }
            StrategyConfig::BuyHold => {}
            StrategyConfig::Pairs(p) => {
                if p.window < 2 {
                    return Err(VectraderError::invalid(
                        section,
                        "window",
                        "window must be at least 2",
                    ));
                }
                require_threshold(section, "entry_threshold", p.entry_threshold)?;
                require_threshold(section, "exit_threshold", p.exit_threshold)?;
                if p.exit_threshold >= p.entry_threshold {
                    return Err(VectraderError::invalid(
                        section,
                        "exit_threshold",
                        "exit_threshold must be less than entry_threshold",
                    ));
                }
                if let HedgeRatio::Fixed(h) = p.hedge_ratio {
                    require_threshold(section, "hedge_ratio", h)?;
                }
                if p.quantity <= 0 {
                    return Err(VectraderError::invalid(
                        section,
                        "quantity",
                        "quantity must be positive",
                    ));
                }
            }
        }
        Ok(())
    }
}

fn require_positive(section: &str, key: &str, value: usize) -> Result<(), VectraderError> {
    if value == 0 {
        return Err(VectraderError::invalid(
            section,
            key,
            format!("{key} must be positive"),
        ));
    }
    Ok(())
}

fn require_threshold(section: &str, key: &str, value: f64) -> Result<(), VectraderError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(VectraderError::invalid(
            section,
            key,
            format!("{key} must be a positive number"),
        ));
    }
    Ok(())
}

impl SignalGenerator for StrategyConfig {
    fn warmup(&self) -> usize {
        match self {
            StrategyConfig::Trend(p) => p.fast_window.max(p.slow_window).saturating_sub(1),
            StrategyConfig::Donchian(p) => p.entry_window.max(p.exit_window),
            StrategyConfig::Rsi(p) => p.period,
            StrategyConfig::Macd(p) => {
                (p.fast_period.max(p.slow_period) + p.signal_period).saturating_sub(2)
            }
            StrategyConfig::BuyHold => 0,
            StrategyConfig::Pairs(p) => p.window.saturating_sub(1),
        }
    }

    fn generate(&self, instruments: &Instruments<'_>) -> Result<SignalSeries, VectraderError> {
        match (self, instruments) {
            (StrategyConfig::Pairs(p), Instruments::Pair { a, b }) => {
                let z = pair_zscores(p, a, b)?;
                Ok(pairs_signals(p, &z))
            }
            (StrategyConfig::Pairs(_), Instruments::Single(_)) => {
                Err(VectraderError::InstrumentMismatch {
                    strategy: self.kind_name().to_string(),
                    expected: "two instruments".to_string(),
                })
            }
            (_, Instruments::Pair { .. }) => Err(VectraderError::InstrumentMismatch {
                strategy: self.kind_name().to_string(),
                expected: "a single instrument".to_string(),
            }),
            (StrategyConfig::Trend(p), Instruments::Single(series)) => {
                Ok(trend_signals(p, &series.closes()))
            }
            (StrategyConfig::Donchian(p), Instruments::Single(series)) => {
                Ok(donchian_signals(p, &series.closes()))
            }
            (StrategyConfig::Rsi(p), Instruments::Single(series)) => {
                Ok(rsi_signals(p, &series.closes()))
            }
            (StrategyConfig::Macd(p), Instruments::Single(series)) => {
                Ok(macd_signals(p, &series.closes()))
            }
            (StrategyConfig::BuyHold, Instruments::Single(series)) => {
                Ok(SignalSeries::new(vec![Some(Signal::Long); series.len()]))
            }
        }
    }
}

fn moving_average(kind: MovingAverageKind, closes: &[f64], window: usize) -> IndicatorSeries {
    match kind {
        MovingAverageKind::Simple => calculate_sma(closes, window),
        MovingAverageKind::Exponential => calculate_ema(closes, window),
    }
}

/// Long while the fast average is above the slow one.
pub fn trend_signals(params: &TrendParams, closes: &[f64]) -> SignalSeries {
    let fast = moving_average(params.kind, closes, params.fast_window);
    let slow = moving_average(params.kind, closes, params.slow_window);

    let points = (0..closes.len())
        .map(|i| match (fast.simple(i), slow.simple(i)) {
            (Some(f), Some(s)) if f > s => Some(Signal::Long),
            (Some(_), Some(_)) => Some(Signal::Flat),
            _ => None,
        })
        .collect();
    SignalSeries::new(points)
}

/// Breakout above the prior high goes long, breakdown below the prior low goes
/// short (flat when long-only). The last breakout direction is held between
/// breakouts.
pub fn donchian_signals(params: &DonchianParams, closes: &[f64]) -> SignalSeries {
    let high_line = calculate_prior_max(closes, params.entry_window);
    let low_line = calculate_prior_min(closes, params.exit_window);

    let mut last_breakout = Signal::Flat;
    let points = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let (high, low) = (high_line.simple(i)?, low_line.simple(i)?);
            if close > high {
                last_breakout = Signal::Long;
            } else if close < low {
                last_breakout = Signal::Short;
            }
            if params.long_only && last_breakout == Signal::Short {
                Some(Signal::Flat)
            } else {
                Some(last_breakout)
            }
        })
        .collect();
    SignalSeries::new(points)
}

/// Enter below `oversold`, exit above `overbought`.
pub fn rsi_signals(params: &RsiParams, closes: &[f64]) -> SignalSeries {
    let rsi = calculate_rsi(closes, params.period);

    let mut holding = false;
    let points = (0..closes.len())
        .map(|i| {
            let value = rsi.simple(i)?;
            if !holding && value < params.oversold {
                holding = true;
            } else if holding && value > params.overbought {
                holding = false;
            }
            Some(if holding { Signal::Long } else { Signal::Flat })
        })
        .collect();
    SignalSeries::new(points)
}

/// Long on an upward zero cross of the MACD histogram, flat on a downward one.
pub fn macd_signals(params: &MacdParams, closes: &[f64]) -> SignalSeries {
    let macd = calculate_macd(
        closes,
        params.fast_period,
        params.slow_period,
        params.signal_period,
    );

    let mut holding = false;
    let mut previous: Option<f64> = None;
    let points = (0..closes.len())
        .map(|i| {
            let histogram = macd.histogram(i)?;
            if let Some(prev) = previous {
                if !holding && prev <= 0.0 && histogram > 0.0 {
                    holding = true;
                } else if holding && prev >= 0.0 && histogram < 0.0 {
                    holding = false;
                }
            }
            previous = Some(histogram);
            Some(if holding { Signal::Long } else { Signal::Flat })
        })
        .collect();
    SignalSeries::new(points)
}

/// `spread[t] = A[t] - h[t] * B[t]`; `None` where the hedge ratio is missing.
pub fn pair_spread(
    params: &PairsParams,
    a: &PriceSeries,
    b: &PriceSeries,
) -> Result<Vec<Option<f64>>, VectraderError> {
    if a.len() != b.len() || a.dates() != b.dates() {
        return Err(VectraderError::MisalignedSeries {
            left: a.code().to_string(),
            right: b.code().to_string(),
            reason: "legs must carry identical dates".to_string(),
        });
    }
    if let HedgeRatio::Series(values) = &params.hedge_ratio {
        if values.len() != a.len() {
            return Err(VectraderError::MisalignedSeries {
                left: a.code().to_string(),
                right: "hedge ratio".to_string(),
                reason: format!("{} hedge values for {} bars", values.len(), a.len()),
            });
        }
    }

    Ok(a
        .bars()
        .iter()
        .zip(b.bars())
        .enumerate()
        .map(|(i, (bar_a, bar_b))| {
            params
                .hedge_ratio
                .at(i)
                .map(|h| bar_a.close - h * bar_b.close)
        })
        .collect())
}

/// Rolling z-score of the spread over `window` bars ending at t.
/// Zero when the window has no variance.
pub fn pair_zscores(
    params: &PairsParams,
    a: &PriceSeries,
    b: &PriceSeries,
) -> Result<Vec<Option<f64>>, VectraderError> {
    let spread = pair_spread(params, a, b)?;
    Ok(rolling_zscore(&spread, params.window))
}

fn rolling_zscore(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    // Undefined points become NaN so any window touching one has no stdev.
    let filled: Vec<f64> = values.iter().map(|v| v.unwrap_or(f64::NAN)).collect();
    let stddev = calculate_stddev(&filled, window);

    (0..values.len())
        .map(|t| {
            let std = stddev.simple(t).filter(|s| s.is_finite())?;
            let mean = filled[t + 1 - window..=t].iter().sum::<f64>() / window as f64;
            if std <= ZERO_STD_TOLERANCE * mean.abs().max(1.0) {
                Some(0.0)
            } else {
                Some((filled[t] - mean) / std)
            }
        })
        .collect()
}

/// Spread state machine: short the spread above `+entry`, long below
/// `-entry`, close once `|z| < exit`. Entry levels apply whatever is held,
/// so a crossing of the opposite band reverses an open spread; otherwise
/// the last state carries forward.
pub fn pairs_signals(params: &PairsParams, zscores: &[Option<f64>]) -> SignalSeries {
    let mut state = Signal::Flat;
    let points = zscores
        .iter()
        .map(|z| {
            let Some(z) = *z else {
                state = Signal::Flat;
                return None;
            };
            state = if z > params.entry_threshold {
                Signal::Short
            } else if z < -params.entry_threshold {
                Signal::Long
            } else if z.abs() < params.exit_threshold {
                Signal::Flat
            } else {
                state
            };
            Some(state)
        })
        .collect();
    SignalSeries::new(points)
}
