//! Technical indicator implementations.
//!
//! Indicators consume a plain value sequence (closes, a spread, a MACD line)
//! and return one point per input value, aligned by index:
//! - `IndicatorPoint`: a single point, flagged invalid during warmup
//! - `IndicatorValue`: enum for the different output shapes
//! - `IndicatorType`: indicator identity + parameters
//! - `IndicatorSeries`: the aligned output sequence

pub mod channel;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;
pub mod stddev;

pub use channel::{calculate_prior_max, calculate_prior_min};
pub use ema::calculate_ema;
pub use macd::calculate_macd;
pub use rsi::calculate_rsi;
pub use sma::calculate_sma;
pub use stddev::calculate_stddev;

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorPoint {
    pub valid: bool,
    pub value: IndicatorValue,
}

impl IndicatorPoint {
    pub fn invalid() -> Self {
        IndicatorPoint {
            valid: false,
            value: IndicatorValue::Simple(0.0),
        }
    }

    pub fn simple(value: f64) -> Self {
        IndicatorPoint {
            valid: true,
            value: IndicatorValue::Simple(value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IndicatorValue {
    Simple(f64),
    Macd {
        line: f64,
        signal: f64,
        histogram: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Sma(usize),
    Ema(usize),
    Rsi(usize),
    Stddev(usize),
    PriorMax(usize),
    PriorMin(usize),
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
    },
}

#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    pub(crate) fn all_invalid(indicator_type: IndicatorType, len: usize) -> Self {
        IndicatorSeries {
            indicator_type,
            values: vec![IndicatorPoint::invalid(); len],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at `index` if the point is valid and single-valued.
    pub fn simple(&self, index: usize) -> Option<f64> {
        match self.values.get(index) {
            Some(IndicatorPoint {
                valid: true,
                value: IndicatorValue::Simple(v),
            }) => Some(*v),
            _ => None,
        }
    }

    /// MACD histogram at `index` if valid.
    pub fn histogram(&self, index: usize) -> Option<f64> {
        match self.values.get(index) {
            Some(IndicatorPoint {
                valid: true,
                value: IndicatorValue::Macd { histogram, .. },
            }) => Some(*histogram),
            _ => None,
        }
    }

    /// Index of the first valid point, or `len()` if none is valid.
    pub fn first_valid(&self) -> usize {
        self.values
            .iter()
            .position(|p| p.valid)
            .unwrap_or(self.values.len())
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Sma(period) => write!(f, "SMA({})", period),
            IndicatorType::Ema(period) => write!(f, "EMA({})", period),
            IndicatorType::Rsi(period) => write!(f, "RSI({})", period),
            IndicatorType::Stddev(period) => write!(f, "STDDEV({})", period),
            IndicatorType::PriorMax(period) => write!(f, "PRIOR_MAX({})", period),
            IndicatorType::PriorMin(period) => write!(f, "PRIOR_MIN({})", period),
            IndicatorType::Macd { fast, slow, signal } => {
                write!(f, "MACD({},{},{})", fast, slow, signal)
            }
        }
    }
}
