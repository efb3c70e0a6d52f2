//! Discrete exposure signals and their per-bar series.

use std::fmt;

/// Desired exposure direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Signal {
    Short,
    #[default]
    Flat,
    Long,
}

impl Signal {
    /// -1, 0 or +1.
    pub fn value(self) -> i64 {
        match self {
            Signal::Short => -1,
            Signal::Flat => 0,
            Signal::Long => 1,
        }
    }

    pub fn as_f64(self) -> f64 {
        self.value() as f64
    }

    pub fn is_flat(self) -> bool {
        self == Signal::Flat
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Short => write!(f, "SHORT"),
            Signal::Flat => write!(f, "FLAT"),
            Signal::Long => write!(f, "LONG"),
        }
    }
}

/// One optional signal per bar. `None` marks warmup bars where the inputs are
/// not yet valid; those bars behave as Flat and never count as trades.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignalSeries {
    points: Vec<Option<Signal>>,
}

impl SignalSeries {
    pub fn new(points: Vec<Option<Signal>>) -> Self {
        SignalSeries { points }
    }

    pub fn undefined(len: usize) -> Self {
        SignalSeries {
            points: vec![None; len],
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Option<Signal>] {
        &self.points
    }

    pub fn get(&self, index: usize) -> Option<Signal> {
        self.points.get(index).copied().flatten()
    }

    /// Signal at `index`, with undefined bars resolved to Flat.
    pub fn resolved(&self, index: usize) -> Signal {
        self.get(index).unwrap_or_default()
    }

    pub fn first_defined(&self) -> Option<usize> {
        self.points.iter().position(Option::is_some)
    }

    pub fn is_all_undefined(&self) -> bool {
        self.points.iter().all(Option::is_none)
    }
}
