//! OHLCV bar representation.

use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub struct OhlcvBar {
    pub code: String,
    pub exchange: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl OhlcvBar {
    /// Price used when a fill lands on this bar. Falls back to the close when
    /// the feed carries no usable open.
    pub fn fill_price(&self) -> f64 {
        if self.open.is_finite() && self.open > 0.0 {
            self.open
        } else {
            self.close
        }
    }
}
