//! Immutable per-instrument bar storage.
//!
//! A `PriceSeries` is the only market input the engine sees. It is built once
//! from a data port fetch, checked for ordering, and then only borrowed.

use chrono::{Datelike, NaiveDate, Weekday};
use std::collections::HashSet;

use super::error::VectraderError;
use super::ohlcv::OhlcvBar;

#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    code: String,
    exchange: String,
    bars: Vec<OhlcvBar>,
}

impl PriceSeries {
    /// Wrap bars for one instrument. Dates must be strictly increasing.
    pub fn new(
        code: impl Into<String>,
        exchange: impl Into<String>,
        bars: Vec<OhlcvBar>,
    ) -> Result<Self, VectraderError> {
        let code = code.into();
        if let Some(index) = bars
            .windows(2)
            .position(|w| w[1].date <= w[0].date)
            .map(|i| i + 1)
        {
            return Err(VectraderError::UnorderedBars { code, index });
        }
        Ok(Self {
            code,
            exchange: exchange.into(),
            bars,
        })
    }

    /// Build a series taking code and exchange from the first bar.
    pub fn from_bars(bars: Vec<OhlcvBar>) -> Result<Self, VectraderError> {
        let (code, exchange) = bars
            .first()
            .map(|b| (b.code.clone(), b.exchange.clone()))
            .unwrap_or_default();
        Self::new(code, exchange, bars)
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn bars(&self) -> &[OhlcvBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.bars.iter().map(|b| b.date).collect()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(|b| b.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }

    /// Weekdays inside the series range that carry no bar.
    ///
    /// Weekends are treated as non-trading days. Exchange holidays show up
    /// here too; the caller decides whether they matter.
    pub fn weekday_gaps(&self) -> Vec<NaiveDate> {
        let (Some(first), Some(last)) = (self.first_date(), self.last_date()) else {
            return Vec::new();
        };
        missing_weekdays(&self.dates(), first, last.succ_opt().unwrap_or(last))
    }
}

/// Weekdays in `[start, end)` absent from the ascending `dates`.
pub fn missing_weekdays(dates: &[NaiveDate], start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut gaps = Vec::new();
    let mut present = dates.iter().skip_while(|d| **d < start).peekable();
    let mut day = start;
    while day < end {
        if present.peek().is_some_and(|d| **d == day) {
            present.next();
        } else if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            gaps.push(day);
        }
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    gaps
}

/// Two series restricted to the dates they both carry.
#[derive(Debug, Clone)]
pub struct AlignedPair {
    pub a: PriceSeries,
    pub b: PriceSeries,
    /// Dates present in only one of the inputs.
    pub dropped: Vec<NaiveDate>,
}

/// Inner-join two series on date.
pub fn align_pair(a: &PriceSeries, b: &PriceSeries) -> Result<AlignedPair, VectraderError> {
    let a_dates: HashSet<NaiveDate> = a.bars.iter().map(|bar| bar.date).collect();
    let b_dates: HashSet<NaiveDate> = b.bars.iter().map(|bar| bar.date).collect();

    let a_bars: Vec<OhlcvBar> = a
        .bars
        .iter()
        .filter(|bar| b_dates.contains(&bar.date))
        .cloned()
        .collect();
    let b_bars: Vec<OhlcvBar> = b
        .bars
        .iter()
        .filter(|bar| a_dates.contains(&bar.date))
        .cloned()
        .collect();

    if a_bars.is_empty() {
        return Err(VectraderError::MisalignedSeries {
            left: a.code.clone(),
            right: b.code.clone(),
            reason: "no common dates".to_string(),
        });
    }

    let mut dropped: Vec<NaiveDate> = a_dates.symmetric_difference(&b_dates).copied().collect();
    dropped.sort();

    Ok(AlignedPair {
        a: PriceSeries::new(a.code.clone(), a.exchange.clone(), a_bars)?,
        b: PriceSeries::new(b.code.clone(), b.exchange.clone(), b_bars)?,
        dropped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(code: &str, date: NaiveDate, close: f64) -> OhlcvBar {
        OhlcvBar {
            code: code.into(),
            exchange: "ASX".into(),
            date,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1000,
        }
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn accepts_increasing_dates() {
        let series = PriceSeries::from_bars(vec![
            bar("BHP", d(2024, 1, 1), 10.0),
            bar("BHP", d(2024, 1, 2), 11.0),
        ])
        .unwrap();
        assert_eq!(series.code(), "BHP");
        assert_eq!(series.exchange(), "ASX");
        assert_eq!(series.closes(), vec![10.0, 11.0]);
    }

    #[test]
    fn rejects_duplicate_dates() {
        let err = PriceSeries::from_bars(vec![
            bar("BHP", d(2024, 1, 1), 10.0),
            bar("BHP", d(2024, 1, 1), 11.0),
        ])
        .unwrap_err();
        assert!(matches!(err, VectraderError::UnorderedBars { index: 1, .. }));
    }

    #[test]
    fn rejects_out_of_order_dates() {
        let err = PriceSeries::from_bars(vec![
            bar("BHP", d(2024, 1, 1), 10.0),
            bar("BHP", d(2024, 1, 3), 11.0),
            bar("BHP", d(2024, 1, 2), 12.0),
        ])
        .unwrap_err();
        assert!(matches!(err, VectraderError::UnorderedBars { index: 2, .. }));
    }

    #[test]
    fn empty_series_is_allowed() {
        let series = PriceSeries::from_bars(vec![]).unwrap();
        assert!(series.is_empty());
        assert!(series.weekday_gaps().is_empty());
    }

    #[test]
    fn weekday_gaps_skip_weekends() {
        // 2024-01-05 is a Friday, 2024-01-08 a Monday.
        let series = PriceSeries::from_bars(vec![
            bar("BHP", d(2024, 1, 4), 10.0),
            bar("BHP", d(2024, 1, 5), 10.0),
            bar("BHP", d(2024, 1, 8), 10.0),
        ])
        .unwrap();
        assert!(series.weekday_gaps().is_empty());
    }

    #[test]
    fn weekday_gaps_report_missing_days() {
        let series = PriceSeries::from_bars(vec![
            bar("BHP", d(2024, 1, 2), 10.0),
            bar("BHP", d(2024, 1, 5), 10.0),
        ])
        .unwrap();
        assert_eq!(series.weekday_gaps(), vec![d(2024, 1, 3), d(2024, 1, 4)]);
    }

    #[test]
    fn missing_weekdays_cover_range_edges() {
        // Wed 2024-01-03 .. Tue 2024-01-09 present, asked for Mon 1st to Fri 12th
        let dates = [d(2024, 1, 3), d(2024, 1, 4), d(2024, 1, 5), d(2024, 1, 8), d(2024, 1, 9)];
        assert_eq!(
            missing_weekdays(&dates, d(2024, 1, 1), d(2024, 1, 12)),
            vec![d(2024, 1, 1), d(2024, 1, 2), d(2024, 1, 10), d(2024, 1, 11)]
        );
        assert!(missing_weekdays(&dates, d(2024, 1, 3), d(2024, 1, 10)).is_empty());
    }

    #[test]
    fn align_pair_inner_joins() {
        let a = PriceSeries::from_bars(vec![
            bar("A", d(2024, 1, 1), 1.0),
            bar("A", d(2024, 1, 2), 2.0),
            bar("A", d(2024, 1, 3), 3.0),
        ])
        .unwrap();
        let b = PriceSeries::from_bars(vec![
            bar("B", d(2024, 1, 2), 20.0),
            bar("B", d(2024, 1, 3), 30.0),
            bar("B", d(2024, 1, 4), 40.0),
        ])
        .unwrap();

        let pair = align_pair(&a, &b).unwrap();
        assert_eq!(pair.a.closes(), vec![2.0, 3.0]);
        assert_eq!(pair.b.closes(), vec![20.0, 30.0]);
        assert_eq!(pair.dropped, vec![d(2024, 1, 1), d(2024, 1, 4)]);
    }

    #[test]
    fn align_pair_without_overlap_fails() {
        let a = PriceSeries::from_bars(vec![bar("A", d(2024, 1, 1), 1.0)]).unwrap();
        let b = PriceSeries::from_bars(vec![bar("B", d(2024, 1, 2), 1.0)]).unwrap();
        assert!(matches!(
            align_pair(&a, &b),
            Err(VectraderError::MisalignedSeries { .. })
        ));
    }
}
