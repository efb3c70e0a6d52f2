#![allow(dead_code)]

use chrono::{Datelike, NaiveDate, Weekday};
use std::collections::HashMap;
use vectrader::domain::backtest::GlobalConfig;
use vectrader::domain::error::VectraderError;
pub use vectrader::domain::ohlcv::OhlcvBar;
use vectrader::domain::price_series::PriceSeries;
use vectrader::ports::data_port::DataPort;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<OhlcvBar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, code: &str, bars: Vec<OhlcvBar>) -> Self {
        self.data.insert(code.to_string(), bars);
        self
    }

    pub fn with_error(mut self, code: &str, reason: &str) -> Self {
        self.errors.insert(code.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_ohlcv(
        &self,
        code: &str,
        _exchange: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, VectraderError> {
        if let Some(reason) = self.errors.get(code) {
            return Err(VectraderError::Data {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(code)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.date >= start_date && b.date < end_date)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_symbols(&self, _exchange: &str) -> Result<Vec<String>, VectraderError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }

    fn get_data_range(
        &self,
        code: &str,
        _exchange: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, VectraderError> {
        if let Some(reason) = self.errors.get(code) {
            return Err(VectraderError::Data {
                reason: reason.clone(),
            });
        }
        match self.data.get(code) {
            Some(bars) if !bars.is_empty() => {
                let min = bars.iter().map(|b| b.date).min().unwrap();
                let max = bars.iter().map(|b| b.date).max().unwrap();
                Ok(Some((min, max, bars.len())))
            }
            _ => Ok(None),
        }
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn make_bar(code: &str, date: NaiveDate, close: f64) -> OhlcvBar {
    OhlcvBar {
        code: code.to_string(),
        exchange: "ASX".to_string(),
        date,
        open: close,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: 1000,
    }
}

/// `count` consecutive weekdays starting on Monday 2024-01-01.
pub fn business_days(count: usize) -> Vec<NaiveDate> {
    let mut days = Vec::with_capacity(count);
    let mut day = date(2024, 1, 1);
    while days.len() < count {
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            days.push(day);
        }
        day = day.succ_opt().unwrap();
    }
    days
}

/// One bar per close on consecutive weekdays, opening at the close.
pub fn bars_from_closes(code: &str, closes: &[f64]) -> Vec<OhlcvBar> {
    business_days(closes.len())
        .into_iter()
        .zip(closes)
        .map(|(day, &close)| make_bar(code, day, close))
        .collect()
}

pub fn series_from_closes(code: &str, closes: &[f64]) -> PriceSeries {
    PriceSeries::new(code.to_string(), "ASX".to_string(), bars_from_closes(code, closes)).unwrap()
}

/// Linear ramp from `start_price`, one point per bar.
pub fn generate_bars(code: &str, count: usize, start_price: f64) -> Vec<OhlcvBar> {
    let closes: Vec<f64> = (0..count).map(|i| start_price + i as f64).collect();
    bars_from_closes(code, &closes)
}

pub fn default_global() -> GlobalConfig {
    GlobalConfig::default()
}
