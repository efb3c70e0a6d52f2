//! CSV file data adapter.
//!
//! One file per instrument, named `<CODE>_<EXCHANGE>.csv`, with a header row
//! and columns `date,open,high,low,close,volume`.

use crate::domain::error::VectraderError;
use crate::domain::ohlcv::OhlcvBar;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub struct CsvAdapter {
    base_path: PathBuf,
}

fn data_error(reason: impl Into<String>) -> VectraderError {
    VectraderError::Data {
        reason: reason.into(),
    }
}

fn field<T>(record: &csv::StringRecord, index: usize, name: &str) -> Result<T, VectraderError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    record
        .get(index)
        .ok_or_else(|| data_error(format!("missing {name} column")))?
        .trim()
        .parse()
        .map_err(|e| data_error(format!("invalid {name} value: {e}")))
}

/// Dated hedge ratio estimates from a `date,hedge_ratio` file.
pub fn read_hedge_ratios(path: &Path) -> Result<Vec<(NaiveDate, f64)>, VectraderError> {
    let content = fs::read_to_string(path)
        .map_err(|e| data_error(format!("failed to read {}: {}", path.display(), e)))?;

    let mut rdr = csv::Reader::from_reader(content.as_bytes());
    let mut estimates = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| data_error(format!("CSV parse error: {e}")))?;
        let date_str: String = field(&record, 0, "date")?;
        let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
            .map_err(|e| data_error(format!("invalid date format: {e}")))?;
        estimates.push((date, field(&record, 1, "hedge_ratio")?));
    }
    tracing::debug!(path = %path.display(), estimates = estimates.len(), "loaded hedge ratios");
    Ok(estimates)
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, code: &str, exchange: &str) -> PathBuf {
        self.base_path.join(format!("{}_{}.csv", code, exchange))
    }

    fn read_bars(&self, code: &str, exchange: &str) -> Result<Vec<OhlcvBar>, VectraderError> {
        let path = self.csv_path(code, exchange);
        let content = fs::read_to_string(&path)
            .map_err(|e| data_error(format!("failed to read {}: {}", path.display(), e)))?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for result in rdr.records() {
            let record = result.map_err(|e| data_error(format!("CSV parse error: {e}")))?;
            let date_str: String = field(&record, 0, "date")?;
            let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
                .map_err(|e| data_error(format!("invalid date format: {e}")))?;

            bars.push(OhlcvBar {
                code: code.to_string(),
                exchange: exchange.to_string(),
                date,
                open: field(&record, 1, "open")?,
                high: field(&record, 2, "high")?,
                low: field(&record, 3, "low")?,
                close: field(&record, 4, "close")?,
                volume: field(&record, 5, "volume")?,
            });
        }

        bars.sort_by_key(|b| b.date);
        Ok(bars)
    }
}

impl DataPort for CsvAdapter {
    fn fetch_ohlcv(
        &self,
        code: &str,
        exchange: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, VectraderError> {
        let mut bars = self.read_bars(code, exchange)?;
        bars.retain(|b| b.date >= start_date && b.date < end_date);
        tracing::debug!(code, exchange, bars = bars.len(), "loaded csv bars");
        Ok(bars)
    }

    fn list_symbols(&self, exchange: &str) -> Result<Vec<String>, VectraderError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| {
            data_error(format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ))
        })?;

        let suffix = format!("_{}.csv", exchange);
        let mut symbols = Vec::new();

        for entry in entries {
            let entry = entry.map_err(|e| data_error(format!("directory entry error: {e}")))?;

            let name = entry.file_name();
            let name_str = name.to_string_lossy();

            if let Some(code) = name_str.strip_suffix(&suffix) {
                symbols.push(code.to_string());
            }
        }

        symbols.sort();
        Ok(symbols)
    }

    fn get_data_range(
        &self,
        code: &str,
        exchange: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, VectraderError> {
        if !self.csv_path(code, exchange).exists() {
            return Ok(None);
        }
        let bars = self.read_bars(code, exchange)?;
        Ok(match (bars.first(), bars.last()) {
            (Some(first), Some(last)) => Some((first.date, last.date, bars.len())),
            _ => None,
        })
    }
}
