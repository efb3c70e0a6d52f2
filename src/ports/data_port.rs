//! Market data port trait.

use crate::domain::error::VectraderError;
use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDate;

pub trait DataPort {
    /// Bars for `code` within `[start_date, end_date)`, ascending by date.
    /// Missing sessions are absent rather than zero-filled.
    fn fetch_ohlcv(
        &self,
        code: &str,
        exchange: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, VectraderError>;

    fn list_symbols(&self, exchange: &str) -> Result<Vec<String>, VectraderError>;

    /// First date, last date and bar count, or `None` when nothing is stored.
    fn get_data_range(
        &self,
        code: &str,
        exchange: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, VectraderError>;
}
