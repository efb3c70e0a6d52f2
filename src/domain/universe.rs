//! Multi-code universe loading.
//!
//! Parses code lists from configuration and loads a price series for each
//! code with enough bars to run.

use crate::domain::error::VectraderError;
use crate::domain::price_series::PriceSeries;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct Universe {
    pub series: Vec<PriceSeries>,
    pub exchange: String,
}

impl Universe {
    pub fn count(&self) -> usize {
        self.series.len()
    }

    pub fn codes(&self) -> Vec<&str> {
        self.series.iter().map(PriceSeries::code).collect()
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in code list")]
    EmptyToken,

    #[error("duplicate code: {0}")]
    DuplicateCode(String),
}

pub fn parse_codes(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut codes = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let code = trimmed.to_uppercase();
        if seen.contains(&code) {
            return Err(UniverseError::DuplicateCode(code));
        }
        seen.insert(code.clone());
        codes.push(code);
    }

    Ok(codes)
}

#[derive(Debug)]
pub struct UniverseValidationResult {
    pub universe: Universe,
    pub skipped: Vec<SkippedCode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedCode {
    pub code: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NoData,
    InsufficientBars { bars: usize },
    /// Bars out of order or with a repeated date.
    InvalidData { reason: String },
}

/// Fetch every code, skipping those without data, with fewer than
/// `min_bars` bars, or whose bars do not form a valid series. Fails only
/// when no code survives.
pub fn load_universe(
    data_port: &dyn DataPort,
    codes: &[String],
    exchange: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
    min_bars: usize,
) -> Result<UniverseValidationResult, VectraderError> {
    let mut series = Vec::new();
    let mut skipped = Vec::new();

    for code in codes {
        let ohlcv = match data_port.fetch_ohlcv(code, exchange, start_date, end_date) {
            Ok(data) if !data.is_empty() => data,
            Ok(_) => {
                tracing::warn!(code = %code, exchange, "skipping: no data found");
                skipped.push(SkippedCode {
                    code: code.clone(),
                    reason: SkipReason::NoData,
                });
                continue;
            }
            Err(e) => {
                tracing::warn!(code = %code, exchange, error = %e, "skipping: fetch failed");
                skipped.push(SkippedCode {
                    code: code.clone(),
                    reason: SkipReason::NoData,
                });
                continue;
            }
        };

        if ohlcv.len() < min_bars {
            tracing::warn!(
                code = %code,
                exchange,
                bars = ohlcv.len(),
                minimum = min_bars,
                "skipping: insufficient bars"
            );
            skipped.push(SkippedCode {
                code: code.clone(),
                reason: SkipReason::InsufficientBars { bars: ohlcv.len() },
            });
            continue;
        }

        let bars = ohlcv.len();
        match PriceSeries::new(code.clone(), exchange.to_string(), ohlcv) {
            Ok(loaded) => {
                tracing::info!(code = %code, bars, "loaded");
                series.push(loaded);
            }
            Err(e) => {
                tracing::warn!(code = %code, exchange, error = %e, "skipping: invalid series");
                skipped.push(SkippedCode {
                    code: code.clone(),
                    reason: SkipReason::InvalidData {
                        reason: e.to_string(),
                    },
                });
            }
        }
    }

    if series.is_empty() {
        return Err(VectraderError::NoData {
            code: codes.join(","),
            exchange: exchange.to_string(),
        });
    }

    if !skipped.is_empty() {
        tracing::info!(
            running = series.len(),
            requested = codes.len(),
            exchange,
            "universe reduced"
        );
    }

    Ok(UniverseValidationResult {
        universe: Universe {
            series,
            exchange: exchange.to_string(),
        },
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_codes_basic() {
        let result = parse_codes("CBA,BHP,WBC,NAB").unwrap();
        assert_eq!(result, vec!["CBA", "BHP", "WBC", "NAB"]);
    }

    #[test]
    fn test_parse_codes_with_whitespace() {
        let result = parse_codes("  CBA , BHP ,WBC,  NAB  ").unwrap();
        assert_eq!(result, vec!["CBA", "BHP", "WBC", "NAB"]);
    }

    #[test]
    fn test_parse_codes_uppercase() {
        let result = parse_codes("cba,bhp,wbc").unwrap();
        assert_eq!(result, vec!["CBA", "BHP", "WBC"]);
    }

    #[test]
    fn test_parse_codes_single() {
        let result = parse_codes("CBA").unwrap();
        assert_eq!(result, vec!["CBA"]);
    }

    #[test]
    fn test_parse_codes_empty_token() {
        let result = parse_codes("CBA,,BHP");
        assert!(matches!(result, Err(UniverseError::EmptyToken)));
    }

    #[test]
    fn test_parse_codes_duplicate() {
        let result = parse_codes("CBA,BHP,CBA");
        assert!(matches!(result, Err(UniverseError::DuplicateCode(s)) if s == "CBA"));
    }

    #[test]
    fn test_universe_count() {
        let universe = Universe {
            series: vec![
                PriceSeries::new(String::from("CBA"), String::from("ASX"), vec![]).unwrap(),
                PriceSeries::new(String::from("BHP"), String::from("ASX"), vec![]).unwrap(),
            ],
            exchange: "ASX".to_string(),
        };
        assert_eq!(universe.count(), 2);
        assert_eq!(universe.codes(), vec!["CBA", "BHP"]);
    }
}
