//! CSV report adapter.
//!
//! Writes one row per bar to the requested path and the executed fills to a
//! sibling `<stem>_fills.csv`.

use std::path::{Path, PathBuf};

use crate::domain::backtest::BacktestReport;
use crate::domain::error::VectraderError;
use crate::ports::report_port::{ReportPort, batch_path};

const BAR_HEADER: [&str; 14] = [
    "date",
    "close",
    "signal",
    "position",
    "market_return",
    "strategy_return",
    "equity",
    "benchmark_equity",
    "zscore",
    "cash",
    "quantity_a",
    "quantity_b",
    "ledger_equity",
    "event",
];

const FILL_HEADER: [&str; 7] = ["bar", "date", "leg", "code", "side", "quantity", "price"];

#[derive(Debug, Default)]
pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        CsvReportAdapter
    }

    /// Where the fills of a report written to `output_path` go.
    pub fn fills_path(output_path: &Path) -> PathBuf {
        batch_path(output_path, "fills")
    }
}

fn csv_error(path: &Path, e: impl std::fmt::Display) -> VectraderError {
    VectraderError::Data {
        reason: format!("failed to write {}: {}", path.display(), e),
    }
}

fn opt(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.8}")).unwrap_or_default()
}

impl ReportPort for CsvReportAdapter {
    fn write(&self, report: &BacktestReport, output_path: &Path) -> Result<(), VectraderError> {
        let mut writer =
            csv::Writer::from_path(output_path).map_err(|e| csv_error(output_path, e))?;
        writer
            .write_record(BAR_HEADER)
            .map_err(|e| csv_error(output_path, e))?;

        let buys = report.buy_events();
        let sells = report.sell_events();

        for t in 0..report.len() {
            let signal = report
                .signals
                .get(t)
                .map(|s| s.to_string())
                .unwrap_or_default();
            let zscore = report
                .zscores
                .as_ref()
                .and_then(|z| z.get(t).copied().flatten());
            let ledger = report.portfolio.ledger.get(t);
            let event = if buys.contains(&t) {
                "BUY"
            } else if sells.contains(&t) {
                "SELL"
            } else {
                ""
            };

            let row = [
                report.dates[t].format("%Y-%m-%d").to_string(),
                format!("{:.4}", report.closes[t]),
                signal,
                report.positions[t].to_string(),
                opt(report.returns.market_returns[t]),
                opt(report.returns.strategy_returns[t]),
                format!("{:.8}", report.returns.equity[t]),
                format!("{:.8}", report.benchmark_equity[t]),
                opt(zscore),
                ledger.map(|l| format!("{:.2}", l.cash)).unwrap_or_default(),
                ledger.map(|l| l.quantities[0].to_string()).unwrap_or_default(),
                ledger.map(|l| l.quantities[1].to_string()).unwrap_or_default(),
                ledger.map(|l| format!("{:.2}", l.equity)).unwrap_or_default(),
                event.to_string(),
            ];
            writer
                .write_record(&row)
                .map_err(|e| csv_error(output_path, e))?;
        }
        writer.flush()?;

        let fills = &report.portfolio.fills;
        if !fills.is_empty() {
            let fills_path = Self::fills_path(output_path);
            let mut writer =
                csv::Writer::from_path(&fills_path).map_err(|e| csv_error(&fills_path, e))?;
            writer
                .write_record(FILL_HEADER)
                .map_err(|e| csv_error(&fills_path, e))?;
            for fill in fills {
                writer
                    .write_record([
                        fill.bar.to_string(),
                        fill.date.format("%Y-%m-%d").to_string(),
                        fill.leg.to_string(),
                        fill.code.clone(),
                        fill.side.to_string(),
                        fill.quantity.to_string(),
                        format!("{:.4}", fill.price),
                    ])
                    .map_err(|e| csv_error(&fills_path, e))?;
            }
            writer.flush()?;
        }

        tracing::info!(
            path = %output_path.display(),
            rows = report.len(),
            fills = fills.len(),
            "report written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::backtest::{GlobalConfig, run_strategy};
    use crate::domain::ohlcv::OhlcvBar;
    use crate::domain::price_series::PriceSeries;
    use crate::domain::strategy::{Instruments, StrategyConfig};
    use chrono::NaiveDate;
    use std::fs;
    use tempfile::TempDir;

    fn sample_report() -> BacktestReport {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bars = [10.0, 11.0, 12.0, 11.0]
            .iter()
            .enumerate()
            .map(|(i, &close)| OhlcvBar {
                code: "BHP".into(),
                exchange: "ASX".into(),
                date: start + chrono::Duration::days(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 100,
            })
            .collect();
        let series = PriceSeries::new(String::from("BHP"), String::from("ASX"), bars).unwrap();
        run_strategy(
            "hold",
            &StrategyConfig::BuyHold,
            Instruments::Single(&series),
            &GlobalConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn writes_one_row_per_bar() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.csv");
        CsvReportAdapter::new().write(&sample_report(), &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("date,close,signal,position"));
        assert!(lines[1].starts_with("2024-01-01,10.0000,LONG,FLAT"));
        assert!(lines[2].ends_with("BUY"));
    }

    #[test]
    fn writes_fills_alongside() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.csv");
        CsvReportAdapter::new().write(&sample_report(), &path).unwrap();

        let fills_path = dir.path().join("report_fills.csv");
        let content = fs::read_to_string(fills_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "1,2024-01-02,A,BHP,BUY,863,11.0000");
    }

    #[test]
    fn write_batch_suffixes_strategy_and_code() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let report = sample_report();
        let written = CsvReportAdapter::new()
            .write_batch(&[&report], &path)
            .unwrap();
        assert_eq!(written, vec![dir.path().join("out_hold_BHP.csv")]);
        assert!(written[0].exists());
    }

    #[test]
    fn unwritable_path_is_data_error() {
        let err = CsvReportAdapter::new()
            .write(&sample_report(), Path::new("/nonexistent/dir/report.csv"))
            .unwrap_err();
        assert!(matches!(err, VectraderError::Data { .. }));
    }
}
