//! Report output port trait.

use std::path::{Path, PathBuf};

use crate::domain::backtest::BacktestReport;
use crate::domain::error::VectraderError;

/// Port for writing backtest reports.
pub trait ReportPort {
    fn write(&self, report: &BacktestReport, output_path: &Path) -> Result<(), VectraderError>;

    /// Default implementation: one file per report, named
    /// `<stem>_<strategy>_<codes>.<ext>`.
    fn write_batch(
        &self,
        reports: &[&BacktestReport],
        output_path: &Path,
    ) -> Result<Vec<PathBuf>, VectraderError> {
        let mut written = Vec::with_capacity(reports.len());
        for report in reports {
            let label = format!("{}_{}", report.strategy, report.codes.join("-"));
            let path = batch_path(output_path, &label);
            self.write(report, &path)?;
            written.push(path);
        }
        Ok(written)
    }
}

/// `out/report.csv` + `BHP` gives `out/report_BHP.csv`.
pub fn batch_path(output_path: &Path, code: &str) -> PathBuf {
    let stem = output_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report".to_string());
    let file_name = match output_path.extension() {
        Some(ext) => format!("{stem}_{code}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{code}"),
    };
    output_path.with_file_name(file_name)
}
