//! Parameter sweeps and multi-symbol batches.
//!
//! Every run borrows the same immutable series and owns its outputs, so runs
//! are spread across the rayon pool without locking.

use rayon::prelude::*;

use super::backtest::{BacktestReport, GlobalConfig, run_strategy};
use super::error::VectraderError;
use super::metrics::Metrics;
use super::price_series::PriceSeries;
use super::strategy::{DonchianParams, Instruments, MovingAverageKind, StrategyConfig, TrendParams};

/// Parameter grid for one strategy family.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamGrid {
    Trend {
        fast_windows: Vec<usize>,
        slow_windows: Vec<usize>,
        kind: MovingAverageKind,
    },
    Donchian {
        entry_windows: Vec<usize>,
        exit_windows: Vec<usize>,
        long_only: bool,
    },
}

impl ParamGrid {
    /// Fast 10/20/30 against slow 50/100/200, exponential averages.
    pub fn trend_default() -> Self {
        ParamGrid::Trend {
            fast_windows: vec![10, 20, 30],
            slow_windows: vec![50, 100, 200],
            kind: MovingAverageKind::Exponential,
        }
    }

    /// Upper bound on the number of configurations.
    pub fn size(&self) -> usize {
        match self {
            ParamGrid::Trend {
                fast_windows,
                slow_windows,
                ..
            } => fast_windows.len() * slow_windows.len(),
            ParamGrid::Donchian {
                entry_windows,
                exit_windows,
                ..
            } => entry_windows.len() * exit_windows.len(),
        }
    }

    /// All valid combinations. Trend pairs with `fast >= slow` are skipped.
    pub fn generate_configs(&self) -> Vec<StrategyConfig> {
        let mut configs = Vec::new();
        match self {
            ParamGrid::Trend {
                fast_windows,
                slow_windows,
                kind,
            } => {
                for &fast in fast_windows {
                    for &slow in slow_windows {
                        if fast >= slow {
                            continue;
                        }
                        configs.push(StrategyConfig::Trend(TrendParams {
                            fast_window: fast,
                            slow_window: slow,
                            kind: *kind,
                        }));
                    }
                }
            }
            ParamGrid::Donchian {
                entry_windows,
                exit_windows,
                long_only,
            } => {
                for &entry in entry_windows {
                    for &exit in exit_windows {
                        configs.push(StrategyConfig::Donchian(DonchianParams {
                            entry_window: entry,
                            exit_window: exit,
                            long_only: *long_only,
                        }));
                    }
                }
            }
        }
        configs
    }
}

/// Short label such as `trend(ema,10,50)`.
pub fn describe(config: &StrategyConfig) -> String {
    match config {
        StrategyConfig::Trend(p) => format!("trend({},{},{})", p.kind, p.fast_window, p.slow_window),
        StrategyConfig::Donchian(p) => format!(
            "donchian({},{}{})",
            p.entry_window,
            p.exit_window,
            if p.long_only { "" } else { ",short" }
        ),
        StrategyConfig::Rsi(p) => format!("rsi({},{},{})", p.period, p.oversold, p.overbought),
        StrategyConfig::Macd(p) => format!(
            "macd({},{},{})",
            p.fast_period, p.slow_period, p.signal_period
        ),
        StrategyConfig::BuyHold => "buy_hold".to_string(),
        StrategyConfig::Pairs(p) => format!(
            "pairs({},{},{})",
            p.window, p.entry_threshold, p.exit_threshold
        ),
    }
}

/// Metrics of one sweep configuration.
#[derive(Debug, Clone)]
pub struct SweepRow {
    pub label: String,
    pub config: StrategyConfig,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, Default)]
pub struct SweepResults {
    rows: Vec<SweepRow>,
}

impl SweepResults {
    pub fn all(&self) -> &[SweepRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows by descending Sharpe; undefined Sharpe sorts last.
    pub fn ranked_by_sharpe(&self) -> Vec<&SweepRow> {
        let mut ranked: Vec<&SweepRow> = self.rows.iter().collect();
        ranked.sort_by(|a, b| {
            let a = a.metrics.sharpe_ratio.unwrap_or(f64::NEG_INFINITY);
            let b = b.metrics.sharpe_ratio.unwrap_or(f64::NEG_INFINITY);
            b.total_cmp(&a)
        });
        ranked
    }

    pub fn best_by_sharpe(&self) -> Option<&SweepRow> {
        self.ranked_by_sharpe()
            .into_iter()
            .find(|row| row.metrics.sharpe_ratio.is_ok())
    }
}

/// Runs many independent backtests, in parallel by default.
#[derive(Debug, Clone)]
pub struct ParamSweep {
    global: GlobalConfig,
    parallel: bool,
}

impl ParamSweep {
    pub fn new(global: GlobalConfig) -> Self {
        ParamSweep {
            global,
            parallel: true,
        }
    }

    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Every configuration of `grid` against the same instruments.
    pub fn sweep(
        &self,
        grid: &ParamGrid,
        instruments: Instruments<'_>,
    ) -> Result<SweepResults, VectraderError> {
        let configs = grid.generate_configs();
        tracing::info!(
            configs = configs.len(),
            bars = instruments.len(),
            parallel = self.parallel,
            "starting sweep"
        );
        run_sweep(&configs, instruments, &self.global, self.parallel)
    }

    /// One configuration against each series.
    pub fn batch(
        &self,
        name: &str,
        config: &StrategyConfig,
        series: &[PriceSeries],
    ) -> Vec<(String, Result<BacktestReport, VectraderError>)> {
        run_batch(name, config, series, &self.global, self.parallel)
    }
}

pub fn run_sweep(
    configs: &[StrategyConfig],
    instruments: Instruments<'_>,
    global: &GlobalConfig,
    parallel: bool,
) -> Result<SweepResults, VectraderError> {
    let run_one = |config: &StrategyConfig| -> Result<SweepRow, VectraderError> {
        let label = describe(config);
        let report = run_strategy(&label, config, instruments, global)?;
        Ok(SweepRow {
            label,
            config: config.clone(),
            metrics: report.metrics,
        })
    };

    let rows = if parallel {
        configs
            .par_iter()
            .map(run_one)
            .collect::<Result<Vec<_>, _>>()?
    } else {
        configs
            .iter()
            .map(run_one)
            .collect::<Result<Vec<_>, _>>()?
    };

    Ok(SweepResults { rows })
}

/// Results keep the input order. A failing symbol does not stop the others.
pub fn run_batch(
    name: &str,
    config: &StrategyConfig,
    series: &[PriceSeries],
    global: &GlobalConfig,
    parallel: bool,
) -> Vec<(String, Result<BacktestReport, VectraderError>)> {
    let run_one = |s: &PriceSeries| {
        let result = run_strategy(name, config, Instruments::Single(s), global);
        if let Err(e) = &result {
            tracing::warn!(code = s.code(), error = %e, "batch run failed");
        }
        (s.code().to_string(), result)
    };

    if parallel {
        series.par_iter().map(run_one).collect()
    } else {
        series.iter().map(run_one).collect()
    }
}
