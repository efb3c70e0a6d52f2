//! Backtest orchestration: strategy lookup, one vectorized pass per run, and
//! the report assembled from it.
//!
//! BacktestConfig carries the `[backtest]` section; GlobalConfig the capital
//! settings shared by every run.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use super::error::VectraderError;
use super::execution::{self, execute};
use super::metrics::{self, Metrics, RoundTrip, Transition};
use super::portfolio::{self, Portfolio, ReturnSeries};
use super::price_series::{PriceSeries, missing_weekdays};
use super::signal::{Signal, SignalSeries};
use super::strategy::{Instruments, SignalGenerator, StrategyConfig, pair_zscores};

pub use super::execution::GlobalConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub exchange: String,
    pub codes: Vec<String>,
    pub global: GlobalConfig,
}

/// Named strategy configurations, validated on insert.
#[derive(Debug, Clone, Default)]
pub struct StrategyRegistry {
    strategies: BTreeMap<String, StrategyConfig>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        StrategyRegistry::default()
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        config: StrategyConfig,
    ) -> Result<(), VectraderError> {
        let name = name.into();
        config.validate_in(&format!("strategy.{name}"))?;
        self.strategies.insert(name, config);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&StrategyConfig, VectraderError> {
        self.strategies
            .get(name)
            .ok_or_else(|| VectraderError::UnknownStrategy {
                name: name.to_string(),
            })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.strategies.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StrategyConfig)> {
        self.strategies.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

/// Everything one run produces, indexed by bar.
#[derive(Debug, Clone)]
pub struct BacktestReport {
    pub strategy: String,
    pub kind: &'static str,
    pub codes: Vec<String>,
    pub dates: Vec<NaiveDate>,
    /// Closes of leg A (the only leg for single-asset runs).
    pub closes: Vec<f64>,
    pub signals: SignalSeries,
    pub positions: Vec<Signal>,
    pub returns: ReturnSeries,
    pub benchmark_equity: Vec<f64>,
    /// Spread z-scores for pairs runs.
    pub zscores: Option<Vec<Option<f64>>>,
    pub metrics: Metrics,
    pub transitions: Vec<Transition>,
    pub round_trips: Vec<RoundTrip>,
    pub portfolio: Portfolio,
    pub data_gaps: Vec<NaiveDate>,
    /// The series was no longer than the strategy warmup.
    pub insufficient_data: bool,
}

impl BacktestReport {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn equity(&self) -> &[f64] {
        &self.returns.equity
    }

    pub fn buy_events(&self) -> Vec<usize> {
        metrics::buy_events(&self.positions)
    }

    pub fn sell_events(&self) -> Vec<usize> {
        metrics::sell_events(&self.positions)
    }

    /// Widen `data_gaps` to every weekday of the requested `[start, end)`
    /// without a bar, including those before the first or after the last bar.
    pub fn extend_gaps_to(&mut self, start: NaiveDate, end: NaiveDate) {
        let mut gaps = missing_weekdays(&self.dates, start, end);
        gaps.extend(self.data_gaps.iter().copied());
        gaps.sort();
        gaps.dedup();
        if gaps.len() > self.data_gaps.len() {
            tracing::warn!(
                strategy = %self.strategy,
                missing = gaps.len(),
                %start,
                %end,
                "weekday gaps in requested range"
            );
        }
        self.data_gaps = gaps;
    }
}

/// Runs registered strategies by name.
#[derive(Debug, Clone)]
pub struct Backtester {
    registry: StrategyRegistry,
    global: GlobalConfig,
}

impl Backtester {
    pub fn new(registry: StrategyRegistry, global: GlobalConfig) -> Result<Self, VectraderError> {
        global.validate()?;
        Ok(Backtester { registry, global })
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    pub fn global(&self) -> &GlobalConfig {
        &self.global
    }

    pub fn run(
        &self,
        name: &str,
        instruments: Instruments<'_>,
    ) -> Result<BacktestReport, VectraderError> {
        let config = self.registry.get(name)?;
        run_strategy(name, config, instruments, &self.global)
    }
}

fn check_instruments(
    name: &str,
    config: &StrategyConfig,
    instruments: &Instruments<'_>,
) -> Result<(), VectraderError> {
    match (config.is_pairs(), instruments) {
        (true, Instruments::Single(_)) => Err(VectraderError::InstrumentMismatch {
            strategy: name.to_string(),
            expected: "a pair of instruments".to_string(),
        }),
        (false, Instruments::Pair { .. }) => Err(VectraderError::InstrumentMismatch {
            strategy: name.to_string(),
            expected: "a single instrument".to_string(),
        }),
        (true, Instruments::Pair { a, b }) if a.code() == b.code() => {
            Err(VectraderError::InstrumentMismatch {
                strategy: name.to_string(),
                expected: "two distinct instruments".to_string(),
            })
        }
        _ => Ok(()),
    }
}

fn collect_gaps(instruments: &Instruments<'_>) -> Vec<NaiveDate> {
    let mut gaps = match instruments {
        Instruments::Single(series) => series.weekday_gaps(),
        Instruments::Pair { a, b } => {
            let mut gaps = a.weekday_gaps();
            gaps.extend(b.weekday_gaps());
            gaps
        }
    };
    gaps.sort();
    gaps.dedup();
    gaps
}

/// One full pass: signals, lagged positions, returns, equity, metrics and the
/// cash ledger. Never mutates the input series.
pub fn run_strategy(
    name: &str,
    config: &StrategyConfig,
    instruments: Instruments<'_>,
    global: &GlobalConfig,
) -> Result<BacktestReport, VectraderError> {
    config.validate_in(&format!("strategy.{name}"))?;
    check_instruments(name, config, &instruments)?;

    let warmup = config.warmup();
    let insufficient_data = instruments.len() <= warmup;
    if insufficient_data {
        tracing::warn!(
            strategy = name,
            bars = instruments.len(),
            warmup,
            "series shorter than warmup; signal stays flat"
        );
    }

    let data_gaps = collect_gaps(&instruments);
    if !data_gaps.is_empty() {
        tracing::warn!(
            strategy = name,
            missing = data_gaps.len(),
            first = %data_gaps[0],
            "weekday gaps in price data"
        );
    }

    let signals = config.generate(&instruments)?;
    let positions = execute(&signals);

    let (primary, returns, zscores, ledger, codes): (
        &PriceSeries,
        ReturnSeries,
        Option<Vec<Option<f64>>>,
        Portfolio,
        Vec<String>,
    ) = match (config, instruments) {
        (StrategyConfig::Pairs(params), Instruments::Pair { a, b }) => {
            let returns =
                portfolio::account_pair(&positions, &a.closes(), &b.closes(), &params.hedge_ratio);
            let zscores = pair_zscores(params, a, b)?;
            let ledger = execution::simulate_pair(a, b, &positions, params, global);
            let codes = vec![a.code().to_string(), b.code().to_string()];
            (a, returns, Some(zscores), ledger, codes)
        }
        (_, Instruments::Single(series)) => {
            let returns = portfolio::account_single(&positions, &series.closes());
            let ledger = execution::simulate_single(series, &positions, global);
            (series, returns, None, ledger, vec![series.code().to_string()])
        }
        (_, Instruments::Pair { .. }) => {
            return Err(VectraderError::InstrumentMismatch {
                strategy: name.to_string(),
                expected: "a single instrument".to_string(),
            });
        }
    };

    let closes = primary.closes();
    let benchmark_equity = portfolio::benchmark_equity(&closes);
    let metrics = Metrics::compute(&returns, &positions);
    let transitions = metrics::transitions(&positions);
    let round_trips = metrics::round_trips(&positions, &returns.strategy_returns);

    tracing::debug!(
        strategy = name,
        kind = config.kind_name(),
        bars = closes.len(),
        trades = metrics.trade_count,
        fills = ledger.fills.len(),
        "backtest complete"
    );

    Ok(BacktestReport {
        strategy: name.to_string(),
        kind: config.kind_name(),
        codes,
        dates: primary.dates(),
        closes,
        signals,
        positions,
        returns,
        benchmark_equity,
        zscores,
        metrics,
        transitions,
        round_trips,
        portfolio: ledger,
        data_gaps,
        insufficient_data,
    })
}
