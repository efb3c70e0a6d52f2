//! Return accounting, equity compounding and the cash ledger.
//!
//! The vectorized side turns a position series into per-bar strategy returns
//! and a compounded equity curve that starts at 1.0. The ledger side
//! (`Portfolio`) tracks cash and whole-share holdings produced by the fill
//! simulation in `execution`.

use chrono::NaiveDate;
use std::collections::HashMap;

use super::position::{ClosedTrade, Fill, Position};
use super::signal::Signal;
use super::strategy::HedgeRatio;

/// Per-bar returns and the equity they compound into.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReturnSeries {
    /// Asset return for single instruments, hedged spread return for pairs.
    pub market_returns: Vec<Option<f64>>,
    pub strategy_returns: Vec<Option<f64>>,
    pub equity: Vec<f64>,
}

/// `close[t] / close[t-1] - 1`; undefined at t = 0 and after a non-positive close.
pub fn simple_returns(closes: &[f64]) -> Vec<Option<f64>> {
    (0..closes.len())
        .map(|t| {
            if t == 0 {
                return None;
            }
            let prev = closes[t - 1];
            if prev > 0.0 && prev.is_finite() && closes[t].is_finite() {
                Some(closes[t] / prev - 1.0)
            } else {
                None
            }
        })
        .collect()
}

/// `equity[0] = 1`, then `equity[t] = equity[t-1] * (1 + r[t])`.
/// An undefined return carries the previous value forward.
pub fn compound(returns: &[Option<f64>]) -> Vec<f64> {
    let mut equity = Vec::with_capacity(returns.len());
    let mut current = 1.0;
    for (t, r) in returns.iter().enumerate() {
        if t > 0 {
            if let Some(r) = r {
                current *= 1.0 + r;
            }
        }
        equity.push(current);
    }
    equity
}

pub fn account_single(positions: &[Signal], closes: &[f64]) -> ReturnSeries {
    let market_returns = simple_returns(closes);
    let strategy_returns: Vec<Option<f64>> = market_returns
        .iter()
        .enumerate()
        .map(|(t, r)| r.map(|r| position_at(positions, t).as_f64() * r))
        .collect();
    let equity = compound(&strategy_returns);
    ReturnSeries {
        market_returns,
        strategy_returns,
        equity,
    }
}

/// Spread return `r_a[t] - h[t-1] * r_b[t]`, scaled by the spread position.
pub fn account_pair(
    positions: &[Signal],
    closes_a: &[f64],
    closes_b: &[f64],
    hedge_ratio: &HedgeRatio,
) -> ReturnSeries {
    let returns_a = simple_returns(closes_a);
    let returns_b = simple_returns(closes_b);
    let market_returns: Vec<Option<f64>> = returns_a
        .iter()
        .zip(&returns_b)
        .enumerate()
        .map(|(t, (ra, rb))| {
            let h = if t == 0 { None } else { hedge_ratio.at(t - 1) };
            Some((*ra)? - h? * (*rb)?)
        })
        .collect();
    let strategy_returns: Vec<Option<f64>> = market_returns
        .iter()
        .enumerate()
        .map(|(t, r)| r.map(|r| position_at(positions, t).as_f64() * r))
        .collect();
    let equity = compound(&strategy_returns);
    ReturnSeries {
        market_returns,
        strategy_returns,
        equity,
    }
}

/// Equity of holding the asset from the first bar.
pub fn benchmark_equity(closes: &[f64]) -> Vec<f64> {
    compound(&simple_returns(closes))
}

fn position_at(positions: &[Signal], t: usize) -> Signal {
    positions.get(t).copied().unwrap_or_default()
}

/// Cash and holdings after the fills of one bar, marked at its close.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub bar: usize,
    pub date: NaiveDate,
    pub cash: f64,
    /// Signed share counts for leg A and leg B (zero for single-asset runs).
    pub quantities: [i64; 2],
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub cash: f64,
    pub initial_capital: f64,
    pub positions: HashMap<String, Position>,
    pub closed_trades: Vec<ClosedTrade>,
    pub fills: Vec<Fill>,
    pub ledger: Vec<LedgerEntry>,
    /// Entries skipped because the computed size was zero or unaffordable.
    pub rejected_entries: usize,
}

impl Portfolio {
    pub fn new(initial_capital: f64) -> Self {
        Portfolio {
            cash: initial_capital,
            initial_capital,
            positions: HashMap::new(),
            closed_trades: Vec::new(),
            fills: Vec::new(),
            ledger: Vec::new(),
            rejected_entries: 0,
        }
    }

    pub fn add_position(&mut self, position: Position) {
        self.positions.insert(position.code.clone(), position);
    }

    pub fn get_position(&self, code: &str) -> Option<&Position> {
        self.positions.get(code)
    }

    pub fn has_position(&self, code: &str) -> bool {
        self.positions.contains_key(code)
    }

    pub fn remove_position(&mut self, code: &str) -> Option<Position> {
        self.positions.remove(code)
    }

    pub fn quantity(&self, code: &str) -> i64 {
        self.positions.get(code).map_or(0, |pos| pos.quantity)
    }

    pub fn record_trade(&mut self, trade: ClosedTrade) {
        self.closed_trades.push(trade);
    }

    pub fn record_fill(&mut self, fill: Fill) {
        self.fills.push(fill);
    }

    pub fn total_equity(&self, price_map: &HashMap<&str, f64>) -> f64 {
        let position_value: f64 = self
            .positions
            .values()
            .filter_map(|pos| {
                price_map
                    .get(pos.code.as_str())
                    .map(|&price| pos.market_value(price))
            })
            .sum();
        self.cash + position_value
    }

    pub fn record_bar(
        &mut self,
        bar: usize,
        date: NaiveDate,
        quantities: [i64; 2],
        price_map: &HashMap<&str, f64>,
    ) {
        let equity = self.total_equity(price_map);
        self.ledger.push(LedgerEntry {
            bar,
            date,
            cash: self.cash,
            quantities,
            equity,
        });
    }

    pub fn final_equity(&self) -> f64 {
        self.ledger
            .last()
            .map_or(self.initial_capital, |entry| entry.equity)
    }
}
