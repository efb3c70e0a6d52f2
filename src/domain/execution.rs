//! Signal-to-position lag and fill simulation.
//!
//! A signal computed on bar t is acted on at bar t+1. The position series is
//! what the vectorized accountant scales returns by; the fill simulation
//! replays the same position changes against a cash ledger, filling at the
//! opening price of the bar where the position changes.

use chrono::NaiveDate;
use std::collections::HashMap;

use super::error::VectraderError;
use super::ohlcv::OhlcvBar;
use super::portfolio::Portfolio;
use super::position::{ClosedTrade, Fill, Leg, Position, Side};
use super::price_series::PriceSeries;
use super::signal::{Signal, SignalSeries};
use super::strategy::PairsParams;

pub const DEFAULT_STARTING_CASH: f64 = 10_000.0;
pub const DEFAULT_POSITION_FRACTION: f64 = 0.95;

/// Run-wide capital settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalConfig {
    pub starting_cash: f64,
    /// Share of available cash committed on each single-asset entry, in (0, 1].
    pub position_fraction: f64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        GlobalConfig {
            starting_cash: DEFAULT_STARTING_CASH,
            position_fraction: DEFAULT_POSITION_FRACTION,
        }
    }
}

impl GlobalConfig {
    pub fn validate(&self) -> Result<(), VectraderError> {
        if !self.starting_cash.is_finite() || self.starting_cash <= 0.0 {
            return Err(VectraderError::invalid(
                "backtest",
                "starting_cash",
                format!("must be positive, got {}", self.starting_cash),
            ));
        }
        if self.position_fraction.is_nan()
            || self.position_fraction <= 0.0
            || self.position_fraction > 1.0
        {
            return Err(VectraderError::invalid(
                "backtest",
                "position_fraction",
                format!("must be in (0, 1], got {}", self.position_fraction),
            ));
        }
        Ok(())
    }
}

/// `position[0] = Flat`, `position[t] = signal[t-1]`, undefined signals as Flat.
pub fn execute(signals: &SignalSeries) -> Vec<Signal> {
    (0..signals.len())
        .map(|t| if t == 0 { Signal::Flat } else { signals.resolved(t - 1) })
        .collect()
}

/// Whole shares affordable with `fraction` of `cash`; never negative.
pub fn fixed_fraction_quantity(cash: f64, fraction: f64, price: f64) -> i64 {
    if !price.is_finite() || price <= 0.0 || cash.is_nan() || cash <= 0.0 {
        return 0;
    }
    let quantity = (cash * fraction / price).floor();
    if quantity.is_finite() && quantity > 0.0 {
        quantity as i64
    } else {
        0
    }
}

/// Result of an entry attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryResult {
    Entered {
        /// Signed quantity of leg A.
        quantity: i64,
        /// Net cash paid (negative when the entry raised cash).
        cost: f64,
    },
    InsufficientCapital,
}

/// Result of an exit.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitResult {
    pub quantity: i64,
    pub exit_price: f64,
    pub pnl: f64,
}

struct Order<'a> {
    leg: Leg,
    bar: &'a OhlcvBar,
    quantity: i64,
}

fn open_leg(portfolio: &mut Portfolio, order: &Order<'_>, bar_index: usize) {
    let price = order.bar.fill_price();
    portfolio.cash -= order.quantity as f64 * price;
    portfolio.add_position(Position {
        leg: order.leg,
        code: order.bar.code.clone(),
        exchange: order.bar.exchange.clone(),
        quantity: order.quantity,
        entry_price: price,
        entry_date: order.bar.date,
        entry_bar: bar_index,
    });
    portfolio.record_fill(Fill {
        bar: bar_index,
        date: order.bar.date,
        leg: order.leg,
        code: order.bar.code.clone(),
        side: Side::of_quantity(order.quantity),
        quantity: order.quantity.abs(),
        price,
    });
}

/// Open one or more legs as a unit. Rejected when any leg has zero size or
/// the net cost exceeds available cash.
fn enter_orders(portfolio: &mut Portfolio, orders: &[Order<'_>], bar_index: usize) -> EntryResult {
    if orders.is_empty() || orders.iter().any(|order| order.quantity == 0) {
        portfolio.rejected_entries += 1;
        return EntryResult::InsufficientCapital;
    }
    let cost: f64 = orders
        .iter()
        .map(|order| order.quantity as f64 * order.bar.fill_price())
        .sum();
    if cost > portfolio.cash {
        portfolio.rejected_entries += 1;
        return EntryResult::InsufficientCapital;
    }
    for order in orders {
        open_leg(portfolio, order, bar_index);
    }
    EntryResult::Entered {
        quantity: orders[0].quantity,
        cost,
    }
}

/// Open a single-asset position sized by `fraction` of available cash.
pub fn enter_position(
    portfolio: &mut Portfolio,
    bar: &OhlcvBar,
    bar_index: usize,
    direction: Signal,
    fraction: f64,
) -> EntryResult {
    let quantity = fixed_fraction_quantity(portfolio.cash, fraction, bar.fill_price());
    let order = Order {
        leg: Leg::A,
        bar,
        quantity: direction.value() * quantity,
    };
    enter_orders(portfolio, &[order], bar_index)
}

/// Open a spread: leg A by `quantity`, leg B by `round(quantity * hedge)` on
/// the opposite side.
pub fn enter_pair(
    portfolio: &mut Portfolio,
    bar_a: &OhlcvBar,
    bar_b: &OhlcvBar,
    bar_index: usize,
    direction: Signal,
    quantity: i64,
    hedge: f64,
) -> EntryResult {
    let hedge_quantity = (quantity as f64 * hedge).round();
    let hedge_quantity = if hedge_quantity.is_finite() {
        hedge_quantity as i64
    } else {
        0
    };
    let orders = [
        Order {
            leg: Leg::A,
            bar: bar_a,
            quantity: direction.value() * quantity,
        },
        Order {
            leg: Leg::B,
            bar: bar_b,
            quantity: -direction.value() * hedge_quantity,
        },
    ];
    enter_orders(portfolio, &orders, bar_index)
}

/// Close the holding in `code` at `price`. Shorts are bought back.
pub fn exit_position(
    portfolio: &mut Portfolio,
    code: &str,
    price: f64,
    exit_date: NaiveDate,
    bar_index: usize,
) -> Option<ExitResult> {
    let position = portfolio.remove_position(code)?;
    let pnl = position.unrealized_pnl(price);
    portfolio.cash += position.market_value(price);

    portfolio.record_fill(Fill {
        bar: bar_index,
        date: exit_date,
        leg: position.leg,
        code: position.code.clone(),
        side: Side::of_quantity(-position.quantity),
        quantity: position.quantity.abs(),
        price,
    });
    portfolio.record_trade(ClosedTrade {
        code: position.code.clone(),
        exchange: position.exchange.clone(),
        quantity: position.quantity,
        entry_price: position.entry_price,
        exit_price: price,
        entry_date: position.entry_date,
        exit_date,
        pnl,
    });

    Some(ExitResult {
        quantity: position.quantity,
        exit_price: price,
        pnl,
    })
}

fn held_direction(portfolio: &Portfolio, code: &str) -> Signal {
    match portfolio.quantity(code) {
        q if q > 0 => Signal::Long,
        q if q < 0 => Signal::Short,
        _ => Signal::Flat,
    }
}

/// Replay a single-asset position series against a cash ledger.
pub fn simulate_single(
    series: &PriceSeries,
    positions: &[Signal],
    config: &GlobalConfig,
) -> Portfolio {
    let mut portfolio = Portfolio::new(config.starting_cash);
    let code = series.code();

    for (t, bar) in series.bars().iter().enumerate() {
        let target = positions.get(t).copied().unwrap_or_default();
        let held = held_direction(&portfolio, code);
        if target != held {
            if !held.is_flat() {
                exit_position(&mut portfolio, code, bar.fill_price(), bar.date, t);
            }
            if !target.is_flat() {
                let result =
                    enter_position(&mut portfolio, bar, t, target, config.position_fraction);
                if result == EntryResult::InsufficientCapital {
                    tracing::debug!(code, bar = t, "entry skipped: insufficient capital");
                }
            }
        }

        let prices = HashMap::from([(code, bar.close)]);
        let quantities = [portfolio.quantity(code), 0];
        portfolio.record_bar(t, bar.date, quantities, &prices);
    }

    portfolio
}

/// Replay a spread position series. Leg B is sized with the hedge ratio
/// known on the signal bar.
pub fn simulate_pair(
    a: &PriceSeries,
    b: &PriceSeries,
    positions: &[Signal],
    params: &PairsParams,
    config: &GlobalConfig,
) -> Portfolio {
    let mut portfolio = Portfolio::new(config.starting_cash);
    let (code_a, code_b) = (a.code(), b.code());

    for (t, (bar_a, bar_b)) in a.bars().iter().zip(b.bars()).enumerate() {
        let target = positions.get(t).copied().unwrap_or_default();
        let held = held_direction(&portfolio, code_a);
        if target != held {
            if !held.is_flat() {
                exit_position(&mut portfolio, code_a, bar_a.fill_price(), bar_a.date, t);
                exit_position(&mut portfolio, code_b, bar_b.fill_price(), bar_b.date, t);
            }
            let hedge = if t == 0 {
                None
            } else {
                params.hedge_ratio.at(t - 1)
            };
            match (target.is_flat(), hedge) {
                (true, _) => {}
                (false, Some(hedge)) => {
                    let result = enter_pair(
                        &mut portfolio,
                        bar_a,
                        bar_b,
                        t,
                        target,
                        params.quantity,
                        hedge,
                    );
                    if result == EntryResult::InsufficientCapital {
                        tracing::debug!(code_a, code_b, bar = t, "spread entry skipped");
                    }
                }
                (false, None) => {
                    portfolio.rejected_entries += 1;
                }
            }
        }

        let prices = HashMap::from([(code_a, bar_a.close), (code_b, bar_b.close)]);
        let quantities = [portfolio.quantity(code_a), portfolio.quantity(code_b)];
        portfolio.record_bar(t, bar_a.date, quantities, &prices);
    }

    portfolio
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::strategy::HedgeRatio;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn bar(code: &str, day: u32, open: f64, close: f64) -> OhlcvBar {
        OhlcvBar {
            code: code.into(),
            exchange: "ASX".into(),
            date: date(day),
            open,
            high: open.max(close),
            low: open.min(close),
            close,
            volume: 1000,
        }
    }

    fn series(code: &str, prices: &[(f64, f64)]) -> PriceSeries {
        let bars = prices
            .iter()
            .enumerate()
            .map(|(i, &(open, close))| bar(code, i as u32 + 1, open, close))
            .collect();
        PriceSeries::new(String::from(code), String::from("ASX"), bars).unwrap()
    }

    fn pairs_params(quantity: i64, hedge: f64) -> PairsParams {
        PairsParams {
            window: 3,
            entry_threshold: 2.0,
            exit_threshold: 0.5,
            hedge_ratio: HedgeRatio::Fixed(hedge),
            quantity,
        }
    }

    #[test]
    fn execute_lags_by_one_bar() {
        let signals = SignalSeries::new(vec![
            None,
            Some(Signal::Long),
            Some(Signal::Long),
            Some(Signal::Short),
            None,
        ]);
        let positions = execute(&signals);
        assert_eq!(
            positions,
            vec![
                Signal::Flat,
                Signal::Flat,
                Signal::Long,
                Signal::Long,
                Signal::Short
            ]
        );
    }

    #[test]
    fn execute_empty() {
        assert!(execute(&SignalSeries::default()).is_empty());
    }

    #[test]
    fn fixed_fraction_floors() {
        assert_eq!(fixed_fraction_quantity(10000.0, 0.95, 100.0), 95);
        assert_eq!(fixed_fraction_quantity(10000.0, 0.5, 333.0), 15);
    }

    #[test]
    fn fixed_fraction_degenerate_inputs() {
        assert_eq!(fixed_fraction_quantity(10.0, 1.0, 100.0), 0);
        assert_eq!(fixed_fraction_quantity(-10.0, 1.0, 1.0), 0);
        assert_eq!(fixed_fraction_quantity(1000.0, 1.0, 0.0), 0);
        assert_eq!(fixed_fraction_quantity(1000.0, 1.0, f64::NAN), 0);
    }

    #[test]
    fn enter_long_deducts_cash() {
        let mut portfolio = Portfolio::new(10000.0);
        let b = bar("BHP", 2, 50.0, 51.0);
        let result = enter_position(&mut portfolio, &b, 1, Signal::Long, 0.5);

        assert_eq!(
            result,
            EntryResult::Entered {
                quantity: 100,
                cost: 5000.0
            }
        );
        assert!((portfolio.cash - 5000.0).abs() < f64::EPSILON);
        assert_eq!(portfolio.quantity("BHP"), 100);
        assert_eq!(portfolio.fills.len(), 1);
        assert_eq!(portfolio.fills[0].side, Side::Buy);
        assert!((portfolio.fills[0].price - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn enter_short_adds_proceeds() {
        let mut portfolio = Portfolio::new(10000.0);
        let b = bar("BHP", 2, 100.0, 100.0);
        enter_position(&mut portfolio, &b, 1, Signal::Short, 0.5);

        assert_eq!(portfolio.quantity("BHP"), -50);
        assert!((portfolio.cash - 15000.0).abs() < f64::EPSILON);
        assert_eq!(portfolio.fills[0].side, Side::Sell);
        assert_eq!(portfolio.fills[0].quantity, 50);
    }

    #[test]
    fn enter_insufficient_capital_is_noop() {
        let mut portfolio = Portfolio::new(50.0);
        let b = bar("BHP", 2, 100.0, 100.0);
        let result = enter_position(&mut portfolio, &b, 1, Signal::Long, 1.0);

        assert_eq!(result, EntryResult::InsufficientCapital);
        assert!((portfolio.cash - 50.0).abs() < f64::EPSILON);
        assert!(portfolio.positions.is_empty());
        assert!(portfolio.fills.is_empty());
        assert_eq!(portfolio.rejected_entries, 1);
    }

    #[test]
    fn exit_long_records_trade() {
        let mut portfolio = Portfolio::new(10000.0);
        enter_position(&mut portfolio, &bar("BHP", 2, 50.0, 50.0), 1, Signal::Long, 0.5);
        let exit = exit_position(&mut portfolio, "BHP", 60.0, date(5), 4).unwrap();

        assert_eq!(exit.quantity, 100);
        assert!((exit.pnl - 1000.0).abs() < f64::EPSILON);
        assert!((portfolio.cash - 11000.0).abs() < f64::EPSILON);
        assert_eq!(portfolio.closed_trades.len(), 1);
        assert_eq!(portfolio.fills[1].side, Side::Sell);
    }

    #[test]
    fn exit_short_buys_back() {
        let mut portfolio = Portfolio::new(10000.0);
        enter_position(&mut portfolio, &bar("BHP", 2, 100.0, 100.0), 1, Signal::Short, 0.5);
        let exit = exit_position(&mut portfolio, "BHP", 90.0, date(5), 4).unwrap();

        assert!((exit.pnl - 500.0).abs() < f64::EPSILON);
        assert!((portfolio.cash - 10500.0).abs() < f64::EPSILON);
        assert_eq!(portfolio.fills[1].side, Side::Buy);
    }

    #[test]
    fn exit_missing_position() {
        let mut portfolio = Portfolio::new(10000.0);
        assert!(exit_position(&mut portfolio, "XYZ", 10.0, date(1), 0).is_none());
    }

    #[test]
    fn enter_pair_sizes_hedge_leg() {
        let mut portfolio = Portfolio::new(10000.0);
        let a = bar("AAA", 2, 50.0, 50.0);
        let b = bar("BBB", 2, 20.0, 20.0);
        let result = enter_pair(&mut portfolio, &a, &b, 1, Signal::Long, 10, 1.26);

        // Long A 10 @ 50, short B round(12.6) = 13 @ 20.
        assert_eq!(
            result,
            EntryResult::Entered {
                quantity: 10,
                cost: 240.0
            }
        );
        assert_eq!(portfolio.quantity("AAA"), 10);
        assert_eq!(portfolio.quantity("BBB"), -13);
        assert!((portfolio.cash - 9760.0).abs() < 1e-9);
    }

    #[test]
    fn enter_pair_zero_hedge_quantity_rejected() {
        let mut portfolio = Portfolio::new(10000.0);
        let a = bar("AAA", 2, 50.0, 50.0);
        let b = bar("BBB", 2, 20.0, 20.0);
        let result = enter_pair(&mut portfolio, &a, &b, 1, Signal::Short, 1, 0.2);
        assert_eq!(result, EntryResult::InsufficientCapital);
        assert!(portfolio.positions.is_empty());
    }

    #[test]
    fn simulate_single_fills_at_next_open() {
        let s = series(
            "BHP",
            &[(10.0, 10.0), (11.0, 12.0), (13.0, 14.0), (15.0, 16.0)],
        );
        let positions = [Signal::Flat, Signal::Long, Signal::Long, Signal::Flat];
        let config = GlobalConfig {
            starting_cash: 1000.0,
            position_fraction: 1.0,
        };
        let portfolio = simulate_single(&s, &positions, &config);

        assert_eq!(portfolio.fills.len(), 2);
        assert_eq!(portfolio.fills[0].bar, 1);
        assert!((portfolio.fills[0].price - 11.0).abs() < f64::EPSILON);
        assert_eq!(portfolio.fills[0].quantity, 90);
        assert_eq!(portfolio.fills[1].bar, 3);
        assert!((portfolio.fills[1].price - 15.0).abs() < f64::EPSILON);

        assert_eq!(portfolio.ledger.len(), 4);
        assert_eq!(portfolio.ledger[1].quantities, [90, 0]);
        // 1000 - 990 + 90 * 12
        assert!((portfolio.ledger[1].equity - 1090.0).abs() < 1e-9);
        // 10 + 90 * 15
        assert!((portfolio.final_equity() - 1360.0).abs() < 1e-9);
    }

    #[test]
    fn simulate_single_reversal_closes_then_opens() {
        let s = series("BHP", &[(10.0, 10.0), (10.0, 10.0), (10.0, 10.0)]);
        let positions = [Signal::Flat, Signal::Long, Signal::Short];
        let config = GlobalConfig {
            starting_cash: 1000.0,
            position_fraction: 0.5,
        };
        let portfolio = simulate_single(&s, &positions, &config);

        assert_eq!(portfolio.fills.len(), 3);
        assert_eq!(portfolio.fills[1].side, Side::Sell);
        assert_eq!(portfolio.fills[2].side, Side::Sell);
        assert_eq!(portfolio.quantity("BHP"), -50);
        assert_eq!(portfolio.closed_trades.len(), 1);
    }

    #[test]
    fn simulate_pair_opens_and_closes_both_legs() {
        let a = series("AAA", &[(50.0, 50.0), (50.0, 52.0), (53.0, 53.0)]);
        let b = series("BBB", &[(25.0, 25.0), (25.0, 25.0), (24.0, 24.0)]);
        let positions = [Signal::Flat, Signal::Short, Signal::Flat];
        let portfolio =
            simulate_pair(&a, &b, &positions, &pairs_params(10, 2.0), &GlobalConfig::default());

        assert_eq!(portfolio.fills.len(), 4);
        assert_eq!(portfolio.ledger[1].quantities, [-10, 20]);
        assert_eq!(portfolio.ledger[2].quantities, [0, 0]);
        // Short A: +500 -530; long B: -500 +480.
        let expected = GlobalConfig::default().starting_cash - 50.0;
        assert!((portfolio.final_equity() - expected).abs() < 1e-9);
    }

    #[test]
    fn global_config_validation() {
        assert!(GlobalConfig::default().validate().is_ok());
        let bad_cash = GlobalConfig {
            starting_cash: 0.0,
            ..GlobalConfig::default()
        };
        assert!(matches!(
            bad_cash.validate(),
            Err(VectraderError::ConfigInvalid { ref key, .. }) if key == "starting_cash"
        ));
        let bad_fraction = GlobalConfig {
            position_fraction: 1.5,
            ..GlobalConfig::default()
        };
        assert!(bad_fraction.validate().is_err());
    }
}
