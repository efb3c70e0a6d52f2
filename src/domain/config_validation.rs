//! Configuration validation and parsing.
//!
//! Reads the `[backtest]` section and every `[strategy.<name>]` section,
//! rejecting bad values before any run starts.

use crate::domain::backtest::{BacktestConfig, GlobalConfig, StrategyRegistry};
use crate::domain::error::VectraderError;
use crate::domain::execution::{DEFAULT_POSITION_FRACTION, DEFAULT_STARTING_CASH};
use crate::domain::strategy::{
    DonchianParams, HedgeRatio, MacdParams, MovingAverageKind, PairsParams, RsiParams,
    StrategyConfig, TrendParams,
};
use crate::domain::universe::parse_codes;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;
use std::str::FromStr;

pub const BACKTEST_SECTION: &str = "backtest";
pub const STRATEGY_PREFIX: &str = "strategy.";

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), VectraderError> {
    build_global_config(config)?.validate()?;
    validate_dates(config)?;
    validate_exchange(config)?;
    resolve_codes(config)?;
    Ok(())
}

pub fn build_global_config(config: &dyn ConfigPort) -> Result<GlobalConfig, VectraderError> {
    Ok(GlobalConfig {
        starting_cash: optional_value(
            config,
            BACKTEST_SECTION,
            "starting_cash",
            DEFAULT_STARTING_CASH,
        )?,
        position_fraction: optional_value(
            config,
            BACKTEST_SECTION,
            "position_fraction",
            DEFAULT_POSITION_FRACTION,
        )?,
    })
}

pub fn build_backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, VectraderError> {
    validate_backtest_config(config)?;
    let (start_date, end_date) = validate_dates(config)?;
    Ok(BacktestConfig {
        start_date,
        end_date,
        exchange: validate_exchange(config)?,
        codes: resolve_codes(config)?,
        global: build_global_config(config)?,
    })
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(NaiveDate, NaiveDate), VectraderError> {
    let start_str = config.get_string(BACKTEST_SECTION, "start_date");
    let end_str = config.get_string(BACKTEST_SECTION, "end_date");

    let start_date = parse_date(start_str.as_deref(), "start_date")?;
    let end_date = parse_date(end_str.as_deref(), "end_date")?;

    if start_date >= end_date {
        return Err(VectraderError::invalid(
            BACKTEST_SECTION,
            "start_date",
            "start_date must be before end_date",
        ));
    }
    Ok((start_date, end_date))
}

fn parse_date(value: Option<&str>, field: &str) -> Result<NaiveDate, VectraderError> {
    match value {
        None => Err(VectraderError::ConfigMissing {
            section: BACKTEST_SECTION.to_string(),
            key: field.to_string(),
        }),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| {
            VectraderError::invalid(
                BACKTEST_SECTION,
                field,
                format!("invalid {} format, expected YYYY-MM-DD", field),
            )
        }),
    }
}

fn validate_exchange(config: &dyn ConfigPort) -> Result<String, VectraderError> {
    match config.get_string(BACKTEST_SECTION, "exchange") {
        Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(VectraderError::ConfigMissing {
            section: BACKTEST_SECTION.to_string(),
            key: "exchange".to_string(),
        }),
    }
}

/// `codes` wins over `code`; both may be absent when only pairs run.
pub fn resolve_codes(config: &dyn ConfigPort) -> Result<Vec<String>, VectraderError> {
    let (key, raw) = match (
        config.get_string(BACKTEST_SECTION, "codes"),
        config.get_string(BACKTEST_SECTION, "code"),
    ) {
        (Some(c), _) if !c.trim().is_empty() => ("codes", c),
        (_, Some(c)) if !c.trim().is_empty() => ("code", c),
        _ => return Ok(Vec::new()),
    };
    parse_codes(&raw).map_err(|e| VectraderError::invalid(BACKTEST_SECTION, key, e.to_string()))
}

/// Names of all `[strategy.<name>]` sections, sorted.
pub fn strategy_names(config: &dyn ConfigPort) -> Vec<String> {
    config
        .sections()
        .into_iter()
        .filter_map(|s| s.strip_prefix(STRATEGY_PREFIX).map(str::to_string))
        .filter(|name| !name.is_empty())
        .collect()
}

/// Every strategy section, parsed and validated.
pub fn build_registry(config: &dyn ConfigPort) -> Result<StrategyRegistry, VectraderError> {
    let mut registry = StrategyRegistry::new();
    for name in strategy_names(config) {
        let strategy = parse_strategy(config, &name)?;
        registry.insert(name, strategy)?;
    }
    Ok(registry)
}

/// Leg codes of a pairs strategy section.
pub fn pair_legs(config: &dyn ConfigPort, name: &str) -> Result<(String, String), VectraderError> {
    let section = format!("{STRATEGY_PREFIX}{name}");
    let leg_a = required_string(config, &section, "leg_a")?.to_uppercase();
    let leg_b = required_string(config, &section, "leg_b")?.to_uppercase();
    if leg_a == leg_b {
        return Err(VectraderError::invalid(
            &section,
            "leg_b",
            "must differ from leg_a",
        ));
    }
    Ok((leg_a, leg_b))
}

/// Path of the per-date hedge ratio file of a pairs strategy, if any.
/// Exclusive with a fixed `hedge_ratio`.
pub fn hedge_ratio_file(
    config: &dyn ConfigPort,
    name: &str,
) -> Result<Option<String>, VectraderError> {
    let section = format!("{STRATEGY_PREFIX}{name}");
    let Some(path) = config
        .get_string(&section, "hedge_ratio_file")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
    else {
        return Ok(None);
    };
    if config.get_string(&section, "hedge_ratio").is_some() {
        return Err(VectraderError::invalid(
            &section,
            "hedge_ratio_file",
            "set either hedge_ratio or hedge_ratio_file, not both",
        ));
    }
    Ok(Some(path))
}

pub fn parse_strategy(config: &dyn ConfigPort, name: &str) -> Result<StrategyConfig, VectraderError> {
    let section = format!("{STRATEGY_PREFIX}{name}");
    let section = section.as_str();
    let kind = required_string(config, section, "kind")?.to_lowercase();

    let strategy = match kind.as_str() {
        "trend" => StrategyConfig::Trend(TrendParams {
            fast_window: optional_value(config, section, "fast_window", 20)?,
            slow_window: optional_value(config, section, "slow_window", 50)?,
            kind: parse_ma_kind(config, section)?,
        }),
        "donchian" => StrategyConfig::Donchian(DonchianParams {
            entry_window: optional_value(config, section, "entry_window", 20)?,
            exit_window: optional_value(config, section, "exit_window", 10)?,
            long_only: parse_bool(config, section, "long_only", true)?,
        }),
        "rsi" => StrategyConfig::Rsi(RsiParams {
            period: optional_value(config, section, "period", 14)?,
            oversold: optional_value(config, section, "oversold", 30.0)?,
            overbought: optional_value(config, section, "overbought", 70.0)?,
        }),
        "macd" => StrategyConfig::Macd(MacdParams {
            fast_period: optional_value(config, section, "fast_period", 12)?,
            slow_period: optional_value(config, section, "slow_period", 26)?,
            signal_period: optional_value(config, section, "signal_period", 9)?,
        }),
        "pairs" => StrategyConfig::Pairs(PairsParams {
            window: optional_value(config, section, "window", 15)?,
            entry_threshold: optional_value(config, section, "entry_threshold", 2.0)?,
            exit_threshold: optional_value(config, section, "exit_threshold", 0.5)?,
            hedge_ratio: HedgeRatio::Fixed(optional_value(config, section, "hedge_ratio", 1.0)?),
            quantity: optional_value(config, section, "quantity", 10)?,
        }),
        "buy_hold" | "buy_and_hold" => StrategyConfig::BuyHold,
        other => {
            return Err(VectraderError::invalid(
                section,
                "kind",
                format!(
                    "unknown kind '{other}' (expected trend, donchian, rsi, macd, pairs or buy_hold)"
                ),
            ));
        }
    };

    strategy.validate_in(section)?;
    Ok(strategy)
}

fn parse_ma_kind(config: &dyn ConfigPort, section: &str) -> Result<MovingAverageKind, VectraderError> {
    match config.get_string(section, "ma") {
        None => Ok(MovingAverageKind::Exponential),
        Some(s) => match s.trim().to_lowercase().as_str() {
            "sma" | "simple" => Ok(MovingAverageKind::Simple),
            "ema" | "exponential" => Ok(MovingAverageKind::Exponential),
            other => Err(VectraderError::invalid(
                section,
                "ma",
                format!("expected sma or ema, got '{other}'"),
            )),
        },
    }
}

fn required_string(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<String, VectraderError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(VectraderError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
    }
}

/// Parsed value of `key`, `default` when absent. Present but malformed
/// values are errors rather than silently replaced.
fn optional_value<T>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: T,
) -> Result<T, VectraderError>
where
    T: FromStr,
{
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            VectraderError::invalid(section, key, format!("cannot parse '{}'", raw.trim()))
        }),
    }
}

fn parse_bool(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: bool,
) -> Result<bool, VectraderError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" => Ok(false),
            other => Err(VectraderError::invalid(
                section,
                key,
                format!("expected a boolean, got '{other}'"),
            )),
        },
    }
}
