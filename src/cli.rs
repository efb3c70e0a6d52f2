//! CLI definition and dispatch.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use crate::adapters::csv_adapter::{CsvAdapter, read_hedge_ratios};
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{BacktestConfig, BacktestReport, Backtester, run_strategy};
use crate::domain::config_validation::{
    BACKTEST_SECTION, build_backtest_config, build_registry, hedge_ratio_file, pair_legs,
};
use crate::domain::error::VectraderError;
use crate::domain::metrics::Metrics;
use crate::domain::price_series::{PriceSeries, align_pair};
use crate::domain::strategy::{
    HedgeRatio, Instruments, MovingAverageKind, SignalGenerator, StrategyConfig,
};
use crate::domain::sweep::{ParamGrid, ParamSweep, describe, run_batch};
use crate::domain::universe::{load_universe, parse_codes};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "vectrader", about = "Vectorized trading strategy backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one or all configured strategies
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Name of a `[strategy.<name>]` section; all strategies run when omitted
        #[arg(short, long)]
        strategy: Option<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        code: Option<String>,
        #[arg(long)]
        exchange: Option<String>,
        #[arg(long)]
        sequential: bool,
        #[arg(long)]
        dry_run: bool,
    },
    /// Run a parameter grid against one instrument
    Sweep {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long, value_enum, default_value_t = SweepFamily::Trend)]
        family: SweepFamily,
        #[arg(long)]
        code: Option<String>,
        #[arg(long)]
        exchange: Option<String>,
        #[arg(long, value_delimiter = ',')]
        fast: Vec<usize>,
        #[arg(long, value_delimiter = ',')]
        slow: Vec<usize>,
        #[arg(long, value_enum, default_value_t = MaArg::Ema)]
        ma: MaArg,
        #[arg(long, value_delimiter = ',')]
        entry: Vec<usize>,
        #[arg(long, value_delimiter = ',')]
        exit: Vec<usize>,
        /// Allow short breakouts in donchian sweeps
        #[arg(long)]
        allow_short: bool,
        #[arg(long)]
        sequential: bool,
    },
    /// List available symbols on an exchange
    ListSymbols {
        #[arg(long)]
        exchange: String,
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show data range for symbol(s)
    Info {
        #[arg(long)]
        code: Option<String>,
        #[arg(long)]
        exchange: Option<String>,
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepFamily {
    Trend,
    Donchian,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaArg {
    Sma,
    Ema,
}

impl From<MaArg> for MovingAverageKind {
    fn from(arg: MaArg) -> Self {
        match arg {
            MaArg::Sma => MovingAverageKind::Simple,
            MaArg::Ema => MovingAverageKind::Exponential,
        }
    }
}

pub fn run(cli: Cli) -> ExitCode {
    init_tracing();
    match cli.command {
        Command::Backtest {
            config,
            strategy,
            output,
            code,
            exchange,
            sequential,
            dry_run,
        } => {
            let request = BacktestRequest {
                strategy: strategy.as_deref(),
                output: output.as_deref(),
                code: code.as_deref(),
                exchange: exchange.as_deref(),
                parallel: !sequential,
            };
            if dry_run {
                run_dry_run(&config, &request)
            } else {
                run_backtest(&config, &request)
            }
        }
        Command::Sweep {
            config,
            family,
            code,
            exchange,
            fast,
            slow,
            ma,
            entry,
            exit,
            allow_short,
            sequential,
        } => {
            let grid = match family {
                SweepFamily::Trend => ParamGrid::Trend {
                    fast_windows: or_default(fast, &[10, 20, 30]),
                    slow_windows: or_default(slow, &[50, 100, 200]),
                    kind: ma.into(),
                },
                SweepFamily::Donchian => ParamGrid::Donchian {
                    entry_windows: or_default(entry, &[10, 20, 55]),
                    exit_windows: or_default(exit, &[5, 10, 20]),
                    long_only: !allow_short,
                },
            };
            run_sweep(
                &config,
                &grid,
                code.as_deref(),
                exchange.as_deref(),
                !sequential,
            )
        }
        Command::ListSymbols { exchange, config } => run_list_symbols(&exchange, &config),
        Command::Validate { config } => run_validate(&config),
        Command::Info {
            code,
            exchange,
            config,
        } => run_info(code.as_deref(), exchange.as_deref(), &config),
    }
}

/// Log to stderr, filtered by `RUST_LOG` (default `info`). Later calls are
/// no-ops.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn or_default(values: Vec<usize>, default: &[usize]) -> Vec<usize> {
    if values.is_empty() {
        default.to_vec()
    } else {
        values
    }
}

fn fail(e: VectraderError) -> ExitCode {
    eprintln!("error: {e}");
    (&e).into()
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        fail(VectraderError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        })
    })
}

/// CSV data adapter rooted at `[backtest] data_dir`. A relative directory is
/// resolved against the config file's location.
pub fn data_adapter(config: &dyn ConfigPort, config_path: &Path) -> CsvAdapter {
    let data_dir = config
        .get_string(BACKTEST_SECTION, "data_dir")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| ".".to_string());
    CsvAdapter::new(relative_to_config(config_path, &data_dir))
}

/// Relative paths in the config are anchored at the config file's directory.
fn relative_to_config(config_path: &Path, raw: &str) -> PathBuf {
    let path = PathBuf::from(raw);
    if path.is_relative() {
        config_path
            .parent()
            .map(|parent| parent.join(&path))
            .unwrap_or(path)
    } else {
        path
    }
}

/// `--code` wins over the configured code list.
pub fn resolve_codes(
    code_override: Option<&str>,
    bt_config: &BacktestConfig,
) -> Result<Vec<String>, VectraderError> {
    match code_override {
        Some(codes) => parse_codes(codes)
            .map_err(|e| VectraderError::invalid("cli", "code", e.to_string())),
        None => Ok(bt_config.codes.clone()),
    }
}

struct BacktestRequest<'a> {
    strategy: Option<&'a str>,
    output: Option<&'a Path>,
    code: Option<&'a str>,
    exchange: Option<&'a str>,
    parallel: bool,
}

/// Configuration shared by every stage of a backtest command.
struct Prepared {
    config_path: PathBuf,
    adapter: FileConfigAdapter,
    bt_config: BacktestConfig,
    backtester: Backtester,
    names: Vec<String>,
    codes: Vec<String>,
    exchange: String,
}

fn prepare(config_path: &Path, request: &BacktestRequest<'_>) -> Result<Prepared, ExitCode> {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = load_config(config_path)?;

    let bt_config = build_backtest_config(&adapter).map_err(fail)?;
    let registry = build_registry(&adapter).map_err(fail)?;
    if registry.is_empty() {
        eprintln!("error: no [strategy.<name>] sections configured");
        return Err(ExitCode::from(2));
    }

    let names: Vec<String> = match request.strategy {
        Some(name) => {
            registry.get(name).map_err(fail)?;
            vec![name.to_string()]
        }
        None => registry.names().map(str::to_string).collect(),
    };

    let codes = resolve_codes(request.code, &bt_config).map_err(fail)?;
    let exchange = request
        .exchange
        .map(str::to_string)
        .unwrap_or_else(|| bt_config.exchange.clone());

    let backtester = Backtester::new(registry, bt_config.global).map_err(fail)?;
    for name in &names {
        let config = backtester.registry().get(name).map_err(fail)?;
        if config.is_pairs() {
            pair_legs(&adapter, name).map_err(fail)?;
            hedge_ratio_file(&adapter, name).map_err(fail)?;
        } else if codes.is_empty() {
            return Err(fail(VectraderError::ConfigMissing {
                section: BACKTEST_SECTION.to_string(),
                key: "codes".to_string(),
            }));
        }
    }

    Ok(Prepared {
        config_path: config_path.to_path_buf(),
        adapter,
        bt_config,
        backtester,
        names,
        codes,
        exchange,
    })
}

fn run_dry_run(config_path: &Path, request: &BacktestRequest<'_>) -> ExitCode {
    let prepared = match prepare(config_path, request) {
        Ok(p) => p,
        Err(code) => return code,
    };
    eprintln!("Config validated successfully");

    eprintln!("\nStrategies:");
    for name in &prepared.names {
        if let Ok(config) = prepared.backtester.registry().get(name) {
            eprintln!("  {}: {}", name, describe(config));
        }
    }

    eprintln!("\nUniverse:");
    eprintln!("  exchange: {}", prepared.exchange);
    eprintln!("  codes: {}", prepared.codes.join(", "));
    eprintln!(
        "  range: {} to {}",
        prepared.bt_config.start_date, prepared.bt_config.end_date
    );

    eprintln!("\nDry run complete: configuration is valid");
    ExitCode::SUCCESS
}

fn run_backtest(config_path: &Path, request: &BacktestRequest<'_>) -> ExitCode {
    let prepared = match prepare(config_path, request) {
        Ok(p) => p,
        Err(code) => return code,
    };
    let data_port = data_adapter(&prepared.adapter, config_path);

    let mut reports = Vec::new();
    for name in &prepared.names {
        let is_pairs = prepared
            .backtester
            .registry()
            .get(name)
            .map(|c| c.is_pairs())
            .unwrap_or(false);
        let result = if is_pairs {
            run_pair(&prepared, &data_port, name).map(|r| vec![r])
        } else {
            run_single(&prepared, &data_port, name, request.parallel)
        };
        match result {
            Ok(mut r) => reports.append(&mut r),
            Err(e) => return fail(e),
        }
    }

    if reports.is_empty() {
        eprintln!("error: no backtest produced a report");
        return ExitCode::from(5);
    }

    for report in &reports {
        print_summary(report);
    }

    let output = match request.output {
        Some(path) => path,
        None => return ExitCode::SUCCESS,
    };
    let reporter = CsvReportAdapter::new();
    let written = if reports.len() == 1 {
        reporter.write(&reports[0], output).map(|()| vec![output.to_path_buf()])
    } else {
        let refs: Vec<&BacktestReport> = reports.iter().collect();
        reporter.write_batch(&refs, output)
    };
    match written {
        Ok(paths) => {
            for path in paths {
                eprintln!("Report written to: {}", path.display());
            }
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

/// One single-asset strategy across every loadable code. Codes that fail
/// are reported and skipped.
fn run_single(
    prepared: &Prepared,
    data_port: &dyn DataPort,
    name: &str,
    parallel: bool,
) -> Result<Vec<BacktestReport>, VectraderError> {
    let config = prepared.backtester.registry().get(name)?;
    let loaded = load_universe(
        data_port,
        &prepared.codes,
        &prepared.exchange,
        prepared.bt_config.start_date,
        prepared.bt_config.end_date,
        config.warmup() + 1,
    )?;

    eprintln!(
        "Running {}: {} codes, {} to {}",
        name,
        loaded.universe.count(),
        prepared.bt_config.start_date,
        prepared.bt_config.end_date,
    );

    let results = run_batch(
        name,
        config,
        &loaded.universe.series,
        prepared.backtester.global(),
        parallel,
    );
    let mut reports = Vec::with_capacity(results.len());
    for (code, result) in results {
        match result {
            Ok(mut report) => {
                report.extend_gaps_to(prepared.bt_config.start_date, prepared.bt_config.end_date);
                reports.push(report);
            }
            Err(e) => eprintln!("warning: skipping {} ({})", code, e),
        }
    }
    Ok(reports)
}

fn run_pair(
    prepared: &Prepared,
    data_port: &dyn DataPort,
    name: &str,
) -> Result<BacktestReport, VectraderError> {
    let (leg_a, leg_b) = pair_legs(&prepared.adapter, name)?;
    let a = fetch_series(data_port, &leg_a, &prepared.exchange, &prepared.bt_config)?;
    let b = fetch_series(data_port, &leg_b, &prepared.exchange, &prepared.bt_config)?;

    let aligned = align_pair(&a, &b)?;
    if !aligned.dropped.is_empty() {
        tracing::warn!(
            leg_a = %leg_a,
            leg_b = %leg_b,
            dropped = aligned.dropped.len(),
            "dates missing from one leg were dropped"
        );
    }

    eprintln!(
        "Running {}: {}/{}, {} bars",
        name,
        leg_a,
        leg_b,
        aligned.a.len()
    );
    let instruments = Instruments::Pair {
        a: &aligned.a,
        b: &aligned.b,
    };
    let mut report = match hedge_ratio_file(&prepared.adapter, name)? {
        Some(raw) => {
            let path = relative_to_config(&prepared.config_path, &raw);
            let estimates = read_hedge_ratios(&path)?;
            let mut config = prepared.backtester.registry().get(name)?.clone();
            if let StrategyConfig::Pairs(params) = &mut config {
                params.hedge_ratio = HedgeRatio::from_dated(&aligned.a.dates(), &estimates);
            }
            eprintln!("Hedge ratio: {} estimates from {}", estimates.len(), path.display());
            run_strategy(name, &config, instruments, prepared.backtester.global())?
        }
        None => prepared.backtester.run(name, instruments)?,
    };
    report.extend_gaps_to(prepared.bt_config.start_date, prepared.bt_config.end_date);
    Ok(report)
}

fn fetch_series(
    data_port: &dyn DataPort,
    code: &str,
    exchange: &str,
    bt_config: &BacktestConfig,
) -> Result<PriceSeries, VectraderError> {
    let bars = data_port.fetch_ohlcv(code, exchange, bt_config.start_date, bt_config.end_date)?;
    if bars.is_empty() {
        return Err(VectraderError::NoData {
            code: code.to_string(),
            exchange: exchange.to_string(),
        });
    }
    PriceSeries::new(code.to_string(), exchange.to_string(), bars)
}

fn format_sharpe(metrics: &Metrics) -> String {
    match metrics.sharpe_ratio {
        Ok(sharpe) => format!("{sharpe:.2}"),
        Err(reason) => format!("n/a ({reason})"),
    }
}

fn print_summary(report: &BacktestReport) {
    let m = &report.metrics;
    eprintln!(
        "\n=== {} [{}] {} ===",
        report.strategy,
        report.kind,
        report.codes.join("/")
    );
    if report.insufficient_data {
        eprintln!("Insufficient data: every signal is undefined");
    }
    eprintln!("Total Return:     {:.2}%", m.total_return * 100.0);
    eprintln!("Annualized:       {:.2}%", m.annualized_return * 100.0);
    eprintln!("Sharpe Ratio:     {}", format_sharpe(m));
    eprintln!(
        "Max Drawdown:     {:.1}% ({} bars)",
        m.max_drawdown * 100.0,
        m.max_drawdown_duration
    );
    eprintln!("Trades:           {}", m.trade_count);
    eprintln!("Round Trips:      {}", m.round_trips);
    match m.win_rate {
        Some(rate) => eprintln!("Win Rate:         {:.1}%", rate * 100.0),
        None => eprintln!("Win Rate:         n/a"),
    }
    eprintln!(
        "Final Equity:     ${:.2} ({} fills)",
        report.portfolio.final_equity(),
        report.portfolio.fills.len()
    );
    if !report.data_gaps.is_empty() {
        eprintln!("Data Gaps:        {} weekdays", report.data_gaps.len());
    }
}

fn run_sweep(
    config_path: &Path,
    grid: &ParamGrid,
    code_override: Option<&str>,
    exchange_override: Option<&str>,
    parallel: bool,
) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let bt_config = match build_backtest_config(&adapter) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    let codes = match resolve_codes(code_override, &bt_config) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    let code = match codes.first() {
        Some(c) => c.clone(),
        None => {
            eprintln!("error: sweep needs --code or a configured code");
            return ExitCode::from(2);
        }
    };
    let exchange = exchange_override.unwrap_or(bt_config.exchange.as_str());

    let data_port = data_adapter(&adapter, config_path);
    let series = match fetch_series(&data_port, &code, exchange, &bt_config) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    if grid.generate_configs().is_empty() {
        eprintln!("error: parameter grid has no valid combination");
        return ExitCode::from(2);
    }

    let sweep = ParamSweep::new(bt_config.global).with_parallelism(parallel);
    let results = match sweep.sweep(grid, Instruments::Single(&series)) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };

    println!("label,total_return,annualized_return,sharpe,max_drawdown,trades");
    for row in results.ranked_by_sharpe() {
        let m = &row.metrics;
        println!(
            "{},{:.6},{:.6},{},{:.6},{}",
            row.label,
            m.total_return,
            m.annualized_return,
            m.sharpe_ratio
                .map(|s| format!("{s:.6}"))
                .unwrap_or_default(),
            m.max_drawdown,
            m.trade_count
        );
    }

    match results.best_by_sharpe() {
        Some(best) => eprintln!(
            "\nBest by Sharpe: {} ({})",
            best.label,
            format_sharpe(&best.metrics)
        ),
        None => eprintln!("\nNo configuration has a defined Sharpe ratio"),
    }
    eprintln!("{} configurations on {}", results.len(), code);
    ExitCode::SUCCESS
}

fn run_list_symbols(exchange: &str, config_path: &Path) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let adapter = data_adapter(&config, config_path);

    let symbols = match adapter.list_symbols(exchange) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    if symbols.is_empty() {
        eprintln!("No symbols found for exchange {}", exchange);
    } else {
        for symbol in &symbols {
            println!("{}", symbol);
        }
        eprintln!("{} symbols found", symbols.len());
    }
    ExitCode::SUCCESS
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let bt_config = match build_backtest_config(&adapter) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    let registry = match build_registry(&adapter) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };

    eprintln!("\nBacktest:");
    eprintln!(
        "  range: {} to {}",
        bt_config.start_date, bt_config.end_date
    );
    eprintln!("  exchange: {}", bt_config.exchange);
    eprintln!("  codes: {}", bt_config.codes.join(", "));
    eprintln!(
        "  starting cash: {:.2}, position fraction: {}",
        bt_config.global.starting_cash, bt_config.global.position_fraction
    );

    eprintln!("\nStrategies:");
    for (name, config) in registry.iter() {
        if config.is_pairs() {
            match pair_legs(&adapter, name) {
                Ok((a, b)) => eprintln!("  {}: {} on {}/{}", name, describe(config), a, b),
                Err(e) => return fail(e),
            }
        } else {
            eprintln!("  {}: {}", name, describe(config));
        }
    }

    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

fn run_info(code: Option<&str>, exchange: Option<&str>, config_path: &Path) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let codes: Vec<String> = match code {
        Some(c) => vec![c.trim().to_uppercase()],
        None => config
            .get_string(BACKTEST_SECTION, "codes")
            .or_else(|| config.get_string(BACKTEST_SECTION, "code"))
            .and_then(|raw| parse_codes(&raw).ok())
            .unwrap_or_default(),
    };
    if codes.is_empty() {
        eprintln!("error: no codes configured (use --code or set codes in config)");
        return ExitCode::from(2);
    }

    let exchange = match exchange {
        Some(e) => e.to_string(),
        None => match config.get_string(BACKTEST_SECTION, "exchange") {
            Some(e) => e,
            None => {
                eprintln!("error: exchange is required (use --exchange or set in config)");
                return ExitCode::from(2);
            }
        },
    };

    let adapter = data_adapter(&config, config_path);
    for c in &codes {
        match adapter.get_data_range(c, &exchange) {
            Ok(Some((min_date, max_date, count))) => {
                println!(
                    "{}.{}: {} bars, {} to {}",
                    c, exchange, count, min_date, max_date
                );
            }
            Ok(None) => {
                eprintln!("{}.{}: no data found", c, exchange);
            }
            Err(e) => {
                eprintln!("error querying {}.{}: {}", c, exchange, e);
            }
        }
    }
    ExitCode::SUCCESS
}
