//! CLI definition and dispatch.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use tracing::{error, info, warn};

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::dry_run_order_adapter::DryRunOrderAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::text_report_adapter::{DEFAULT_TRADE_LIMIT, TextReportAdapter, format_time};
use crate::domain::backtest::{BacktestConfig, entry_signal, inputs_at, run_backtest};
use crate::domain::config_validation::{
    check_consistency, parse_time_bound, validate_backtest_config, validate_strategy_config,
};
use crate::domain::error::TraderError;
use crate::domain::indicator::IndicatorSet;
use crate::domain::indicator::volatility::calculate_volatility;
use crate::domain::ohlcv::{OhlcvBar, resample};
use crate::domain::position::Side;
use crate::domain::signal::{Signal, evaluate_exit};
use crate::domain::strategy::{EntryPattern, StrategyConfig, TrendFilter};
use crate::domain::sweep::{ParamGrid, run_sweep};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::order_port::{OrderOutcome, OrderPort, OrderRequest};
use crate::ports::report_port::ReportPort;

const DEFAULT_SWEEP_TOP: usize = 10;

#[derive(Parser, Debug)]
#[command(name = "rsitrader", about = "RSI/EMA backtesting engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Where bars come from and which slice of them to use.
#[derive(Args, Debug, Clone, Default)]
pub struct DataArgs {
    /// INI configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// SQLite kline database (overrides [data] sqlite_path)
    #[arg(long)]
    pub db: Option<PathBuf>,
    /// Directory of <SYMBOL>.csv files (overrides [data] csv_dir)
    #[arg(long)]
    pub csv_dir: Option<PathBuf>,
    #[arg(long)]
    pub symbol: Option<String>,
    /// YYYY-MM-DD or unix seconds
    #[arg(long)]
    pub start: Option<String>,
    /// YYYY-MM-DD or unix seconds
    #[arg(long)]
    pub end: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeldSide {
    Long,
    Short,
}

impl From<HeldSide> for Side {
    fn from(side: HeldSide) -> Self {
        match side {
            HeldSide::Long => Side::Long,
            HeldSide::Short => Side::Short,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest and print the report
    Backtest {
        #[command(flatten)]
        data: DataArgs,
        /// Write the report to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Number of most recent trades to list
        #[arg(long, default_value_t = DEFAULT_TRADE_LIMIT)]
        trades: usize,
    },
    /// Run the parameter sweep and rank the combinations
    Optimize {
        #[command(flatten)]
        data: DataArgs,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Combinations to show (overrides [sweep] top)
        #[arg(long)]
        top: Option<usize>,
        /// Evaluate combinations on one thread
        #[arg(long)]
        sequential: bool,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show stored data range for symbol(s)
    Info {
        #[command(flatten)]
        data: DataArgs,
    },
    /// Evaluate the latest bar and dispatch the signal (dry run)
    Signal {
        #[command(flatten)]
        data: DataArgs,
        /// Quote value to trade (defaults to start_balance * first_batch_size)
        #[arg(long)]
        notional: Option<f64>,
        /// Side currently held, to also evaluate the RSI exit
        #[arg(long, value_enum)]
        holding: Option<HeldSide>,
    },
    /// Write a default configuration file
    InitConfig {
        #[arg(default_value = "rsitrader.ini")]
        path: PathBuf,
        /// Strategy preset: trend or bounce
        #[arg(long, default_value = "trend")]
        pattern: EntryPattern,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Backtest {
            data,
            output,
            trades,
        } => run_backtest_command(&data, output, trades),
        Command::Optimize {
            data,
            output,
            top,
            sequential,
        } => run_optimize(&data, output, top, sequential),
        Command::Validate { config } => run_validate(&config),
        Command::Info { data } => run_info(&data),
        Command::Signal {
            data,
            notional,
            holding,
        } => run_signal(&data, notional, holding),
        Command::InitConfig {
            path,
            pattern,
            force,
        } => run_init_config(&path, pattern, force),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<FileConfigAdapter, TraderError> {
    match path {
        Some(path) => {
            info!(path = %path.display(), "loading config");
            FileConfigAdapter::from_file(path)
        }
        None => Ok(FileConfigAdapter::empty()),
    }
}

pub fn build_backtest_config(config: &dyn ConfigPort) -> BacktestConfig {
    let defaults = BacktestConfig::default();
    BacktestConfig {
        symbol: config
            .get_string("backtest", "symbol")
            .unwrap_or(defaults.symbol),
        start_balance: config.get_double("backtest", "start_balance", defaults.start_balance),
        fee_rate: config.get_double("backtest", "fee_rate", defaults.fee_rate),
        leverage: config.get_double("backtest", "leverage", defaults.leverage),
        bars_per_year: config.get_double("backtest", "bars_per_year", defaults.bars_per_year),
    }
}

/// The preset selected by `[strategy] pattern`, with every key present in
/// the section overriding it.
pub fn build_strategy(config: &dyn ConfigPort) -> Result<StrategyConfig, TraderError> {
    let pattern = match config.get_string("strategy", "pattern") {
        Some(s) => s
            .parse::<EntryPattern>()
            .map_err(|reason| TraderError::invalid("strategy", "pattern", reason))?,
        None => EntryPattern::TrendBreakout,
    };
    let p = StrategyConfig::preset(pattern);

    let trend_filter = match config.get_string("strategy", "trend_filter") {
        None => p.trend_filter,
        Some(s) => match s.trim().to_ascii_lowercase().as_str() {
            "ema" => TrendFilter::EmaAlignment,
            "breakout" => TrendFilter::Breakout {
                lookback: config.get_int("strategy", "breakout_lookback", 20).max(1) as usize,
            },
            other => {
                return Err(TraderError::invalid(
                    "strategy",
                    "trend_filter",
                    format!("unknown trend filter '{other}'"),
                ));
            }
        },
    };

    let int = |key: &str, default: usize| {
        config.get_int("strategy", key, default as i64).max(0) as usize
    };
    let secs = |key: &str, default: i64| config.get_int("strategy", key, default);
    let num = |key: &str, default: f64| config.get_double("strategy", key, default);

    Ok(StrategyConfig {
        name: config.get_string("strategy", "name").unwrap_or(p.name),
        pattern,
        trend_filter,
        allow_short: config.get_bool("strategy", "allow_short", p.allow_short),

        rsi_period: int("rsi_period", p.rsi_period),
        ema_fast: int("ema_fast", p.ema_fast),
        ema_slow: int("ema_slow", p.ema_slow),
        volume_period: int("volume_period", p.volume_period),
        volatility_period: int("volatility_period", p.volatility_period),

        rsi_oversold_long: num("rsi_oversold_long", p.rsi_oversold_long),
        rsi_entry_long: num("rsi_entry_long", p.rsi_entry_long),
        rsi_overbought_short: num("rsi_overbought_short", p.rsi_overbought_short),
        rsi_entry_short: num("rsi_entry_short", p.rsi_entry_short),
        volume_ratio_threshold: num("volume_ratio_threshold", p.volume_ratio_threshold),

        drop_lookback: int("drop_lookback", p.drop_lookback),
        drop_threshold: num("drop_threshold", p.drop_threshold),

        first_batch_size: num("first_batch_size", p.first_batch_size),
        other_batch_size: num("other_batch_size", p.other_batch_size),
        batch_interval: secs("batch_interval", p.batch_interval),
        max_batches: int("max_batches", p.max_batches),
        scale_in_min_profit: num("scale_in_min_profit", p.scale_in_min_profit),

        rsi_exit: num("rsi_exit", p.rsi_exit),
        max_hold_time: secs("max_hold_time", p.max_hold_time),
        exit_on_ema_cross: config.get_bool("strategy", "exit_on_ema_cross", p.exit_on_ema_cross),
        stop_loss_pct: num("stop_loss_pct", p.stop_loss_pct),
        exit_on_rsi_neutral: config.get_bool(
            "strategy",
            "exit_on_rsi_neutral",
            p.exit_on_rsi_neutral,
        ),

        profit_threshold: num("profit_threshold", p.profit_threshold),
        start_exit_time: secs("start_exit_time", p.start_exit_time),
        exit_interval: secs("exit_interval", p.exit_interval),
        exit_percent: num("exit_percent", p.exit_percent),
        take_profit_pct: num("take_profit_pct", p.take_profit_pct),

        min_warmup: int("min_warmup", p.min_warmup),
    })
}

fn parse_list<T: std::str::FromStr>(
    config: &dyn ConfigPort,
    key: &str,
    default: Vec<T>,
) -> Result<Vec<T>, TraderError> {
    let Some(raw) = config.get_string("sweep", key) else {
        return Ok(default);
    };

    let values = raw
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| {
            v.parse::<T>()
                .map_err(|_| TraderError::invalid("sweep", key, format!("invalid value '{v}'")))
        })
        .collect::<Result<Vec<T>, TraderError>>()?;

    if values.is_empty() {
        return Err(TraderError::invalid("sweep", key, "list must not be empty"));
    }
    Ok(values)
}

/// `[sweep]` value lists, each falling back to the built-in grid.
pub fn build_grid(config: &dyn ConfigPort) -> Result<ParamGrid, TraderError> {
    let d = ParamGrid::default();
    Ok(ParamGrid {
        rsi_oversold_long: parse_list(config, "rsi_oversold_long", d.rsi_oversold_long)?,
        rsi_entry_long: parse_list(config, "rsi_entry_long", d.rsi_entry_long)?,
        rsi_overbought_short: parse_list(config, "rsi_overbought_short", d.rsi_overbought_short)?,
        rsi_entry_short: parse_list(config, "rsi_entry_short", d.rsi_entry_short)?,
        volume_ratio_threshold: parse_list(
            config,
            "volume_ratio_threshold",
            d.volume_ratio_threshold,
        )?,
        ema_fast: parse_list(config, "ema_fast", d.ema_fast)?,
        ema_slow: parse_list(config, "ema_slow", d.ema_slow)?,
    })
}

/// Bar source by precedence: `--csv-dir`, `--db`, `[data] csv_dir`,
/// `[data] sqlite_path`.
pub fn open_data_port(
    args: &DataArgs,
    config: &dyn ConfigPort,
) -> Result<Box<dyn DataPort>, TraderError> {
    if let Some(dir) = &args.csv_dir {
        return Ok(Box::new(CsvAdapter::new(dir.clone())));
    }
    if let Some(db) = &args.db {
        return open_sqlite(db, config);
    }
    if let Some(dir) = config.get_string("data", "csv_dir") {
        return Ok(Box::new(CsvAdapter::new(PathBuf::from(dir))));
    }
    match config.get_string("data", "sqlite_path") {
        Some(path) => open_sqlite(Path::new(&path), config),
        None => Err(TraderError::ConfigMissing {
            section: "data".into(),
            key: "sqlite_path".into(),
        }),
    }
}

#[cfg(feature = "sqlite")]
fn open_sqlite(path: &Path, config: &dyn ConfigPort) -> Result<Box<dyn DataPort>, TraderError> {
    use crate::adapters::sqlite_adapter::SqliteAdapter;

    if !path.is_file() {
        return Err(TraderError::Database {
            reason: format!("database {} does not exist", path.display()),
        });
    }
    let pool_size = config.get_int("data", "sqlite_pool_size", 4).max(1) as u32;
    Ok(Box::new(SqliteAdapter::open(path, pool_size)?))
}

#[cfg(not(feature = "sqlite"))]
fn open_sqlite(path: &Path, _config: &dyn ConfigPort) -> Result<Box<dyn DataPort>, TraderError> {
    Err(TraderError::Database {
        reason: format!(
            "cannot open {}: built without the sqlite feature",
            path.display()
        ),
    })
}

fn resolve_symbol(args: &DataArgs, config: &dyn ConfigPort) -> String {
    args.symbol
        .clone()
        .or_else(|| config.get_string("backtest", "symbol"))
        .unwrap_or_else(|| BacktestConfig::default().symbol)
}

fn resolve_bound(
    arg: Option<&str>,
    config: &dyn ConfigPort,
    key: &str,
) -> Result<Option<i64>, TraderError> {
    let raw = match arg {
        Some(s) => Some(s.to_string()),
        None => config.get_string("backtest", key),
    };
    match raw {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => parse_time_bound(&s).map(Some).ok_or_else(|| {
            TraderError::invalid(
                "backtest",
                key,
                format!("invalid time '{s}', expected YYYY-MM-DD or unix seconds"),
            )
        }),
    }
}

/// Everything a run needs, resolved from flags and configuration.
pub struct RunSetup {
    pub config: FileConfigAdapter,
    pub backtest: BacktestConfig,
    pub strategy: StrategyConfig,
    pub bars: Vec<OhlcvBar>,
}

/// Load and validate configuration, then fetch and resample bars. Fails
/// with [`TraderError::NoData`] on an empty slice and
/// [`TraderError::InsufficientData`] when the bars cannot cover warm-up.
pub fn prepare_run(args: &DataArgs) -> Result<RunSetup, TraderError> {
    let config = load_config(args.config.as_deref())?;
    validate_backtest_config(&config)?;
    validate_strategy_config(&config)?;

    let strategy = build_strategy(&config)?;
    check_consistency(&strategy)?;

    let mut backtest = build_backtest_config(&config);
    backtest.symbol = resolve_symbol(args, &config);

    let start = resolve_bound(args.start.as_deref(), &config, "start_date")?;
    let end = resolve_bound(args.end.as_deref(), &config, "end_date")?;

    let data_port = open_data_port(args, &config)?;
    let bars = load_bars(data_port.as_ref(), &backtest.symbol, start, end)?;

    let factor = config.get_int("backtest", "resample", 1).max(1) as usize;
    let bars = if factor > 1 {
        let resampled = resample(&bars, factor);
        info!(
            factor,
            from = bars.len(),
            to = resampled.len(),
            "resampled bars"
        );
        resampled
    } else {
        bars
    };

    let minimum = strategy.warmup_bars();
    if bars.len() <= minimum {
        return Err(TraderError::InsufficientData {
            symbol: backtest.symbol,
            bars: bars.len(),
            minimum,
        });
    }

    Ok(RunSetup {
        config,
        backtest,
        strategy,
        bars,
    })
}

fn load_bars(
    data_port: &dyn DataPort,
    symbol: &str,
    start: Option<i64>,
    end: Option<i64>,
) -> Result<Vec<OhlcvBar>, TraderError> {
    let bars = data_port.load_bars(symbol, start, end)?;
    if bars.is_empty() {
        return Err(TraderError::NoData {
            symbol: symbol.to_string(),
        });
    }

    info!(
        symbol,
        bars = bars.len(),
        first = %format_time(bars[0].timestamp),
        last = %format_time(bars[bars.len() - 1].timestamp),
        "loaded bars"
    );
    Ok(bars)
}

fn report_adapter(output: Option<PathBuf>) -> TextReportAdapter {
    match output {
        Some(path) => TextReportAdapter::to_file(path),
        None => TextReportAdapter::stdout(),
    }
}

fn run_backtest_command(
    args: &DataArgs,
    output: Option<PathBuf>,
    trades: usize,
) -> Result<(), TraderError> {
    let setup = prepare_run(args)?;
    info!(
        strategy = %setup.strategy.name,
        pattern = %setup.strategy.pattern,
        bars = setup.bars.len(),
        "running backtest"
    );

    let result = run_backtest(&setup.bars, &setup.strategy, &setup.backtest);
    info!(
        trades = result.total_trades,
        pnl = result.total_pnl,
        "backtest finished"
    );

    let written_to = output.clone();
    report_adapter(output)
        .with_trade_limit(trades)
        .write(&result, &setup.strategy, &setup.backtest)?;
    if let Some(path) = written_to {
        info!(path = %path.display(), "report written");
    }
    Ok(())
}

fn run_optimize(
    args: &DataArgs,
    output: Option<PathBuf>,
    top: Option<usize>,
    sequential: bool,
) -> Result<(), TraderError> {
    let setup = prepare_run(args)?;
    let grid = build_grid(&setup.config)?;
    let top = top.unwrap_or_else(|| {
        setup
            .config
            .get_int("sweep", "top", DEFAULT_SWEEP_TOP as i64)
            .max(1) as usize
    });

    let cancel = AtomicBool::new(false);
    let entries = run_sweep(
        &setup.bars,
        &grid,
        &setup.strategy,
        &setup.backtest,
        !sequential,
        &cancel,
    );

    if entries.is_empty() {
        warn!("no consistent parameter combinations in the grid");
    }

    report_adapter(output).write_sweep(&entries, top)
}

fn run_validate(path: &Path) -> Result<(), TraderError> {
    let config = FileConfigAdapter::from_file(path)?;
    validate_backtest_config(&config)?;
    validate_strategy_config(&config)?;

    let strategy = build_strategy(&config)?;
    check_consistency(&strategy)?;
    build_grid(&config)?;

    let backtest = build_backtest_config(&config);
    info!(
        path = %path.display(),
        strategy = %strategy.name,
        pattern = %strategy.pattern,
        symbol = %backtest.symbol,
        warmup = strategy.warmup_bars(),
        "configuration is valid"
    );
    Ok(())
}

fn run_info(args: &DataArgs) -> Result<(), TraderError> {
    let config = load_config(args.config.as_deref())?;
    let data_port = open_data_port(args, &config)?;

    let symbols = match &args.symbol {
        Some(symbol) => vec![symbol.clone()],
        None => data_port.list_symbols()?,
    };

    if symbols.is_empty() {
        warn!("no symbols in data store");
    }

    for symbol in &symbols {
        match data_port.get_data_range(symbol)? {
            Some((first, last, count)) => println!(
                "{:<10} {:>9} bars  {} .. {}",
                symbol,
                count,
                format_time(first),
                format_time(last)
            ),
            None => println!("{:<10} no data", symbol),
        }
    }
    Ok(())
}

fn run_signal(
    args: &DataArgs,
    notional: Option<f64>,
    holding: Option<HeldSide>,
) -> Result<(), TraderError> {
    let setup = prepare_run(args)?;
    let bars = &setup.bars;
    let strategy = &setup.strategy;

    let indicators =
        IndicatorSet::compute(bars, strategy).ok_or_else(|| TraderError::InsufficientData {
            symbol: setup.backtest.symbol.clone(),
            bars: bars.len(),
            minimum: strategy.warmup_bars(),
        })?;
    let volatility = calculate_volatility(
        bars,
        strategy.volatility_period,
        Some(setup.backtest.bars_per_year),
    );

    let i = bars.len() - 1;
    let inputs = inputs_at(bars, &indicators, strategy, i);
    info!(
        time = %format_time(bars[i].timestamp),
        close = inputs.close,
        rsi = inputs.rsi,
        volatility = ?volatility.and_then(|v| v.get(i)),
        volume_ratio = inputs.volume_ratio,
        "latest bar"
    );

    let signal = match holding {
        Some(side) => evaluate_exit(side.into(), inputs.prev_rsi, inputs.rsi),
        None => entry_signal(bars, &inputs, strategy, i).0,
    };

    if signal == Signal::None {
        info!("no signal");
        return Ok(());
    }

    let request = OrderRequest {
        symbol: setup.backtest.symbol.clone(),
        signal,
        price: inputs.close,
        notional: notional
            .unwrap_or(setup.backtest.start_balance * strategy.first_batch_size),
    };
    info!(signal = ?signal, "dispatching signal");

    match DryRunOrderAdapter::new().execute(&request) {
        OrderOutcome::Completed {
            signal,
            amount,
            price,
        } => info!(signal = ?signal, amount, price, "order completed"),
        OrderOutcome::Failed { reason } => warn!(%reason, "order failed"),
    }
    Ok(())
}

fn run_init_config(path: &Path, pattern: EntryPattern, force: bool) -> Result<(), TraderError> {
    if path.exists() && !force {
        return Err(TraderError::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("{} already exists (use --force to overwrite)", path.display()),
        )));
    }

    let adapter = FileConfigAdapter::from_settings(
        &BacktestConfig::default(),
        &StrategyConfig::preset(pattern),
    );
    adapter.save(path)?;
    info!(path = %path.display(), %pattern, "wrote default configuration");
    Ok(())
}
