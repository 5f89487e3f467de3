use anyhow::{Context, Result};
use chrono::DateTime;
use clap::{Parser, Subcommand};
use optibar::prelude::*;
use prettytable::{Cell, Row, Table};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "optibar")]
#[command(about = "A Rust-based bar backtesting and parameter search engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    //run a single backtest
    Run {
        //json configuration, flags below override its values
        #[arg(long)]
        config: Option<PathBuf>,

        //path to csv data file
        #[arg(long)]
        data: Option<PathBuf>,

        //symbol to keep from the csv (eg BTCUSDT)
        #[arg(long)]
        symbol: Option<String>,

        //strategy (sma_cross, ema_cross, rsi_reversion)
        #[arg(long)]
        strategy: Option<String>,

        //first bar time, epoch seconds
        #[arg(long)]
        start: Option<i64>,

        //last bar time, epoch seconds
        #[arg(long)]
        end: Option<i64>,

        //fast period (for crossover strategies)
        #[arg(long)]
        fast: Option<i64>,

        //slow period (for crossover strategies)
        #[arg(long)]
        slow: Option<i64>,

        //rsi lookback period (for rsi strategy)
        #[arg(long)]
        rsi_period: Option<i64>,

        //rsi lower threshold (for rsi strategy)
        #[arg(long)]
        oversold: Option<f64>,

        //rsi upper threshold (for rsi strategy)
        #[arg(long)]
        overbought: Option<f64>,

        //reverse into shorts instead of going flat
        #[arg(long)]
        allow_short: bool,

        //initial account capital
        #[arg(long)]
        initial_capital: Option<f64>,

        //commission value, fraction for percent mode (0.001 == 0.1%)
        #[arg(long)]
        commission: Option<f64>,

        //commission type (percent, fixed)
        #[arg(long)]
        commission_type: Option<String>,

        //quantity value
        #[arg(long)]
        qty: Option<f64>,

        //quantity type (percent_of_equity, cash, fixed_units)
        #[arg(long)]
        qty_type: Option<String>,

        //output path for equity curve csv
        #[arg(long)]
        output_equity_csv: Option<PathBuf>,

        //output path for trades csv
        #[arg(long)]
        output_trades_csv: Option<PathBuf>,
    },

    //search strategy parameters
    Optimize {
        //json configuration (see `optibar template`)
        #[arg(long)]
        config: PathBuf,

        //path to csv data file
        #[arg(long)]
        data: Option<PathBuf>,

        //number of trials
        #[arg(long)]
        trials: Option<usize>,

        //number of ranked results to keep
        #[arg(long)]
        top_n: Option<usize>,

        //metric to optimize (eg sharpe_ratio, max_drawdown)
        #[arg(long)]
        objective: Option<String>,

        //sampler (tpe, random)
        #[arg(long)]
        sampler: Option<String>,

        //sampler seed
        #[arg(long)]
        seed: Option<u64>,

        //worker threads
        #[arg(long)]
        workers: Option<usize>,

        //output path for the json report
        #[arg(long)]
        output: Option<PathBuf>,
    },

    //write a default configuration file
    Template {
        //where to write the configuration
        #[arg(long, default_value = "optimize.json")]
        output: PathBuf,

        //write a backtest configuration instead of an optimize one
        #[arg(long)]
        backtest: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            data,
            symbol,
            strategy,
            start,
            end,
            fast,
            slow,
            rsi_period,
            oversold,
            overbought,
            allow_short,
            initial_capital,
            commission,
            commission_type,
            qty,
            qty_type,
            output_equity_csv,
            output_trades_csv,
        } => {
            let mut cfg = match config {
                Some(path) => BacktestConfiguration::from_json_file(&path)
                    .context(format!("Failed to read configuration {:?}", path))?,
                None => BacktestConfiguration::default(),
            };

            if let Some(data) = data {
                cfg.data_path = data;
            }
            if let Some(symbol) = symbol {
                cfg.fetch.symbol = symbol;
            }
            if let Some(name) = strategy {
                cfg.strategy = BuiltinStrategy::parse(&name)
                    .ok_or_else(|| anyhow::anyhow!("Unknown strategy: {}", name))?;
            }
            cfg.fetch.start = start.or(cfg.fetch.start);
            cfg.fetch.end = end.or(cfg.fetch.end);

            let int_params = [("fast_period", fast), ("slow_period", slow), ("rsi_period", rsi_period)];
            for (name, value) in int_params {
                if let Some(v) = value {
                    cfg.params.insert(name.to_string(), ParamValue::Int(v));
                }
            }
            let float_params = [("oversold", oversold), ("overbought", overbought)];
            for (name, value) in float_params {
                if let Some(v) = value {
                    cfg.params.insert(name.to_string(), ParamValue::Float(v));
                }
            }
            if allow_short {
                cfg.params.insert("allow_short".to_string(), ParamValue::Int(1));
            }

            if let Some(v) = initial_capital {
                cfg.context.initial_capital = v;
            }
            if let Some(v) = commission {
                cfg.context.commission_value = v;
            }
            if let Some(name) = commission_type {
                cfg.context.commission_type = CommissionType::parse(&name)
                    .ok_or_else(|| anyhow::anyhow!("Unknown commission type: {}", name))?;
            }
            if let Some(v) = qty {
                cfg.context.quantity_value = v;
            }
            if let Some(name) = qty_type {
                cfg.context.quantity_type = QuantityType::parse(&name)
                    .ok_or_else(|| anyhow::anyhow!("Unknown quantity type: {}", name))?;
            }
            if output_equity_csv.is_some() {
                cfg.output_equity_csv = output_equity_csv;
            }
            if output_trades_csv.is_some() {
                cfg.output_trades_csv = output_trades_csv;
            }

            run_backtest(&cfg)?;
        }
        Commands::Optimize {
            config,
            data,
            trials,
            top_n,
            objective,
            sampler,
            seed,
            workers,
            output,
        } => {
            let mut cfg = OptimizeConfiguration::from_json_file(&config)
                .context(format!("Failed to read configuration {:?}", config))?;

            if let Some(data) = data {
                cfg.data_path = data;
            }
            if let Some(n) = trials {
                cfg.search.n_trials = n;
            }
            if let Some(n) = top_n {
                cfg.search.top_n = n;
            }
            if let Some(name) = objective {
                cfg.search.objective = Objective::parse(&name)
                    .ok_or_else(|| anyhow::anyhow!("Unknown objective: {}", name))?;
            }
            if let Some(name) = sampler {
                cfg.search.sampler = SamplerKind::parse(&name)
                    .ok_or_else(|| anyhow::anyhow!("Unknown sampler: {}", name))?;
            }
            if let Some(seed) = seed {
                cfg.search.seed = seed;
            }
            cfg.search.workers = workers.or(cfg.search.workers);
            if output.is_some() {
                cfg.output_report_json = output;
            }

            run_optimize(&cfg)?;
        }
        Commands::Template { output, backtest } => {
            if backtest {
                BacktestConfiguration::default().to_json_file(&output)?;
            } else {
                OptimizeConfiguration::default().to_json_file(&output)?;
            }
            println!("Configuration written to {:?}", output);
        }
    }

    Ok(())
}

fn format_time(time: i64) -> String {
    DateTime::from_timestamp(time, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| time.to_string())
}

fn run_backtest(cfg: &BacktestConfiguration) -> Result<()> {
    cfg.context
        .validate()
        .map_err(anyhow::Error::msg)
        .context("Invalid execution settings")?;

    println!("optibar Backtesting Engine");
    println!("==========================\n");

    //load data
    println!("Loading data from {:?}...", cfg.data_path);
    let source = CsvBarSource::new(&cfg.data_path);
    let bars = source
        .fetch(&cfg.fetch)
        .context(format!("Failed to load data from {:?}", cfg.data_path))?;

    println!("Loaded {} bars for {}", bars.len(), cfg.fetch.symbol);
    if let (Some(first), Some(last)) = (bars.first_time(), bars.last_time()) {
        println!("Date range: {} to {}\n", format_time(first), format_time(last));
    }

    let decision = cfg.strategy.decision();
    let params = ParameterSet::new(cfg.params.clone(), cfg.context);

    println!("Strategy: {}", decision.name());
    for (name, value) in &cfg.params {
        println!("  {} = {}", name, value);
    }
    println!("Initial capital: ${:.2}", cfg.context.initial_capital);
    println!(
        "Commission: {} ({:?})",
        cfg.context.commission_value, cfg.context.commission_type
    );
    println!(
        "Quantity: {} ({:?})\n",
        cfg.context.quantity_value, cfg.context.quantity_type
    );

    //run backtest
    println!("Running backtest...\n");
    let result = Simulator::new(&bars, cfg.context)
        .run(decision.as_ref(), &params)
        .context("Backtest failed")?;
    let metrics = Metrics::from_simulation(&result, &bars);

    //display results
    println!("Backtest Results");
    println!("================\n");
    metrics.pretty_print_table();

    //save outputs if requested
    if let Some(equity_path) = &cfg.output_equity_csv {
        let curve = calculate_equity_curve(&bars.times(), &result.equity_curve);
        save_equity_csv(&curve, equity_path)?;
        println!("\nEquity curve saved to {:?}", equity_path);
    }

    if let Some(trades_path) = &cfg.output_trades_csv {
        save_trades_csv(&result.trades, trades_path)?;
        println!("Trades saved to {:?}", trades_path);
    }

    Ok(())
}

fn run_optimize(cfg: &OptimizeConfiguration) -> Result<()> {
    println!("optibar Parameter Search");
    println!("========================\n");

    let source = CsvBarSource::new(&cfg.data_path);
    let compiler = BuiltinCompiler;
    let cancel = Arc::new(AtomicBool::new(false));

    let mut print_event = |event: SearchEvent| match event {
        SearchEvent::Log { message } => println!("{}", message),
        SearchEvent::Error { message } => eprintln!("error: {}", message),
        SearchEvent::Progress { .. } | SearchEvent::Result { .. } => {}
    };

    let report = run_search(&cfg.search, &source, &compiler, cancel, &mut print_event)
        .context("Parameter search failed")?;

    println!("\nRanked Results ({})", report.objective);
    println!("==============\n");
    print_ranked_table(&report);

    if let Some(best) = report.elite.first() {
        println!("\nBest trial #{} metrics", best.trial_id);
        best.metrics.pretty_print_table();
    }

    if let Some(path) = &cfg.output_report_json {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json).context(format!("Failed to write report {:?}", path))?;
        println!("\nReport saved to {:?}", path);
    }

    Ok(())
}

fn print_ranked_table(report: &SearchReport) {
    let mut table = Table::new();

    table.add_row(Row::new(vec![
        Cell::new("Rank"),
        Cell::new("Trial"),
        Cell::new("Params"),
        Cell::new(report.objective.as_str()),
        Cell::new("Trades"),
        Cell::new("Win Rate"),
        Cell::new("Profit"),
        Cell::new("Max DD"),
    ]));

    for entry in &report.elite {
        let params = entry
            .params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ");

        table.add_row(Row::new(vec![
            Cell::new(&entry.rank.map(|r| r.to_string()).unwrap_or_default()),
            Cell::new(&entry.trial_id.to_string()),
            Cell::new(&params),
            Cell::new(&format!("{:.4}", entry.score)),
            Cell::new(&entry.metrics.total_trades.to_string()),
            Cell::new(&format!("{:.2}%", entry.metrics.win_rate)),
            Cell::new(&format!("{:.2}%", entry.metrics.profit_pct)),
            Cell::new(&format!("{:.2}%", entry.metrics.max_drawdown)),
        ]));
    }

    table.printstd();
    println!(
        "{} of {} trials succeeded, mean {:.1} ms/trial{}",
        report.successful_trials(),
        report.completed,
        report.mean_trial_ms,
        if report.cancelled { " (cancelled)" } else { "" }
    );
}

fn save_equity_csv(equity_curve: &[EquityPoint], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for point in equity_curve {
        writer.serialize(point)?;
    }
    writer.flush()?;
    Ok(())
}

fn save_trades_csv(trades: &[Trade], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for trade in trades {
        writer.serialize(trade)?;
    }
    writer.flush()?;
    Ok(())
}
