use crate::data::BarSeries;
use crate::engine::SimulationResult;
use crate::metrics::timeseries::{calculate_returns, daily_equity, distinct_days, max_drawdown};
use crate::portfolio::Trade;
use chrono::DateTime;
use prettytable::{Cell, Row, Table};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;

//guards profit factor against a zero gross loss
const LOSS_EPSILON: f64 = 1e-9;

//trading days per year used to annualize sharpe
const TRADING_DAYS: f64 = 252.0;

//summary metrics for one simulation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,

    //percent, 0..=100
    pub win_rate: f64,

    //percent return on initial capital
    pub profit_pct: f64,
    pub profit_factor: f64,

    //percent, from the bar-level curve
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
    pub final_equity: f64,
    pub gross_profit: f64,

    //absolute value, 0 when there are no losses
    pub gross_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,

    //"YYYY-MM" of the exit time -> summed pnl
    pub monthly_pnl: BTreeMap<String, f64>,
}

impl Metrics {
    //metrics of a run that never traded
    pub fn neutral(initial_capital: f64) -> Self {
        Metrics {
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            win_rate: 0.0,
            profit_pct: 0.0,
            profit_factor: 0.0,
            max_drawdown: 0.0,
            sharpe_ratio: 0.0,
            final_equity: initial_capital,
            gross_profit: 0.0,
            gross_loss: 0.0,
            largest_win: 0.0,
            largest_loss: 0.0,
            monthly_pnl: BTreeMap::new(),
        }
    }

    //reduces a simulation over the given bars
    pub fn from_simulation(result: &SimulationResult, bars: &BarSeries) -> Self {
        Self::calculate(
            &result.trades,
            &result.equity_curve,
            &bars.times(),
            result.initial_capital,
            result.final_equity,
        )
    }

    //equity_curve and times are aligned, one value per bar
    pub fn calculate(
        trades: &[Trade],
        equity_curve: &[f64],
        times: &[i64],
        initial_capital: f64,
        final_equity: f64,
    ) -> Self {
        if trades.is_empty() {
            return Self::neutral(initial_capital);
        }

        let stats = calculate_trade_statistics(trades);

        let profit_pct = if initial_capital != 0.0 {
            (final_equity - initial_capital) / initial_capital * 100.0
        } else {
            0.0
        };

        Metrics {
            total_trades: trades.len(),
            winning_trades: stats.winning_trades,
            losing_trades: stats.losing_trades,
            win_rate: stats.winning_trades as f64 / trades.len() as f64 * 100.0,
            profit_pct,
            profit_factor: stats.gross_profit / stats.gross_loss.max(LOSS_EPSILON),
            max_drawdown: max_drawdown(equity_curve),
            sharpe_ratio: calculate_sharpe_ratio(times, equity_curve),
            final_equity,
            gross_profit: stats.gross_profit,
            gross_loss: stats.gross_loss,
            largest_win: stats.largest_win,
            largest_loss: stats.largest_loss,
            monthly_pnl: monthly_pnl(trades),
        }
    }

    //prints metrics in a formatted table
    pub fn pretty_print_table(&self) {
        let mut table = Table::new();

        table.add_row(Row::new(vec![Cell::new("Metric"), Cell::new("Value")]));

        let rows = [
            ("Final Equity", format!("${:.2}", self.final_equity)),
            ("Profit", format!("{:.2}%", self.profit_pct)),
            ("Max Drawdown", format!("{:.2}%", self.max_drawdown)),
            ("Sharpe Ratio", format!("{:.3}", self.sharpe_ratio)),
            ("Number of Trades", format!("{}", self.total_trades)),
            ("Win Rate", format!("{:.2}%", self.win_rate)),
            ("Profit Factor", format!("{:.3}", self.profit_factor)),
            ("Gross Profit", format!("${:.2}", self.gross_profit)),
            ("Gross Loss", format!("${:.2}", self.gross_loss)),
            ("Largest Win", format!("${:.2}", self.largest_win)),
            ("Largest Loss", format!("${:.2}", self.largest_loss)),
        ];

        for (name, value) in rows.iter() {
            table.add_row(Row::new(vec![Cell::new(name), Cell::new(value)]));
        }

        table.printstd();

        if !self.monthly_pnl.is_empty() {
            let mut monthly = Table::new();
            monthly.add_row(Row::new(vec![Cell::new("Month"), Cell::new("PnL")]));
            for (month, pnl) in &self.monthly_pnl {
                monthly.add_row(Row::new(vec![
                    Cell::new(month),
                    Cell::new(&format!("${:.2}", pnl)),
                ]));
            }
            monthly.printstd();
        }
    }
}

struct TradeStats {
    winning_trades: usize,
    losing_trades: usize,
    gross_profit: f64,
    gross_loss: f64,
    largest_win: f64,
    largest_loss: f64,
}

//a zero pnl trade counts as a loss
fn calculate_trade_statistics(trades: &[Trade]) -> TradeStats {
    let mut stats = TradeStats {
        winning_trades: 0,
        losing_trades: 0,
        gross_profit: 0.0,
        gross_loss: 0.0,
        largest_win: 0.0,
        largest_loss: 0.0,
    };

    for trade in trades {
        if trade.is_win() {
            stats.winning_trades += 1;
            stats.gross_profit += trade.pnl;
            stats.largest_win = stats.largest_win.max(trade.pnl);
        } else {
            stats.losing_trades += 1;
            stats.gross_loss += trade.pnl.abs();
            stats.largest_loss = stats.largest_loss.min(trade.pnl);
        }
    }

    stats
}

//annualized sharpe of daily resampled equity
fn calculate_sharpe_ratio(times: &[i64], equity_curve: &[f64]) -> f64 {
    if distinct_days(times) < 3 {
        return 0.0;
    }

    let daily = daily_equity(times, equity_curve);
    let returns = calculate_returns(&daily);
    if returns.len() < 2 {
        return 0.0;
    }

    let mean = returns.as_slice().mean();
    let std_dev = returns.as_slice().population_std_dev();

    if !std_dev.is_finite() || std_dev == 0.0 {
        return 0.0;
    }

    (mean / std_dev) * TRADING_DAYS.sqrt()
}

fn monthly_pnl(trades: &[Trade]) -> BTreeMap<String, f64> {
    let mut monthly = BTreeMap::new();
    for trade in trades {
        let Some(exit) = DateTime::from_timestamp(trade.exit_time, 0) else {
            continue;
        };
        *monthly.entry(exit.format("%Y-%m").to_string()).or_insert(0.0) += trade.pnl;
    }
    monthly
}
