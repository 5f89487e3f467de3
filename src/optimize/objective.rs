use crate::metrics::Metrics;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Maximize,
    Minimize,
}

impl Direction {
    //true if a beats b
    pub fn is_better(&self, a: f64, b: f64) -> bool {
        match self {
            Direction::Maximize => a > b,
            Direction::Minimize => a < b,
        }
    }

    //score given to a trial that could not be evaluated
    pub fn sentinel(&self) -> f64 {
        match self {
            Direction::Maximize => f64::NEG_INFINITY,
            Direction::Minimize => f64::INFINITY,
        }
    }

    //orders better scores first
    pub fn compare(&self, a: f64, b: f64) -> Ordering {
        if self.is_better(a, b) {
            Ordering::Less
        } else if self.is_better(b, a) {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    }
}

//metric a search optimizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    TotalTrades,
    WinRate,
    ProfitPct,
    ProfitFactor,
    MaxDrawdown,
    SharpeRatio,
    FinalEquity,
    GrossProfit,
    GrossLoss,
}

impl Objective {
    pub const ALL: [Objective; 9] = [
        Objective::TotalTrades,
        Objective::WinRate,
        Objective::ProfitPct,
        Objective::ProfitFactor,
        Objective::MaxDrawdown,
        Objective::SharpeRatio,
        Objective::FinalEquity,
        Objective::GrossProfit,
        Objective::GrossLoss,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        Objective::ALL.into_iter().find(|o| o.as_str() == s)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Objective::TotalTrades => "total_trades",
            Objective::WinRate => "win_rate",
            Objective::ProfitPct => "profit_pct",
            Objective::ProfitFactor => "profit_factor",
            Objective::MaxDrawdown => "max_drawdown",
            Objective::SharpeRatio => "sharpe_ratio",
            Objective::FinalEquity => "final_equity",
            Objective::GrossProfit => "gross_profit",
            Objective::GrossLoss => "gross_loss",
        }
    }

    //drawdown is the only metric where lower is better
    pub fn direction(&self) -> Direction {
        match self {
            Objective::MaxDrawdown => Direction::Minimize,
            _ => Direction::Maximize,
        }
    }

    pub fn value(&self, metrics: &Metrics) -> f64 {
        match self {
            Objective::TotalTrades => metrics.total_trades as f64,
            Objective::WinRate => metrics.win_rate,
            Objective::ProfitPct => metrics.profit_pct,
            Objective::ProfitFactor => metrics.profit_factor,
            Objective::MaxDrawdown => metrics.max_drawdown,
            Objective::SharpeRatio => metrics.sharpe_ratio,
            Objective::FinalEquity => metrics.final_equity,
            Objective::GrossProfit => metrics.gross_profit,
            Objective::GrossLoss => metrics.gross_loss,
        }
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_drawdown_minimizes() {
        for objective in Objective::ALL {
            let expected = if objective == Objective::MaxDrawdown {
                Direction::Minimize
            } else {
                Direction::Maximize
            };
            assert_eq!(objective.direction(), expected);
        }
    }

    #[test]
    fn sentinels_lose_every_comparison() {
        for direction in [Direction::Maximize, Direction::Minimize] {
            let sentinel = direction.sentinel();
            assert!(direction.is_better(0.0, sentinel));
            assert!(!direction.is_better(sentinel, -1e300));
            assert!(!direction.is_better(sentinel, 1e300));
        }
    }

    #[test]
    fn parses_names() {
        assert_eq!(Objective::parse("Sharpe_Ratio"), Some(Objective::SharpeRatio));
        assert_eq!(Objective::parse("sortino"), None);
        let parsed: Objective = serde_json::from_str("\"max_drawdown\"").unwrap();
        assert_eq!(parsed, Objective::MaxDrawdown);
    }

    #[test]
    fn compare_sorts_best_first() {
        let mut scores = vec![1.0, 3.0, 2.0];
        scores.sort_by(|a, b| Direction::Minimize.compare(*a, *b));
        assert_eq!(scores, vec![1.0, 2.0, 3.0]);
        scores.sort_by(|a, b| Direction::Maximize.compare(*a, *b));
        assert_eq!(scores, vec![3.0, 2.0, 1.0]);
    }
}
