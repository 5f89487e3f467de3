pub mod summary;
pub mod timeseries;

pub use summary::Metrics;
pub use timeseries::{
    calculate_equity_curve, daily_equity, max_drawdown, trade_equity_curve, EquityPoint,
};
