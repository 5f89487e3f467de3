//a Rust-based bar backtesting and parameter search engine

pub mod config;
pub mod data;
pub mod engine;
pub mod metrics;
pub mod optimize;
pub mod portfolio;
pub mod strategy;

//prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{BacktestConfiguration, OptimizeConfiguration};
    pub use crate::data::{filter_by_symbol, load_csv, Bar, BarSeries, BarSource, CsvBarSource, FetchRequest};
    pub use crate::engine::{
        CommissionType, ExecutionContext, ExecutionEngine, QuantityType, SimState, SimulationResult,
        Simulator,
    };
    pub use crate::metrics::{calculate_equity_curve, trade_equity_curve, EquityPoint, Metrics};
    pub use crate::optimize::{
        run_search, Direction, Objective, ParamRange, ParamValue, ParamValues, ParameterSet,
        ProgressSink, SamplerKind, SearchEvent, SearchReport, SearchRequest,
    };
    pub use crate::portfolio::{Account, Position, Side, Trade};
    pub use crate::strategy::{
        BuiltinCompiler, BuiltinStrategy, DecisionFn, RawSignals, Strategy, StrategyCompiler,
        StrategyContext, StrategyError,
    };
}
