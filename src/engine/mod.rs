pub mod backtest;
pub mod execution;

pub use backtest::{SimState, SimulationResult, Simulator};
pub use execution::{CommissionType, ExecutionContext, ExecutionEngine, PendingOrder, QuantityType};
