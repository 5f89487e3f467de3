pub mod run_config;

pub use run_config::{BacktestConfiguration, OptimizeConfiguration};
