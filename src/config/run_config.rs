use crate::data::FetchRequest;
use crate::engine::ExecutionContext;
use crate::optimize::{Objective, ParamRange, ParamValue, ParamValues, SamplerKind, SearchRequest};
use crate::strategy::BuiltinStrategy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

//single backtest configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfiguration {
    //data
    pub data_path: PathBuf,
    pub fetch: FetchRequest,

    //strategy and its parameter values
    pub strategy: BuiltinStrategy,
    #[serde(default)]
    pub params: ParamValues,

    //sizing and commission
    #[serde(default)]
    pub context: ExecutionContext,

    //optional output paths
    #[serde(default)]
    pub output_equity_csv: Option<PathBuf>,
    #[serde(default)]
    pub output_trades_csv: Option<PathBuf>,
}

impl Default for BacktestConfiguration {
    fn default() -> Self {
        let mut params = ParamValues::new();
        params.insert("fast_period".to_string(), ParamValue::Int(10));
        params.insert("slow_period".to_string(), ParamValue::Int(30));

        BacktestConfiguration {
            data_path: PathBuf::from("data.csv"),
            fetch: FetchRequest::new("BTCUSDT"),
            strategy: BuiltinStrategy::SmaCross,
            params,
            context: ExecutionContext::default(),
            output_equity_csv: None,
            output_trades_csv: None,
        }
    }
}

impl BacktestConfiguration {
    //load configuration from a JSON file
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: BacktestConfiguration = serde_json::from_str(&contents)?;
        Ok(config)
    }

    //save configuration to a JSON file
    pub fn to_json_file(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

//parameter search configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizeConfiguration {
    pub data_path: PathBuf,

    #[serde(flatten)]
    pub search: SearchRequest,

    //where to write the full json report
    #[serde(default)]
    pub output_report_json: Option<PathBuf>,
}

impl Default for OptimizeConfiguration {
    fn default() -> Self {
        OptimizeConfiguration {
            data_path: PathBuf::from("data.csv"),
            search: SearchRequest {
                fetch: FetchRequest::new("BTCUSDT"),
                script: BuiltinStrategy::SmaCross.as_str().to_string(),
                ranges: vec![
                    ParamRange::around_default("fast_period", 10.0, true),
                    ParamRange::around_default("slow_period", 30.0, true),
                ],
                objective: Objective::SharpeRatio,
                n_trials: 100,
                top_n: 10,
                batch_size: 10,
                workers: None,
                sampler: SamplerKind::Tpe,
                seed: 42,
                context: ExecutionContext::default(),
            },
            output_report_json: None,
        }
    }
}

impl OptimizeConfiguration {
    //load configuration from a JSON file
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: OptimizeConfiguration = serde_json::from_str(&contents)?;
        Ok(config)
    }

    //save configuration to a JSON file
    pub fn to_json_file(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
