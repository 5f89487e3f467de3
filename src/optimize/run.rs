use crate::data::{BarSource, FetchError, FetchRequest};
use crate::engine::ExecutionContext;
use crate::optimize::driver::{SearchConfig, SearchDriver, SearchReport};
use crate::optimize::evaluator::TrialEvaluator;
use crate::optimize::events::{ProgressSink, SearchEvent};
use crate::optimize::objective::Objective;
use crate::optimize::params::ParamRange;
use crate::optimize::sampler::SamplerKind;
use crate::strategy::{CompileError, StrategyCompiler};
use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

//fewest bars a search will start on
pub const MIN_BARS: usize = 50;

//failures that abort a whole search before any trial runs
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("failed to fetch bars: {0}")]
    Fetch(#[from] FetchError),

    #[error("insufficient data: found {found} bars, need at least {required}")]
    InsufficientData { found: usize, required: usize },

    #[error("failed to compile strategy: {0}")]
    Compile(#[from] CompileError),

    #[error("invalid search request: {0}")]
    InvalidRequest(String),

    #[error("failed to start worker pool: {0}")]
    ThreadPool(String),
}

//everything a search needs besides its collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub fetch: FetchRequest,

    //reference handed to the strategy compiler
    pub script: String,
    pub ranges: Vec<ParamRange>,
    pub objective: Objective,
    pub n_trials: usize,
    pub top_n: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub sampler: SamplerKind,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub context: ExecutionContext,
}

fn default_batch_size() -> usize {
    10
}

fn default_seed() -> u64 {
    42
}

impl SearchRequest {
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.n_trials < 1 {
            return Err(SearchError::InvalidRequest("n_trials must be at least 1".into()));
        }
        if self.top_n < 1 {
            return Err(SearchError::InvalidRequest("top_n must be at least 1".into()));
        }
        if self.batch_size < 1 {
            return Err(SearchError::InvalidRequest("batch_size must be at least 1".into()));
        }
        if self.ranges.is_empty() {
            return Err(SearchError::InvalidRequest(
                "at least one parameter range is required".into(),
            ));
        }
        for range in &self.ranges {
            range.validate().map_err(SearchError::InvalidRequest)?;
        }
        self.context.validate().map_err(SearchError::InvalidRequest)?;
        Ok(())
    }

    pub fn config(&self) -> SearchConfig {
        SearchConfig {
            objective: self.objective,
            n_trials: self.n_trials,
            top_n: self.top_n,
            batch_size: self.batch_size,
            workers: self.workers,
        }
    }

    pub fn param_names(&self) -> Vec<String> {
        self.ranges.iter().map(|r| r.name.clone()).collect()
    }
}

//fetches bars, compiles the strategy and runs the whole search
//fatal errors are also sent to the sink as an error event
pub fn run_search(
    request: &SearchRequest,
    source: &dyn BarSource,
    compiler: &dyn StrategyCompiler,
    cancel: Arc<AtomicBool>,
    sink: &mut dyn ProgressSink,
) -> Result<SearchReport, SearchError> {
    match prepare_and_run(request, source, compiler, cancel, sink) {
        Ok(report) => Ok(report),
        Err(e) => {
            error!(error = %e, "search aborted");
            sink.emit(SearchEvent::Error {
                message: e.to_string(),
            });
            Err(e)
        }
    }
}

fn prepare_and_run(
    request: &SearchRequest,
    source: &dyn BarSource,
    compiler: &dyn StrategyCompiler,
    cancel: Arc<AtomicBool>,
    sink: &mut dyn ProgressSink,
) -> Result<SearchReport, SearchError> {
    request.validate()?;

    let bars = source.fetch(&request.fetch)?;
    if bars.len() < MIN_BARS {
        return Err(SearchError::InsufficientData {
            found: bars.len(),
            required: MIN_BARS,
        });
    }

    let decision = compiler.compile(&request.script, &request.param_names())?;

    info!(
        symbol = %request.fetch.symbol,
        bars = bars.len(),
        strategy = decision.name(),
        trials = request.n_trials,
        objective = %request.objective,
        "search starting"
    );

    sink.emit(SearchEvent::log(format!(
        "capital={} qty={} ({:?}) commission={} ({:?}) | bars: {} | trials: {}",
        request.context.initial_capital,
        request.context.quantity_value,
        request.context.quantity_type,
        request.context.commission_value,
        request.context.commission_type,
        bars.len(),
        request.n_trials
    )));

    let evaluator = TrialEvaluator::new(&bars, decision, compiler.fallback(), request.objective);
    let sampler = request
        .sampler
        .build(request.ranges.clone(), request.objective.direction(), request.seed);

    let driver = SearchDriver::new(evaluator, sampler, request.context, request.config(), cancel)?;
    Ok(driver.run(sink))
}
