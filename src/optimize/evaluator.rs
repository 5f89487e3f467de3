use crate::data::BarSeries;
use crate::engine::{SimulationResult, Simulator};
use crate::metrics::Metrics;
use crate::optimize::objective::Objective;
use crate::optimize::params::ParameterSet;
use crate::strategy::{DecisionFn, StrategyError};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

//why a single trial produced no metrics
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum TrialError {
    #[error("strategy runtime error: {0}")]
    StrategyRuntime(String),
    #[error("strategy type error: {0}")]
    StrategyType(String),
    #[error("insufficient data: {0}")]
    InsufficientData(String),
}

impl From<StrategyError> for TrialError {
    fn from(err: StrategyError) -> Self {
        match err {
            StrategyError::Runtime(msg) => TrialError::StrategyRuntime(msg),
            StrategyError::Type(msg) => TrialError::StrategyType(msg),
            e @ StrategyError::InsufficientData { .. } => TrialError::InsufficientData(e.to_string()),
        }
    }
}

//simulation and its metrics for one successful trial
#[derive(Debug, Clone)]
pub struct TrialRun {
    pub simulation: SimulationResult,
    pub metrics: Metrics,
}

#[derive(Debug, Clone)]
pub struct TrialOutcome {
    pub trial_id: usize,
    pub params: ParameterSet,
    pub result: Result<TrialRun, TrialError>,

    //objective value, or the direction's sentinel when unusable
    pub score: f64,

    //true when the reference strategy stood in for this trial
    pub used_fallback: bool,
    pub elapsed: Duration,
}

impl TrialOutcome {
    //successful with a comparable score
    pub fn is_rankable(&self) -> bool {
        self.result.is_ok() && !self.score.is_infinite()
    }
}

//runs one parameter set against shared read-only bars
pub struct TrialEvaluator<'a> {
    bars: &'a BarSeries,
    decision: Arc<dyn DecisionFn>,
    fallback: Option<Arc<dyn DecisionFn>>,
    objective: Objective,
}

impl<'a> TrialEvaluator<'a> {
    pub fn new(
        bars: &'a BarSeries,
        decision: Arc<dyn DecisionFn>,
        fallback: Option<Arc<dyn DecisionFn>>,
        objective: Objective,
    ) -> Self {
        TrialEvaluator {
            bars,
            decision,
            fallback,
            objective,
        }
    }

    pub fn bars(&self) -> &BarSeries {
        self.bars
    }

    //never fails: errors become a sentinel score on the outcome
    pub fn evaluate(&self, trial_id: usize, params: ParameterSet) -> TrialOutcome {
        let started = Instant::now();
        let mut used_fallback = false;

        let mut result = self.run_once(self.decision.as_ref(), &params);

        //structural incompatibility gets one retry with the reference strategy
        if let Err(TrialError::StrategyType(msg)) = &result {
            if let Some(fallback) = &self.fallback {
                warn!(
                    trial = trial_id,
                    error = %msg,
                    fallback = fallback.name(),
                    "decision function incompatible, retrying trial with fallback strategy"
                );
                used_fallback = true;
                result = self.run_once(fallback.as_ref(), &params);
            }
        }

        let direction = self.objective.direction();
        let score = match &result {
            Ok(run) => {
                let value = self.objective.value(&run.metrics);
                if value.is_nan() {
                    debug!(trial = trial_id, "objective is nan, scoring as sentinel");
                    direction.sentinel()
                } else {
                    value
                }
            }
            Err(e) => {
                debug!(trial = trial_id, error = %e, "trial failed");
                direction.sentinel()
            }
        };

        TrialOutcome {
            trial_id,
            params,
            result,
            score,
            used_fallback,
            elapsed: started.elapsed(),
        }
    }

    fn run_once(&self, decision: &dyn DecisionFn, params: &ParameterSet) -> Result<TrialRun, TrialError> {
        let simulator = Simulator::new(self.bars, params.context);

        let simulation = catch_unwind(AssertUnwindSafe(|| simulator.run(decision, params)))
            .map_err(|payload| TrialError::StrategyRuntime(panic_message(payload)))??;

        let metrics = Metrics::from_simulation(&simulation, self.bars);
        Ok(TrialRun {
            simulation,
            metrics,
        })
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    let detail = if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    };
    format!("decision function panicked: {}", detail)
}
