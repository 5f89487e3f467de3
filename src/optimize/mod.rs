pub mod driver;
pub mod elite;
pub mod evaluator;
pub mod events;
pub mod objective;
pub mod params;
pub mod run;
pub mod sampler;

pub use driver::{BatchProgress, SearchConfig, SearchDriver, SearchReport};
pub use elite::{EliteBuffer, TrialResult, TrialSummary};
pub use evaluator::{TrialError, TrialEvaluator, TrialOutcome, TrialRun};
pub use events::{ProgressSink, SearchEvent};
pub use objective::{Direction, Objective};
pub use params::{ParamRange, ParamValue, ParamValues, ParameterSet};
pub use run::{run_search, SearchError, SearchRequest, MIN_BARS};
pub use sampler::{RandomSampler, Sampler, SamplerKind, TpeSampler};
