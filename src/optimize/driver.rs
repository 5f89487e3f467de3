use crate::engine::ExecutionContext;
use crate::optimize::elite::{EliteBuffer, TrialResult, TrialSummary};
use crate::optimize::evaluator::TrialEvaluator;
use crate::optimize::events::{ProgressSink, SearchEvent};
use crate::optimize::objective::{Direction, Objective};
use crate::optimize::params::{ParamValues, ParameterSet};
use crate::optimize::run::SearchError;
use crate::optimize::sampler::Sampler;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

//shape of one search run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    pub objective: Objective,
    pub n_trials: usize,
    pub top_n: usize,
    pub batch_size: usize,

    //worker threads, none means available parallelism
    #[serde(default)]
    pub workers: Option<usize>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            objective: Objective::SharpeRatio,
            n_trials: 100,
            top_n: 10,
            batch_size: 10,
            workers: None,
        }
    }
}

//ranked outcome of a search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchReport {
    pub objective: Objective,
    pub direction: Direction,
    pub requested_trials: usize,
    pub completed: usize,
    pub cancelled: bool,

    //best score among successful trials
    pub best_score: Option<f64>,
    pub best_params: Option<ParamValues>,

    //one per completed trial, in dispatch order
    pub summaries: Vec<TrialSummary>,

    //best first, ranks 1..=k
    pub elite: Vec<TrialResult>,
    pub mean_trial_ms: f64,
}

impl SearchReport {
    //number of trials that produced metrics
    pub fn successful_trials(&self) -> usize {
        self.summaries.iter().filter(|s| s.error.is_none()).count()
    }
}

//state after a finished batch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchProgress {
    pub completed: usize,
    pub total: usize,
    pub best_score: Option<f64>,
}

//runs trials batch by batch on a worker pool
//each step() is one batch, callers regain control in between
pub struct SearchDriver<'a> {
    evaluator: TrialEvaluator<'a>,
    sampler: Box<dyn Sampler>,
    context: ExecutionContext,
    config: SearchConfig,
    pool: rayon::ThreadPool,

    //shared with workers
    elite: Mutex<EliteBuffer>,
    completed: AtomicUsize,

    dispatched: usize,
    summaries: Vec<TrialSummary>,
    best_score: Option<f64>,
    cancel: Arc<AtomicBool>,
    cancelled: bool,
}

impl<'a> SearchDriver<'a> {
    pub fn new(
        evaluator: TrialEvaluator<'a>,
        sampler: Box<dyn Sampler>,
        context: ExecutionContext,
        config: SearchConfig,
        cancel: Arc<AtomicBool>,
    ) -> Result<Self, SearchError> {
        let workers = config.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .build()
            .map_err(|e| SearchError::ThreadPool(e.to_string()))?;

        debug!(workers, "search worker pool ready");

        Ok(SearchDriver {
            elite: Mutex::new(EliteBuffer::new(config.top_n, config.objective.direction())),
            evaluator,
            sampler,
            context,
            config,
            pool,
            completed: AtomicUsize::new(0),
            dispatched: 0,
            summaries: Vec::with_capacity(config.n_trials),
            best_score: None,
            cancel,
            cancelled: false,
        })
    }

    pub fn direction(&self) -> Direction {
        self.config.objective.direction()
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.cancelled || self.dispatched >= self.config.n_trials
    }

    pub fn best_score(&self) -> Option<f64> {
        self.best_score
    }

    //runs the next batch, none once all trials ran or cancellation was seen
    pub fn step(&mut self) -> Option<BatchProgress> {
        if self.is_finished() {
            return None;
        }

        if self.cancel.load(Ordering::SeqCst) {
            info!(completed = self.completed(), "search cancelled at batch boundary");
            self.cancelled = true;
            return None;
        }

        let batch = self.config.batch_size.min(self.config.n_trials - self.dispatched);

        //every proposal of the batch is asked before any trial runs
        let mut proposals = Vec::with_capacity(batch);
        for i in 0..batch {
            let values = self.sampler.ask();
            proposals.push((self.dispatched + i, ParameterSet::new(values, self.context)));
        }
        self.dispatched += batch;

        let evaluator = &self.evaluator;
        let elite = &self.elite;
        let completed = &self.completed;

        let summaries: Vec<TrialSummary> = self.pool.install(|| {
            proposals
                .into_par_iter()
                .map(|(trial_id, params)| {
                    let outcome = evaluator.evaluate(trial_id, params);
                    let summary = TrialSummary::from(&outcome);

                    //full results are built outside the lock, offer re-checks admission
                    if outcome.is_rankable() && admits(elite, outcome.score, trial_id) {
                        if let Some(result) = TrialResult::from_outcome(outcome) {
                            elite
                                .lock()
                                .unwrap_or_else(PoisonError::into_inner)
                                .offer(result);
                        }
                    }

                    completed.fetch_add(1, Ordering::SeqCst);
                    summary
                })
                .collect()
        });

        //feedback in dispatch order keeps the sampler deterministic
        let direction = self.direction();
        for summary in &summaries {
            self.sampler.tell(&summary.params, summary.score);

            if summary.error.is_none() && summary.score.is_finite() {
                let better = match self.best_score {
                    Some(best) => direction.is_better(summary.score, best),
                    None => true,
                };
                if better {
                    self.best_score = Some(summary.score);
                }
            }

            if summary.trial_id == 0 {
                info!(elapsed_ms = summary.elapsed_ms, "first trial finished");
            }
        }

        self.summaries.extend(summaries);

        let progress = BatchProgress {
            completed: self.completed(),
            total: self.config.n_trials,
            best_score: self.best_score,
        };
        debug!(
            completed = progress.completed,
            total = progress.total,
            best = ?progress.best_score,
            "batch finished"
        );

        Some(progress)
    }

    //drives every batch, streaming events to the sink
    pub fn run(mut self, sink: &mut dyn ProgressSink) -> SearchReport {
        sink.emit(SearchEvent::log(format!(
            "starting search: {} trials of {} over {} bars, batch {}, {}",
            self.config.n_trials,
            self.config.objective,
            self.evaluator.bars().len(),
            self.config.batch_size,
            match self.direction() {
                Direction::Maximize => "maximize",
                Direction::Minimize => "minimize",
            }
        )));

        while let Some(progress) = self.step() {
            let best = progress
                .best_score
                .map(|s| format!(", best {}={:.4}", self.config.objective, s))
                .unwrap_or_default();

            let event = SearchEvent::progress(progress.completed, progress.total, progress.best_score);
            if let SearchEvent::Progress { percent, .. } = &event {
                let message = format!(
                    "[{:3}%] completed {}/{} trials{}",
                    percent, progress.completed, progress.total, best
                );
                sink.emit(event.clone());
                sink.emit(SearchEvent::log(message));
            }
        }

        if self.cancelled {
            sink.emit(SearchEvent::log(format!(
                "search cancelled after {} of {} trials",
                self.completed(),
                self.config.n_trials
            )));
        }

        let report = self.finish();
        sink.emit(SearchEvent::log(format!(
            "search finished: {} valid of {} trials, returning top {}",
            report.successful_trials(),
            report.completed,
            report.elite.len()
        )));
        sink.emit(SearchEvent::Result {
            report: Box::new(report.clone()),
        });

        report
    }

    //ranks the elite buffer and builds the report
    pub fn finish(self) -> SearchReport {
        let elite = self
            .elite
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .into_ranked();

        let times: Vec<f64> = self.summaries.iter().map(|s| s.elapsed_ms).collect();
        let mean_trial_ms = if times.is_empty() {
            0.0
        } else {
            times.iter().sum::<f64>() / times.len() as f64
        };

        if let Some((first, rest)) = times.split_first() {
            let rest_ms = rest.iter().sum::<f64>() / rest.len().max(1) as f64;
            info!(
                trials = times.len(),
                first_ms = *first,
                rest_mean_ms = rest_ms,
                "trial timing"
            );
        }

        SearchReport {
            objective: self.config.objective,
            direction: self.config.objective.direction(),
            requested_trials: self.config.n_trials,
            completed: self.completed.load(Ordering::SeqCst),
            cancelled: self.cancelled,
            best_score: self.best_score,
            best_params: elite.first().map(|e| e.params.clone()),
            summaries: self.summaries,
            elite,
            mean_trial_ms,
        }
    }
}

fn admits(elite: &Mutex<EliteBuffer>, score: f64, trial_id: usize) -> bool {
    elite
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .would_admit(score, trial_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Bar, BarSeries};
    use crate::optimize::params::ParamRange;
    use crate::optimize::sampler::SamplerKind;
    use crate::strategy::BuiltinStrategy;

    fn bars() -> BarSeries {
        let bars = (0..200)
            .map(|i| {
                let p = 100.0 + (i as f64 / 7.0).sin() * 15.0 + i as f64 * 0.05;
                Bar::new_unchecked(i as i64 * 86_400, p, p, p, p, 1.0)
            })
            .collect();
        BarSeries::new(bars).unwrap()
    }

    fn make_driver<'a>(bars: &'a BarSeries, config: SearchConfig, cancel: Arc<AtomicBool>) -> SearchDriver<'a> {
        let ranges = vec![ParamRange::int("fast", 2, 10, 1), ParamRange::int("slow", 12, 40, 1)];
        let evaluator = TrialEvaluator::new(
            bars,
            BuiltinStrategy::SmaCross.decision(),
            None,
            config.objective,
        );
        let sampler = SamplerKind::Tpe.build(ranges, config.objective.direction(), 42);
        SearchDriver::new(evaluator, sampler, ExecutionContext::default(), config, cancel).unwrap()
    }

    impl SearchDriver<'_> {
        fn finish_all(mut self) -> SearchReport {
            while self.step().is_some() {}
            self.finish()
        }
    }

    #[test]
    fn steps_batch_by_batch() {
        let bars = bars();
        let config = SearchConfig {
            n_trials: 25,
            batch_size: 10,
            workers: Some(2),
            ..SearchConfig::default()
        };
        let mut driver = make_driver(&bars, config, Arc::new(AtomicBool::new(false)));

        let completed: Vec<usize> = std::iter::from_fn(|| driver.step().map(|p| p.completed)).collect();
        assert_eq!(completed, vec![10, 20, 25]);
        assert!(driver.is_finished());
        assert!(driver.step().is_none());
    }

    #[test]
    fn cancellation_stops_at_next_batch() {
        let bars = bars();
        let cancel = Arc::new(AtomicBool::new(false));
        let config = SearchConfig {
            n_trials: 50,
            batch_size: 5,
            workers: Some(2),
            ..SearchConfig::default()
        };
        let mut driver = make_driver(&bars, config, cancel.clone());

        assert!(driver.step().is_some());
        cancel.store(true, Ordering::SeqCst);
        assert!(driver.step().is_none());

        let report = driver.finish();
        assert!(report.cancelled);
        assert_eq!(report.completed, 5);
        assert_eq!(report.summaries.len(), 5);
    }

    #[test]
    fn run_emits_progress_then_result() {
        let bars = bars();
        let config = SearchConfig {
            n_trials: 12,
            top_n: 3,
            batch_size: 4,
            workers: Some(3),
            objective: Objective::ProfitPct,
        };
        let driver = make_driver(&bars, config, Arc::new(AtomicBool::new(false)));

        let mut events = Vec::new();
        let report = driver.run(&mut |e: SearchEvent| events.push(e));

        let progress: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                SearchEvent::Progress { completed, .. } => Some(*completed),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![4, 8, 12]);
        assert!(matches!(events.last(), Some(SearchEvent::Result { .. })));

        assert_eq!(report.summaries.len(), 12);
        assert!(report.elite.len() <= 3);
        for (i, entry) in report.elite.iter().enumerate() {
            assert_eq!(entry.rank, Some(i + 1));
        }
        let ids: Vec<usize> = report.summaries.iter().map(|s| s.trial_id).collect();
        assert_eq!(ids, (0..12).collect::<Vec<_>>());
    }

    #[test]
    fn elite_holds_the_best_summaries_under_parallel_admission() {
        let bars = bars();
        let config = SearchConfig {
            n_trials: 40,
            top_n: 3,
            batch_size: 20,
            workers: Some(8),
            objective: Objective::ProfitPct,
        };
        let report = make_driver(&bars, config, Arc::new(AtomicBool::new(false))).finish_all();

        let mut expected: Vec<(f64, usize)> = report
            .summaries
            .iter()
            .filter(|s| s.error.is_none() && s.score.is_finite())
            .map(|s| (s.score, s.trial_id))
            .collect();
        expected.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        expected.truncate(3);

        let elite: Vec<(f64, usize)> = report.elite.iter().map(|e| (e.score, e.trial_id)).collect();
        assert_eq!(elite, expected);
    }
}
