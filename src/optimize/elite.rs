use crate::metrics::{trade_equity_curve, Metrics};
use crate::optimize::evaluator::TrialOutcome;
use crate::optimize::objective::Direction;
use crate::optimize::params::ParamValues;
use crate::portfolio::Trade;
use serde::{Deserialize, Serialize};

//lightweight record kept for every trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialSummary {
    pub trial_id: usize,

    //searchable values only, execution fields are left out
    pub params: ParamValues,
    pub score: f64,
    pub metrics: Option<Metrics>,
    pub error: Option<String>,
    pub used_fallback: bool,
    pub elapsed_ms: f64,
}

impl From<&TrialOutcome> for TrialSummary {
    fn from(outcome: &TrialOutcome) -> Self {
        let (metrics, error) = match &outcome.result {
            Ok(run) => (Some(run.metrics.clone()), None),
            Err(e) => (None, Some(e.to_string())),
        };

        TrialSummary {
            trial_id: outcome.trial_id,
            params: outcome.params.values.clone(),
            score: outcome.score,
            metrics,
            error,
            used_fallback: outcome.used_fallback,
            elapsed_ms: outcome.elapsed.as_secs_f64() * 1_000.0,
        }
    }
}

//full record kept only while it ranks in the top n
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub trial_id: usize,

    //assigned when the buffer is ranked
    pub rank: Option<usize>,
    pub params: ParamValues,
    pub score: f64,
    pub metrics: Metrics,
    pub trades: Vec<Trade>,

    //one point per bar
    pub equity_curve: Vec<f64>,

    //initial capital then one point per trade
    pub trade_equity_curve: Vec<f64>,
}

impl TrialResult {
    //takes the full result out of a successful outcome
    pub fn from_outcome(outcome: TrialOutcome) -> Option<Self> {
        let run = outcome.result.ok()?;
        let simulation = run.simulation;

        Some(TrialResult {
            trial_id: outcome.trial_id,
            rank: None,
            params: outcome.params.values,
            score: outcome.score,
            metrics: run.metrics,
            trade_equity_curve: trade_equity_curve(simulation.initial_capital, &simulation.trades),
            trades: simulation.trades,
            equity_curve: simulation.equity_curve,
        })
    }
}

//bounded top-n of full trial results
//kept sorted best first, ties go to the earlier trial
#[derive(Debug, Clone)]
pub struct EliteBuffer {
    capacity: usize,
    direction: Direction,
    entries: Vec<TrialResult>,
}

impl EliteBuffer {
    pub fn new(capacity: usize, direction: Direction) -> Self {
        EliteBuffer {
            capacity,
            direction,
            entries: Vec::with_capacity(capacity + 1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    //score of the entry that would be evicted next, none until full
    pub fn bound(&self) -> Option<f64> {
        if self.entries.len() < self.capacity {
            return None;
        }
        self.entries.last().map(|e| e.score)
    }

    fn insert_position(&self, score: f64, trial_id: usize) -> usize {
        let direction = self.direction;
        self.entries.partition_point(|e| {
            direction.is_better(e.score, score) || (e.score == score && e.trial_id < trial_id)
        })
    }

    //true if a result with this score would be kept
    pub fn would_admit(&self, score: f64, trial_id: usize) -> bool {
        self.capacity > 0
            && !score.is_nan()
            && self.insert_position(score, trial_id) < self.capacity
    }

    //inserts and evicts the worst entry past capacity
    //returns false if the result was not kept
    pub fn offer(&mut self, result: TrialResult) -> bool {
        if !self.would_admit(result.score, result.trial_id) {
            return false;
        }

        let pos = self.insert_position(result.score, result.trial_id);
        self.entries.insert(pos, result);
        if self.entries.len() > self.capacity {
            self.entries.pop();
        }
        true
    }

    //entries best first with ranks 1..=k
    pub fn into_ranked(self) -> Vec<TrialResult> {
        self.entries
            .into_iter()
            .enumerate()
            .map(|(i, mut entry)| {
                entry.rank = Some(i + 1);
                entry
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(trial_id: usize, score: f64) -> TrialResult {
        TrialResult {
            trial_id,
            rank: None,
            params: ParamValues::new(),
            score,
            metrics: Metrics::neutral(10_000.0),
            trades: Vec::new(),
            equity_curve: Vec::new(),
            trade_equity_curve: vec![10_000.0],
        }
    }

    fn ids(buffer: &EliteBuffer) -> Vec<usize> {
        buffer.entries.iter().map(|e| e.trial_id).collect()
    }

    #[test]
    fn keeps_top_n_when_maximizing() {
        let mut buffer = EliteBuffer::new(3, Direction::Maximize);
        for (id, score) in [(0, 1.0), (1, 5.0), (2, 3.0), (3, 4.0), (4, 0.5)].into_iter() {
            buffer.offer(result(id, score));
        }
        assert_eq!(ids(&buffer), vec![1, 3, 2]);
        assert_eq!(buffer.bound(), Some(3.0));
        assert!(!buffer.would_admit(2.0, 9));
    }

    #[test]
    fn keeps_lowest_when_minimizing() {
        let mut buffer = EliteBuffer::new(2, Direction::Minimize);
        for (id, score) in [(0, 10.0), (1, 2.0), (2, 7.0)].into_iter() {
            buffer.offer(result(id, score));
        }
        assert_eq!(ids(&buffer), vec![1, 2]);
    }

    #[test]
    fn ties_rank_earlier_trial_first() {
        let mut buffer = EliteBuffer::new(3, Direction::Maximize);
        buffer.offer(result(4, 1.0));
        buffer.offer(result(2, 1.0));
        buffer.offer(result(7, 1.0));
        buffer.offer(result(5, 1.0));
        assert_eq!(ids(&buffer), vec![2, 4, 5]);
    }

    #[test]
    fn ranks_are_contiguous() {
        let mut buffer = EliteBuffer::new(5, Direction::Maximize);
        buffer.offer(result(0, 2.0));
        buffer.offer(result(1, 9.0));
        let ranked = buffer.into_ranked();
        assert_eq!(
            ranked.iter().map(|r| (r.trial_id, r.rank)).collect::<Vec<_>>(),
            vec![(1, Some(1)), (0, Some(2))]
        );
    }

    #[test]
    fn nan_is_never_admitted() {
        let mut buffer = EliteBuffer::new(2, Direction::Maximize);
        assert!(!buffer.offer(result(0, f64::NAN)));
        assert!(buffer.is_empty());
    }
}
