use crate::optimize::objective::Direction;
use crate::optimize::params::{ParamRange, ParamValues};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

//proposes parameter values and learns from their scores
pub trait Sampler: Send {
    fn ask(&mut self) -> ParamValues;

    fn tell(&mut self, params: &ParamValues, score: f64);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplerKind {
    Random,
    #[default]
    Tpe,
}

impl SamplerKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "random" => Some(SamplerKind::Random),
            "tpe" | "bayesian" => Some(SamplerKind::Tpe),
            _ => None,
        }
    }

    pub fn build(&self, ranges: Vec<ParamRange>, direction: Direction, seed: u64) -> Box<dyn Sampler> {
        match self {
            SamplerKind::Random => Box::new(RandomSampler::new(ranges, seed)),
            SamplerKind::Tpe => Box::new(TpeSampler::new(ranges, direction, seed)),
        }
    }
}

fn draw(ranges: &[ParamRange], rng: &mut StdRng) -> ParamValues {
    ranges
        .iter()
        .map(|range| (range.name.clone(), range.sample(rng)))
        .collect()
}

//uniform sampling over every range
pub struct RandomSampler {
    ranges: Vec<ParamRange>,
    rng: StdRng,
}

impl RandomSampler {
    pub fn new(ranges: Vec<ParamRange>, seed: u64) -> Self {
        RandomSampler {
            ranges,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Sampler for RandomSampler {
    fn ask(&mut self) -> ParamValues {
        draw(&self.ranges, &mut self.rng)
    }

    fn tell(&mut self, _params: &ParamValues, _score: f64) {}
}

//tree-structured parzen estimator
//splits history into good and bad groups and proposes the candidate with the best l(x)/g(x)
pub struct TpeSampler {
    ranges: Vec<ParamRange>,
    direction: Direction,
    rng: StdRng,
    history: Vec<(ParamValues, f64)>,
    pub n_startup_trials: usize,
    pub gamma: f64,
    pub n_candidates: usize,
}

impl TpeSampler {
    pub fn new(ranges: Vec<ParamRange>, direction: Direction, seed: u64) -> Self {
        TpeSampler {
            ranges,
            direction,
            rng: StdRng::seed_from_u64(seed),
            history: Vec::new(),
            n_startup_trials: 10,
            gamma: 0.2,
            n_candidates: 24,
        }
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    fn sample_numerical(&mut self, range: &ParamRange, good: &[f64], bad: &[f64]) -> f64 {
        let sigma = 0.1 * range.span();
        if good.is_empty() || sigma <= 0.0 {
            return range.sample(&mut self.rng).as_f64();
        }

        let mut best_val = range.min;
        let mut best_ratio = f64::NEG_INFINITY;

        for _ in 0..self.n_candidates {
            let base = good[self.rng.random_range(0..good.len())];
            let candidate = match Normal::new(base, sigma) {
                Ok(normal) => normal.sample(&mut self.rng),
                Err(_) => base,
            };
            let candidate = range.quantize(candidate).as_f64();

            let lx = mixture_pdf(candidate, good, sigma);
            let gx = mixture_pdf(candidate, bad, sigma);

            let ratio = lx / (gx + 1e-10);
            if ratio > best_ratio {
                best_ratio = ratio;
                best_val = candidate;
            }
        }

        best_val
    }
}

impl Sampler for TpeSampler {
    fn ask(&mut self) -> ParamValues {
        if self.history.len() < self.n_startup_trials {
            return draw(&self.ranges, &mut self.rng);
        }

        //best first under the search direction
        let direction = self.direction;
        let mut sorted: Vec<&(ParamValues, f64)> = self.history.iter().collect();
        sorted.sort_by(|a, b| direction.compare(a.1, b.1));

        let n_good = ((sorted.len() as f64 * self.gamma).ceil() as usize).clamp(1, sorted.len());
        let (good, bad) = sorted.split_at(n_good);

        let column = |group: &[&(ParamValues, f64)], name: &str| -> Vec<f64> {
            group
                .iter()
                .filter_map(|(params, _)| params.get(name))
                .map(|v| v.as_f64())
                .collect()
        };

        let plan: Vec<(ParamRange, Vec<f64>, Vec<f64>)> = self
            .ranges
            .iter()
            .map(|range| (range.clone(), column(good, &range.name), column(bad, &range.name)))
            .collect();

        let mut suggested = ParamValues::new();
        for (range, good_vals, bad_vals) in plan {
            let value = self.sample_numerical(&range, &good_vals, &bad_vals);
            suggested.insert(range.name.clone(), range.quantize(value));
        }

        suggested
    }

    fn tell(&mut self, params: &ParamValues, score: f64) {
        //nan carries no ordering information
        let score = if score.is_nan() {
            self.direction.sentinel()
        } else {
            score
        };
        self.history.push((params.clone(), score));
    }
}

fn mixture_pdf(x: f64, centers: &[f64], sigma: f64) -> f64 {
    if centers.is_empty() {
        return 0.0;
    }
    centers.iter().map(|&c| gaussian_pdf(x, c, sigma)).sum::<f64>() / centers.len() as f64
}

fn gaussian_pdf(x: f64, mean: f64, sigma: f64) -> f64 {
    let exponent = -0.5 * ((x - mean) / sigma).powi(2);
    (1.0 / (sigma * (2.0 * std::f64::consts::PI).sqrt())) * exponent.exp()
}
