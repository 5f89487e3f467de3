use crate::optimize::ParameterSet;
use crate::portfolio::Side;
use crate::strategy::{ema_step, sma, Strategy, StrategyContext, StrategyError};
use serde::{Deserialize, Serialize};

pub const FAST_ALIASES: [&str; 4] = ["fast_period", "fast", "fastLength", "fast_length"];
pub const SLOW_ALIASES: [&str; 4] = ["slow_period", "slow", "slowLength", "slow_length"];
pub const ALLOW_SHORT: &str = "allow_short";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovingAverage {
    Simple,
    Exponential,
}

impl MovingAverage {
    //periods used when a parameter set does not name them
    pub fn default_periods(&self) -> (usize, usize) {
        match self {
            MovingAverage::Simple => (10, 30),
            MovingAverage::Exponential => (9, 21),
        }
    }
}

//moving average crossover strategy
//golden cross goes long, death cross exits (or reverses when shorting is allowed)
#[derive(Debug, Clone)]
pub struct CrossoverStrategy {
    kind: MovingAverage,
    fast_period: usize,
    slow_period: usize,
    allow_short: bool,

    //previous bar's averages
    last_fast: Option<f64>,
    last_slow: Option<f64>,

    //running ema values
    fast_ema: Option<f64>,
    slow_ema: Option<f64>,

    position: Option<Side>,
}

impl CrossoverStrategy {
    pub fn new(kind: MovingAverage, fast_period: usize, slow_period: usize, allow_short: bool) -> Self {
        CrossoverStrategy {
            kind,
            fast_period,
            slow_period,
            allow_short,
            last_fast: None,
            last_slow: None,
            fast_ema: None,
            slow_ema: None,
            position: None,
        }
    }

    //builds from a parameter set, accepting the usual period aliases
    pub fn from_params(kind: MovingAverage, params: &ParameterSet) -> Result<Self, StrategyError> {
        let (default_fast, default_slow) = kind.default_periods();
        let fast = period(params, &FAST_ALIASES, default_fast)?;
        let slow = period(params, &SLOW_ALIASES, default_slow)?;
        let allow_short = params.get_f64(ALLOW_SHORT).map(|v| v >= 0.5).unwrap_or(false);

        Ok(Self::new(kind, fast, slow, allow_short))
    }

    pub fn fast_period(&self) -> usize {
        self.fast_period
    }

    pub fn slow_period(&self) -> usize {
        self.slow_period
    }

    //bars of history before a cross can be read
    fn window(&self) -> usize {
        self.fast_period.max(self.slow_period)
    }

    //fast and slow averages as of the current bar, none while warming up
    fn averages(&mut self, context: &StrategyContext<'_>) -> Option<(f64, f64)> {
        match self.kind {
            MovingAverage::Simple => {
                if context.bar_count() < self.window() {
                    return None;
                }
                let closes = context.get_close_prices(self.window());
                let fast = sma(&closes[closes.len() - self.fast_period..])?;
                let slow = sma(&closes[closes.len() - self.slow_period..])?;
                Some((fast, slow))
            }
            MovingAverage::Exponential => {
                let close = context.bar()?.close;
                let fast = ema_step(self.fast_ema, close, self.fast_period);
                let slow = ema_step(self.slow_ema, close, self.slow_period);
                self.fast_ema = Some(fast);
                self.slow_ema = Some(slow);
                Some((fast, slow))
            }
        }
    }
}

fn period(params: &ParameterSet, aliases: &[&str], default: usize) -> Result<usize, StrategyError> {
    match params.first_of(aliases) {
        None => Ok(default),
        Some(v) if v.is_finite() && v >= 1.0 => Ok(v.round() as usize),
        Some(v) => Err(StrategyError::Runtime(format!(
            "{} must be a period of at least 1, got {}",
            aliases[0], v
        ))),
    }
}

impl Strategy for CrossoverStrategy {
    fn on_start(&mut self, available_bars: usize) -> Result<(), StrategyError> {
        let required = self.window() + 1;
        if available_bars < required {
            return Err(StrategyError::InsufficientData {
                required,
                available: available_bars,
            });
        }
        Ok(())
    }

    fn on_bar(&mut self, context: &StrategyContext<'_>) -> Result<Option<Side>, StrategyError> {
        let current = self.averages(context);
        let previous = self.last_fast.zip(self.last_slow);

        if let Some((fast, slow)) = current {
            self.last_fast = Some(fast);
            self.last_slow = Some(slow);
        }

        //crosses are only read once the slow window is fully behind us
        if context.index() < self.window() {
            return Ok(self.position);
        }

        if let (Some((prev_fast, prev_slow)), Some((fast, slow))) = (previous, current) {
            if prev_fast <= prev_slow && fast > slow {
                self.position = Some(Side::Long);
            } else if prev_fast >= prev_slow && fast < slow {
                self.position = if self.allow_short { Some(Side::Short) } else { None };
            }
        }

        Ok(self.position)
    }

    fn name(&self) -> &str {
        match self.kind {
            MovingAverage::Simple => "SMA Crossover",
            MovingAverage::Exponential => "EMA Crossover",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Bar, BarSeries};
    use crate::engine::ExecutionContext;
    use crate::optimize::{ParamValue, ParamValues};
    use crate::strategy::{BarByBar, DecisionFn, RawSignals};

    fn bars(closes: &[f64]) -> BarSeries {
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar::new_unchecked(i as i64 * 86_400, c, c, c, c, 1.0))
            .collect();
        BarSeries::new(bars).unwrap()
    }

    fn params(pairs: &[(&str, i64)]) -> ParameterSet {
        let values: ParamValues = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), ParamValue::Int(*v)))
            .collect();
        ParameterSet::new(values, ExecutionContext::default())
    }

    fn targets(kind: MovingAverage, closes: &[f64], p: &ParameterSet) -> Vec<Option<Side>> {
        let decision = BarByBar::new("crossover", move |p: &ParameterSet| {
            CrossoverStrategy::from_params(kind, p)
        });
        match decision.decide(&bars(closes), p).unwrap() {
            RawSignals::Positions(t) => t,
            other => panic!("unexpected signals {:?}", other),
        }
    }

    #[test]
    fn golden_then_death_cross() {
        let p = params(&[("fast", 2), ("slow", 3)]);
        let t = targets(MovingAverage::Simple, &[10.0, 10.0, 10.0, 12.0, 8.0, 14.0], &p);

        //bar 3: fast 11 > slow 10.67 after being equal
        //bar 4: fast 10 == slow 10, no cross
        //bar 5: fast 11 < slow 11.33 after being equal
        assert_eq!(t[..3], [None, None, None]);
        assert_eq!(t[3], Some(Side::Long));
        assert_eq!(t[4], Some(Side::Long));
        assert_eq!(t[5], None);
    }

    #[test]
    fn aliases_resolve_in_order() {
        let p = params(&[("fastLength", 4), ("slow_period", 7)]);
        let strategy = CrossoverStrategy::from_params(MovingAverage::Simple, &p).unwrap();
        assert_eq!(strategy.fast_period(), 4);
        assert_eq!(strategy.slow_period(), 7);

        let strategy =
            CrossoverStrategy::from_params(MovingAverage::Exponential, &params(&[])).unwrap();
        assert_eq!((strategy.fast_period(), strategy.slow_period()), (9, 21));
    }

    #[test]
    fn short_allowed_reverses_on_death_cross() {
        let p = params(&[("fast", 2), ("slow", 3), ("allow_short", 1)]);
        let t = targets(MovingAverage::Simple, &[10.0, 10.0, 10.0, 12.0, 8.0, 14.0], &p);
        assert_eq!(t[5], Some(Side::Short));
    }

    #[test]
    fn too_few_bars_is_insufficient_data() {
        let decision = BarByBar::new("crossover", |p: &ParameterSet| {
            CrossoverStrategy::from_params(MovingAverage::Simple, p)
        });
        let err = decision
            .decide(&bars(&[1.0, 2.0, 3.0]), &params(&[("fast", 2), ("slow", 5)]))
            .unwrap_err();
        assert_eq!(
            err,
            StrategyError::InsufficientData {
                required: 6,
                available: 3
            }
        );
    }

    #[test]
    fn zero_period_is_rejected() {
        let err = CrossoverStrategy::from_params(MovingAverage::Simple, &params(&[("fast", 0)]))
            .unwrap_err();
        assert!(matches!(err, StrategyError::Runtime(_)));
    }

    #[test]
    fn ema_crosses_on_trend_change() {
        let mut closes = vec![100.0; 30];
        closes.extend((1..=15).map(|i| 100.0 + i as f64));
        closes.extend((1..=15).map(|i| 115.0 - 2.0 * i as f64));

        let t = targets(MovingAverage::Exponential, &closes, &params(&[("fast", 3), ("slow", 8)]));

        assert!(t[..8].iter().all(|s| s.is_none()));
        assert!(t.contains(&Some(Side::Long)));
        assert_eq!(*t.last().unwrap(), None);
    }
}
