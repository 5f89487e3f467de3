pub mod compile;
pub mod crossover;
pub mod rsi_reversion;

use crate::data::{Bar, BarSeries};
use crate::optimize::ParameterSet;
use crate::portfolio::Side;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use compile::{BuiltinCompiler, BuiltinStrategy, CompileError, StrategyCompiler};
pub use crossover::{CrossoverStrategy, MovingAverage};
pub use rsi_reversion::RsiReversionStrategy;

//failure raised by a decision function for one run
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StrategyError {
    #[error("strategy raised: {0}")]
    Runtime(String),
    //output or internal state the simulator cannot consume
    #[error("strategy output is structurally incompatible: {0}")]
    Type(String),
    #[error("strategy needs {required} bars, only {available} available")]
    InsufficientData { required: usize, available: usize },
}

//what a decision asks for at a given bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalAction {
    Enter(Side),
    Exit,
}

//an explicit order decided with bars up to and including bar_index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub bar_index: usize,
    pub action: SignalAction,
}

//raw output of a decision function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawSignals {
    //desired position after each bar's close, one entry per bar
    Positions(Vec<Option<Side>>),
    //explicit order list, anything between two orders holds the previous target
    Orders(Vec<OrderIntent>),
}

impl RawSignals {
    //desired position after every bar
    pub fn targets(&self, len: usize) -> Result<Vec<Option<Side>>, StrategyError> {
        match self {
            RawSignals::Positions(positions) => {
                if positions.len() != len {
                    return Err(StrategyError::Type(format!(
                        "expected {} position flags, got {}",
                        len,
                        positions.len()
                    )));
                }
                Ok(positions.clone())
            }
            RawSignals::Orders(orders) => {
                if let Some(bad) = orders.iter().find(|o| o.bar_index >= len) {
                    return Err(StrategyError::Type(format!(
                        "order at bar {} is outside the {} available bars",
                        bad.bar_index, len
                    )));
                }

                let mut sorted = orders.clone();
                sorted.sort_by_key(|o| o.bar_index);

                let mut targets = Vec::with_capacity(len);
                let mut current = None;
                let mut pending = sorted.iter().peekable();

                for i in 0..len {
                    while let Some(order) = pending.next_if(|o| o.bar_index == i) {
                        current = match order.action {
                            SignalAction::Enter(side) => Some(side),
                            SignalAction::Exit => None,
                        };
                    }
                    targets.push(current);
                }

                Ok(targets)
            }
        }
    }
}

//fixed contract for anything that turns bars and parameters into signals
//implementations must be pure: same inputs, same signals
pub trait DecisionFn: Send + Sync {
    fn decide(&self, bars: &BarSeries, params: &ParameterSet) -> Result<RawSignals, StrategyError>;

    fn name(&self) -> &str;
}

//decision function backed by a closure
pub struct FnDecision<F> {
    name: String,
    f: F,
}

//wraps a closure as a decision function
pub fn from_fn<F>(name: impl Into<String>, f: F) -> FnDecision<F>
where
    F: Fn(&BarSeries, &ParameterSet) -> Result<RawSignals, StrategyError> + Send + Sync,
{
    FnDecision {
        name: name.into(),
        f,
    }
}

impl<F> DecisionFn for FnDecision<F>
where
    F: Fn(&BarSeries, &ParameterSet) -> Result<RawSignals, StrategyError> + Send + Sync,
{
    fn decide(&self, bars: &BarSeries, params: &ParameterSet) -> Result<RawSignals, StrategyError> {
        (self.f)(bars, params)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

//bar-by-bar strategy interface
pub trait Strategy: Send {
    //called once before the first bar with the number of bars that will follow
    fn on_start(&mut self, _available_bars: usize) -> Result<(), StrategyError> {
        Ok(())
    }

    //called on each bar, returns the position wanted after this bar's close
    fn on_bar(&mut self, context: &StrategyContext<'_>) -> Result<Option<Side>, StrategyError>;

    //returns the strategy name
    fn name(&self) -> &str;
}

//read-only view of history up to and including the current bar
//later bars are not reachable from here
pub struct StrategyContext<'a> {
    history: &'a [Bar],
}

impl<'a> StrategyContext<'a> {
    pub fn new(history: &'a [Bar]) -> Self {
        StrategyContext { history }
    }

    //index of the current bar
    pub fn index(&self) -> usize {
        self.history.len().saturating_sub(1)
    }

    //returns the current bar
    pub fn bar(&self) -> Option<&Bar> {
        self.history.last()
    }

    //returns the last n bars, oldest first
    pub fn get_bars(&self, n: usize) -> &[Bar] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }

    //returns the close prices for the last n bars
    pub fn get_close_prices(&self, n: usize) -> Vec<f64> {
        self.get_bars(n).iter().map(|b| b.close).collect()
    }

    //returns the number of bars in history
    pub fn bar_count(&self) -> usize {
        self.history.len()
    }
}

//runs a bar-by-bar strategy as a decision function
//a fresh strategy is built per call so concurrent trials share nothing
pub struct BarByBar<F> {
    name: String,
    factory: F,
}

impl<F, S> BarByBar<F>
where
    F: Fn(&ParameterSet) -> Result<S, StrategyError> + Send + Sync,
    S: Strategy,
{
    pub fn new(name: impl Into<String>, factory: F) -> Self {
        BarByBar {
            name: name.into(),
            factory,
        }
    }
}

impl<F, S> DecisionFn for BarByBar<F>
where
    F: Fn(&ParameterSet) -> Result<S, StrategyError> + Send + Sync,
    S: Strategy,
{
    fn decide(&self, bars: &BarSeries, params: &ParameterSet) -> Result<RawSignals, StrategyError> {
        let mut strategy = (self.factory)(params)?;
        strategy.on_start(bars.len())?;

        let mut targets = Vec::with_capacity(bars.len());
        for i in 0..bars.len() {
            let context = StrategyContext::new(&bars[..=i]);
            targets.push(strategy.on_bar(&context)?);
        }

        Ok(RawSignals::Positions(targets))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

//helper function to calculate simple moving average
pub fn sma(prices: &[f64]) -> Option<f64> {
    if prices.is_empty() {
        return None;
    }
    Some(prices.iter().sum::<f64>() / prices.len() as f64)
}

//next value of an exponential moving average seeded with the first price
pub fn ema_step(previous: Option<f64>, price: f64, span: usize) -> f64 {
    let alpha = 2.0 / (span as f64 + 1.0);
    match previous {
        Some(prev) => alpha * price + (1.0 - alpha) * prev,
        None => price,
    }
}

//helper function to calculate relative strength index
pub fn rsi(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period + 1 {
        return None;
    }

    let changes: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();
    let recent = &changes[changes.len() - period..];

    let avg_gain: f64 = recent.iter().filter(|c| **c > 0.0).sum::<f64>() / period as f64;
    let avg_loss: f64 = -recent.iter().filter(|c| **c < 0.0).sum::<f64>() / period as f64;

    if avg_loss == 0.0 {
        return Some(100.0);
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - (100.0 / (1.0 + rs)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ExecutionContext;
    use approx::assert_relative_eq;

    #[test]
    fn orders_expand_to_held_targets() {
        let signals = RawSignals::Orders(vec![
            OrderIntent {
                bar_index: 3,
                action: SignalAction::Exit,
            },
            OrderIntent {
                bar_index: 1,
                action: SignalAction::Enter(Side::Long),
            },
            OrderIntent {
                bar_index: 4,
                action: SignalAction::Enter(Side::Short),
            },
        ]);

        let targets = signals.targets(6).unwrap();
        assert_eq!(
            targets,
            vec![
                None,
                Some(Side::Long),
                Some(Side::Long),
                None,
                Some(Side::Short),
                Some(Side::Short)
            ]
        );
    }

    #[test]
    fn order_past_the_end_is_a_type_error() {
        let signals = RawSignals::Orders(vec![OrderIntent {
            bar_index: 9,
            action: SignalAction::Exit,
        }]);
        assert!(matches!(signals.targets(3), Err(StrategyError::Type(_))));
    }

    struct HistoryProbe;

    impl Strategy for HistoryProbe {
        fn on_bar(&mut self, context: &StrategyContext<'_>) -> Result<Option<Side>, StrategyError> {
            //the context never exposes bars past the current one
            let current = context.bar().map(|b| b.time);
            let newest = context.get_bars(usize::MAX).last().map(|b| b.time);
            if current != newest || context.bar_count() != context.index() + 1 {
                return Err(StrategyError::Runtime("saw the future".into()));
            }
            Ok(None)
        }

        fn name(&self) -> &str {
            "probe"
        }
    }

    #[test]
    fn bar_by_bar_only_sees_history() {
        let bars = (0..10)
            .map(|i| Bar::new_unchecked(i * 60, 1.0, 1.0, 1.0, 1.0, 1.0))
            .collect();
        let bars = BarSeries::new(bars).unwrap();
        let decision = BarByBar::new("probe", |_: &ParameterSet| Ok(HistoryProbe));
        let params = ParameterSet::new(Default::default(), ExecutionContext::default());

        let signals = decision.decide(&bars, &params).unwrap();
        assert_eq!(signals, RawSignals::Positions(vec![None; 10]));
    }

    #[test]
    fn indicator_helpers() {
        assert_eq!(sma(&[]), None);
        assert_relative_eq!(sma(&[1.0, 2.0, 3.0]).unwrap(), 2.0);
        assert_relative_eq!(ema_step(None, 10.0, 9), 10.0);
        assert_relative_eq!(ema_step(Some(10.0), 20.0, 9), 12.0);
        assert_eq!(rsi(&[1.0, 2.0, 3.0], 2), Some(100.0));
        assert_relative_eq!(rsi(&[1.0, 2.0, 1.0], 2).unwrap(), 50.0);
    }
}
