use crate::optimize::ParameterSet;
use crate::strategy::crossover::{
    CrossoverStrategy, MovingAverage, ALLOW_SHORT, FAST_ALIASES, SLOW_ALIASES,
};
use crate::strategy::rsi_reversion::{
    RsiReversionStrategy, LOOKBACK_ALIASES, OVERBOUGHT_ALIASES, OVERSOLD_ALIASES,
};
use crate::strategy::{BarByBar, DecisionFn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("empty strategy reference")]
    Empty,
    #[error("unknown strategy '{0}'. Use 'sma_cross', 'ema_cross', or 'rsi_reversion'")]
    UnknownStrategy(String),
    #[error("strategy '{strategy}' has no parameter named '{name}'")]
    UnknownParameter { strategy: String, name: String },
}

//produces decision functions from a script reference
//the shape of the result is checked here, once, not per trial
pub trait StrategyCompiler: Send + Sync {
    fn compile(&self, script: &str, param_names: &[String]) -> Result<Arc<dyn DecisionFn>, CompileError>;

    //substitute used when a compiled function's output cannot be consumed
    fn fallback(&self) -> Option<Arc<dyn DecisionFn>> {
        None
    }
}

//strategies shipped with the crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinStrategy {
    SmaCross,
    EmaCross,
    RsiReversion,
}

impl BuiltinStrategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "sma_cross" | "sma" | "sma_crossover" => Some(BuiltinStrategy::SmaCross),
            "ema_cross" | "ema" | "ema_crossover" => Some(BuiltinStrategy::EmaCross),
            "rsi_reversion" | "rsi" => Some(BuiltinStrategy::RsiReversion),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BuiltinStrategy::SmaCross => "sma_cross",
            BuiltinStrategy::EmaCross => "ema_cross",
            BuiltinStrategy::RsiReversion => "rsi_reversion",
        }
    }

    //parameter names the strategy reads
    pub fn accepted_params(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        match self {
            BuiltinStrategy::SmaCross | BuiltinStrategy::EmaCross => {
                names.extend(FAST_ALIASES);
                names.extend(SLOW_ALIASES);
            }
            BuiltinStrategy::RsiReversion => {
                names.extend(LOOKBACK_ALIASES);
                names.extend(OVERSOLD_ALIASES);
                names.extend(OVERBOUGHT_ALIASES);
            }
        }
        names.push(ALLOW_SHORT);
        names
    }

    pub fn decision(&self) -> Arc<dyn DecisionFn> {
        match self {
            BuiltinStrategy::SmaCross => Arc::new(BarByBar::new(self.as_str(), |p: &ParameterSet| {
                CrossoverStrategy::from_params(MovingAverage::Simple, p)
            })),
            BuiltinStrategy::EmaCross => Arc::new(BarByBar::new(self.as_str(), |p: &ParameterSet| {
                CrossoverStrategy::from_params(MovingAverage::Exponential, p)
            })),
            BuiltinStrategy::RsiReversion => Arc::new(BarByBar::new(
                self.as_str(),
                RsiReversionStrategy::from_params,
            )),
        }
    }
}

//resolves builtin strategy references, falls back to the ema crossover
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinCompiler;

impl StrategyCompiler for BuiltinCompiler {
    fn compile(&self, script: &str, param_names: &[String]) -> Result<Arc<dyn DecisionFn>, CompileError> {
        if script.trim().is_empty() {
            return Err(CompileError::Empty);
        }

        let strategy = BuiltinStrategy::parse(script)
            .ok_or_else(|| CompileError::UnknownStrategy(script.to_string()))?;

        let accepted = strategy.accepted_params();
        if let Some(name) = param_names.iter().find(|n| !accepted.contains(&n.as_str())) {
            return Err(CompileError::UnknownParameter {
                strategy: strategy.as_str().to_string(),
                name: name.clone(),
            });
        }

        Ok(strategy.decision())
    }

    fn fallback(&self) -> Option<Arc<dyn DecisionFn>> {
        Some(BuiltinStrategy::EmaCross.decision())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_known_references() {
        let compiler = BuiltinCompiler;
        let names = vec!["fast".to_string(), "slow_period".to_string()];

        let decision = compiler.compile("SMA_CROSS", &names).unwrap();
        assert_eq!(decision.name(), "sma_cross");

        let decision = compiler
            .compile("rsi", &["oversold".to_string()])
            .unwrap();
        assert_eq!(decision.name(), "rsi_reversion");
    }

    #[test]
    fn rejects_unknown_reference_and_parameters() {
        let compiler = BuiltinCompiler;
        assert_eq!(
            compiler.compile("macd", &[]).err(),
            Some(CompileError::UnknownStrategy("macd".into()))
        );
        assert_eq!(compiler.compile("  ", &[]).err(), Some(CompileError::Empty));
        assert!(matches!(
            compiler.compile("ema_cross", &["oversold".to_string()]),
            Err(CompileError::UnknownParameter { .. })
        ));
    }

    #[test]
    fn fallback_is_ema_crossover() {
        let fallback = BuiltinCompiler.fallback().unwrap();
        assert_eq!(fallback.name(), "ema_cross");
    }
}
