use crate::optimize::ParameterSet;
use crate::portfolio::Side;
use crate::strategy::{rsi, Strategy, StrategyContext, StrategyError};

pub const LOOKBACK_ALIASES: [&str; 3] = ["rsi_period", "lookback", "rsi_lookback"];
pub const OVERSOLD_ALIASES: [&str; 2] = ["oversold", "rsi_lower"];
pub const OVERBOUGHT_ALIASES: [&str; 2] = ["overbought", "rsi_upper"];

//rsi mean reversion strategy
//long below the oversold threshold, short above overbought, flat in between
#[derive(Debug, Clone)]
pub struct RsiReversionStrategy {
    lookback: usize,
    oversold: f64,
    overbought: f64,
    allow_short: bool,
}

impl RsiReversionStrategy {
    pub fn new(lookback: usize, oversold: f64, overbought: f64, allow_short: bool) -> Self {
        RsiReversionStrategy {
            lookback,
            oversold,
            overbought,
            allow_short,
        }
    }

    //reads lookback and thresholds, falling back to 14 / 30 / 70
    pub fn from_params(params: &ParameterSet) -> Result<Self, StrategyError> {
        let lookback = params.first_of(&LOOKBACK_ALIASES).unwrap_or(14.0);
        if !(lookback.is_finite() && lookback >= 1.0) {
            return Err(StrategyError::Runtime(format!(
                "rsi_period must be at least 1, got {}",
                lookback
            )));
        }

        let oversold = params.first_of(&OVERSOLD_ALIASES).unwrap_or(30.0);
        let overbought = params.first_of(&OVERBOUGHT_ALIASES).unwrap_or(70.0);
        if oversold >= overbought {
            return Err(StrategyError::Runtime(format!(
                "oversold {} must be below overbought {}",
                oversold, overbought
            )));
        }

        let allow_short = params.get_f64("allow_short").map(|v| v >= 0.5).unwrap_or(true);

        Ok(Self::new(lookback.round() as usize, oversold, overbought, allow_short))
    }
}

impl Strategy for RsiReversionStrategy {
    fn on_start(&mut self, available_bars: usize) -> Result<(), StrategyError> {
        if available_bars < self.lookback + 2 {
            return Err(StrategyError::InsufficientData {
                required: self.lookback + 2,
                available: available_bars,
            });
        }
        Ok(())
    }

    fn on_bar(&mut self, context: &StrategyContext<'_>) -> Result<Option<Side>, StrategyError> {
        //need at least lookback + 1 bars for rsi calculation
        let closes = context.get_close_prices(self.lookback + 1);
        let rsi_value = match rsi(&closes, self.lookback) {
            Some(v) => v,
            None => return Ok(None),
        };

        if rsi_value < self.oversold {
            Ok(Some(Side::Long))
        } else if rsi_value > self.overbought && self.allow_short {
            Ok(Some(Side::Short))
        } else {
            Ok(None)
        }
    }

    fn name(&self) -> &str {
        "RSI Reversion"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Bar;
    use crate::engine::ExecutionContext;
    use crate::optimize::ParamValue;

    fn run(strategy: &mut RsiReversionStrategy, closes: &[f64]) -> Vec<Option<Side>> {
        let bars: Vec<Bar> = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar::new_unchecked(i as i64 * 60, c, c, c, c, 1.0))
            .collect();
        (0..bars.len())
            .map(|i| strategy.on_bar(&StrategyContext::new(&bars[..=i])).unwrap())
            .collect()
    }

    #[test]
    fn follows_thresholds() {
        let mut strategy = RsiReversionStrategy::new(2, 30.0, 70.0, true);

        let t = run(&mut strategy, &[10.0, 9.0, 8.0, 9.0, 10.0, 11.0]);
        assert_eq!(t[..2], [None, None]);
        assert_eq!(t[2], Some(Side::Long));
        //one up one down
        assert_eq!(t[3], None);
        assert_eq!(t[5], Some(Side::Short));
    }

    #[test]
    fn long_only_stays_flat_when_overbought() {
        let mut strategy = RsiReversionStrategy::new(2, 30.0, 70.0, false);
        let t = run(&mut strategy, &[10.0, 11.0, 12.0, 13.0]);
        assert!(t.iter().all(|s| s.is_none()));
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let mut params = ParameterSet::new(Default::default(), ExecutionContext::default());
        params.set("oversold", ParamValue::Float(80.0));
        assert!(matches!(
            RsiReversionStrategy::from_params(&params),
            Err(StrategyError::Runtime(_))
        ));
    }
}
