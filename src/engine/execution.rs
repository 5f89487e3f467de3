use crate::data::Bar;
use crate::portfolio::{Account, Side, Trade};
use serde::{Deserialize, Serialize};

//how commission is charged on each leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionType {
    //fraction of traded notional, 0.001 == 0.1%
    Percent,
    //flat amount per order
    #[serde(alias = "cash_per_order")]
    Fixed,
}

//how entry size is derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantityType {
    PercentOfEquity,
    Cash,
    #[serde(alias = "fixed")]
    FixedUnits,
}

impl CommissionType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "percent" => Some(CommissionType::Percent),
            "fixed" | "cash_per_order" => Some(CommissionType::Fixed),
            _ => None,
        }
    }
}

impl QuantityType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "percent_of_equity" | "percent" => Some(QuantityType::PercentOfEquity),
            "cash" => Some(QuantityType::Cash),
            "fixed" | "fixed_units" => Some(QuantityType::FixedUnits),
            _ => None,
        }
    }
}

//fixed execution fields shared by every trial of a run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub initial_capital: f64,
    pub commission_type: CommissionType,
    pub commission_value: f64,
    pub quantity_type: QuantityType,
    pub quantity_value: f64,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        ExecutionContext {
            initial_capital: 10_000.0,
            commission_type: CommissionType::Percent,
            commission_value: 0.001,
            quantity_type: QuantityType::PercentOfEquity,
            quantity_value: 100.0,
        }
    }
}

impl ExecutionContext {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return Err(format!(
                "initial capital must be positive and finite, got {}",
                self.initial_capital
            ));
        }
        if !(self.commission_value.is_finite() && self.commission_value >= 0.0) {
            return Err(format!(
                "commission must be non-negative and finite, got {}",
                self.commission_value
            ));
        }
        if !(self.quantity_value.is_finite() && self.quantity_value > 0.0) {
            return Err(format!(
                "quantity must be positive and finite, got {}",
                self.quantity_value
            ));
        }
        Ok(())
    }

    //units to buy or sell at price given current equity
    pub fn units(&self, equity: f64, price: f64) -> f64 {
        if price <= 0.0 {
            return 0.0;
        }

        match self.quantity_type {
            QuantityType::PercentOfEquity => equity * self.quantity_value / 100.0 / price,
            QuantityType::Cash => self.quantity_value / price,
            QuantityType::FixedUnits => self.quantity_value,
        }
    }

    //commission for one leg
    pub fn commission(&self, units: f64, price: f64) -> f64 {
        match self.commission_type {
            CommissionType::Percent => units * price * self.commission_value,
            CommissionType::Fixed => self.commission_value,
        }
    }
}

//order waiting for the next bar's open
//target is the position wanted after the fill, none means flat
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub target: Option<Side>,
    pub signal_index: usize,
}

//simulates delayed order execution
//an order decided on bar i fills at bar i+1's open
#[derive(Debug, Default)]
pub struct ExecutionEngine {
    pending: Option<PendingOrder>,
    fills: usize,
}

impl ExecutionEngine {
    pub fn new() -> Self {
        ExecutionEngine::default()
    }

    //queues a position change, replacing any unfilled order
    pub fn submit(&mut self, target: Option<Side>, signal_index: usize) {
        self.pending = Some(PendingOrder {
            target,
            signal_index,
        });
    }

    pub fn pending(&self) -> Option<&PendingOrder> {
        self.pending.as_ref()
    }

    //fills the pending order at this bar's open
    //a reversal closes first then opens, so the new entry is sized from post-exit equity
    //returns the trades closed by the fill
    pub fn process_orders(&mut self, bar: &Bar, account: &mut Account) -> Vec<Trade> {
        let mut closed = Vec::new();

        let Some(order) = self.pending.take() else {
            return closed;
        };

        if account.side() == order.target {
            return closed;
        }

        if let Some(trade) = account.close(bar.open, bar.time) {
            closed.push(trade.clone());
            self.fills += 1;
        }

        if let Some(side) = order.target {
            if account.open(side, bar.open, bar.time).is_some() {
                self.fills += 1;
            }
        }

        closed
    }

    //drops any unfilled order
    pub fn cancel_all_orders(&mut self) {
        self.pending = None;
    }

    pub fn pending_order_count(&self) -> usize {
        usize::from(self.pending.is_some())
    }

    //number of legs filled so far
    pub fn fill_count(&self) -> usize {
        self.fills
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn sizing_modes() {
        let mut context = ExecutionContext::default();
        assert_relative_eq!(context.units(5_000.0, 50.0), 100.0);

        context.quantity_type = QuantityType::Cash;
        context.quantity_value = 1_000.0;
        assert_relative_eq!(context.units(5_000.0, 50.0), 20.0);

        context.quantity_type = QuantityType::FixedUnits;
        context.quantity_value = 3.0;
        assert_relative_eq!(context.units(5_000.0, 50.0), 3.0);
    }

    #[test]
    fn context_rejects_unusable_values() {
        assert!(ExecutionContext::default().validate().is_ok());

        let broken = [
            ExecutionContext { initial_capital: 0.0, ..ExecutionContext::default() },
            ExecutionContext { initial_capital: f64::INFINITY, ..ExecutionContext::default() },
            ExecutionContext { commission_value: f64::NAN, ..ExecutionContext::default() },
            ExecutionContext { commission_value: -0.001, ..ExecutionContext::default() },
            ExecutionContext { quantity_value: 0.0, ..ExecutionContext::default() },
        ];
        for context in broken {
            assert!(context.validate().is_err(), "{:?}", context);
        }
    }

    #[test]
    fn fixed_commission_ignores_size() {
        let context = ExecutionContext {
            commission_type: CommissionType::Fixed,
            commission_value: 2.5,
            ..ExecutionContext::default()
        };
        assert_relative_eq!(context.commission(1_000.0, 99.0), 2.5);
    }

    #[test]
    fn parses_aliases() {
        assert_eq!(CommissionType::parse("cash_per_order"), Some(CommissionType::Fixed));
        assert_eq!(QuantityType::parse("fixed"), Some(QuantityType::FixedUnits));
        assert_eq!(QuantityType::parse("lots"), None);

        let parsed: QuantityType = serde_json::from_str("\"percent_of_equity\"").unwrap();
        assert_eq!(parsed, QuantityType::PercentOfEquity);
    }

    #[test]
    fn reversal_fills_exit_then_entry_at_open() {
        let mut account = Account::new(ExecutionContext {
            commission_value: 0.0,
            ..ExecutionContext::default()
        });
        let mut engine = ExecutionEngine::new();

        engine.submit(Some(Side::Long), 0);
        let bar = Bar::new_unchecked(60, 100.0, 100.0, 100.0, 100.0, 1.0);
        assert!(engine.process_orders(&bar, &mut account).is_empty());
        assert_eq!(account.side(), Some(Side::Long));

        engine.submit(Some(Side::Short), 1);
        let bar = Bar::new_unchecked(120, 110.0, 110.0, 110.0, 110.0, 1.0);
        let closed = engine.process_orders(&bar, &mut account);

        assert_eq!(closed.len(), 1);
        assert_relative_eq!(closed[0].pnl, 1_000.0);
        assert_eq!(account.side(), Some(Side::Short));
        //short sized from 11_000 equity
        assert_relative_eq!(account.position.as_ref().unwrap().units, 100.0);
        assert_eq!(engine.fill_count(), 3);
        assert_eq!(engine.pending_order_count(), 0);
    }
}
