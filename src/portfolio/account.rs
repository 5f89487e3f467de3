use crate::engine::execution::ExecutionContext;
use crate::portfolio::position::{Position, Side, Trade};
use tracing::debug;

//cash account holding at most one open position
#[derive(Debug, Clone)]
pub struct Account {
    //initial account balance
    pub initial_capital: f64,

    //cash equity: initial capital plus realized gross pnl minus every commission paid
    pub equity: f64,

    //open position, none when flat
    pub position: Option<Position>,

    //complete trade log
    pub trade_log: Vec<Trade>,

    //sizing and commission rules
    context: ExecutionContext,
}

impl Account {
    pub fn new(context: ExecutionContext) -> Self {
        Account {
            initial_capital: context.initial_capital,
            equity: context.initial_capital,
            position: None,
            trade_log: Vec::new(),
            context,
        }
    }

    //opens a position sized from current equity
    //the entry commission leaves equity immediately
    pub fn open(&mut self, side: Side, price: f64, time: i64) -> Option<&Position> {
        if self.position.is_some() {
            return None;
        }

        let units = self.context.units(self.equity, price);
        if !(units.is_finite() && units > 0.0) {
            debug!(price, equity = self.equity, units, "skipping entry with unusable size");
            return None;
        }

        let entry_commission = self.context.commission(units, price);
        self.equity -= entry_commission;

        self.position = Some(Position {
            side,
            entry_price: price,
            entry_time: time,
            units,
            entry_commission,
        });

        self.position.as_ref()
    }

    //closes the open position and logs the trade
    //equity only takes gross pnl minus the exit commission, entry commission was paid at entry
    pub fn close(&mut self, price: f64, time: i64) -> Option<&Trade> {
        let position = self.position.take()?;

        let exit_commission = self.context.commission(position.units, price);
        self.equity += position.gross_pnl(price) - exit_commission;

        self.trade_log
            .push(Trade::close(position, price, time, exit_commission));
        self.trade_log.last()
    }

    //equity including the open position valued at the given price
    pub fn mark_to_market(&self, price: f64) -> f64 {
        match &self.position {
            Some(position) => self.equity + position.gross_pnl(price),
            None => self.equity,
        }
    }

    //side of the open position, none if flat
    pub fn side(&self) -> Option<Side> {
        self.position.as_ref().map(|p| p.side)
    }

    pub fn is_flat(&self) -> bool {
        self.position.is_none()
    }

    //sum of closed trade pnl
    pub fn total_realized_pnl(&self) -> f64 {
        self.trade_log.iter().map(|t| t.pnl).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::execution::{CommissionType, QuantityType};
    use approx::assert_relative_eq;

    fn context() -> ExecutionContext {
        ExecutionContext {
            initial_capital: 10_000.0,
            commission_type: CommissionType::Percent,
            commission_value: 0.001,
            quantity_type: QuantityType::PercentOfEquity,
            quantity_value: 100.0,
        }
    }

    #[test]
    fn commission_is_charged_once_per_leg() {
        let mut account = Account::new(context());

        let position = account.open(Side::Long, 100.0, 0).unwrap().clone();
        assert_relative_eq!(position.units, 100.0);
        assert_relative_eq!(position.entry_commission, 10.0);
        assert_relative_eq!(account.equity, 9_990.0);
        assert_relative_eq!(account.mark_to_market(105.0), 9_990.0 + 500.0);

        let trade = account.close(110.0, 60).unwrap().clone();
        assert_relative_eq!(trade.exit_commission, 11.0);
        assert_relative_eq!(trade.pnl, 1_000.0 - 10.0 - 11.0);
        assert_relative_eq!(account.equity, 10_979.0);
        assert_relative_eq!(
            account.total_realized_pnl(),
            account.equity - account.initial_capital,
            epsilon = 1e-9
        );
    }

    #[test]
    fn cannot_open_twice() {
        let mut account = Account::new(context());
        assert!(account.open(Side::Short, 50.0, 0).is_some());
        assert!(account.open(Side::Long, 50.0, 60).is_none());
        assert_eq!(account.side(), Some(Side::Short));
    }

    #[test]
    fn zero_price_entry_is_skipped() {
        let mut account = Account::new(context());
        assert!(account.open(Side::Long, 0.0, 0).is_none());
        assert!(account.is_flat());
        assert_relative_eq!(account.equity, 10_000.0);
    }
}
