use crate::data::BarSeries;
use crate::engine::execution::{ExecutionContext, ExecutionEngine, PendingOrder};
use crate::optimize::ParameterSet;
use crate::portfolio::{Account, Side, Trade};
use crate::strategy::{DecisionFn, RawSignals, StrategyError};
use serde::{Deserialize, Serialize};
use tracing::trace;

//where a run stands between two bars
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimState {
    Flat,
    PendingEntry(Side),
    Open(Side),
    PendingExit(Side),
}

impl SimState {
    pub fn of(position: Option<Side>, pending: Option<&PendingOrder>) -> Self {
        match (position, pending) {
            (None, None) => SimState::Flat,
            (None, Some(order)) => match order.target {
                Some(side) => SimState::PendingEntry(side),
                None => SimState::Flat,
            },
            (Some(side), None) => SimState::Open(side),
            (Some(side), Some(_)) => SimState::PendingExit(side),
        }
    }
}

//result of one simulation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub trades: Vec<Trade>,

    //one mark-to-market value per bar, first value is the initial capital
    pub equity_curve: Vec<f64>,
    pub initial_capital: f64,
    pub final_equity: f64,
}

impl SimulationResult {
    //sum of trade pnl, equals final_equity - initial_capital
    pub fn realized_pnl(&self) -> f64 {
        self.trades.iter().map(|t| t.pnl).sum()
    }
}

//bar-by-bar execution simulator
//decisions made with bars up to i fill at bar i+1's open
pub struct Simulator<'a> {
    bars: &'a BarSeries,
    context: ExecutionContext,
}

impl<'a> Simulator<'a> {
    pub fn new(bars: &'a BarSeries, context: ExecutionContext) -> Self {
        Simulator { bars, context }
    }

    //asks the decision function for signals then simulates them
    pub fn run(
        &self,
        decision: &dyn DecisionFn,
        params: &ParameterSet,
    ) -> Result<SimulationResult, StrategyError> {
        let signals = decision.decide(self.bars, params)?;
        self.simulate(&signals)
    }

    //simulates already-produced signals
    pub fn simulate(&self, signals: &RawSignals) -> Result<SimulationResult, StrategyError> {
        let targets = signals.targets(self.bars.len())?;

        let mut account = Account::new(self.context);
        let mut execution = ExecutionEngine::new();
        let mut equity_curve = Vec::with_capacity(self.bars.len());

        for (i, (bar, target)) in self.bars.iter().zip(targets.iter().copied()).enumerate() {
            //orders decided on the previous bar fill at this open
            if i > 0 {
                execution.process_orders(bar, &mut account);
            }

            equity_curve.push(account.mark_to_market(bar.close));

            match execution.state(&account) {
                SimState::Flat => {
                    if target.is_some() {
                        execution.submit(target, i);
                    }
                }
                SimState::Open(side) => {
                    if target != Some(side) {
                        execution.submit(target, i);
                    }
                }
                SimState::PendingEntry(_) | SimState::PendingExit(_) => {}
            }

            trace!(bar = i, state = ?execution.state(&account), "bar processed");
        }

        //an order from the last bar has no next open
        execution.cancel_all_orders();

        //force-close at the last close and restate the last equity point
        if let Some(last) = self.bars.last() {
            if account.close(last.close, last.time).is_some() {
                if let Some(point) = equity_curve.last_mut() {
                    *point = account.equity;
                }
            }
        }

        Ok(SimulationResult {
            trades: account.trade_log,
            equity_curve,
            initial_capital: self.context.initial_capital,
            final_equity: account.equity,
        })
    }
}

impl ExecutionEngine {
    //state of the run given the account it fills into
    pub fn state(&self, account: &Account) -> SimState {
        SimState::of(account.side(), self.pending())
    }
}
