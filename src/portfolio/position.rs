use serde::{Deserialize, Serialize};

//direction of a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    //+1 for long, -1 for short
    pub fn sign(&self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }
}

//an open position, only alive between entry fill and exit fill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub side: Side,
    pub entry_price: f64,
    pub entry_time: i64,
    pub units: f64,

    //already deducted from equity at entry, kept for the trade's pnl at exit
    pub entry_commission: f64,
}

impl Position {
    //gross pnl if closed at the given price, before any commission
    pub fn gross_pnl(&self, price: f64) -> f64 {
        self.units * (price - self.entry_price) * self.side.sign()
    }
}

//a completed round trip
//pnl == units * (exit - entry) * sign - entry_commission - exit_commission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub entry_time: i64,
    pub exit_time: i64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub side: Side,
    pub units: f64,
    pub entry_commission: f64,
    pub exit_commission: f64,
    pub pnl: f64,
    pub pnl_pct: f64,
}

impl Trade {
    //closes a position at the given price and time
    pub fn close(position: Position, exit_price: f64, exit_time: i64, exit_commission: f64) -> Self {
        let gross = position.gross_pnl(exit_price);
        let pnl = gross - position.entry_commission - exit_commission;
        let pnl_pct = if position.entry_price != 0.0 {
            (exit_price - position.entry_price) / position.entry_price * 100.0 * position.side.sign()
        } else {
            0.0
        };

        Trade {
            entry_time: position.entry_time,
            exit_time,
            entry_price: position.entry_price,
            exit_price,
            side: position.side,
            units: position.units,
            entry_commission: position.entry_commission,
            exit_commission,
            pnl,
            pnl_pct,
        }
    }

    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }
}
