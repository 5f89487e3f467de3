use crate::portfolio::Trade;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const SECONDS_PER_DAY: i64 = 86_400;

//a point in the equity curve
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: f64,
    pub drawdown: f64,
    pub returns: f64,
}

impl EquityPoint {
    pub fn new(timestamp: DateTime<Utc>, equity: f64, drawdown: f64, returns: f64) -> Self {
        EquityPoint {
            timestamp,
            equity,
            drawdown,
            returns,
        }
    }
}

//calculates the equity curve with drawdowns
//bars with a timestamp chrono cannot represent are skipped
pub fn calculate_equity_curve(times: &[i64], equity_values: &[f64]) -> Vec<EquityPoint> {
    let mut curve = Vec::with_capacity(times.len());
    let mut peak: Option<f64> = None;
    let mut prev_equity: Option<f64> = None;

    for (&time, &equity) in times.iter().zip(equity_values.iter()) {
        let Some(timestamp) = DateTime::from_timestamp(time, 0) else {
            continue;
        };

        //update peak
        let running_peak = peak.map_or(equity, |p| p.max(equity));
        peak = Some(running_peak);

        let drawdown = (running_peak - equity) / peak_divisor(running_peak);

        //calculate returns
        let returns = match prev_equity {
            Some(prev) if prev != 0.0 => (equity - prev) / prev,
            _ => 0.0,
        };

        curve.push(EquityPoint::new(timestamp, equity, drawdown, returns));
        prev_equity = Some(equity);
    }

    curve
}

//a zero peak is read as 1 so drawdown stays finite
fn peak_divisor(peak: f64) -> f64 {
    if peak == 0.0 {
        1.0
    } else {
        peak
    }
}

//maximum drawdown of an equity series in percent
pub fn max_drawdown(equity_values: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut max_dd: f64 = 0.0;

    for &equity in equity_values {
        peak = peak.max(equity);
        max_dd = max_dd.max((peak - equity) / peak_divisor(peak) * 100.0);
    }

    max_dd
}

//calculates returns from equity values
pub fn calculate_returns(equity_values: &[f64]) -> Vec<f64> {
    equity_values
        .windows(2)
        .map(|w| if w[0] != 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

//utc calendar day of an epoch timestamp
pub fn day_of(time: i64) -> i64 {
    time.div_euclid(SECONDS_PER_DAY)
}

//number of distinct utc days covered by the timestamps
pub fn distinct_days(times: &[i64]) -> usize {
    let mut days: Vec<i64> = times.iter().map(|&t| day_of(t)).collect();
    days.dedup();
    days.len()
}

//last equity value of every utc day from the first to the last bar
//days without bars carry the previous day's value
pub fn daily_equity(times: &[i64], equity_values: &[f64]) -> Vec<f64> {
    let mut daily: Vec<f64> = Vec::new();
    let mut current_day: Option<i64> = None;

    for (&time, &equity) in times.iter().zip(equity_values.iter()) {
        let day = day_of(time);
        match current_day {
            Some(d) if d == day => {
                if let Some(last) = daily.last_mut() {
                    *last = equity;
                }
            }
            Some(d) => {
                let carried = daily.last().copied().unwrap_or(equity);
                for _ in (d + 1)..day {
                    daily.push(carried);
                }
                daily.push(equity);
            }
            None => daily.push(equity),
        }
        current_day = Some(day);
    }

    daily
}

//compact curve: initial capital then equity after each trade exit
pub fn trade_equity_curve(initial_capital: f64, trades: &[Trade]) -> Vec<f64> {
    let mut curve = Vec::with_capacity(trades.len() + 1);
    curve.push(initial_capital);

    let mut equity = initial_capital;
    for trade in trades {
        equity += trade.pnl;
        curve.push(equity);
    }

    curve
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn drawdown_uses_running_peak() {
        let dd = max_drawdown(&[100.0, 120.0, 90.0, 130.0, 117.0]);
        assert_relative_eq!(dd, 25.0);
        assert_relative_eq!(max_drawdown(&[]), 0.0);
        assert_relative_eq!(max_drawdown(&[0.0, -5.0]), 500.0);
    }

    #[test]
    fn daily_resampling_keeps_last_value_and_fills_gaps() {
        let day = SECONDS_PER_DAY;
        let times = [0, 3_600, day + 10, 4 * day];
        let equity = [1.0, 2.0, 3.0, 4.0];

        let daily = daily_equity(&times, &equity);
        assert_eq!(daily, vec![2.0, 3.0, 3.0, 3.0, 4.0]);
        assert_eq!(distinct_days(&times), 3);
    }

    #[test]
    fn negative_times_fall_on_the_previous_day() {
        assert_eq!(day_of(-1), -1);
        assert_eq!(day_of(0), 0);
    }

    #[test]
    fn equity_points_carry_drawdown_fraction() {
        let curve = calculate_equity_curve(&[0, 60, 120], &[100.0, 80.0, 100.0]);
        assert_eq!(curve.len(), 3);
        assert_relative_eq!(curve[1].drawdown, 0.2);
        assert_relative_eq!(curve[2].returns, 0.25);
    }
}
