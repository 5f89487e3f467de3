use serde::{Deserialize, Serialize};
use std::ops::Deref;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BarError {
    #[error("Invalid OHLC values: high ({high}) < low ({low})")]
    InvalidHighLow { high: f64, low: f64 },
    #[error("Invalid OHLC values: close ({close}) outside high-low range [{low}, {high}]")]
    InvalidClose { close: f64, high: f64, low: f64 },
    #[error("Invalid OHLC values: open ({open}) outside high-low range [{low}, {high}]")]
    InvalidOpen { open: f64, high: f64, low: f64 },
    #[error("Negative volume: {0}")]
    NegativeVolume(f64),
    #[error("Bar {index} has time {current} which does not follow previous time {previous}")]
    NonIncreasingTime {
        index: usize,
        previous: i64,
        current: i64,
    },
}

//represents a single ohlcv bar, time is epoch seconds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Bar {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    //creates a new Bar with validation
    pub fn new(
        time: i64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, BarError> {
        //validate high >= low
        if high < low {
            return Err(BarError::InvalidHighLow { high, low });
        }

        //validate close within [low, high]
        if close < low || close > high {
            return Err(BarError::InvalidClose { close, high, low });
        }

        //validate open within [low, high]
        if open < low || open > high {
            return Err(BarError::InvalidOpen { open, high, low });
        }

        //validate non-negative volume
        if volume < 0.0 {
            return Err(BarError::NegativeVolume(volume));
        }

        Ok(Bar::new_unchecked(time, open, high, low, close, volume))
    }

    //creates a Bar without validation
    pub fn new_unchecked(time: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Bar {
            time,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

//immutable, time-ordered sequence of bars
//shared read-only by every concurrent trial, never mutated after construction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarSeries {
    bars: Vec<Bar>,
}

impl BarSeries {
    //builds a series, rejecting duplicate or out-of-order timestamps
    pub fn new(bars: Vec<Bar>) -> Result<Self, BarError> {
        for (index, pair) in bars.windows(2).enumerate() {
            if pair[1].time <= pair[0].time {
                return Err(BarError::NonIncreasingTime {
                    index: index + 1,
                    previous: pair[0].time,
                    current: pair[1].time,
                });
            }
        }

        Ok(BarSeries { bars })
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    //close prices in bar order
    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    //bar timestamps in order
    pub fn times(&self) -> Vec<i64> {
        self.bars.iter().map(|b| b.time).collect()
    }

    pub fn first_time(&self) -> Option<i64> {
        self.bars.first().map(|b| b.time)
    }

    pub fn last_time(&self) -> Option<i64> {
        self.bars.last().map(|b| b.time)
    }
}

impl Deref for BarSeries {
    type Target = [Bar];

    fn deref(&self) -> &[Bar] {
        &self.bars
    }
}

impl TryFrom<Vec<Bar>> for BarSeries {
    type Error = BarError;

    fn try_from(bars: Vec<Bar>) -> Result<Self, Self::Error> {
        BarSeries::new(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_high_low() {
        let err = Bar::new(0, 10.0, 9.0, 11.0, 10.0, 1.0).unwrap_err();
        assert!(matches!(err, BarError::InvalidHighLow { .. }));
    }

    #[test]
    fn rejects_negative_volume() {
        let err = Bar::new(0, 10.0, 11.0, 9.0, 10.0, -1.0).unwrap_err();
        assert_eq!(err, BarError::NegativeVolume(-1.0));
    }

    #[test]
    fn series_rejects_duplicate_timestamps() {
        let bars = vec![
            Bar::new_unchecked(60, 1.0, 1.0, 1.0, 1.0, 0.0),
            Bar::new_unchecked(120, 1.0, 1.0, 1.0, 1.0, 0.0),
            Bar::new_unchecked(120, 1.0, 1.0, 1.0, 1.0, 0.0),
        ];

        let err = BarSeries::new(bars).unwrap_err();
        assert_eq!(
            err,
            BarError::NonIncreasingTime {
                index: 2,
                previous: 120,
                current: 120
            }
        );
    }

    #[test]
    fn series_derefs_to_slice() {
        let bars = vec![
            Bar::new_unchecked(60, 1.0, 2.0, 0.5, 1.5, 3.0),
            Bar::new_unchecked(120, 1.5, 2.5, 1.0, 2.0, 4.0),
        ];
        let series = BarSeries::new(bars).unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(series[1].close, 2.0);
        assert_eq!(series.closes(), vec![1.5, 2.0]);
        assert_eq!(series.last_time(), Some(120));
    }
}
