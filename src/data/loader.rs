use crate::data::bar::{Bar, BarError, BarSeries};
use chrono::DateTime;
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

//epoch values at or above this are treated as milliseconds
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Failed to read bars from {path:?}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("Failed to parse timestamp '{value}' at line {line}")]
    Timestamp { value: String, line: usize },
    #[error("No bars found for {symbol} in the requested window")]
    Empty { symbol: String },
    #[error("Invalid bar series: {0}")]
    InvalidSeries(#[from] BarError),
}

//what the caller wants fetched; start/end are inclusive epoch seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub symbol: String,
    #[serde(default)]
    pub interval: Option<String>,
    #[serde(default)]
    pub start: Option<i64>,
    #[serde(default)]
    pub end: Option<i64>,
}

impl FetchRequest {
    pub fn new(symbol: impl Into<String>) -> Self {
        FetchRequest {
            symbol: symbol.into(),
            interval: None,
            start: None,
            end: None,
        }
    }

    fn in_window(&self, time: i64) -> bool {
        self.start.map_or(true, |s| time >= s) && self.end.map_or(true, |e| time <= e)
    }
}

//source of historical bars, retries and venue fallback live behind this trait
pub trait BarSource {
    fn fetch(&self, request: &FetchRequest) -> Result<BarSeries, FetchError>;
}

//bar source reading a local csv file
#[derive(Debug, Clone)]
pub struct CsvBarSource {
    path: PathBuf,
}

impl CsvBarSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        CsvBarSource { path: path.into() }
    }
}

impl BarSource for CsvBarSource {
    fn fetch(&self, request: &FetchRequest) -> Result<BarSeries, FetchError> {
        let rows = load_csv(&self.path)?;
        let total = rows.len();

        let bars: Vec<Bar> = filter_by_symbol(&rows, &request.symbol)
            .into_iter()
            .filter(|bar| request.in_window(bar.time))
            .collect();

        if bars.is_empty() {
            return Err(FetchError::Empty {
                symbol: request.symbol.clone(),
            });
        }

        info!(
            path = ?self.path,
            symbol = %request.symbol,
            kept = bars.len(),
            total,
            "loaded bars"
        );

        Ok(BarSeries::new(bars)?)
    }
}

#[derive(Debug, Deserialize)]
struct CsvRecord {
    time: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
    #[serde(default)]
    symbol: Option<String>,
}

//one parsed csv row, symbol is kept for filtering
#[derive(Debug, Clone)]
pub struct CsvRow {
    pub bar: Bar,
    pub symbol: Option<String>,
}

//loads bars from a csv file, sorted by time
pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Vec<CsvRow>, FetchError> {
    let path = path.as_ref();
    let csv_error = |source| FetchError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_error)?;

    let mut rows = Vec::new();

    for (index, result) in reader.deserialize().enumerate() {
        let record: CsvRecord = result.map_err(csv_error)?;
        let line = index + 2;

        let time = parse_time(&record.time).ok_or_else(|| FetchError::Timestamp {
            value: record.time.clone(),
            line,
        })?;

        let bar = Bar::new(
            time,
            record.open,
            record.high,
            record.low,
            record.close,
            record.volume,
        )?;

        rows.push(CsvRow {
            bar,
            symbol: record.symbol.filter(|s| !s.is_empty()),
        });
    }

    //sort by time to ensure chronological order
    rows.sort_by_key(|row| row.bar.time);
    debug!(path = ?path, rows = rows.len(), "parsed csv");

    Ok(rows)
}

//accepts epoch seconds, epoch milliseconds or rfc3339
pub fn parse_time(value: &str) -> Option<i64> {
    if let Ok(raw) = value.parse::<i64>() {
        return Some(if raw.abs() >= MILLIS_THRESHOLD {
            raw / 1000
        } else {
            raw
        });
    }

    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.timestamp())
}

impl CsvRow {
    //rows without a symbol column belong to every symbol
    pub fn matches(&self, symbol: &str) -> bool {
        self.symbol
            .as_deref()
            .map_or(true, |s| s.eq_ignore_ascii_case(symbol))
    }
}

//filters rows by symbol, ignoring case
pub fn filter_by_symbol(rows: &[CsvRow], symbol: &str) -> Vec<Bar> {
    rows.iter()
        .filter(|row| row.matches(symbol))
        .map(|row| row.bar)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn parses_all_timestamp_forms() {
        assert_eq!(parse_time("1700000000"), Some(1_700_000_000));
        assert_eq!(parse_time("1700000000000"), Some(1_700_000_000));
        assert_eq!(parse_time("2024-01-02T00:00:00Z"), Some(1_704_153_600));
        assert_eq!(parse_time("yesterday"), None);
    }

    #[test]
    fn loads_sorted_rows_and_filters_window() {
        let file = write_csv(
            "time,open,high,low,close,volume,symbol\n\
             180,3,3,3,3,1,BTCUSDT\n\
             60,1,1,1,1,1,BTCUSDT\n\
             120,2,2,2,2,1,BTCUSDT\n\
             120,9,9,9,9,1,ETHUSDT\n",
        );

        let rows = load_csv(file.path()).unwrap();
        assert_eq!(rows[0].bar.time, 60);
        assert_eq!(filter_by_symbol(&rows, "ETHUSDT").len(), 1);

        let source = CsvBarSource::new(file.path());
        let mut request = FetchRequest::new("btcusdt");
        request.start = Some(100);

        let series = source.fetch(&request).unwrap();
        assert_eq!(series.times(), vec![120, 180]);
    }

    #[test]
    fn empty_window_is_an_error() {
        let file = write_csv("time,open,high,low,close,volume\n60,1,1,1,1,1\n");
        let source = CsvBarSource::new(file.path());
        let mut request = FetchRequest::new("X");
        request.end = Some(10);

        assert!(matches!(
            source.fetch(&request),
            Err(FetchError::Empty { .. })
        ));
    }

    #[test]
    fn symbol_filter_ignores_case() {
        let file = write_csv(
            "time,open,high,low,close,volume,symbol\n\
             60,1,1,1,1,1,BTCUSDT\n\
             120,2,2,2,2,1,btcusdt\n\
             120,9,9,9,9,1,ETHUSDT\n\
             180,3,3,3,3,1,\n",
        );

        let rows = load_csv(file.path()).unwrap();
        let times: Vec<i64> = filter_by_symbol(&rows, "BtcUsdt").iter().map(|b| b.time).collect();
        assert_eq!(times, vec![60, 120, 180]);

        let series = CsvBarSource::new(file.path())
            .fetch(&FetchRequest::new("BtcUsdt"))
            .unwrap();
        assert_eq!(series.times(), times);
    }

    #[test]
    fn inconsistent_ohlc_row_is_rejected() {
        let file = write_csv("time,open,high,low,close,volume\n60,1,1,1,1,1\n120,2,1,3,2,1\n");
        assert!(matches!(
            load_csv(file.path()),
            Err(FetchError::InvalidSeries(BarError::InvalidHighLow { .. }))
        ));

        let file = write_csv("time,open,high,low,close,volume\n60,1,2,1,1,-5\n");
        assert!(matches!(
            load_csv(file.path()),
            Err(FetchError::InvalidSeries(BarError::NegativeVolume(_)))
        ));
    }

    #[test]
    fn bad_timestamp_reports_line() {
        let file = write_csv("time,open,high,low,close,volume\n60,1,1,1,1,1\nnope,1,1,1,1,1\n");
        match load_csv(file.path()) {
            Err(FetchError::Timestamp { line, .. }) => assert_eq!(line, 3),
            other => panic!("unexpected result: {:?}", other.map(|r| r.len())),
        }
    }
}
