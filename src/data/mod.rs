pub mod bar;
pub mod loader;

pub use bar::{Bar, BarError, BarSeries};
pub use loader::{
    filter_by_symbol, load_csv, parse_time, BarSource, CsvBarSource, CsvRow, FetchError,
    FetchRequest,
};
