//! Bar supply port trait.

use crate::domain::error::TraderError;
use crate::domain::ohlcv::OhlcvBar;

pub trait DataPort {
    /// Bars for `symbol` in ascending timestamp order, optionally bounded by
    /// inclusive unix-second `start`/`end`. Unknown symbols fail with
    /// [`TraderError::UnknownInstrument`].
    fn load_bars(
        &self,
        symbol: &str,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Result<Vec<OhlcvBar>, TraderError>;

    fn list_symbols(&self) -> Result<Vec<String>, TraderError>;

    /// First timestamp, last timestamp and bar count, or `None` when the
    /// store holds nothing for `symbol`.
    fn get_data_range(&self, symbol: &str) -> Result<Option<(i64, i64, usize)>, TraderError>;
}
