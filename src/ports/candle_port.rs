//! Candle data access port trait.

use crate::domain::error::StratflowError;
use crate::domain::market_data::{Candle, DateRange};

pub trait CandlePort {
    /// Candles for one symbol inside `range`, oldest first.
    fn fetch_candles(&self, symbol: &str, range: &DateRange) -> Result<Vec<Candle>, StratflowError>;

    fn list_symbols(&self) -> Result<Vec<String>, StratflowError>;
}
