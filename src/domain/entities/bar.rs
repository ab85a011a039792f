//! OHLCV candle as returned by the Exchange Adapter's `FetchOHLCV`.

use crate::domain::value_objects::price::Price;

#[derive(Debug, Clone, Copy)]
pub struct Bar {
    pub ts_ms: i64,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: f64,
}

impl Bar {
    pub fn new(
        ts_ms: i64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, String> {
        Ok(Bar {
            ts_ms,
            open: Price::new(open)?,
            high: Price::new(high)?,
            low: Price::new(low)?,
            close: Price::new(close)?,
            volume,
        })
    }

    /// True if any OHLCV field is non-finite (NaN/inf) — such rows are dropped
    /// before feeding the indicator engine.
    pub fn has_nan(&self) -> bool {
        !(self.open.value().is_finite()
            && self.high.value().is_finite()
            && self.low.value().is_finite()
            && self.close.value().is_finite()
            && self.volume.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_nan_volume() {
        let bar = Bar {
            ts_ms: 0,
            open: Price::new(1.0).unwrap(),
            high: Price::new(1.0).unwrap(),
            low: Price::new(1.0).unwrap(),
            close: Price::new(1.0).unwrap(),
            volume: f64::NAN,
        };
        assert!(bar.has_nan());
    }

    #[test]
    fn clean_bar_has_no_nan() {
        let bar = Bar::new(1_700_000_000_000, 100.0, 105.0, 95.0, 102.0, 10.0).unwrap();
        assert!(!bar.has_nan());
    }
}
