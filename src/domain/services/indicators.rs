//! Indicator Engine (spec §4.2).
//!
//! Pure functions over a cleaned `Bar` sequence; no I/O, deterministic for
//! identical input. The `Indicator` trait and its full-series implementations
//! below are the original per-bar engine; the `*_latest` functions at the
//! bottom are the spec-facing contract — they clean the input, enforce the
//! minimum-bar floor, and return the value at the last cleaned bar or a
//! typed error.

use crate::domain::entities::bar::Bar;
use crate::domain::value_objects::price::Price;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum IndicatorError {
    #[error("need at least {required} bars after cleaning, got {got}")]
    InsufficientData { required: usize, got: usize },

    #[error("indicator produced NaN")]
    IndicatorNaN,
}

/// Drop any bar with a non-finite OHLCV field.
pub fn clean_bars(bars: &[Bar]) -> Vec<Bar> {
    bars.iter().copied().filter(|b| !b.has_nan()).collect()
}

fn require_bars(cleaned: &[Bar], required: usize) -> Result<(), IndicatorError> {
    if cleaned.len() < required {
        return Err(IndicatorError::InsufficientData {
            required,
            got: cleaned.len(),
        });
    }
    Ok(())
}

fn finite_or_nan(value: f64) -> Result<f64, IndicatorError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(IndicatorError::IndicatorNaN)
    }
}

#[derive(Debug, Clone)]
pub struct Candle {
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: f64,
}

impl Candle {
    pub fn new(open: f64, high: f64, low: f64, close: f64, volume: f64) -> Result<Self, String> {
        Ok(Candle {
            open: Price::new(open)?,
            high: Price::new(high)?,
            low: Price::new(low)?,
            close: Price::new(close)?,
            volume,
        })
    }
}

impl From<&Bar> for Candle {
    fn from(bar: &Bar) -> Self {
        Candle {
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
        }
    }
}

fn as_candles(bars: &[Bar]) -> Vec<Candle> {
    bars.iter().map(Candle::from).collect()
}

pub trait Indicator {
    fn calculate(&self, candles: &[Candle]) -> Vec<f64>;
}

pub struct SMA {
    pub period: usize,
}

impl SMA {
    pub fn new(period: usize) -> Self {
        SMA { period }
    }
}

impl Indicator for SMA {
    fn calculate(&self, candles: &[Candle]) -> Vec<f64> {
        if self.period == 0 || candles.len() < self.period {
            return vec![];
        }
        let mut out = Vec::with_capacity(candles.len() - self.period + 1);
        for i in self.period..=candles.len() {
            let slice = &candles[i - self.period..i];
            let sum: f64 = slice.iter().map(|c| c.close.value()).sum();
            out.push(sum / self.period as f64);
        }
        out
    }
}

pub struct EMA {
    pub period: usize,
}

impl EMA {
    pub fn new(period: usize) -> Self {
        EMA { period }
    }

    pub fn calculate_on_values(&self, values: &[f64]) -> Vec<f64> {
        if values.is_empty() || self.period == 0 {
            return vec![];
        }
        let mut ema_values = Vec::with_capacity(values.len());
        let multiplier = 2.0 / (self.period as f64 + 1.0);

        let initial_count = self.period.min(values.len());
        let mut sum = 0.0;
        for i in 0..initial_count {
            sum += values[i];
        }
        let mut ema = sum / initial_count as f64;
        ema_values.push(ema);

        for &val in values.iter().skip(self.period) {
            ema = (val - ema) * multiplier + ema;
            ema_values.push(ema);
        }

        ema_values
    }
}

impl Indicator for EMA {
    fn calculate(&self, candles: &[Candle]) -> Vec<f64> {
        if candles.is_empty() || self.period == 0 {
            return vec![];
        }
        let mut ema_values = Vec::with_capacity(candles.len());
        let multiplier = 2.0 / (self.period as f64 + 1.0);

        let initial_count = self.period.min(candles.len());
        let mut sum = 0.0;
        for i in 0..initial_count {
            sum += candles[i].close.value();
        }
        let mut ema = sum / initial_count as f64;
        ema_values.push(ema);

        for candle in candles.iter().skip(self.period) {
            ema = (candle.close.value() - ema) * multiplier + ema;
            ema_values.push(ema);
        }

        ema_values
    }
}

pub struct RSI {
    pub period: usize,
}

impl RSI {
    pub fn new(period: usize) -> Self {
        RSI { period }
    }
}

impl Indicator for RSI {
    fn calculate(&self, candles: &[Candle]) -> Vec<f64> {
        if self.period == 0 || candles.len() < self.period + 1 {
            return vec![];
        }
        let mut gains = Vec::new();
        let mut losses = Vec::new();

        for i in 1..candles.len() {
            let change = candles[i].close.value() - candles[i - 1].close.value();
            if change > 0.0 {
                gains.push(change);
                losses.push(0.0);
            } else {
                gains.push(0.0);
                losses.push(change.abs());
            }
        }

        if gains.len() < self.period {
            return vec![];
        }

        // Wilder smoothing: seed with a simple average over the first
        // `period` changes, then roll forward with the (period-1)/period
        // recurrence.
        let mut avg_gain = gains[..self.period].iter().sum::<f64>() / self.period as f64;
        let mut avg_loss = losses[..self.period].iter().sum::<f64>() / self.period as f64;

        let mut rsi_values = Vec::new();
        let push_rsi = |avg_gain: f64, avg_loss: f64, out: &mut Vec<f64>| {
            let rs = if avg_loss == 0.0 {
                f64::INFINITY
            } else {
                avg_gain / avg_loss
            };
            let rsi = if rs.is_infinite() {
                100.0
            } else {
                100.0 - (100.0 / (1.0 + rs))
            };
            out.push(rsi);
        };
        push_rsi(avg_gain, avg_loss, &mut rsi_values);

        for i in self.period..gains.len() {
            avg_gain = (avg_gain * (self.period - 1) as f64 + gains[i]) / self.period as f64;
            avg_loss = (avg_loss * (self.period - 1) as f64 + losses[i]) / self.period as f64;
            push_rsi(avg_gain, avg_loss, &mut rsi_values);
        }

        rsi_values
    }
}

/// Wilder-smoothed Average True Range.
pub struct ATR {
    pub period: usize,
}

impl ATR {
    pub fn new(period: usize) -> Self {
        ATR { period }
    }

    fn true_ranges(candles: &[Candle]) -> Vec<f64> {
        let mut trs = Vec::with_capacity(candles.len().saturating_sub(1));
        for i in 1..candles.len() {
            let high = candles[i].high.value();
            let low = candles[i].low.value();
            let prev_close = candles[i - 1].close.value();
            let tr = (high - low)
                .max((high - prev_close).abs())
                .max((low - prev_close).abs());
            trs.push(tr);
        }
        trs
    }
}

impl Indicator for ATR {
    fn calculate(&self, candles: &[Candle]) -> Vec<f64> {
        if self.period == 0 || candles.len() < self.period + 1 {
            return vec![];
        }
        let trs = Self::true_ranges(candles);
        if trs.len() < self.period {
            return vec![];
        }

        let mut atr = trs[..self.period].iter().sum::<f64>() / self.period as f64;
        let mut out = vec![atr];
        for &tr in &trs[self.period..] {
            atr = (atr * (self.period - 1) as f64 + tr) / self.period as f64;
            out.push(atr);
        }
        out
    }
}

/// Average Directional Index, Wilder-smoothed (period 14 by convention).
pub struct ADX {
    pub period: usize,
}

impl ADX {
    pub fn new(period: usize) -> Self {
        ADX { period }
    }
}

impl Indicator for ADX {
    fn calculate(&self, candles: &[Candle]) -> Vec<f64> {
        if self.period == 0 || candles.len() < 2 * self.period + 1 {
            return vec![];
        }

        let mut plus_dm = Vec::with_capacity(candles.len() - 1);
        let mut minus_dm = Vec::with_capacity(candles.len() - 1);
        let trs = ATR::true_ranges(candles);

        for i in 1..candles.len() {
            let up_move = candles[i].high.value() - candles[i - 1].high.value();
            let down_move = candles[i - 1].low.value() - candles[i].low.value();
            if up_move > down_move && up_move > 0.0 {
                plus_dm.push(up_move);
            } else {
                plus_dm.push(0.0);
            }
            if down_move > up_move && down_move > 0.0 {
                minus_dm.push(down_move);
            } else {
                minus_dm.push(0.0);
            }
        }

        let wilder_smooth = |values: &[f64], period: usize| -> Vec<f64> {
            if values.len() < period {
                return vec![];
            }
            let mut smoothed = values[..period].iter().sum::<f64>();
            let mut out = vec![smoothed];
            for &v in &values[period..] {
                smoothed = smoothed - (smoothed / period as f64) + v;
                out.push(smoothed);
            }
            out
        };

        let smoothed_tr = wilder_smooth(&trs, self.period);
        let smoothed_plus_dm = wilder_smooth(&plus_dm, self.period);
        let smoothed_minus_dm = wilder_smooth(&minus_dm, self.period);

        let len = smoothed_tr.len().min(smoothed_plus_dm.len()).min(smoothed_minus_dm.len());
        let mut dx_values = Vec::with_capacity(len);
        for i in 0..len {
            let plus_di = if smoothed_tr[i] > 0.0 {
                100.0 * smoothed_plus_dm[i] / smoothed_tr[i]
            } else {
                0.0
            };
            let minus_di = if smoothed_tr[i] > 0.0 {
                100.0 * smoothed_minus_dm[i] / smoothed_tr[i]
            } else {
                0.0
            };
            let sum_di = plus_di + minus_di;
            let dx = if sum_di > 0.0 {
                100.0 * (plus_di - minus_di).abs() / sum_di
            } else {
                0.0
            };
            dx_values.push(dx);
        }

        if dx_values.len() < self.period {
            return vec![];
        }
        let mut adx = dx_values[..self.period].iter().sum::<f64>() / self.period as f64;
        let mut out = vec![adx];
        for &dx in &dx_values[self.period..] {
            adx = (adx * (self.period - 1) as f64 + dx) / self.period as f64;
            out.push(adx);
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct BollingerBandsValues {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

pub struct BollingerBands {
    pub period: usize,
    pub std_dev: f64,
}

impl BollingerBands {
    pub fn new(period: usize, std_dev: f64) -> Self {
        BollingerBands { period, std_dev }
    }

    pub fn calculate_detailed(&self, candles: &[Candle]) -> BollingerBandsValues {
        if self.period == 0 || candles.len() < self.period {
            return BollingerBandsValues {
                upper: vec![],
                middle: vec![],
                lower: vec![],
            };
        }

        let mut upper = Vec::new();
        let mut middle = Vec::new();
        let mut lower = Vec::new();

        for i in self.period..=candles.len() {
            let start_idx = i - self.period;
            let end_idx = i - 1;
            let slice = &candles[start_idx..=end_idx];
            let sma = slice.iter().map(|c| c.close.value()).sum::<f64>() / self.period as f64;
            let variance = slice
                .iter()
                .map(|c| (c.close.value() - sma).powi(2))
                .sum::<f64>()
                / self.period as f64;
            let std = variance.sqrt();

            upper.push(sma + self.std_dev * std);
            middle.push(sma);
            lower.push(sma - self.std_dev * std);
        }

        BollingerBandsValues {
            upper,
            middle,
            lower,
        }
    }
}

impl Indicator for BollingerBands {
    fn calculate(&self, candles: &[Candle]) -> Vec<f64> {
        let detailed = self.calculate_detailed(candles);
        detailed.middle
    }
}

pub struct MACD {
    pub fast_period: usize,
    pub slow_period: usize,
    pub signal_period: usize,
}

impl MACD {
    pub fn new(fast_period: usize, slow_period: usize, signal_period: usize) -> Self {
        MACD {
            fast_period,
            slow_period,
            signal_period,
        }
    }

    pub fn calculate_detailed(&self, candles: &[Candle]) -> (Vec<f64>, Vec<f64>) {
        let fast_ema = EMA::new(self.fast_period);
        let slow_ema = EMA::new(self.slow_period);
        let fast_values = fast_ema.calculate(candles);
        let slow_values = slow_ema.calculate(candles);

        let offset = slow_values.len().saturating_sub(fast_values.len());
        let macd_line: Vec<f64> = fast_values
            .iter()
            .skip(offset)
            .zip(slow_values.iter())
            .map(|(f, s)| f - s)
            .collect();

        let signal_ema = EMA::new(self.signal_period);
        let signal_line = signal_ema.calculate_on_values(&macd_line);
        (macd_line, signal_line)
    }
}

impl Indicator for MACD {
    fn calculate(&self, candles: &[Candle]) -> Vec<f64> {
        let (macd_line, _signal) = self.calculate_detailed(candles);
        macd_line
    }
}

pub struct StochasticOscillator {
    pub k_period: usize,
    pub d_period: usize,
}

impl StochasticOscillator {
    pub fn new(k_period: usize, d_period: usize) -> Self {
        StochasticOscillator { k_period, d_period }
    }

    pub fn calculate_detailed(&self, candles: &[Candle]) -> (Vec<f64>, Vec<f64>) {
        if candles.len() < self.k_period {
            return (vec![], vec![]);
        }
        let mut k_values = Vec::new();

        for i in self.k_period..=candles.len() {
            let start_idx = i - self.k_period;
            let end_idx = i - 1;
            let slice = &candles[start_idx..=end_idx];
            let highest = slice
                .iter()
                .map(|c| c.high.value())
                .fold(f64::NEG_INFINITY, f64::max);
            let lowest = slice
                .iter()
                .map(|c| c.low.value())
                .fold(f64::INFINITY, f64::min);
            let current_close = candles[end_idx].close.value();

            let range = highest - lowest;
            let k = if range > f64::EPSILON {
                100.0 * (current_close - lowest) / range
            } else {
                50.0
            };
            k_values.push(k);
        }

        if self.d_period == 0 || k_values.len() < self.d_period {
            return (k_values, vec![]);
        }
        let mut d_values = Vec::new();
        for i in self.d_period..=k_values.len() {
            let start_idx = i - self.d_period;
            let end_idx = i - 1;
            let sum: f64 = k_values[start_idx..=end_idx].iter().sum();
            d_values.push(sum / self.d_period as f64);
        }

        (k_values, d_values)
    }
}

impl Indicator for StochasticOscillator {
    fn calculate(&self, candles: &[Candle]) -> Vec<f64> {
        self.calculate_detailed(candles).1
    }
}

pub struct VWAP;

impl Indicator for VWAP {
    fn calculate(&self, candles: &[Candle]) -> Vec<f64> {
        let mut vwap_values = Vec::new();
        let mut cumulative_volume = 0.0;
        let mut cumulative_volume_price = 0.0;

        for candle in candles {
            let typical_price =
                (candle.high.value() + candle.low.value() + candle.close.value()) / 3.0;
            cumulative_volume += candle.volume;
            cumulative_volume_price += typical_price * candle.volume;

            let vwap = if cumulative_volume > f64::EPSILON {
                cumulative_volume_price / cumulative_volume
            } else {
                typical_price
            };
            vwap_values.push(vwap);
        }

        vwap_values
    }
}

/// Volume EMA over raw bar volume (used by the scanner's pre-filter and
/// volume-spike source).
pub fn volume_ema_latest(bars: &[Bar], period: usize) -> Result<f64, IndicatorError> {
    let cleaned = clean_bars(bars);
    require_bars(&cleaned, period + 1)?;
    let volumes: Vec<f64> = cleaned.iter().map(|b| b.volume).collect();
    let values = EMA::new(period).calculate_on_values(&volumes);
    finite_or_nan(*values.last().ok_or(IndicatorError::InsufficientData {
        required: period + 1,
        got: cleaned.len(),
    })?)
}

pub fn sma_latest(bars: &[Bar], period: usize) -> Result<f64, IndicatorError> {
    let cleaned = clean_bars(bars);
    require_bars(&cleaned, period + 1)?;
    let values = SMA::new(period).calculate(&as_candles(&cleaned));
    finite_or_nan(*values.last().ok_or(IndicatorError::IndicatorNaN)?)
}

pub fn ema_latest(bars: &[Bar], period: usize) -> Result<f64, IndicatorError> {
    let cleaned = clean_bars(bars);
    require_bars(&cleaned, period + 1)?;
    let values = EMA::new(period).calculate(&as_candles(&cleaned));
    finite_or_nan(*values.last().ok_or(IndicatorError::IndicatorNaN)?)
}

pub fn rsi_latest(bars: &[Bar], period: usize) -> Result<f64, IndicatorError> {
    let cleaned = clean_bars(bars);
    require_bars(&cleaned, period + 1)?;
    let values = RSI::new(period).calculate(&as_candles(&cleaned));
    finite_or_nan(*values.last().ok_or(IndicatorError::IndicatorNaN)?)
}

pub fn atr_latest(bars: &[Bar], period: usize) -> Result<f64, IndicatorError> {
    let cleaned = clean_bars(bars);
    require_bars(&cleaned, period + 1)?;
    let values = ATR::new(period).calculate(&as_candles(&cleaned));
    finite_or_nan(*values.last().ok_or(IndicatorError::IndicatorNaN)?)
}

/// ATR% = ATR / last close * 100.
pub fn atr_percent_latest(bars: &[Bar], period: usize) -> Result<f64, IndicatorError> {
    let cleaned = clean_bars(bars);
    require_bars(&cleaned, period + 1)?;
    let atr = atr_latest(bars, period)?;
    let last_close = cleaned.last().ok_or(IndicatorError::IndicatorNaN)?.close.value();
    finite_or_nan(atr / last_close * 100.0)
}

pub fn adx_latest(bars: &[Bar], period: usize) -> Result<f64, IndicatorError> {
    let cleaned = clean_bars(bars);
    require_bars(&cleaned, 2 * period + 1)?;
    let values = ADX::new(period).calculate(&as_candles(&cleaned));
    finite_or_nan(*values.last().ok_or(IndicatorError::InsufficientData {
        required: 2 * period + 1,
        got: cleaned.len(),
    })?)
}

pub fn bollinger_latest(
    bars: &[Bar],
    period: usize,
    std_dev: f64,
) -> Result<(f64, f64, f64), IndicatorError> {
    let cleaned = clean_bars(bars);
    require_bars(&cleaned, period)?;
    let detailed = BollingerBands::new(period, std_dev).calculate_detailed(&as_candles(&cleaned));
    let upper = *detailed.upper.last().ok_or(IndicatorError::IndicatorNaN)?;
    let middle = *detailed.middle.last().ok_or(IndicatorError::IndicatorNaN)?;
    let lower = *detailed.lower.last().ok_or(IndicatorError::IndicatorNaN)?;
    Ok((finite_or_nan(upper)?, finite_or_nan(middle)?, finite_or_nan(lower)?))
}

pub fn macd_latest(
    bars: &[Bar],
    fast: usize,
    slow: usize,
    signal: usize,
) -> Result<(f64, f64, f64), IndicatorError> {
    let cleaned = clean_bars(bars);
    require_bars(&cleaned, slow + signal)?;
    let (macd_line, signal_line) = MACD::new(fast, slow, signal).calculate_detailed(&as_candles(&cleaned));
    let macd = *macd_line.last().ok_or(IndicatorError::IndicatorNaN)?;
    let sig = *signal_line.last().ok_or(IndicatorError::IndicatorNaN)?;
    Ok((finite_or_nan(macd)?, finite_or_nan(sig)?, finite_or_nan(macd - sig)?))
}

pub fn stochastic_latest(
    bars: &[Bar],
    k_period: usize,
    d_period: usize,
) -> Result<(f64, f64), IndicatorError> {
    let cleaned = clean_bars(bars);
    require_bars(&cleaned, k_period + d_period)?;
    let (k_values, d_values) =
        StochasticOscillator::new(k_period, d_period).calculate_detailed(&as_candles(&cleaned));
    let k = *k_values.last().ok_or(IndicatorError::IndicatorNaN)?;
    let d = *d_values.last().ok_or(IndicatorError::IndicatorNaN)?;
    Ok((finite_or_nan(k)?, finite_or_nan(d)?))
}

/// Period/window settings the snapshot builder below needs. Kept separate
/// from `config::Settings` so the indicator engine stays free of any
/// dependency on the settings layer.
#[derive(Debug, Clone, Copy)]
pub struct IndicatorParams {
    pub rsi_period: usize,
    pub atr_period: usize,
    pub adx_period: usize,
    pub sma_fast_period: usize,
    pub sma_slow_period: usize,
    pub bb_period: usize,
    pub bb_std_dev: f64,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub stoch_k: usize,
    pub stoch_d: usize,
    pub volume_ema_period: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        IndicatorParams {
            rsi_period: 14,
            atr_period: 14,
            adx_period: 14,
            sma_fast_period: 9,
            sma_slow_period: 21,
            bb_period: 20,
            bb_std_dev: 2.0,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            stoch_k: 14,
            stoch_d: 3,
            volume_ema_period: 20,
        }
    }
}

/// Best-effort indicator snapshot for a bar series: every indicator that has
/// enough data to compute is included under its name; an indicator that
/// can't (too few bars for this timeframe) is simply omitted rather than
/// failing the whole snapshot, matching the original screener's per-indicator
/// try/catch around a shared bar fetch.
pub fn compute_snapshot(bars: &[Bar], params: &IndicatorParams) -> std::collections::HashMap<String, f64> {
    let mut out = std::collections::HashMap::new();

    if let Ok(v) = rsi_latest(bars, params.rsi_period) {
        out.insert("rsi".to_string(), v);
    }
    if let Ok(v) = atr_latest(bars, params.atr_period) {
        out.insert("atr".to_string(), v);
    }
    if let Ok(v) = atr_percent_latest(bars, params.atr_period) {
        out.insert("atr_percent".to_string(), v);
    }
    if let Ok(v) = adx_latest(bars, params.adx_period) {
        out.insert("adx".to_string(), v);
    }
    if let Ok(v) = sma_latest(bars, params.sma_fast_period) {
        out.insert("sma_fast".to_string(), v);
    }
    if let Ok(v) = sma_latest(bars, params.sma_slow_period) {
        out.insert("sma_slow".to_string(), v);
    }
    if let Ok((upper, middle, lower)) = bollinger_latest(bars, params.bb_period, params.bb_std_dev) {
        out.insert("bb_upper".to_string(), upper);
        out.insert("bb_middle".to_string(), middle);
        out.insert("bb_lower".to_string(), lower);
    }
    if let Ok((macd, signal, hist)) =
        macd_latest(bars, params.macd_fast, params.macd_slow, params.macd_signal)
    {
        out.insert("macd".to_string(), macd);
        out.insert("macd_signal".to_string(), signal);
        out.insert("macd_hist".to_string(), hist);
    }
    if let Ok((k, d)) = stochastic_latest(bars, params.stoch_k, params.stoch_d) {
        out.insert("stoch_k".to_string(), k);
        out.insert("stoch_d".to_string(), d);
    }
    if let Ok(v) = volume_ema_latest(bars, params.volume_ema_period) {
        out.insert("volume_ema".to_string(), v);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bars(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar::new(i as i64, c, c + 1.0, c - 1.0, c, 1000.0).unwrap())
            .collect()
    }

    #[test]
    fn ema_calculation_matches_trait() {
        let candles = vec![
            Candle::new(100.0, 105.0, 95.0, 102.0, 1000.0).unwrap(),
            Candle::new(102.0, 108.0, 98.0, 105.0, 1100.0).unwrap(),
            Candle::new(105.0, 110.0, 100.0, 108.0, 1200.0).unwrap(),
        ];
        let ema = EMA::new(2);
        let values = ema.calculate(&candles);
        assert!(!values.is_empty());
        assert!(values[0] > 100.0);
    }

    #[test]
    fn rsi_calculation_is_bounded() {
        let candles = vec![
            Candle::new(100.0, 105.0, 95.0, 102.0, 1000.0).unwrap(),
            Candle::new(102.0, 108.0, 98.0, 105.0, 1100.0).unwrap(),
            Candle::new(105.0, 110.0, 100.0, 108.0, 1200.0).unwrap(),
            Candle::new(108.0, 112.0, 103.0, 106.0, 1300.0).unwrap(),
            Candle::new(106.0, 111.0, 102.0, 109.0, 1400.0).unwrap(),
        ];
        let rsi = RSI::new(2);
        let values = rsi.calculate(&candles);
        assert!(!values.is_empty());
        assert!(values[0] >= 0.0 && values[0] <= 100.0);
    }

    #[test]
    fn vwap_increases_with_rising_prices() {
        let candles = vec![
            Candle::new(100.0, 105.0, 95.0, 102.0, 1000.0).unwrap(),
            Candle::new(102.0, 108.0, 98.0, 105.0, 1100.0).unwrap(),
        ];
        let vwap = VWAP;
        let values = vwap.calculate(&candles);
        assert_eq!(values.len(), 2);
        assert!(values[1] > values[0]);
    }

    #[test]
    fn insufficient_data_is_reported() {
        let data = bars(&[100.0, 101.0, 102.0]);
        let err = rsi_latest(&data, 14).unwrap_err();
        assert!(matches!(err, IndicatorError::InsufficientData { .. }));
    }

    #[test]
    fn sma_latest_over_flat_series() {
        let data = bars(&[100.0; 20]);
        let v = sma_latest(&data, 10).unwrap();
        assert!((v - 100.0).abs() < 1e-9);
    }

    #[test]
    fn atr_and_atr_percent_on_synthetic_trend() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        let data = bars(&closes);
        let atr = atr_latest(&data, 14).unwrap();
        assert!(atr > 0.0);
        let atr_pct = atr_percent_latest(&data, 14).unwrap();
        assert!(atr_pct > 0.0 && atr_pct < 100.0);
    }

    #[test]
    fn adx_on_strong_trend_is_high() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64 * 2.0).collect();
        let data = bars(&closes);
        let adx = adx_latest(&data, 14).unwrap();
        assert!(adx > 0.0);
    }

    #[test]
    fn bollinger_bands_bracket_the_close() {
        let closes: Vec<f64> = vec![
            100.0, 101.0, 99.0, 102.0, 98.0, 103.0, 97.0, 104.0, 96.0, 105.0, 100.0, 101.0, 99.0,
            102.0, 98.0, 103.0, 97.0, 104.0, 96.0, 105.0,
        ];
        let data = bars(&closes);
        let (upper, middle, lower) = bollinger_latest(&data, 20, 2.0).unwrap();
        assert!(lower < middle && middle < upper);
    }

    #[test]
    fn macd_produces_histogram() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 / 3.0).sin() * 5.0).collect();
        let data = bars(&closes);
        let (macd, signal, hist) = macd_latest(&data, 12, 26, 9).unwrap();
        assert!((macd - signal - hist).abs() < 1e-9);
    }

    #[test]
    fn stochastic_is_bounded() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + (i as f64 / 2.0).sin() * 10.0).collect();
        let data = bars(&closes);
        let (k, d) = stochastic_latest(&data, 14, 3).unwrap();
        assert!((0.0..=100.0).contains(&k));
        assert!((0.0..=100.0).contains(&d));
    }

    #[test]
    fn snapshot_includes_every_indicator_given_enough_bars() {
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + (i as f64 / 4.0).sin() * 8.0).collect();
        let data = bars(&closes);
        let snapshot = compute_snapshot(&data, &IndicatorParams::default());
        for key in [
            "rsi", "atr", "atr_percent", "adx", "sma_fast", "sma_slow", "bb_upper", "bb_middle",
            "bb_lower", "macd", "macd_signal", "macd_hist", "stoch_k", "stoch_d", "volume_ema",
        ] {
            assert!(snapshot.contains_key(key), "missing {key} in snapshot");
        }
    }

    #[test]
    fn snapshot_omits_indicators_with_too_little_data() {
        let closes: Vec<f64> = vec![100.0, 101.0, 99.0];
        let data = bars(&closes);
        let snapshot = compute_snapshot(&data, &IndicatorParams::default());
        assert!(snapshot.is_empty());
    }
}
