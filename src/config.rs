//! Settings (spec §3, §6) — process-wide configuration loaded from
//! persistent storage with typed defaults, overridable per-key at runtime.

use crate::persistence::repository::{SettingValue, SettingsRepository};
use crate::persistence::{DatabaseError, DbPool};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOrderType {
    Limit,
    Market,
}

impl fmt::Display for EntryOrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryOrderType::Limit => write!(f, "LIMIT"),
            EntryOrderType::Market => write!(f, "MARKET"),
        }
    }
}

impl std::str::FromStr for EntryOrderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "LIMIT" => Ok(EntryOrderType::Limit),
            "MARKET" => Ok(EntryOrderType::Market),
            other => Err(format!("unknown order type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketType {
    Future,
    Spot,
}

impl fmt::Display for MarketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketType::Future => write!(f, "future"),
            MarketType::Spot => write!(f, "spot"),
        }
    }
}

impl std::str::FromStr for MarketType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "future" => Ok(MarketType::Future),
            "spot" => Ok(MarketType::Spot),
            other => Err(format!("unknown market type: {other}")),
        }
    }
}

/// All recognized Settings keys with their typed defaults (spec §6).
#[derive(Debug, Clone)]
pub struct Settings {
    // Trading
    pub live_trading: bool,
    pub virtual_balance: f64,
    pub default_order_type: EntryOrderType,
    pub default_market_type: MarketType,
    pub leverage: u32,
    pub max_concurrent_trades: usize,

    // Risk
    pub risk_per_trade_percent: f64,
    pub use_dynamic_risk: bool,
    pub dynamic_risk_atr_period: usize,
    pub dynamic_risk_base_risk: f64,
    pub dynamic_risk_low_vol_threshold: f64,
    pub dynamic_risk_low_vol_multiplier: f64,
    pub dynamic_risk_high_vol_threshold: f64,
    pub dynamic_risk_high_vol_multiplier: f64,

    // SL/TP
    pub use_atr_for_sltp: bool,
    pub atr_multiplier_sl: f64,
    pub risk_reward_ratio_tp: f64,

    // Advanced exits
    pub use_trailing_stop_loss: bool,
    pub trailing_stop_activation_percent: f64,
    pub use_partial_tp: bool,
    pub partial_tp_target_rr: f64,
    pub partial_tp_close_percent: f64,
    pub use_bailout_exit: bool,
    pub bailout_arm_loss_percent: f64,
    pub bailout_recovery_percent: f64,
    pub use_ai_bailout_confirmation: bool,

    // MTA
    pub use_mta_analysis: bool,
    pub mta_trend_timeframe: String,

    // Scheduler
    pub position_check_interval_seconds: u64,
    pub orphan_order_check_interval_seconds: u64,
    pub position_sync_interval_seconds: u64,

    // Scanner
    pub proactive_scan_enabled: bool,
    pub proactive_scan_interval_seconds: u64,
    pub proactive_scan_auto_confirm: bool,
    pub proactive_scan_entry_timeframe: String,
    pub proactive_scan_trend_timeframe: String,
    pub proactive_scan_min_volume_usdt: f64,
    pub proactive_scan_top_n: usize,
    pub proactive_scan_use_gainers_losers: bool,
    pub proactive_scan_use_volume_spike: bool,
    pub proactive_scan_volume_timeframe: String,
    pub proactive_scan_volume_multiplier: f64,
    pub proactive_scan_volume_period: usize,
    pub proactive_scan_whitelist: Vec<String>,
    pub proactive_scan_blacklist: Vec<String>,

    // Pre-filter
    pub proactive_scan_prefilter_enabled: bool,
    pub proactive_scan_rsi_lower: f64,
    pub proactive_scan_rsi_upper: f64,
    pub proactive_scan_adx_threshold: f64,
    pub proactive_scan_use_volatility_filter: bool,
    pub proactive_scan_atr_period: usize,
    pub proactive_scan_atr_threshold_percent: f64,
    pub proactive_scan_use_volume_filter: bool,
    pub proactive_scan_volume_avg_period: usize,
    pub proactive_scan_volume_confirm_multiplier: f64,

    // LLM
    pub gemini_model: String,
    pub gemini_model_fallback_order: Vec<String>,

    // Notifications
    pub telegram_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            live_trading: false,
            virtual_balance: 10_000.0,
            default_order_type: EntryOrderType::Limit,
            default_market_type: MarketType::Future,
            leverage: 10,
            max_concurrent_trades: 5,

            risk_per_trade_percent: 5.0,
            use_dynamic_risk: true,
            dynamic_risk_atr_period: 14,
            dynamic_risk_base_risk: 1.5,
            dynamic_risk_low_vol_threshold: 1.5,
            dynamic_risk_low_vol_multiplier: 1.5,
            dynamic_risk_high_vol_threshold: 4.0,
            dynamic_risk_high_vol_multiplier: 0.75,

            use_atr_for_sltp: true,
            atr_multiplier_sl: 2.0,
            risk_reward_ratio_tp: 2.0,

            use_trailing_stop_loss: true,
            trailing_stop_activation_percent: 1.5,
            use_partial_tp: true,
            partial_tp_target_rr: 1.0,
            partial_tp_close_percent: 50.0,
            use_bailout_exit: true,
            bailout_arm_loss_percent: -2.0,
            bailout_recovery_percent: 1.0,
            use_ai_bailout_confirmation: true,

            use_mta_analysis: true,
            mta_trend_timeframe: "4h".to_string(),

            position_check_interval_seconds: 60,
            orphan_order_check_interval_seconds: 300,
            position_sync_interval_seconds: 300,

            proactive_scan_enabled: false,
            proactive_scan_interval_seconds: 900,
            proactive_scan_auto_confirm: false,
            proactive_scan_entry_timeframe: "15m".to_string(),
            proactive_scan_trend_timeframe: "4h".to_string(),
            proactive_scan_min_volume_usdt: 750_000.0,
            proactive_scan_top_n: 10,
            proactive_scan_use_gainers_losers: true,
            proactive_scan_use_volume_spike: true,
            proactive_scan_volume_timeframe: "1h".to_string(),
            proactive_scan_volume_multiplier: 5.0,
            proactive_scan_volume_period: 24,
            proactive_scan_whitelist: vec!["BTC".to_string(), "ETH".to_string(), "SOL".to_string()],
            proactive_scan_blacklist: vec!["SHIB".to_string(), "PEPE".to_string()],

            proactive_scan_prefilter_enabled: true,
            proactive_scan_rsi_lower: 38.0,
            proactive_scan_rsi_upper: 62.0,
            proactive_scan_adx_threshold: 18.0,
            proactive_scan_use_volatility_filter: true,
            proactive_scan_atr_period: 14,
            proactive_scan_atr_threshold_percent: 0.4,
            proactive_scan_use_volume_filter: true,
            proactive_scan_volume_avg_period: 20,
            proactive_scan_volume_confirm_multiplier: 1.2,

            gemini_model: "gemini-1.5-flash".to_string(),
            gemini_model_fallback_order: Vec::new(),

            telegram_enabled: true,
        }
    }
}

impl Settings {
    /// Build defaults, then overlay every row stored in `settings`. Unknown
    /// keys (e.g. a typo from a hand-edited row) are logged and skipped
    /// rather than rejecting the whole load.
    pub async fn load(pool: &DbPool) -> Result<Self, DatabaseError> {
        let repo = SettingsRepository::new(pool.clone());
        let overrides = repo.get_all().await?;

        let mut settings = Settings::default();
        for (key, value) in &overrides {
            if let Err(err) = settings.apply(key, value) {
                tracing::warn!("ignoring stored setting {key}: {err}");
            }
        }
        Ok(settings)
    }

    /// Apply a single typed override by key. Returns an error describing a
    /// type/key mismatch; the caller decides whether that's fatal.
    pub fn apply(&mut self, key: &str, value: &SettingValue) -> Result<(), String> {
        macro_rules! as_bool {
            () => {
                match value {
                    SettingValue::Bool(b) => *b,
                    _ => return Err(format!("{key} expects a bool")),
                }
            };
        }
        macro_rules! as_f64 {
            () => {
                match value {
                    SettingValue::Float(f) => *f,
                    SettingValue::Int(i) => *i as f64,
                    _ => return Err(format!("{key} expects a number")),
                }
            };
        }
        macro_rules! as_usize {
            () => {
                match value {
                    SettingValue::Int(i) if *i >= 0 => *i as usize,
                    _ => return Err(format!("{key} expects a non-negative int")),
                }
            };
        }
        macro_rules! as_u64 {
            () => {
                match value {
                    SettingValue::Int(i) if *i >= 0 => *i as u64,
                    _ => return Err(format!("{key} expects a non-negative int")),
                }
            };
        }
        macro_rules! as_string {
            () => {
                match value {
                    SettingValue::Str(s) => s.clone(),
                    _ => return Err(format!("{key} expects a string")),
                }
            };
        }
        macro_rules! as_list {
            () => {
                match value {
                    SettingValue::List(items) => items.clone(),
                    _ => return Err(format!("{key} expects a list")),
                }
            };
        }

        match key {
            "LIVE_TRADING" => self.live_trading = as_bool!(),
            "VIRTUAL_BALANCE" => self.virtual_balance = as_f64!(),
            "DEFAULT_ORDER_TYPE" => {
                self.default_order_type = as_string!().parse().map_err(|e: String| e)?
            }
            "DEFAULT_MARKET_TYPE" => {
                self.default_market_type = as_string!().parse().map_err(|e: String| e)?
            }
            "LEVERAGE" => self.leverage = as_usize!() as u32,
            "MAX_CONCURRENT_TRADES" => self.max_concurrent_trades = as_usize!(),

            "RISK_PER_TRADE_PERCENT" => self.risk_per_trade_percent = as_f64!(),
            "USE_DYNAMIC_RISK" => self.use_dynamic_risk = as_bool!(),
            "DYNAMIC_RISK_ATR_PERIOD" => self.dynamic_risk_atr_period = as_usize!(),
            "DYNAMIC_RISK_BASE_RISK" => self.dynamic_risk_base_risk = as_f64!(),
            "DYNAMIC_RISK_LOW_VOL_THRESHOLD" => self.dynamic_risk_low_vol_threshold = as_f64!(),
            "DYNAMIC_RISK_LOW_VOL_MULTIPLIER" => self.dynamic_risk_low_vol_multiplier = as_f64!(),
            "DYNAMIC_RISK_HIGH_VOL_THRESHOLD" => self.dynamic_risk_high_vol_threshold = as_f64!(),
            "DYNAMIC_RISK_HIGH_VOL_MULTIPLIER" => self.dynamic_risk_high_vol_multiplier = as_f64!(),

            "USE_ATR_FOR_SLTP" => self.use_atr_for_sltp = as_bool!(),
            "ATR_MULTIPLIER_SL" => self.atr_multiplier_sl = as_f64!(),
            "RISK_REWARD_RATIO_TP" => self.risk_reward_ratio_tp = as_f64!(),

            "USE_TRAILING_STOP_LOSS" => self.use_trailing_stop_loss = as_bool!(),
            "TRAILING_STOP_ACTIVATION_PERCENT" => {
                self.trailing_stop_activation_percent = as_f64!()
            }
            "USE_PARTIAL_TP" => self.use_partial_tp = as_bool!(),
            "PARTIAL_TP_TARGET_RR" => self.partial_tp_target_rr = as_f64!(),
            "PARTIAL_TP_CLOSE_PERCENT" => self.partial_tp_close_percent = as_f64!(),
            "USE_BAILOUT_EXIT" => self.use_bailout_exit = as_bool!(),
            "BAILOUT_ARM_LOSS_PERCENT" => self.bailout_arm_loss_percent = as_f64!(),
            "BAILOUT_RECOVERY_PERCENT" => self.bailout_recovery_percent = as_f64!(),
            "USE_AI_BAILOUT_CONFIRMATION" => self.use_ai_bailout_confirmation = as_bool!(),

            "USE_MTA_ANALYSIS" => self.use_mta_analysis = as_bool!(),
            "MTA_TREND_TIMEFRAME" => self.mta_trend_timeframe = as_string!(),

            "POSITION_CHECK_INTERVAL_SECONDS" => self.position_check_interval_seconds = as_u64!(),
            "ORPHAN_ORDER_CHECK_INTERVAL_SECONDS" => {
                self.orphan_order_check_interval_seconds = as_u64!()
            }
            "POSITION_SYNC_INTERVAL_SECONDS" => self.position_sync_interval_seconds = as_u64!(),

            "PROACTIVE_SCAN_ENABLED" => self.proactive_scan_enabled = as_bool!(),
            "PROACTIVE_SCAN_INTERVAL_SECONDS" => self.proactive_scan_interval_seconds = as_u64!(),
            "PROACTIVE_SCAN_AUTO_CONFIRM" => self.proactive_scan_auto_confirm = as_bool!(),
            "PROACTIVE_SCAN_ENTRY_TIMEFRAME" => self.proactive_scan_entry_timeframe = as_string!(),
            "PROACTIVE_SCAN_TREND_TIMEFRAME" => self.proactive_scan_trend_timeframe = as_string!(),
            "PROACTIVE_SCAN_MIN_VOLUME_USDT" => self.proactive_scan_min_volume_usdt = as_f64!(),
            "PROACTIVE_SCAN_TOP_N" => self.proactive_scan_top_n = as_usize!(),
            "PROACTIVE_SCAN_USE_GAINERS_LOSERS" => {
                self.proactive_scan_use_gainers_losers = as_bool!()
            }
            "PROACTIVE_SCAN_USE_VOLUME_SPIKE" => self.proactive_scan_use_volume_spike = as_bool!(),
            "PROACTIVE_SCAN_VOLUME_TIMEFRAME" => self.proactive_scan_volume_timeframe = as_string!(),
            "PROACTIVE_SCAN_VOLUME_MULTIPLIER" => self.proactive_scan_volume_multiplier = as_f64!(),
            "PROACTIVE_SCAN_VOLUME_PERIOD" => self.proactive_scan_volume_period = as_usize!(),
            "PROACTIVE_SCAN_WHITELIST" => self.proactive_scan_whitelist = as_list!(),
            "PROACTIVE_SCAN_BLACKLIST" => self.proactive_scan_blacklist = as_list!(),

            "PROACTIVE_SCAN_PREFILTER_ENABLED" => {
                self.proactive_scan_prefilter_enabled = as_bool!()
            }
            "PROACTIVE_SCAN_RSI_LOWER" => self.proactive_scan_rsi_lower = as_f64!(),
            "PROACTIVE_SCAN_RSI_UPPER" => self.proactive_scan_rsi_upper = as_f64!(),
            "PROACTIVE_SCAN_ADX_THRESHOLD" => self.proactive_scan_adx_threshold = as_f64!(),
            "PROACTIVE_SCAN_USE_VOLATILITY_FILTER" => {
                self.proactive_scan_use_volatility_filter = as_bool!()
            }
            "PROACTIVE_SCAN_ATR_PERIOD" => self.proactive_scan_atr_period = as_usize!(),
            "PROACTIVE_SCAN_ATR_THRESHOLD_PERCENT" => {
                self.proactive_scan_atr_threshold_percent = as_f64!()
            }
            "PROACTIVE_SCAN_USE_VOLUME_FILTER" => self.proactive_scan_use_volume_filter = as_bool!(),
            "PROACTIVE_SCAN_VOLUME_AVG_PERIOD" => self.proactive_scan_volume_avg_period = as_usize!(),
            "PROACTIVE_SCAN_VOLUME_CONFIRM_MULTIPLIER" => {
                self.proactive_scan_volume_confirm_multiplier = as_f64!()
            }

            "GEMINI_MODEL" => self.gemini_model = as_string!(),
            "GEMINI_MODEL_FALLBACK_ORDER" => self.gemini_model_fallback_order = as_list!(),

            "TELEGRAM_ENABLED" => self.telegram_enabled = as_bool!(),

            unknown => return Err(format!("unrecognized settings key: {unknown}")),
        }
        Ok(())
    }

    /// The ordered, deduplicated LLM model list (spec §4.4): the primary
    /// model first, then its configured fallbacks, each kept only once.
    pub fn llm_model_list(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut models = Vec::new();
        for model in std::iter::once(self.gemini_model.clone())
            .chain(self.gemini_model_fallback_order.iter().cloned())
        {
            if seen.insert(model.clone()) {
                models.push(model);
            }
        }
        models
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let settings = Settings::default();
        assert!(!settings.live_trading);
        assert_eq!(settings.virtual_balance, 10_000.0);
        assert_eq!(settings.max_concurrent_trades, 5);
        assert_eq!(settings.proactive_scan_whitelist, vec!["BTC", "ETH", "SOL"]);
    }

    #[test]
    fn apply_overrides_typed_value() {
        let mut settings = Settings::default();
        settings.apply("LIVE_TRADING", &SettingValue::Bool(true)).unwrap();
        assert!(settings.live_trading);

        settings
            .apply("MAX_CONCURRENT_TRADES", &SettingValue::Int(3))
            .unwrap();
        assert_eq!(settings.max_concurrent_trades, 3);
    }

    #[test]
    fn apply_rejects_unknown_key() {
        let mut settings = Settings::default();
        assert!(settings.apply("NOT_A_REAL_KEY", &SettingValue::Bool(true)).is_err());
    }

    #[test]
    fn apply_rejects_type_mismatch() {
        let mut settings = Settings::default();
        assert!(settings
            .apply("LIVE_TRADING", &SettingValue::Str("true".to_string()))
            .is_err());
    }

    #[test]
    fn llm_model_list_dedups_preserving_order() {
        let mut settings = Settings::default();
        settings.gemini_model = "gemini-1.5-flash".to_string();
        settings.gemini_model_fallback_order =
            vec!["gemini-1.5-pro".to_string(), "gemini-1.5-flash".to_string()];
        assert_eq!(
            settings.llm_model_list(),
            vec!["gemini-1.5-flash".to_string(), "gemini-1.5-pro".to_string()]
        );
    }
}
