//! Database row shapes (spec §3, §6) for the five persisted tables:
//! `settings`, `managed_positions`, `trade_history`, `events`,
//! `strategy_presets`, and `scanner_candidates`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One row of `settings(key PK, value, type)`. `value` is always stored as
/// text; `kind` tells the loader how to parse it back (bool/int/float/string/list).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SettingRow {
    pub key: String,
    pub value: String,
    pub kind: String,
}

/// A live managed position (spec §3 Position).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ManagedPositionRow {
    pub symbol: String,
    pub side: String,
    pub entry_price: f64,
    pub initial_amount: f64,
    pub initial_stop_loss: f64,
    pub leverage: f64,
    pub timeframe: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub amount: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub pnl: f64,
    pub pnl_percentage: f64,
    pub partial_tp_executed: bool,
    pub bailout_armed: bool,
    pub extremum_price: f64,
    pub bailout_analysis_triggered: bool,
}

/// Append-only closed-position ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TradeHistoryRow {
    pub id: i64,
    pub symbol: String,
    pub side: String,
    pub initial_amount: f64,
    pub entry_price: f64,
    pub close_price: f64,
    pub pnl: f64,
    pub status: String,
    pub timeframe: String,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
}

/// Append-only operational event log.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EventRow {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub category: String,
    pub message: String,
}

/// One scanner hit; the whole table is overwritten on every interactive scan.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ScannerCandidateRow {
    pub symbol: String,
    pub source: String,
    pub timeframe: String,
    pub indicators_json: String,
    pub last_updated: DateTime<Utc>,
}

/// A named, read-only (from the core's perspective) settings bundle.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StrategyPresetRow {
    pub id: i64,
    pub name: String,
    pub settings_json: String,
    pub created_at: DateTime<Utc>,
}
