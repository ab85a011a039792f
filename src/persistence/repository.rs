//! Data access layer over the six persisted tables.

use super::models::*;
use super::{DatabaseError, DbPool};
use crate::domain::entities::candidate::ScannerCandidate;
use crate::domain::entities::event::{Event, EventLevel};
use crate::domain::entities::position::{Position, PositionSide};
use crate::domain::entities::preset::Preset;
use crate::domain::entities::trade_history::TradeHistoryEntry;
use chrono::Utc;
use std::collections::HashMap;
use tracing::{debug, error};

fn parse_side(raw: &str) -> Result<PositionSide, DatabaseError> {
    match raw {
        "buy" => Ok(PositionSide::Buy),
        "sell" => Ok(PositionSide::Sell),
        other => Err(DatabaseError::QueryError(format!(
            "unrecognized position side in storage: {other}"
        ))),
    }
}

fn parse_level(raw: &str) -> EventLevel {
    match raw {
        "DEBUG" => EventLevel::Debug,
        "INFO" => EventLevel::Info,
        "SUCCESS" => EventLevel::Success,
        "WARNING" => EventLevel::Warning,
        "ERROR" => EventLevel::Error,
        _ => EventLevel::Critical,
    }
}

impl ManagedPositionRow {
    fn into_position(self) -> Result<Position, DatabaseError> {
        Ok(Position {
            symbol: self.symbol,
            side: parse_side(&self.side)?,
            entry_price: self.entry_price,
            initial_amount: self.initial_amount,
            initial_stop_loss: self.initial_stop_loss,
            leverage: self.leverage,
            timeframe: self.timeframe,
            reason: self.reason,
            created_at: self.created_at,
            amount: self.amount,
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
            pnl: self.pnl,
            pnl_percentage: self.pnl_percentage,
            partial_tp_executed: self.partial_tp_executed,
            bailout_armed: self.bailout_armed,
            extremum_price: self.extremum_price,
            bailout_analysis_triggered: self.bailout_analysis_triggered,
        })
    }
}

/// Typed settings values as read back from `settings.kind`.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<String>),
}

impl SettingValue {
    fn encode(&self) -> (String, &'static str) {
        match self {
            SettingValue::Bool(b) => (b.to_string(), "bool"),
            SettingValue::Int(i) => (i.to_string(), "int"),
            SettingValue::Float(f) => (f.to_string(), "float"),
            SettingValue::Str(s) => (s.clone(), "string"),
            SettingValue::List(items) => (items.join(","), "list"),
        }
    }

    fn decode(row: &SettingRow) -> Result<Self, DatabaseError> {
        match row.kind.as_str() {
            "bool" => row
                .value
                .parse()
                .map(SettingValue::Bool)
                .map_err(|e| DatabaseError::QueryError(format!("bad bool for {}: {e}", row.key))),
            "int" => row
                .value
                .parse()
                .map(SettingValue::Int)
                .map_err(|e| DatabaseError::QueryError(format!("bad int for {}: {e}", row.key))),
            "float" => row
                .value
                .parse()
                .map(SettingValue::Float)
                .map_err(|e| DatabaseError::QueryError(format!("bad float for {}: {e}", row.key))),
            "list" => Ok(SettingValue::List(
                row.value.split(',').filter(|s| !s.is_empty()).map(str::to_string).collect(),
            )),
            _ => Ok(SettingValue::Str(row.value.clone())),
        }
    }
}

pub struct SettingsRepository {
    pool: DbPool,
}

impl SettingsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get_all(&self) -> Result<HashMap<String, SettingValue>, DatabaseError> {
        let rows = sqlx::query_as::<_, SettingRow>("SELECT * FROM settings")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DatabaseError::QueryError(format!("get_all settings: {e}")))?;

        rows.iter()
            .map(|row| SettingValue::decode(row).map(|v| (row.key.clone(), v)))
            .collect()
    }

    pub async fn set(&self, key: &str, value: SettingValue) -> Result<(), DatabaseError> {
        let (encoded, kind) = value.encode();
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, kind) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, kind = excluded.kind
            "#,
        )
        .bind(key)
        .bind(encoded)
        .bind(kind)
        .execute(&self.pool)
        .await
        .map_err(|e| DatabaseError::QueryError(format!("set setting {key}: {e}")))?;

        debug!("setting updated: {key}");
        Ok(())
    }
}

pub struct ManagedPositionRepository {
    pool: DbPool,
}

impl ManagedPositionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert a newly opened position or overwrite the row for its symbol
    /// entirely (the Position Manager's mutators always write back the
    /// whole struct).
    pub async fn upsert(&self, position: &Position) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO managed_positions (
                symbol, side, entry_price, initial_amount, initial_stop_loss, leverage,
                timeframe, reason, created_at, amount, stop_loss, take_profit, pnl,
                pnl_percentage, partial_tp_executed, bailout_armed, extremum_price,
                bailout_analysis_triggered
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
            ON CONFLICT(symbol) DO UPDATE SET
                amount = excluded.amount,
                stop_loss = excluded.stop_loss,
                take_profit = excluded.take_profit,
                pnl = excluded.pnl,
                pnl_percentage = excluded.pnl_percentage,
                partial_tp_executed = excluded.partial_tp_executed,
                bailout_armed = excluded.bailout_armed,
                extremum_price = excluded.extremum_price,
                bailout_analysis_triggered = excluded.bailout_analysis_triggered
            "#,
        )
        .bind(&position.symbol)
        .bind(position.side.to_string())
        .bind(position.entry_price)
        .bind(position.initial_amount)
        .bind(position.initial_stop_loss)
        .bind(position.leverage)
        .bind(&position.timeframe)
        .bind(&position.reason)
        .bind(position.created_at)
        .bind(position.amount)
        .bind(position.stop_loss)
        .bind(position.take_profit)
        .bind(position.pnl)
        .bind(position.pnl_percentage)
        .bind(position.partial_tp_executed)
        .bind(position.bailout_armed)
        .bind(position.extremum_price)
        .bind(position.bailout_analysis_triggered)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("failed to upsert position {}: {}", position.symbol, e);
            DatabaseError::QueryError(format!("upsert position: {e}"))
        })?;

        Ok(())
    }

    pub async fn get(&self, symbol: &str) -> Result<Option<Position>, DatabaseError> {
        let row = sqlx::query_as::<_, ManagedPositionRow>(
            "SELECT * FROM managed_positions WHERE symbol = ?1",
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DatabaseError::QueryError(format!("get position {symbol}: {e}")))?;

        row.map(ManagedPositionRow::into_position).transpose()
    }

    pub async fn get_all(&self) -> Result<Vec<Position>, DatabaseError> {
        let rows = sqlx::query_as::<_, ManagedPositionRow>("SELECT * FROM managed_positions")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DatabaseError::QueryError(format!("get_all positions: {e}")))?;

        rows.into_iter().map(ManagedPositionRow::into_position).collect()
    }

    pub async fn delete(&self, symbol: &str) -> Result<(), DatabaseError> {
        let rows_affected = sqlx::query("DELETE FROM managed_positions WHERE symbol = ?1")
            .bind(symbol)
            .execute(&self.pool)
            .await
            .map_err(|e| DatabaseError::QueryError(format!("delete position {symbol}: {e}")))?
            .rows_affected();

        if rows_affected == 0 {
            return Err(DatabaseError::QueryError(format!(
                "position not found: {symbol}"
            )));
        }
        Ok(())
    }
}

pub struct TradeHistoryRepository {
    pool: DbPool,
}

impl TradeHistoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn append(&self, entry: &TradeHistoryEntry) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO trade_history (
                symbol, side, initial_amount, entry_price, close_price, pnl,
                status, timeframe, opened_at, closed_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&entry.symbol)
        .bind(entry.side.to_string())
        .bind(entry.initial_amount)
        .bind(entry.entry_price)
        .bind(entry.close_price)
        .bind(entry.pnl)
        .bind(&entry.status)
        .bind(&entry.timeframe)
        .bind(entry.opened_at)
        .bind(entry.closed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("failed to append trade history for {}: {}", entry.symbol, e);
            DatabaseError::QueryError(format!("append trade history: {e}"))
        })?;

        Ok(())
    }

    pub async fn recent(&self, limit: i64) -> Result<Vec<TradeHistoryEntry>, DatabaseError> {
        let rows = sqlx::query_as::<_, TradeHistoryRow>(
            "SELECT * FROM trade_history ORDER BY closed_at DESC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DatabaseError::QueryError(format!("recent trade history: {e}")))?;

        rows.into_iter()
            .map(|row| {
                Ok(TradeHistoryEntry::new(
                    row.symbol,
                    parse_side(&row.side)?,
                    row.initial_amount,
                    row.entry_price,
                    row.close_price,
                    row.pnl,
                    row.status,
                    row.timeframe,
                    row.opened_at,
                    row.closed_at,
                ))
            })
            .collect()
    }

    pub async fn count_by_symbol_since(
        &self,
        symbol: &str,
        opened_at: chrono::DateTime<Utc>,
    ) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM trade_history WHERE symbol = ?1 AND opened_at = ?2",
        )
        .bind(symbol)
        .bind(opened_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DatabaseError::QueryError(format!("count trade history: {e}")))?;

        Ok(row.0)
    }
}

pub struct EventRepository {
    pool: DbPool,
}

impl EventRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn append(&self, event: &Event) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO events (timestamp, level, category, message) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(event.timestamp)
        .bind(event.level.to_string())
        .bind(&event.category)
        .bind(&event.message)
        .execute(&self.pool)
        .await
        .map_err(|e| DatabaseError::QueryError(format!("append event: {e}")))?;

        Ok(())
    }

    pub async fn recent(&self, limit: i64) -> Result<Vec<Event>, DatabaseError> {
        let rows = sqlx::query_as::<_, EventRow>(
            "SELECT * FROM events ORDER BY timestamp DESC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DatabaseError::QueryError(format!("recent events: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|row| Event {
                timestamp: row.timestamp,
                level: parse_level(&row.level),
                category: row.category,
                message: row.message,
            })
            .collect())
    }
}

pub struct ScannerCandidateRepository {
    pool: DbPool,
}

impl ScannerCandidateRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Overwrites the whole table with the latest scan results (spec §3:
    /// "the whole table is overwritten on each interactive scan").
    pub async fn replace_all(&self, candidates: &[ScannerCandidate]) -> Result<(), DatabaseError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DatabaseError::QueryError(format!("begin tx: {e}")))?;

        sqlx::query("DELETE FROM scanner_candidates")
            .execute(&mut *tx)
            .await
            .map_err(|e| DatabaseError::QueryError(format!("clear scanner_candidates: {e}")))?;

        for candidate in candidates {
            let indicators_json = serde_json::to_string(&candidate.indicators)
                .map_err(|e| DatabaseError::QueryError(format!("serialize indicators: {e}")))?;

            sqlx::query(
                r#"
                INSERT INTO scanner_candidates (symbol, source, timeframe, indicators_json, last_updated)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(&candidate.symbol)
            .bind(&candidate.source)
            .bind(&candidate.timeframe)
            .bind(indicators_json)
            .bind(candidate.last_updated)
            .execute(&mut *tx)
            .await
            .map_err(|e| DatabaseError::QueryError(format!("insert candidate: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| DatabaseError::QueryError(format!("commit tx: {e}")))?;

        debug!("scanner candidates replaced: {} rows", candidates.len());
        Ok(())
    }

    pub async fn get_all(&self) -> Result<Vec<ScannerCandidate>, DatabaseError> {
        let rows = sqlx::query_as::<_, ScannerCandidateRow>("SELECT * FROM scanner_candidates")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DatabaseError::QueryError(format!("get_all candidates: {e}")))?;

        rows.into_iter()
            .map(|row| {
                let indicators: HashMap<String, f64> = serde_json::from_str(&row.indicators_json)
                    .map_err(|e| DatabaseError::QueryError(format!("parse indicators: {e}")))?;
                Ok(ScannerCandidate {
                    symbol: row.symbol,
                    source: row.source,
                    timeframe: row.timeframe,
                    indicators,
                    last_updated: row.last_updated,
                })
            })
            .collect()
    }
}

pub struct StrategyPresetRepository {
    pool: DbPool,
}

impl StrategyPresetRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get_all(&self) -> Result<Vec<Preset>, DatabaseError> {
        let rows = sqlx::query_as::<_, StrategyPresetRow>(
            "SELECT * FROM strategy_presets ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DatabaseError::QueryError(format!("get_all presets: {e}")))?;

        rows.into_iter()
            .map(|row| {
                let settings: HashMap<String, String> = serde_json::from_str(&row.settings_json)
                    .map_err(|e| DatabaseError::QueryError(format!("parse preset settings: {e}")))?;
                Ok(Preset {
                    id: row.id,
                    name: row.name,
                    settings,
                    created_at: row.created_at,
                })
            })
            .collect()
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Option<Preset>, DatabaseError> {
        let row = sqlx::query_as::<_, StrategyPresetRow>(
            "SELECT * FROM strategy_presets WHERE name = ?1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DatabaseError::QueryError(format!("get preset {name}: {e}")))?;

        row.map(|row| {
            let settings: HashMap<String, String> = serde_json::from_str(&row.settings_json)
                .map_err(|e| DatabaseError::QueryError(format!("parse preset settings: {e}")))?;
            Ok(Preset {
                id: row.id,
                name: row.name,
                settings,
                created_at: row.created_at,
            })
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::init_database;

    fn sample_position(symbol: &str) -> Position {
        Position::open(
            symbol.to_string(),
            PositionSide::Buy,
            50000.0,
            0.1,
            49000.0,
            51000.0,
            10.0,
            "15m".to_string(),
            "RSI oversold".to_string(),
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn settings_roundtrip() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        let repo = SettingsRepository::new(pool);

        repo.set("LIVE_TRADING", SettingValue::Bool(false)).await.unwrap();
        repo.set("MAX_CONCURRENT_TRADES", SettingValue::Int(5)).await.unwrap();
        repo.set("RISK_PER_TRADE_PERCENT", SettingValue::Float(5.0)).await.unwrap();
        repo.set(
            "PROACTIVE_SCAN_WHITELIST",
            SettingValue::List(vec!["BTC".to_string(), "ETH".to_string()]),
        )
        .await
        .unwrap();

        let all = repo.get_all().await.unwrap();
        assert_eq!(all.get("LIVE_TRADING"), Some(&SettingValue::Bool(false)));
        assert_eq!(all.get("MAX_CONCURRENT_TRADES"), Some(&SettingValue::Int(5)));
        assert_eq!(
            all.get("PROACTIVE_SCAN_WHITELIST"),
            Some(&SettingValue::List(vec!["BTC".to_string(), "ETH".to_string()]))
        );
    }

    #[tokio::test]
    async fn position_upsert_and_get() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        let repo = ManagedPositionRepository::new(pool);

        let position = sample_position("BTC/USDT");
        repo.upsert(&position).await.unwrap();

        let fetched = repo.get("BTC/USDT").await.unwrap().unwrap();
        assert_eq!(fetched.symbol, "BTC/USDT");
        assert_eq!(fetched.entry_price, 50000.0);

        let mut mutated = fetched.clone();
        mutated.apply_partial_tp(0.05);
        repo.upsert(&mutated).await.unwrap();

        let refetched = repo.get("BTC/USDT").await.unwrap().unwrap();
        assert!(refetched.partial_tp_executed);
        assert!((refetched.amount - 0.05).abs() < 1e-9);
    }

    #[tokio::test]
    async fn position_delete_removes_row() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        let repo = ManagedPositionRepository::new(pool);
        repo.upsert(&sample_position("ETH/USDT")).await.unwrap();
        repo.delete("ETH/USDT").await.unwrap();
        assert!(repo.get("ETH/USDT").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn trade_history_is_append_only() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        let repo = TradeHistoryRepository::new(pool);
        let now = Utc::now();
        let entry = TradeHistoryEntry::new(
            "BTC/USDT".to_string(),
            PositionSide::Buy,
            0.1,
            50000.0,
            51000.0,
            100.0,
            "TP".to_string(),
            "15m".to_string(),
            now,
            now,
        );
        repo.append(&entry).await.unwrap();
        let recent = repo.recent(10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].symbol, "BTC/USDT");
    }

    #[tokio::test]
    async fn scanner_candidates_replace_all_overwrites() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        let repo = ScannerCandidateRepository::new(pool);

        let mut indicators = HashMap::new();
        indicators.insert("rsi".to_string(), 45.0);
        let first = vec![ScannerCandidate::new(
            "BTC/USDT".to_string(),
            "gainers".to_string(),
            "15m".to_string(),
            indicators,
        )];
        repo.replace_all(&first).await.unwrap();
        assert_eq!(repo.get_all().await.unwrap().len(), 1);

        repo.replace_all(&[]).await.unwrap();
        assert_eq!(repo.get_all().await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn events_are_recorded_in_order() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        let repo = EventRepository::new(pool);
        repo.append(&Event::new(EventLevel::Info, "trade", "opened BTC/USDT"))
            .await
            .unwrap();
        repo.append(&Event::new(EventLevel::Critical, "llm", "all models exhausted"))
            .await
            .unwrap();

        let recent = repo.recent(10).await.unwrap();
        assert_eq!(recent.len(), 2);
    }
}
