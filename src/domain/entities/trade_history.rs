//! Append-only closed-position ledger entry.

use super::position::PositionSide;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct TradeHistoryEntry {
    pub symbol: String,
    pub side: PositionSide,
    pub initial_amount: f64,
    pub entry_price: f64,
    pub close_price: f64,
    pub pnl: f64,
    /// Close reason: "SL", "TP", "BAILOUT_EXIT", "AI_BAILOUT_EXIT", "MANUAL", ...
    pub status: String,
    pub timeframe: String,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
}

impl TradeHistoryEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: String,
        side: PositionSide,
        initial_amount: f64,
        entry_price: f64,
        close_price: f64,
        pnl: f64,
        status: String,
        timeframe: String,
        opened_at: DateTime<Utc>,
        closed_at: DateTime<Utc>,
    ) -> Self {
        TradeHistoryEntry {
            symbol,
            side,
            initial_amount,
            entry_price,
            close_price,
            pnl,
            status,
            timeframe,
            opened_at,
            closed_at,
        }
    }
}
