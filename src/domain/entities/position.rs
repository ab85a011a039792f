//! A managed, open trade.
//!
//! Positions are created by the Trader after a successful exchange fill,
//! mutated only by the Position Manager's per-tick state machine, and
//! destroyed when the Trader confirms a close (see `trading::trader`).

use crate::domain::errors::ValidationError;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PositionSide {
    Buy,
    Sell,
}

impl PositionSide {
    pub fn opposite(&self) -> PositionSide {
        match self {
            PositionSide::Buy => PositionSide::Sell,
            PositionSide::Sell => PositionSide::Buy,
        }
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionSide::Buy => write!(f, "buy"),
            PositionSide::Sell => write!(f, "sell"),
        }
    }
}

/// An open, managed trade. See spec §3 for the field-by-field invariants
/// enforced by the constructors and mutators below.
#[derive(Debug, Clone)]
pub struct Position {
    // Identity
    pub symbol: String,

    // Immutable after open
    pub side: PositionSide,
    pub entry_price: f64,
    pub initial_amount: f64,
    pub initial_stop_loss: f64,
    pub leverage: f64,
    pub timeframe: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,

    // Mutable
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

impl Position {
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        symbol: String,
        side: PositionSide,
        entry_price: f64,
        amount: f64,
        stop_loss: f64,
        take_profit: f64,
        leverage: f64,
        timeframe: String,
        reason: String,
        created_at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        if amount <= 0.0 {
            return Err(ValidationError::InvalidQuantity(
                "amount must be > 0".to_string(),
            ));
        }
        if leverage < 1.0 {
            return Err(ValidationError::InvalidInput(
                "leverage must be >= 1".to_string(),
            ));
        }
        if entry_price <= 0.0 {
            return Err(ValidationError::InvalidPrice(
                "entry_price must be > 0".to_string(),
            ));
        }
        match side {
            PositionSide::Buy => {
                if !(stop_loss < entry_price && entry_price < take_profit) {
                    return Err(ValidationError::InvalidInput(
                        "buy position requires stop_loss < entry_price < take_profit".to_string(),
                    ));
                }
            }
            PositionSide::Sell => {
                if !(take_profit < entry_price && entry_price < stop_loss) {
                    return Err(ValidationError::InvalidInput(
                        "sell position requires take_profit < entry_price < stop_loss".to_string(),
                    ));
                }
            }
        }

        Ok(Position {
            symbol,
            side,
            entry_price,
            initial_amount: amount,
            initial_stop_loss: stop_loss,
            leverage,
            timeframe,
            reason,
            created_at,
            amount,
            stop_loss,
            take_profit,
            pnl: 0.0,
            pnl_percentage: 0.0,
            partial_tp_executed: false,
            bailout_armed: false,
            extremum_price: 0.0,
            bailout_analysis_triggered: false,
        })
    }

    /// Recompute `pnl`/`pnl_percentage` for a new mark price. `margin` uses
    /// `entry_price * initial_amount / leverage`, matching the original
    /// position-management refresh.
    pub fn refresh_pnl(&mut self, current_price: f64) {
        let signed = match self.side {
            PositionSide::Buy => current_price - self.entry_price,
            PositionSide::Sell => self.entry_price - current_price,
        };
        self.pnl = signed * self.amount;
        let margin = self.entry_price * self.initial_amount / self.leverage;
        self.pnl_percentage = if margin.abs() > f64::EPSILON {
            (signed * self.initial_amount) / margin * 100.0
        } else {
            0.0
        };
    }

    pub fn hard_stop_loss_hit(&self, current_price: f64) -> bool {
        match self.side {
            PositionSide::Buy => current_price <= self.stop_loss,
            PositionSide::Sell => current_price >= self.stop_loss,
        }
    }

    pub fn hard_take_profit_hit(&self, current_price: f64) -> bool {
        match self.side {
            PositionSide::Buy => current_price >= self.take_profit,
            PositionSide::Sell => current_price <= self.take_profit,
        }
    }

    /// Move the stop-loss, enforcing the monotone-favorable invariant once
    /// trailing/partial-TP has begun (partial_tp_executed latched, or a
    /// strictly-better candidate is always accepted since callers only pass
    /// a candidate after checking it's favorable — this is the last line of
    /// defense against a regression).
    pub fn move_stop_loss(&mut self, new_stop_loss: f64) {
        let more_favorable = match self.side {
            PositionSide::Buy => new_stop_loss > self.stop_loss,
            PositionSide::Sell => new_stop_loss < self.stop_loss,
        };
        if more_favorable {
            self.stop_loss = new_stop_loss;
        }
    }

    /// Latch `partial_tp_executed`, shrink `amount`, and move SL to breakeven.
    /// Write-once: calling this twice is a no-op the second time.
    pub fn apply_partial_tp(&mut self, closed_amount: f64) {
        if self.partial_tp_executed {
            return;
        }
        self.amount = (self.amount - closed_amount).max(0.0);
        self.move_stop_loss(self.entry_price);
        self.partial_tp_executed = true;
    }

    pub fn arm_bailout(&mut self, current_price: f64) {
        self.bailout_armed = true;
        self.extremum_price = current_price;
        self.bailout_analysis_triggered = false;
    }

    pub fn disarm_bailout(&mut self) {
        self.bailout_armed = false;
        self.extremum_price = 0.0;
        self.bailout_analysis_triggered = false;
    }

    /// Update the worst price seen since arming, if `current_price` is worse.
    pub fn update_bailout_extremum(&mut self, current_price: f64) {
        let worse = match self.side {
            PositionSide::Buy => current_price < self.extremum_price,
            PositionSide::Sell => current_price > self.extremum_price,
        };
        if worse {
            self.extremum_price = current_price;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buy_position() -> Position {
        Position::open(
            "BTC/USDT".to_string(),
            PositionSide::Buy,
            100.0,
            25.0,
            96.0,
            108.0,
            10.0,
            "15m".to_string(),
            "scanner".to_string(),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn rejects_invalid_buy_bracket() {
        let err = Position::open(
            "BTC/USDT".to_string(),
            PositionSide::Buy,
            100.0,
            25.0,
            101.0,
            108.0,
            10.0,
            "15m".to_string(),
            "scanner".to_string(),
            Utc::now(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn rejects_non_positive_amount() {
        let err = Position::open(
            "BTC/USDT".to_string(),
            PositionSide::Buy,
            100.0,
            0.0,
            96.0,
            108.0,
            10.0,
            "15m".to_string(),
            "scanner".to_string(),
            Utc::now(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn refresh_pnl_buy_matches_scenario_2() {
        let mut pos = buy_position();
        pos.refresh_pnl(95.9);
        assert!((pos.pnl - (95.9 - 100.0) * 25.0).abs() < 1e-9);
    }

    #[test]
    fn hard_exits_trigger_at_bracket() {
        let pos = buy_position();
        assert!(pos.hard_stop_loss_hit(95.9));
        assert!(!pos.hard_stop_loss_hit(96.1));
        assert!(pos.hard_take_profit_hit(108.1));
        assert!(!pos.hard_take_profit_hit(107.9));
    }

    #[test]
    fn move_stop_loss_is_monotone_favorable_for_buy() {
        let mut pos = buy_position();
        pos.move_stop_loss(97.6);
        assert_eq!(pos.stop_loss, 97.6);
        pos.move_stop_loss(95.0);
        assert_eq!(pos.stop_loss, 97.6, "must not move against the position");
    }

    #[test]
    fn move_stop_loss_is_monotone_favorable_for_sell() {
        let mut pos = Position::open(
            "BTC/USDT".to_string(),
            PositionSide::Sell,
            100.0,
            25.0,
            104.0,
            92.0,
            10.0,
            "15m".to_string(),
            "scanner".to_string(),
            Utc::now(),
        )
        .unwrap();
        pos.move_stop_loss(102.0);
        assert_eq!(pos.stop_loss, 102.0);
        pos.move_stop_loss(103.0);
        assert_eq!(pos.stop_loss, 102.0);
    }

    #[test]
    fn partial_tp_is_write_once() {
        let mut pos = buy_position();
        pos.apply_partial_tp(12.5);
        assert!(pos.partial_tp_executed);
        assert_eq!(pos.amount, 12.5);
        assert_eq!(pos.stop_loss, pos.entry_price);

        // Second call is a no-op even with a different amount.
        pos.apply_partial_tp(5.0);
        assert_eq!(pos.amount, 12.5);
    }

    #[test]
    fn bailout_arming_sets_extremum() {
        let mut pos = buy_position();
        pos.arm_bailout(97.5);
        assert!(pos.bailout_armed);
        assert_eq!(pos.extremum_price, 97.5);

        pos.update_bailout_extremum(96.0);
        assert_eq!(pos.extremum_price, 96.0);

        // A bounce does not worsen the extremum.
        pos.update_bailout_extremum(96.96);
        assert_eq!(pos.extremum_price, 96.0);
    }
}
