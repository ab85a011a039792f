//! Pure per-tick decision logic for a managed position (spec §4.6).
//!
//! Every function here is a deterministic state transition over a `Position`
//! snapshot — no I/O, no clock reads beyond a `current_price` the caller
//! supplies. The orchestration that calls these in the right order, persists
//! the result, and talks to the exchange/notifier lives in
//! `trading::position_manager`.

use crate::domain::entities::position::{Position, PositionSide};
use std::collections::HashSet;

/// Why a position's hard bracket fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardExitReason {
    StopLoss,
    TakeProfit,
}

/// Checks the hard SL/TP brackets. Stop-loss is checked first: on the rare
/// tick where both could be considered crossed (a price gap through both
/// levels), the position is treated as stopped out, matching the original
/// per-position check order.
pub fn check_hard_exit(position: &Position, current_price: f64) -> Option<HardExitReason> {
    if position.hard_stop_loss_hit(current_price) {
        return Some(HardExitReason::StopLoss);
    }
    if position.hard_take_profit_hit(current_price) {
        return Some(HardExitReason::TakeProfit);
    }
    None
}

#[derive(Debug, Clone, Copy)]
pub struct BailoutConfig {
    pub arm_loss_percent: f64,
    pub recovery_percent: f64,
    pub require_ai_confirmation: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BailoutAction {
    /// No change this tick.
    None,
    /// Just armed (crossed into the loss band).
    Armed,
    /// Was armed, has since recovered into profit — disarmed without closing.
    Disarmed,
    /// Armed, price recovered past the extremum's recovery target. If
    /// `require_ai_confirmation` is set the caller must run the reanalysis
    /// prompt before closing; otherwise it should close immediately.
    ReadyForReview,
}

/// Evaluate and mutate the bailout state machine for one tick (spec §4.6.3).
///
/// Ordering mirrors the original: a position that's back in profit disarms
/// first; only an unarmed, currently-losing position can newly arm; an armed
/// position tracks its extremum and watches for a recovery past the target.
/// `bailout_analysis_triggered` latches so the same recovery doesn't
/// re-trigger review every tick while a confirmation call is in flight.
pub fn evaluate_bailout(
    position: &mut Position,
    current_price: f64,
    pnl_percentage: f64,
    cfg: &BailoutConfig,
) -> BailoutAction {
    if position.bailout_armed && pnl_percentage > 0.0 {
        position.disarm_bailout();
        return BailoutAction::Disarmed;
    }

    if !position.bailout_armed {
        if pnl_percentage < cfg.arm_loss_percent {
            position.arm_bailout(current_price);
            return BailoutAction::Armed;
        }
        return BailoutAction::None;
    }

    position.update_bailout_extremum(current_price);

    if position.bailout_analysis_triggered {
        return BailoutAction::None;
    }

    let recovery_target = match position.side {
        PositionSide::Buy => position.extremum_price * (1.0 + cfg.recovery_percent / 100.0),
        PositionSide::Sell => position.extremum_price * (1.0 - cfg.recovery_percent / 100.0),
    };
    let recovered = match position.side {
        PositionSide::Buy => current_price >= recovery_target,
        PositionSide::Sell => current_price <= recovery_target,
    };

    if recovered {
        position.bailout_analysis_triggered = true;
        BailoutAction::ReadyForReview
    } else {
        BailoutAction::None
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PartialTpConfig {
    pub target_rr: f64,
    pub close_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartialTpDecision {
    /// Amount to close at market, expressed against `initial_amount` (the
    /// exchange-precision rounding of this value is the caller's job).
    pub close_amount: f64,
    /// New stop-loss to move to on success (breakeven).
    pub new_stop_loss: f64,
}

/// Evaluate whether the partial-take-profit target has been reached.
/// Returns `None` if already executed (write-once, enforced again here so
/// callers can check before touching the exchange) or if the target hasn't
/// been crossed yet.
pub fn evaluate_partial_tp(
    position: &Position,
    current_price: f64,
    cfg: &PartialTpConfig,
) -> Option<PartialTpDecision> {
    if position.partial_tp_executed {
        return None;
    }

    let risk_distance = (position.entry_price - position.initial_stop_loss).abs();
    if risk_distance <= f64::EPSILON {
        return None;
    }
    let target = match position.side {
        PositionSide::Buy => position.entry_price + risk_distance * cfg.target_rr,
        PositionSide::Sell => position.entry_price - risk_distance * cfg.target_rr,
    };
    let crossed = match position.side {
        PositionSide::Buy => current_price >= target,
        PositionSide::Sell => current_price <= target,
    };
    if !crossed {
        return None;
    }

    let close_amount = position.initial_amount * cfg.close_percent / 100.0;
    Some(PartialTpDecision {
        close_amount,
        new_stop_loss: position.entry_price,
    })
}

#[derive(Debug, Clone, Copy)]
pub struct TrailingStopConfig {
    pub activation_percent: f64,
}

/// Evaluate the trailing stop. Activation is a strict `>` on
/// `pnl_percentage` (a position sitting exactly at the activation threshold
/// has not yet earned a trail); the candidate stop only replaces the current
/// one if `Position::move_stop_loss` would actually accept it, so callers can
/// pass the result straight through without re-checking favorability.
pub fn evaluate_trailing_stop(
    position: &Position,
    current_price: f64,
    pnl_percentage: f64,
    cfg: &TrailingStopConfig,
) -> Option<f64> {
    if pnl_percentage <= cfg.activation_percent {
        return None;
    }

    let original_sl_distance = (position.entry_price - position.initial_stop_loss).abs();
    if original_sl_distance <= f64::EPSILON {
        return None;
    }
    let candidate = match position.side {
        PositionSide::Buy => current_price - original_sl_distance,
        PositionSide::Sell => current_price + original_sl_distance,
    };
    let more_favorable = match position.side {
        PositionSide::Buy => candidate > position.stop_loss,
        PositionSide::Sell => candidate < position.stop_loss,
    };

    more_favorable.then_some(candidate)
}

/// Classify the exchange's live positions against the locally managed ledger
/// (spec §4.6.1 reconciliation): symbols we manage but the exchange no longer
/// reports are "ghosts" (closed out from under us); symbols the exchange
/// reports but we don't manage are "unmanaged" (opened outside the bot).
pub fn classify_reconciliation(
    managed_symbols: &HashSet<String>,
    exchange_symbols: &HashSet<String>,
) -> (Vec<String>, Vec<String>) {
    let mut ghosts: Vec<String> = managed_symbols.difference(exchange_symbols).cloned().collect();
    let mut unmanaged: Vec<String> =
        exchange_symbols.difference(managed_symbols).cloned().collect();
    ghosts.sort();
    unmanaged.sort();
    (ghosts, unmanaged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

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
    fn hard_exit_checks_stop_loss_before_take_profit() {
        let pos = buy_position();
        assert_eq!(check_hard_exit(&pos, 95.0), Some(HardExitReason::StopLoss));
        assert_eq!(check_hard_exit(&pos, 110.0), Some(HardExitReason::TakeProfit));
        assert_eq!(check_hard_exit(&pos, 102.0), None);
    }

    #[test]
    fn bailout_arms_on_loss_then_disarms_on_recovery_to_profit() {
        let mut pos = buy_position();
        let cfg = BailoutConfig {
            arm_loss_percent: -2.0,
            recovery_percent: 1.0,
            require_ai_confirmation: true,
        };

        let action = evaluate_bailout(&mut pos, 97.0, -3.0, &cfg);
        assert_eq!(action, BailoutAction::Armed);
        assert!(pos.bailout_armed);
        assert_eq!(pos.extremum_price, 97.0);

        let action = evaluate_bailout(&mut pos, 101.0, 1.0, &cfg);
        assert_eq!(action, BailoutAction::Disarmed);
        assert!(!pos.bailout_armed);
    }

    #[test]
    fn bailout_ready_for_review_once_recovery_target_crossed() {
        let mut pos = buy_position();
        let cfg = BailoutConfig {
            arm_loss_percent: -2.0,
            recovery_percent: 1.0,
            require_ai_confirmation: true,
        };
        evaluate_bailout(&mut pos, 97.0, -3.0, &cfg);

        // A bounce that doesn't reach the recovery target keeps tracking the
        // extremum and stays silent.
        let action = evaluate_bailout(&mut pos, 97.3, -2.7, &cfg);
        assert_eq!(action, BailoutAction::None);
        assert_eq!(pos.extremum_price, 97.0, "a bounce must not worsen the extremum");

        // 97.0 * 1.01 = 97.97
        let action = evaluate_bailout(&mut pos, 98.0, -2.0, &cfg);
        assert_eq!(action, BailoutAction::ReadyForReview);
        assert!(pos.bailout_analysis_triggered);

        // Latched: the same tick condition does not re-trigger.
        let action = evaluate_bailout(&mut pos, 98.5, -1.5, &cfg);
        assert_eq!(action, BailoutAction::None);
    }

    #[test]
    fn partial_tp_fires_once_rr_target_is_crossed() {
        let pos = buy_position();
        let cfg = PartialTpConfig {
            target_rr: 1.0,
            close_percent: 50.0,
        };
        // risk_distance = 100 - 96 = 4; target = 104
        assert!(evaluate_partial_tp(&pos, 103.0, &cfg).is_none());
        let decision = evaluate_partial_tp(&pos, 104.0, &cfg).unwrap();
        assert_eq!(decision.close_amount, 12.5);
        assert_eq!(decision.new_stop_loss, 100.0);
    }

    #[test]
    fn partial_tp_is_skipped_once_already_executed() {
        let mut pos = buy_position();
        pos.apply_partial_tp(12.5);
        let cfg = PartialTpConfig {
            target_rr: 1.0,
            close_percent: 50.0,
        };
        assert!(evaluate_partial_tp(&pos, 200.0, &cfg).is_none());
    }

    #[test]
    fn trailing_stop_requires_strictly_above_activation() {
        let pos = buy_position();
        let cfg = TrailingStopConfig {
            activation_percent: 1.5,
        };
        assert!(evaluate_trailing_stop(&pos, 101.5, 1.5, &cfg).is_none());
        let candidate = evaluate_trailing_stop(&pos, 102.0, 2.0, &cfg).unwrap();
        // original_sl_distance = 4; candidate = 102 - 4 = 98
        assert_eq!(candidate, 98.0);
    }

    #[test]
    fn trailing_stop_does_not_offer_a_worse_candidate() {
        let mut pos = buy_position();
        pos.move_stop_loss(99.0);
        let cfg = TrailingStopConfig {
            activation_percent: 1.5,
        };
        // candidate would be 102 - 4 = 98, which is worse than the current 99.
        assert!(evaluate_trailing_stop(&pos, 102.0, 2.0, &cfg).is_none());
    }

    #[test]
    fn reconciliation_classifies_ghosts_and_unmanaged() {
        let managed: HashSet<String> =
            ["BTC/USDT".to_string(), "ETH/USDT".to_string()].into_iter().collect();
        let exchange: HashSet<String> =
            ["ETH/USDT".to_string(), "SOL/USDT".to_string()].into_iter().collect();
        let (ghosts, unmanaged) = classify_reconciliation(&managed, &exchange);
        assert_eq!(ghosts, vec!["BTC/USDT".to_string()]);
        assert_eq!(unmanaged, vec!["SOL/USDT".to_string()]);
    }
}
