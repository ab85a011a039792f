//! Risk-based position sizing (spec §4.5, `Trader::Open` steps 4-7).
//!
//! Given an ATR reading and a balance, derives the stop/take-profit distance
//! and the contract amount that risks exactly `risk_percent` of the balance
//! if the stop is hit.

use crate::domain::entities::order::OrderSide;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SizingError {
    #[error("stop distance is zero or non-finite")]
    BadStopDistance,

    #[error("required margin {required:.2} exceeds available balance {available:.2}")]
    InsufficientMargin { required: f64, available: f64 },
}

/// The dynamic-risk bands from Settings (spec §6); only consulted when
/// `use_dynamic_risk` is true.
#[derive(Debug, Clone, Copy)]
pub struct DynamicRiskConfig {
    pub base_risk_percent: f64,
    pub low_vol_threshold: f64,
    pub low_vol_multiplier: f64,
    pub high_vol_threshold: f64,
    pub high_vol_multiplier: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct SizingRequest {
    pub side: OrderSide,
    pub current_price: f64,
    pub atr: f64,
    pub balance: f64,
    pub leverage: f64,
    pub live_trading: bool,
    pub use_dynamic_risk: bool,
    pub risk_per_trade_percent: f64,
    pub dynamic_risk: DynamicRiskConfig,
    pub atr_multiplier_sl: f64,
    pub risk_reward_ratio_tp: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizingResult {
    pub amount: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub risk_percent: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PositionSizer;

impl PositionSizer {
    pub fn new() -> Self {
        Self
    }

    fn risk_percent(req: &SizingRequest) -> f64 {
        if !req.use_dynamic_risk {
            return req.risk_per_trade_percent;
        }
        let volatility = req.atr / req.current_price * 100.0;
        let cfg = req.dynamic_risk;
        let mut risk = cfg.base_risk_percent;
        if volatility < cfg.low_vol_threshold {
            risk *= cfg.low_vol_multiplier;
        }
        if volatility > cfg.high_vol_threshold {
            risk *= cfg.high_vol_multiplier;
        }
        risk
    }

    pub fn size(&self, req: &SizingRequest) -> Result<SizingResult, SizingError> {
        let risk_percent = Self::risk_percent(req);

        let sl_distance = req.atr * req.atr_multiplier_sl;
        if !sl_distance.is_finite() || sl_distance.abs() < f64::EPSILON {
            return Err(SizingError::BadStopDistance);
        }
        let tp_distance = sl_distance * req.risk_reward_ratio_tp;

        let (stop_loss, take_profit) = match req.side {
            OrderSide::Buy => (
                req.current_price - sl_distance,
                req.current_price + tp_distance,
            ),
            OrderSide::Sell => (
                req.current_price + sl_distance,
                req.current_price - tp_distance,
            ),
        };

        let risk_usd = req.balance * risk_percent / 100.0;
        let amount = risk_usd / sl_distance;

        if req.live_trading {
            let required_margin = amount * req.current_price / req.leverage;
            if required_margin > req.balance {
                return Err(SizingError::InsufficientMargin {
                    required: required_margin,
                    available: req.balance,
                });
            }
        }

        Ok(SizingResult {
            amount,
            stop_loss,
            take_profit,
            risk_percent,
        })
    }
}
