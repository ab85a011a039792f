//! Trader: `Open`/`Close` (spec §4.5).
//!
//! Both operations follow the same shape as the Position Manager's per-tick
//! loop: read state, decide, act against the exchange, persist, notify. The
//! actual order submission is skipped entirely in simulated mode
//! (`live_trading = false`) — fills are taken at the current market price and
//! `VIRTUAL_BALANCE` stands in for the exchange balance, re-read fresh on
//! every call rather than mutated (SPEC_FULL.md §D, resolution 4).

use crate::config::EntryOrderType;
use crate::domain::entities::event::{Event, EventLevel};
use crate::domain::entities::order::{OrderParams, OrderSide, OrderType};
use crate::domain::entities::position::{Position, PositionSide};
use crate::domain::entities::recommendation::Recommendation;
use crate::domain::entities::trade_history::TradeHistoryEntry;
use crate::domain::errors::TradeError;
use crate::domain::repositories::notifier::Notification;
use crate::domain::services::indicators::atr_latest;
use crate::domain::services::position_sizer::{DynamicRiskConfig, PositionSizer, SizingError, SizingRequest};
use crate::domain::value_objects::symbol;
use crate::persistence::repository::{EventRepository, ManagedPositionRepository, TradeHistoryRepository};
use crate::trading::core::Core;
use chrono::Utc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Bars fetched to derive the sizing ATR. 100 is generous headroom for any
/// configured ATR period up to the low end of a scanner's lookback.
const ATR_LOOKBACK_BARS: usize = 100;

/// Gap between the entry fill and bracket-order submission (spec §5: "entry,
/// then SL, then TP, each a fire-and-confirm call separated by a short
/// sleep so the exchange has processed the fill before brackets reference it").
const BRACKET_SUBMIT_DELAY: Duration = Duration::from_millis(500);

pub struct OpenRequest {
    pub symbol: String,
    pub recommendation: Recommendation,
    pub timeframe: String,
    pub reason: String,
}

fn side_from_recommendation(recommendation: Recommendation) -> Result<PositionSide, TradeError> {
    match recommendation {
        Recommendation::Buy => Ok(PositionSide::Buy),
        Recommendation::Sell => Ok(PositionSide::Sell),
        other => Err(TradeError::Validation(
            crate::domain::errors::ValidationError::InvalidInput(format!(
                "{other} is not an entry signal"
            )),
        )),
    }
}

/// Open a new managed position (spec §4.5 Open).
pub async fn open(core: &Core, request: OpenRequest) -> Result<Position, TradeError> {
    let symbol = symbol::canonicalize(&request.symbol);
    let settings = core.settings_snapshot();
    let positions = ManagedPositionRepository::new(core.db.clone());

    if positions.get(&symbol).await?.is_some() {
        return Err(TradeError::AlreadyOpen(symbol));
    }
    if positions.get_all().await?.len() >= settings.max_concurrent_trades {
        return Err(TradeError::MaxConcurrentTrades);
    }

    let side = side_from_recommendation(request.recommendation)?;
    let order_side = match side {
        PositionSide::Buy => OrderSide::Buy,
        PositionSide::Sell => OrderSide::Sell,
    };

    let bars = core
        .exchange
        .fetch_ohlcv(&symbol, &request.timeframe, ATR_LOOKBACK_BARS)
        .await?;
    let atr = atr_latest(&bars, settings.dynamic_risk_atr_period).map_err(|_| TradeError::BadStopDistance)?;

    let current_price = core.exchange.fetch_price(&symbol).await?;

    let balance = if settings.live_trading {
        core.exchange.fetch_balance("USDT").await?
    } else {
        settings.virtual_balance
    };

    let sizing = PositionSizer::new()
        .size(&SizingRequest {
            side: order_side,
            current_price,
            atr,
            balance,
            leverage: settings.leverage as f64,
            live_trading: settings.live_trading,
            use_dynamic_risk: settings.use_dynamic_risk,
            risk_per_trade_percent: settings.risk_per_trade_percent,
            dynamic_risk: DynamicRiskConfig {
                base_risk_percent: settings.dynamic_risk_base_risk,
                low_vol_threshold: settings.dynamic_risk_low_vol_threshold,
                low_vol_multiplier: settings.dynamic_risk_low_vol_multiplier,
                high_vol_threshold: settings.dynamic_risk_high_vol_threshold,
                high_vol_multiplier: settings.dynamic_risk_high_vol_multiplier,
            },
            atr_multiplier_sl: settings.atr_multiplier_sl,
            risk_reward_ratio_tp: settings.risk_reward_ratio_tp,
        })
        .map_err(|e| match e {
            SizingError::BadStopDistance => TradeError::BadStopDistance,
            SizingError::InsufficientMargin { .. } => TradeError::InsufficientMargin,
        })?;

    let amount = core.exchange.amount_to_precision(&symbol, sizing.amount);
    let stop_loss = core.exchange.price_to_precision(&symbol, sizing.stop_loss);
    let take_profit = core.exchange.price_to_precision(&symbol, sizing.take_profit);

    let fill_price = if settings.live_trading {
        core.exchange.set_leverage(&symbol, settings.leverage).await?;

        let entry_type = match settings.default_order_type {
            EntryOrderType::Market => OrderType::Market,
            EntryOrderType::Limit => OrderType::Limit,
        };
        let entry_price = matches!(settings.default_order_type, EntryOrderType::Limit)
            .then_some(core.exchange.price_to_precision(&symbol, current_price));

        let entry_params = OrderParams {
            client_order_id: Some(format!("open-{}", Uuid::new_v4())),
            ..Default::default()
        };
        let entry_receipt = core
            .exchange
            .create_order(&symbol, entry_type, order_side, amount, entry_price, entry_params)
            .await?;

        tokio::time::sleep(BRACKET_SUBMIT_DELAY).await;

        let bracket_side = match side {
            PositionSide::Buy => OrderSide::Sell,
            PositionSide::Sell => OrderSide::Buy,
        };
        core.exchange
            .create_order(
                &symbol,
                OrderType::StopMarket,
                bracket_side,
                amount,
                None,
                OrderParams { stop_price: Some(stop_loss), reduce_only: true, ..Default::default() },
            )
            .await?;
        core.exchange
            .create_order(
                &symbol,
                OrderType::TakeProfitMarket,
                bracket_side,
                amount,
                None,
                OrderParams { stop_price: Some(take_profit), reduce_only: true, ..Default::default() },
            )
            .await?;

        entry_receipt.average_price.unwrap_or(current_price)
    } else {
        current_price
    };

    let position = Position::open(
        symbol.clone(),
        side,
        fill_price,
        amount,
        stop_loss,
        take_profit,
        settings.leverage as f64,
        request.timeframe,
        request.reason,
        Utc::now(),
    )?;

    positions.upsert(&position).await?;

    EventRepository::new(core.db.clone())
        .append(&Event::new(
            EventLevel::Success,
            "trader",
            format!("opened {side} {symbol} amount={amount} entry={fill_price}"),
        ))
        .await?;
    core.notifier
        .notify(Notification::PositionOpened {
            symbol: symbol.clone(),
            side: side.to_string(),
            amount,
            entry_price: fill_price,
        })
        .await;

    info!(symbol = %symbol, %side, amount, entry_price = fill_price, "position opened");
    Ok(position)
}

/// Close a managed position (spec §4.5 Close).
pub async fn close(core: &Core, symbol: &str, reason: &str) -> Result<Position, TradeError> {
    let symbol = symbol::canonicalize(symbol);
    let settings = core.settings_snapshot();
    let positions = ManagedPositionRepository::new(core.db.clone());

    let mut position = positions
        .get(&symbol)
        .await?
        .ok_or_else(|| TradeError::NotFound(symbol.clone()))?;

    let exit_price = if settings.live_trading {
        if let Err(e) = core.exchange.cancel_all_orders(&symbol).await {
            warn!(symbol = %symbol, error = %e, "failed to cancel brackets before close, proceeding anyway");
        }

        let bracket_side = match position.side {
            PositionSide::Buy => OrderSide::Sell,
            PositionSide::Sell => OrderSide::Buy,
        };
        let receipt = core
            .exchange
            .create_order(
                &symbol,
                OrderType::Market,
                bracket_side,
                position.amount,
                None,
                OrderParams { stop_price: None, reduce_only: true, ..Default::default() },
            )
            .await?;

        match receipt.average_price {
            Some(p) => p,
            None => core.exchange.fetch_price(&symbol).await?,
        }
    } else {
        core.exchange.fetch_price(&symbol).await?
    };

    position.refresh_pnl(exit_price);

    // The recorded close PnL is realized against the position's original
    // size, not `position.amount` (which partial-TP may have already
    // shrunk) — spec §4.5 Close step 4: `pnl = (close-entry)·initial_amount`.
    // `refresh_pnl` above is the live, amount-based unrealized figure and is
    // a different number once a partial TP has fired.
    let signed = match position.side {
        PositionSide::Buy => exit_price - position.entry_price,
        PositionSide::Sell => position.entry_price - exit_price,
    };
    let realized_pnl = signed * position.initial_amount;

    positions.delete(&symbol).await?;

    let entry = TradeHistoryEntry::new(
        symbol.clone(),
        position.side,
        position.initial_amount,
        position.entry_price,
        exit_price,
        realized_pnl,
        reason.to_string(),
        position.timeframe.clone(),
        position.created_at,
        Utc::now(),
    );
    TradeHistoryRepository::new(core.db.clone()).append(&entry).await?;

    EventRepository::new(core.db.clone())
        .append(&Event::new(
            EventLevel::Success,
            "trader",
            format!("closed {symbol} ({reason}) pnl={:.2}", realized_pnl),
        ))
        .await?;
    core.notifier
        .notify(Notification::PositionClosed {
            symbol: symbol.clone(),
            reason: reason.to_string(),
            pnl: realized_pnl,
        })
        .await;

    info!(symbol = %symbol, reason, pnl = realized_pnl, "position closed");
    Ok(position)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_from_recommendation_rejects_non_entry_signals() {
        assert!(side_from_recommendation(Recommendation::Wait).is_err());
        assert!(side_from_recommendation(Recommendation::Hold).is_err());
        assert!(side_from_recommendation(Recommendation::Close).is_err());
    }

    #[test]
    fn side_from_recommendation_maps_buy_and_sell() {
        assert_eq!(side_from_recommendation(Recommendation::Buy).unwrap(), PositionSide::Buy);
        assert_eq!(side_from_recommendation(Recommendation::Sell).unwrap(), PositionSide::Sell);
    }
}
