//! Position Manager orchestration (spec §4.6): reconciliation, the
//! per-position tick, and the orphan-order sweep. The actual decisions are
//! made by the pure functions in `domain::services::position_manager`; this
//! module fetches what they need, persists what they decide, and talks to
//! the exchange/notifier.

use crate::config::Settings;
use crate::domain::entities::event::{Event, EventLevel};
use crate::domain::entities::order::{OrderParams, OrderSide, OrderType};
use crate::domain::entities::position::{Position, PositionSide};
use crate::domain::entities::recommendation::Recommendation;
use crate::domain::repositories::exchange_client::ExchangeError;
use crate::domain::repositories::notifier::Notification;
use crate::domain::services::indicators::{atr_latest, compute_snapshot, IndicatorParams};
use crate::domain::services::position_manager::{
    check_hard_exit, classify_reconciliation, evaluate_bailout, evaluate_partial_tp,
    evaluate_trailing_stop, BailoutAction, BailoutConfig, PartialTpConfig, TrailingStopConfig,
};
use crate::domain::services::prompts::{build_bailout_prompt, BailoutInput};
use crate::domain::value_objects::symbol;
use crate::persistence::repository::{EventRepository, ManagedPositionRepository};
use crate::trading::core::Core;
use crate::trading::trader;
use std::collections::HashSet;
use tracing::{error, info, warn};

/// Bars fetched on unmanaged-position reconstruction and bailout reanalysis.
const RECONSTRUCT_LOOKBACK_BARS: usize = 100;
/// Default timeframe used to rebuild SL/TP for a position the exchange shows
/// but the ledger doesn't know about (spec §4.6.1).
const RECONSTRUCT_TIMEFRAME: &str = "15m";
/// Reconciliation retries up to 3 times, 2 seconds apart, before trusting the
/// exchange's position list (spec §4.6.1 — a transient API hiccup must not
/// be mistaken for a closed-out ghost).
const RECONCILE_ATTEMPTS: u32 = 3;
const RECONCILE_RETRY_DELAY: std::time::Duration = std::time::Duration::from_secs(2);

async fn fetch_positions_with_retry(
    core: &Core,
) -> Result<Vec<crate::domain::repositories::exchange_client::ExchangePosition>, ExchangeError> {
    let mut last_err = None;
    for attempt in 0..RECONCILE_ATTEMPTS {
        match core.exchange.fetch_open_positions().await {
            Ok(positions) => return Ok(positions),
            Err(e) => {
                warn!(attempt, error = %e, "fetch_open_positions failed during reconciliation");
                last_err = Some(e);
                if attempt + 1 < RECONCILE_ATTEMPTS {
                    tokio::time::sleep(RECONCILE_RETRY_DELAY).await;
                }
            }
        }
    }
    Err(last_err.expect("loop always sets last_err before exhausting attempts"))
}

/// Reconcile the local ledger against the exchange's live positions
/// (spec §4.6.1). Ghosts (closed out from under us) are dropped with a
/// CRITICAL event; unmanaged positions (opened outside the bot) are adopted
/// with SL/TP reconstructed from ATR on the default timeframe.
pub async fn reconcile(core: &Core) -> Result<(), ExchangeError> {
    let positions_repo = ManagedPositionRepository::new(core.db.clone());
    let events = EventRepository::new(core.db.clone());
    let settings = core.settings_snapshot();

    let managed = positions_repo
        .get_all()
        .await
        .map_err(|e| ExchangeError::Network(e.to_string()))?;
    let managed_symbols: HashSet<String> = managed.iter().map(|p| p.symbol.clone()).collect();

    let exchange_positions = fetch_positions_with_retry(core).await?;
    let exchange_symbols: HashSet<String> =
        exchange_positions.iter().map(|p| p.symbol.clone()).collect();

    let (ghosts, unmanaged) = classify_reconciliation(&managed_symbols, &exchange_symbols);

    for symbol in &ghosts {
        if let Err(e) = positions_repo.delete(symbol).await {
            warn!(symbol, error = %e, "failed to drop ghost position from ledger");
        }
        let _ = events
            .append(&Event::new(
                EventLevel::Critical,
                "position_manager",
                format!("{symbol} closed out from under the bot; dropped from ledger"),
            ))
            .await;
        core.notifier
            .notify(Notification::SyncWarning {
                message: format!("{symbol} was closed outside the bot and is no longer managed"),
            })
            .await;
    }

    for symbol in &unmanaged {
        if let Err(e) = adopt_unmanaged(core, &settings, &exchange_positions, symbol).await {
            error!(symbol, error = %e, "failed to adopt unmanaged exchange position");
        }
    }

    Ok(())
}

async fn adopt_unmanaged(
    core: &Core,
    settings: &Settings,
    exchange_positions: &[crate::domain::repositories::exchange_client::ExchangePosition],
    symbol: &str,
) -> Result<(), ExchangeError> {
    let exch_pos = exchange_positions
        .iter()
        .find(|p| p.symbol == symbol)
        .expect("symbol came from this same exchange_positions list");

    let side = match exch_pos.side {
        OrderSide::Buy => PositionSide::Buy,
        OrderSide::Sell => PositionSide::Sell,
    };

    let bars = core
        .exchange
        .fetch_ohlcv(symbol, RECONSTRUCT_TIMEFRAME, RECONSTRUCT_LOOKBACK_BARS)
        .await?;
    let atr = atr_latest(&bars, settings.dynamic_risk_atr_period)
        .map_err(|e| ExchangeError::Network(e.to_string()))?;

    let sl_distance = atr * settings.atr_multiplier_sl;
    let tp_distance = sl_distance * settings.risk_reward_ratio_tp;
    let (stop_loss, take_profit) = match side {
        PositionSide::Buy => (
            exch_pos.entry_price - sl_distance,
            exch_pos.entry_price + tp_distance,
        ),
        PositionSide::Sell => (
            exch_pos.entry_price + sl_distance,
            exch_pos.entry_price - tp_distance,
        ),
    };

    let position = Position::open(
        symbol.to_string(),
        side,
        exch_pos.entry_price,
        exch_pos.contracts,
        stop_loss,
        take_profit,
        settings.leverage as f64,
        RECONSTRUCT_TIMEFRAME.to_string(),
        "adopted: opened outside the bot".to_string(),
        chrono::Utc::now(),
    )
    .map_err(|e| ExchangeError::Network(e.to_string()))?;

    ManagedPositionRepository::new(core.db.clone())
        .upsert(&position)
        .await
        .map_err(|e| ExchangeError::Network(e.to_string()))?;

    info!(symbol, "adopted unmanaged exchange position");
    core.notifier
        .notify(Notification::SyncWarning {
            message: format!("{symbol} was found open on the exchange and is now managed"),
        })
        .await;
    Ok(())
}

/// Cancel any open order whose symbol has no corresponding managed position
/// (spec §4.6: the orphan-order sweep).
pub async fn sweep_orphan_orders(core: &Core) -> Result<(), ExchangeError> {
    let managed = ManagedPositionRepository::new(core.db.clone())
        .get_all()
        .await
        .map_err(|e| ExchangeError::Network(e.to_string()))?;
    let managed_symbols: HashSet<String> = managed.iter().map(|p| p.symbol.clone()).collect();

    let open_orders = core.exchange.fetch_open_orders(None).await?;
    for order in open_orders {
        if managed_symbols.contains(&order.symbol) {
            continue;
        }
        if let Err(e) = core.exchange.cancel_order(&order.id, &order.symbol).await {
            warn!(symbol = %order.symbol, order_id = %order.id, error = %e, "failed to cancel orphan order");
            continue;
        }
        let _ = EventRepository::new(core.db.clone())
            .append(&Event::new(
                EventLevel::Info,
                "position_manager",
                format!("cancelled orphan order {} on {}", order.id, order.symbol),
            ))
            .await;
        core.notifier
            .notify(Notification::OrphanOrderCleaned {
                symbol: order.symbol.clone(),
                order_id: order.id.clone(),
            })
            .await;
    }
    Ok(())
}

/// Run one tick of the per-position state machine (spec §4.6 ordering
/// guarantee): refresh price/pnl, check hard exits (short-circuits the rest
/// of the tick on close), then bailout (also short-circuits on close), then
/// partial-TP, then the trailing stop.
pub async fn tick_position(core: &Core, symbol: &str) -> Result<(), ExchangeError> {
    let settings = core.settings_snapshot();
    let positions_repo = ManagedPositionRepository::new(core.db.clone());

    let mut position = match positions_repo
        .get(symbol)
        .await
        .map_err(|e| ExchangeError::Network(e.to_string()))?
    {
        Some(p) => p,
        None => return Ok(()),
    };

    let price_key = crate::domain::services::cache::price_key(symbol);
    let current_price = match core.price_cache.get(&price_key) {
        Some(p) => p,
        None => {
            let p = core.exchange.fetch_price(symbol).await?;
            core.price_cache.set(price_key, p, crate::domain::services::cache::PRICE_TTL);
            p
        }
    };

    position.refresh_pnl(current_price);
    positions_repo
        .upsert(&position)
        .await
        .map_err(|e| ExchangeError::Network(e.to_string()))?;

    if let Some(reason) = check_hard_exit(&position, current_price) {
        let label = match reason {
            crate::domain::services::position_manager::HardExitReason::StopLoss => "SL",
            crate::domain::services::position_manager::HardExitReason::TakeProfit => "TP",
        };
        if let Err(e) = trader::close(core, symbol, label).await {
            error!(symbol, error = %e, "hard exit close failed");
        }
        return Ok(());
    }

    if settings.use_bailout_exit {
        let bailout_cfg = BailoutConfig {
            arm_loss_percent: settings.bailout_arm_loss_percent,
            recovery_percent: settings.bailout_recovery_percent,
            require_ai_confirmation: settings.use_ai_bailout_confirmation,
        };
        let action = evaluate_bailout(&mut position, current_price, position.pnl_percentage, &bailout_cfg);
        positions_repo
            .upsert(&position)
            .await
            .map_err(|e| ExchangeError::Network(e.to_string()))?;

        if action == BailoutAction::ReadyForReview {
            let should_close = if settings.use_ai_bailout_confirmation {
                confirm_bailout_with_llm(core, &position, current_price).await
            } else {
                true
            };
            if should_close {
                let label = if settings.use_ai_bailout_confirmation {
                    "AI_BAILOUT_EXIT"
                } else {
                    "BAILOUT_EXIT"
                };
                if let Err(e) = trader::close(core, symbol, label).await {
                    error!(symbol, error = %e, "bailout close failed");
                }
                return Ok(());
            }
        }
    }

    if settings.use_partial_tp && !position.partial_tp_executed {
        let cfg = PartialTpConfig {
            target_rr: settings.partial_tp_target_rr,
            close_percent: settings.partial_tp_close_percent,
        };
        if let Some(decision) = evaluate_partial_tp(&position, current_price, &cfg) {
            let close_amount = core.exchange.amount_to_precision(symbol, decision.close_amount);
            let bracket_side = match position.side {
                PositionSide::Buy => OrderSide::Sell,
                PositionSide::Sell => OrderSide::Buy,
            };
            if settings.live_trading {
                core.exchange
                    .create_order(
                        symbol,
                        OrderType::Market,
                        bracket_side,
                        close_amount,
                        None,
                        OrderParams { stop_price: None, reduce_only: true, ..Default::default() },
                    )
                    .await?;
            }
            position.apply_partial_tp(close_amount);
            positions_repo
                .upsert(&position)
                .await
                .map_err(|e| ExchangeError::Network(e.to_string()))?;

            let _ = EventRepository::new(core.db.clone())
                .append(&Event::new(
                    EventLevel::Info,
                    "position_manager",
                    format!("partial take-profit on {symbol}: closed {close_amount}"),
                ))
                .await;
            core.notifier
                .notify(Notification::PartialTakeProfit { symbol: symbol.to_string(), closed_amount: close_amount })
                .await;
        }
    }

    if settings.use_trailing_stop_loss {
        let cfg = TrailingStopConfig { activation_percent: settings.trailing_stop_activation_percent };
        if let Some(candidate) = evaluate_trailing_stop(&position, current_price, position.pnl_percentage, &cfg) {
            let rounded = core.exchange.price_to_precision(symbol, candidate);
            if settings.live_trading {
                if let Err(e) = replace_stop_order(core, symbol, &position, rounded).await {
                    warn!(symbol, error = %e, "failed to replace stop order on exchange, not moving local stop");
                    return Ok(());
                }
            }
            position.move_stop_loss(rounded);
            positions_repo
                .upsert(&position)
                .await
                .map_err(|e| ExchangeError::Network(e.to_string()))?;
        }
    }

    Ok(())
}

async fn replace_stop_order(
    core: &Core,
    symbol: &str,
    position: &Position,
    new_stop: f64,
) -> Result<(), ExchangeError> {
    core.exchange.cancel_all_orders(symbol).await?;
    let bracket_side = match position.side {
        PositionSide::Buy => OrderSide::Sell,
        PositionSide::Sell => OrderSide::Buy,
    };
    core.exchange
        .create_order(
            symbol,
            OrderType::StopMarket,
            bracket_side,
            position.amount,
            None,
            OrderParams { stop_price: Some(new_stop), reduce_only: true, ..Default::default() },
        )
        .await?;
    core.exchange
        .create_order(
            symbol,
            OrderType::TakeProfitMarket,
            bracket_side,
            position.amount,
            None,
            OrderParams { stop_price: Some(position.take_profit), reduce_only: true, ..Default::default() },
        )
        .await?;
    Ok(())
}

async fn confirm_bailout_with_llm(core: &Core, position: &Position, current_price: f64) -> bool {
    let bars = match core
        .exchange
        .fetch_ohlcv(&position.symbol, &position.timeframe, RECONSTRUCT_LOOKBACK_BARS)
        .await
    {
        Ok(b) => b,
        Err(e) => {
            warn!(symbol = %position.symbol, error = %e, "bailout reanalysis OHLCV fetch failed, closing without confirmation");
            return true;
        }
    };
    let indicators = compute_snapshot(&bars, &IndicatorParams::default());

    let prompt = build_bailout_prompt(&BailoutInput {
        symbol: &position.symbol,
        side: &position.side.to_string(),
        entry_price: position.entry_price,
        current_price,
        extremum_price: position.extremum_price,
        pnl_percentage: position.pnl_percentage,
        timeframe: &position.timeframe,
        indicators: &indicators,
    });

    match core.llm.invoke(&prompt).await {
        Ok(response) => response.recommendation == Recommendation::Close,
        Err(e) => {
            warn!(symbol = %position.symbol, error = %e, "bailout reanalysis LLM call failed, closing without confirmation");
            true
        }
    }
}

/// Cancel every bracket order and drop the position from the ledger without
/// the usual close flow — used only when an interactive caller force-closes
/// a position outside the scheduler's own tick.
#[allow(dead_code)]
pub async fn force_flatten(core: &Core, symbol: &str) -> Result<(), ExchangeError> {
    let canonical = symbol::canonicalize(symbol);
    core.exchange.cancel_all_orders(&canonical).await?;
    Ok(())
}
