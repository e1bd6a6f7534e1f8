// =============================================================================
// Price Target Monitor — market-sells ladder tiers that limit orders can't hold
// =============================================================================
//
// Each tick (1 s by default):
//   1. Fetch the current price.
//   2. Log the change since the average entry price.
//   3. If LIMIT tiers are resting, read the trade history and mark the ones
//      whose orders filled.
//   4. Market-sell every pending MARKET-ON-CROSS tier whose trigger is at or
//      below the price, lowest first. A jump across several triggers sells
//      all of them in the same tick. The book lock is taken per tier, and the
//      panic token and the liquidation flag are checked before every sell.
//   5. Finish once the highest monitored tier is resolved.
//
// The panic token is also raced against the tick sleep and the exchange
// reads, so a trigger interrupts the loop without waiting for the next tick.
// It is the only way the loop stops early; there is no timeout.
// =============================================================================

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::exchange::Exchange;
use crate::ladder::premium_pct;
use crate::normalizer::normalize;
use crate::position_engine::{SharedBook, TierMechanism, TierState};
use crate::types::ExchangeFilters;

/// Why the monitor loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorExit {
    /// The highest tier was resolved.
    Completed,
    /// The panic signal fired first.
    Preempted,
}

/// Inputs the monitor needs besides the exchange and the book.
#[derive(Debug, Clone)]
pub struct MonitorParams {
    pub symbol: String,
    pub filters: ExchangeFilters,
    pub average_entry_price: f64,
    pub poll_interval: Duration,
}

/// Run the monitor until the ladder completes or `panic` is cancelled.
pub async fn run_price_monitor(
    exchange: &dyn Exchange,
    book: &SharedBook,
    params: &MonitorParams,
    panic: &CancellationToken,
) -> MonitorExit {
    let symbol = params.symbol.as_str();
    info!(
        symbol,
        interval_ms = params.poll_interval.as_millis() as u64,
        "sell orders placed, entering long poll monitoring mode"
    );

    loop {
        if panic.is_cancelled() {
            return MonitorExit::Preempted;
        }
        {
            let guard = book.lock().await;
            if guard.is_liquidated() {
                return MonitorExit::Preempted;
            }
            if guard.ladder().final_tier_resolved() {
                info!(symbol, "final target resolved; monitor finished");
                return MonitorExit::Completed;
            }
        }

        tokio::select! {
            biased;
            _ = panic.cancelled() => return MonitorExit::Preempted,
            _ = tokio::time::sleep(params.poll_interval) => {}
        }

        let price = tokio::select! {
            biased;
            _ = panic.cancelled() => return MonitorExit::Preempted,
            res = exchange.get_price(symbol) => match res {
                Ok(p) => p,
                Err(e) => {
                    warn!(symbol, error = %e, "price fetch failed; skipping tick");
                    continue;
                }
            },
        };

        info!(
            symbol,
            price,
            change_pct = premium_pct(price, params.average_entry_price),
            "percent change since entry"
        );

        let has_open_limits = book.lock().await.ladder().has_open_limits();
        if has_open_limits {
            tokio::select! {
                biased;
                _ = panic.cancelled() => return MonitorExit::Preempted,
                _ = reconcile_limit_fills(exchange, book, symbol) => {}
            }
        }

        if !sell_crossed_tiers(exchange, book, params, price, panic).await {
            return MonitorExit::Preempted;
        }
    }
}

/// Mark resting LIMIT tiers filled from the account's trade history.
async fn reconcile_limit_fills(exchange: &dyn Exchange, book: &SharedBook, symbol: &str) {
    match exchange.get_trade_history(symbol).await {
        Ok(trades) => {
            let mut guard = book.lock().await;
            if !guard.is_liquidated() {
                guard.reconcile_limit_fills(&trades);
            }
        }
        Err(e) => warn!(symbol, error = %e, "trade history fetch failed; limit fills not checked"),
    }
}

/// One tick's worth of tier evaluation at `price`. Returns `false` if the
/// panic fired or the position was liquidated, before or during the tick.
async fn sell_crossed_tiers(
    exchange: &dyn Exchange,
    book: &SharedBook,
    params: &MonitorParams,
    price: f64,
    panic: &CancellationToken,
) -> bool {
    let symbol = params.symbol.as_str();
    let pending = {
        let guard = book.lock().await;
        if guard.is_liquidated() || panic.is_cancelled() {
            debug!(symbol, "panic fired; monitor stands down");
            return false;
        }
        guard.ladder().pending(TierMechanism::MarketOnCross)
    };

    for index in pending {
        let mut guard = book.lock().await;
        if guard.is_liquidated() || panic.is_cancelled() {
            debug!(symbol, "panic fired mid-tick; remaining tiers not sold");
            return false;
        }
        let Some(tier) = guard.ladder().tier(index).cloned() else {
            continue;
        };
        if price < tier.trigger_price {
            break;
        }

        let quantity = normalize(tier.quantity, price, &params.filters);
        info!(
            symbol,
            tier = %tier.label(),
            trigger = tier.trigger_price,
            price,
            quantity,
            "target hit, selling"
        );

        match exchange.market_sell(symbol, quantity).await {
            Ok(ack) => {
                let sold = if ack.executed_qty > 0.0 {
                    ack.executed_qty
                } else {
                    quantity
                };
                guard.ladder_mut().transition(index, TierState::Filled);
                guard.ladder_mut().record_order(index, ack.order_id, quantity);
                guard.record_sell(sold);
            }
            Err(e) => {
                error!(
                    symbol,
                    tier = %tier.label(),
                    error = %e,
                    "market sell failed; tier skipped"
                );
                guard.ladder_mut().transition(index, TierState::Skipped);
            }
        }
    }

    true
}
