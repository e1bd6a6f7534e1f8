// =============================================================================
// Panic Controller — cancel everything and dump the position at market
// =============================================================================
//
// Armed as soon as the symbol is known and waits on the one-shot panic token,
// independently of the monitor's tick timer. On trigger:
//   1. Raise the liquidation flag under the book lock (freezes the ladder;
//      the monitor can no longer sell).
//   2. Cancel all open orders on the symbol (standing limit tiers).
//   3. Re-fetch the free asset balance and the price.
//   4. Market-sell the whole balance.
// Any failure here is fatal to the session; nothing is retried.
// =============================================================================

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::ExchangeResult;
use crate::exchange::Exchange;
use crate::normalizer::normalize;
use crate::position_engine::SharedBook;
use crate::session::SessionContext;
use crate::types::OrderAck;

/// What the liquidation did.
#[derive(Debug, Clone, Default)]
pub struct Liquidation {
    pub orders_cancelled: usize,
    pub balance: f64,
    pub price: f64,
    /// Quantity submitted; `0.0` when the balance was below the minimum lot.
    pub quantity_sold: f64,
    pub ack: Option<OrderAck>,
}

/// Wait for `trigger`, then liquidate.
pub async fn run_panic_controller(
    exchange: &dyn Exchange,
    ctx: &SessionContext,
    book: &SharedBook,
    symbol: &str,
    asset: &str,
    trigger: &CancellationToken,
) -> ExchangeResult<Liquidation> {
    trigger.cancelled().await;
    liquidate(exchange, ctx, book, symbol, asset).await
}

/// Cancel open orders on `symbol` and sell the free balance of `asset`.
pub async fn liquidate(
    exchange: &dyn Exchange,
    ctx: &SessionContext,
    book: &SharedBook,
    symbol: &str,
    asset: &str,
) -> ExchangeResult<Liquidation> {
    let filters = ctx.filters_for(symbol)?;

    book.lock().await.begin_liquidation();

    info!(symbol, "closing orders");
    let orders_cancelled = exchange.cancel_all_orders(symbol).await?;

    let balance = exchange.get_balance(asset).await?;
    let price = exchange.get_price(symbol).await?;

    let mut liquidation = Liquidation {
        orders_cancelled,
        balance,
        price,
        ..Liquidation::default()
    };

    if balance <= 0.0 || balance < filters.min_qty || balance * price < filters.min_notional {
        warn!(
            symbol,
            balance,
            price,
            min_qty = filters.min_qty,
            min_notional = filters.min_notional,
            "remaining balance below minimum lot or notional; nothing to sell"
        );
        book.lock().await.close_position();
        return Ok(liquidation);
    }

    let quantity = normalize(balance, price, filters);
    info!(symbol, quantity, price, orders_cancelled, "market sell everything");
    let ack = exchange.market_sell(symbol, quantity).await?;

    {
        let mut guard = book.lock().await;
        guard.record_sell(quantity);
        guard.close_position();
    }

    info!(
        symbol,
        quantity,
        order_id = ack.order_id,
        status = %ack.status,
        "panic liquidation complete"
    );

    liquidation.quantity_sold = quantity;
    liquidation.ack = Some(ack);
    Ok(liquidation)
}
