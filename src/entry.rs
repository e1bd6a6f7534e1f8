// =============================================================================
// Entry Controller — market buy sized from the base balance, and cost basis
// =============================================================================

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::ExchangeResult;
use crate::exchange::Exchange;
use crate::normalizer::{normalize, round8};
use crate::position_engine::SharedBook;
use crate::session::SessionContext;
use crate::types::{OrderAck, Trade};

/// Result of a submitted entry buy.
#[derive(Debug, Clone)]
pub struct EntryFill {
    /// Price quoted just before the buy.
    pub quoted_price: f64,
    /// Normalised quantity that was submitted.
    pub quantity: f64,
    pub ack: OrderAck,
}

/// Buy `symbol` at market with `buy_fraction` of the starting base balance.
///
/// Returns `Ok(None)` without buying if the panic signal has fired. The buy is
/// submitted under the book lock so a concurrent liquidation cannot
/// interleave with it. Rejections are returned to the caller and
/// are fatal to the session.
pub async fn enter(
    exchange: &dyn Exchange,
    ctx: &SessionContext,
    book: &SharedBook,
    symbol: &str,
    panic: &CancellationToken,
) -> ExchangeResult<Option<EntryFill>> {
    let filters = ctx.filters_for(symbol)?;
    let quoted_price = exchange.get_price(symbol).await?;

    let desired = if quoted_price > 0.0 {
        ctx.starting_balance / quoted_price * ctx.config.buy_fraction
    } else {
        0.0
    };
    let quantity = normalize(desired, quoted_price, filters);

    let guard = book.lock().await;
    if guard.is_liquidated() || panic.is_cancelled() {
        warn!(symbol, "panic fired before entry; buy not submitted");
        return Ok(None);
    }

    info!(symbol, quantity, price = quoted_price, "want to buy");
    let ack = exchange.market_buy(symbol, quantity).await?;
    drop(guard);

    info!(
        symbol,
        quantity,
        order_id = ack.order_id,
        status = %ack.status,
        "entry buy executed"
    );

    Ok(Some(EntryFill {
        quoted_price,
        quantity,
        ack,
    }))
}

/// Volume-weighted average of the buy fills in `trades` at or after
/// `since_ms`, 8 decimals.
///
/// Returns `0.0` when nothing matches.
pub fn average_price(trades: &[Trade], since_ms: i64) -> f64 {
    let (bought, spent) = trades
        .iter()
        .filter(|t| t.is_buyer && t.time >= since_ms)
        .fold((0.0, 0.0), |(bought, spent), t| {
            (bought + t.qty, spent + t.qty * t.price)
        });

    if bought <= 0.0 {
        return 0.0;
    }
    round8(spent / bought)
}

/// Cost basis of the session's fills on `symbol`.
pub async fn average_entry_price(
    exchange: &dyn Exchange,
    symbol: &str,
    since_ms: i64,
) -> ExchangeResult<f64> {
    let trades = exchange.get_trade_history(symbol).await?;
    Ok(average_price(&trades, since_ms))
}
