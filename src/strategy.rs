// =============================================================================
// Strategy — one pump session from entry to profit report
// =============================================================================
//
// Two futures race once the symbol is known:
//
//   ladder flow:  enter -> cost basis -> place limit tiers -> price monitor
//   panic:        wait for the token -> cancel all -> sell everything
//
// If the panic controller finishes first the ladder flow is dropped. If the
// monitor returns `Preempted` the panic has fired, so the liquidation is
// awaited to completion. Either way the profit report runs exactly once.
//
// Errors in the entry path or the liquidation abort the session; open orders
// are left standing.
// =============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::entry::{average_entry_price, enter};
use crate::error::ExchangeResult;
use crate::exchange::Exchange;
use crate::exit::monitor::{run_price_monitor, MonitorExit, MonitorParams};
use crate::exit::panic::{run_panic_controller, Liquidation};
use crate::ladder::place_ladder;
use crate::position_engine::{new_shared_book, Position, SharedBook, TargetLadder, TierState};
use crate::report::{report, ProfitReport};
use crate::session::SessionContext;
use crate::types::{ExchangeFilters, SessionOutcome};

/// Run a full session on `asset` against the configured base currency.
pub async fn run_session(
    exchange: &dyn Exchange,
    ctx: &SessionContext,
    asset: &str,
    panic: CancellationToken,
) -> Result<ProfitReport> {
    let asset = asset.trim().to_uppercase();
    let symbol = ctx.resolve_symbol(&asset)?;
    let filters = ctx.filters_for(&symbol)?.clone();
    let book = new_shared_book();

    let panic_ctl = run_panic_controller(exchange, ctx, &book, &symbol, &asset, &panic);
    tokio::pin!(panic_ctl);

    let ladder_flow = run_ladder_flow(exchange, ctx, &book, &symbol, &asset, &filters, &panic);

    let outcome = tokio::select! {
        liq = &mut panic_ctl => {
            log_liquidation(&symbol, &liq.context("panic liquidation failed")?);
            SessionOutcome::Liquidated
        }
        flow = ladder_flow => match flow {
            Ok(MonitorExit::Completed) => SessionOutcome::LadderCompleted,
            Ok(MonitorExit::Preempted) => {
                let liq = (&mut panic_ctl).await.context("panic liquidation failed")?;
                log_liquidation(&symbol, &liq);
                SessionOutcome::Liquidated
            }
            Err(e) => {
                error!(
                    symbol = %symbol,
                    error = %e,
                    rejected = e.is_rejection(),
                    "entry path failed; aborting session"
                );
                return Err(e).context("entry path failed");
            }
        },
    };

    log_book(&symbol, &book).await;

    report(exchange, ctx, outcome)
        .await
        .context("failed to compute profit")
}

/// Entry, ladder placement and monitoring.
async fn run_ladder_flow(
    exchange: &dyn Exchange,
    ctx: &SessionContext,
    book: &SharedBook,
    symbol: &str,
    asset: &str,
    filters: &ExchangeFilters,
    panic: &CancellationToken,
) -> ExchangeResult<MonitorExit> {
    info!(symbol, "buying");
    let Some(fill) = enter(exchange, ctx, book, symbol, panic).await? else {
        return Ok(MonitorExit::Preempted);
    };

    let average = average_entry_price(exchange, symbol, ctx.started_at_ms()).await?;
    let quantity_bought = exchange.get_balance(asset).await?;

    info!(
        symbol,
        quantity = quantity_bought,
        average_price = average,
        base_price = fill.quoted_price,
        "bought"
    );

    let basis = if average > 0.0 {
        average
    } else {
        warn!(
            symbol,
            quoted_price = fill.quoted_price,
            "no session trades found; using quoted price as entry"
        );
        fill.quoted_price
    };

    let ladder = TargetLadder::build(basis, quantity_bought, &ctx.config.ladder)?;
    {
        let mut guard = book.lock().await;
        if guard.is_liquidated() {
            return Ok(MonitorExit::Preempted);
        }
        guard.open(Position::new(symbol, asset, quantity_bought, basis));
        guard.install_ladder(ladder);
    }

    place_ladder(exchange, book, symbol, filters, basis, fill.quoted_price).await;

    let params = MonitorParams {
        symbol: symbol.to_string(),
        filters: filters.clone(),
        average_entry_price: basis,
        poll_interval: Duration::from_millis(ctx.config.poll_interval_ms),
    };
    Ok(run_price_monitor(exchange, book, &params, panic).await)
}

async fn log_book(symbol: &str, book: &SharedBook) {
    let guard = book.lock().await;
    if guard.ladder().is_empty() {
        return;
    }
    let tiers = guard.ladder().tiers();
    let filled = tiers.iter().filter(|t| t.state == TierState::Filled).count();
    let skipped = tiers.iter().filter(|t| t.state == TierState::Skipped).count();
    info!(
        symbol,
        filled,
        skipped,
        position_closed = guard.position().map_or(true, |p| p.is_closed()),
        "ladder final state"
    );
}

fn log_liquidation(symbol: &str, liq: &Liquidation) {
    info!(
        symbol,
        orders_cancelled = liq.orders_cancelled,
        balance = liq.balance,
        quantity_sold = liq.quantity_sold,
        price = liq.price,
        "panic sell finished"
    );
}
