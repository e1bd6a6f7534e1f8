// =============================================================================
// Ladder Placer — standing limit sells for the lowest take-profit tiers
// =============================================================================
//
// Only the LIMIT tiers are submitted here; MARKET-ON-CROSS tiers stay Pending
// for the price monitor. A failed submission marks that tier Skipped and the
// next tier is still attempted.
// =============================================================================

use tracing::{error, info, warn};

use crate::exchange::Exchange;
use crate::normalizer::{check_filters, normalize, normalize_price, round_to};
use crate::position_engine::{SharedBook, TierMechanism, TierState};
use crate::types::ExchangeFilters;

/// Outcome counts of one placement pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlacementSummary {
    pub placed: usize,
    pub skipped: usize,
}

/// Percentage of `price` over `entry`, 2 decimals.
pub fn premium_pct(price: f64, entry: f64) -> f64 {
    if entry <= 0.0 {
        return 0.0;
    }
    round_to(100.0 * price / entry - 100.0, 2)
}

/// Submit every pending LIMIT tier of the installed ladder.
///
/// `reference_price` is the last quoted price, used to respect the symbol's
/// upward price multiplier.
pub async fn place_ladder(
    exchange: &dyn Exchange,
    book: &SharedBook,
    symbol: &str,
    filters: &ExchangeFilters,
    entry_price: f64,
    reference_price: f64,
) -> PlacementSummary {
    let mut summary = PlacementSummary::default();
    let pending = book.lock().await.ladder().pending(TierMechanism::Limit);

    for index in pending {
        let mut guard = book.lock().await;
        if guard.is_liquidated() {
            warn!(symbol, "liquidation in progress; remaining limit tiers not placed");
            break;
        }
        let Some(tier) = guard.ladder().tier(index).cloned() else {
            continue;
        };

        let limit_price = normalize_price(tier.trigger_price, filters);
        let quantity = normalize(tier.quantity, limit_price, filters);

        if let Some(cap) = filters.multiplier_up {
            if reference_price > 0.0 && limit_price > reference_price * cap {
                warn!(
                    symbol,
                    tier = %tier.label(),
                    limit_price,
                    cap = reference_price * cap,
                    "limit price above the symbol's price multiplier; tier skipped"
                );
                guard.ladder_mut().transition(index, TierState::Skipped);
                summary.skipped += 1;
                continue;
            }
        }

        info!(
            symbol,
            tier = %tier.label(),
            quantity,
            limit_price,
            premium_pct = premium_pct(limit_price, entry_price),
            "placing limit sell order"
        );

        let submitted = match check_filters(quantity, limit_price, filters) {
            Ok(()) => exchange.limit_sell(symbol, quantity, limit_price).await,
            Err(e) => Err(e),
        };
        match submitted {
            Ok(ack) => {
                let ladder = guard.ladder_mut();
                ladder.transition(index, TierState::Submitted);
                ladder.record_order(index, ack.order_id, quantity);
                summary.placed += 1;
            }
            Err(e) => {
                error!(
                    symbol,
                    tier = %tier.label(),
                    error = %e,
                    "error placing sell order; tier skipped"
                );
                guard.ladder_mut().transition(index, TierState::Skipped);
                summary.skipped += 1;
            }
        }
    }

    info!(
        symbol,
        placed = summary.placed,
        skipped = summary.skipped,
        "limit tiers placed"
    );
    summary
}
