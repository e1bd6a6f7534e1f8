// =============================================================================
// Position Engine — the bought position, its exit ladder, and their owner
// =============================================================================
//
// Tier life-cycle:
//   Pending  ->  Submitted  ->  Filled        (LIMIT, seen in trade history)
//   Pending  ->  Filled                       (MARKET-ON-CROSS)
//   Pending | Submitted  ->  Skipped          (failure or panic)
// Filled and Skipped are terminal; a tier is Filled at most once.
//
// Thread-safety: the strategy flow, the price monitor and the panic controller
// all reach the position through one `tokio::sync::Mutex<PositionBook>`. Any
// order that sells (or buys) the position is submitted while holding that
// lock, after checking `liquidated`. The panic controller sets `liquidated`
// under the lock before it issues its own sell, so no other sell can follow.
// =============================================================================

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{ExchangeError, ExchangeResult};
use crate::normalizer::round8;
use crate::runtime_config::{LadderPolicy, MAX_LIMIT_TIERS};
use crate::types::Trade;

// ---------------------------------------------------------------------------
// Position model
// ---------------------------------------------------------------------------

/// The single position held by a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub asset: String,
    pub quantity_bought: f64,
    /// Volume-weighted fill price since session start.
    pub average_entry_price: f64,
    /// Never increases.
    pub remaining_quantity: f64,
}

impl Position {
    pub fn new(symbol: &str, asset: &str, quantity_bought: f64, average_entry_price: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            asset: asset.to_string(),
            quantity_bought,
            average_entry_price,
            remaining_quantity: quantity_bought,
        }
    }

    /// Account for an executed sell.
    pub fn record_sell(&mut self, qty: f64) {
        self.remaining_quantity = round8((self.remaining_quantity - qty.max(0.0)).max(0.0));
    }

    pub fn is_closed(&self) -> bool {
        self.remaining_quantity <= 0.0
    }
}

// ---------------------------------------------------------------------------
// Ladder model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TierMechanism {
    /// Standing limit sell placed right after entry.
    Limit,
    /// Market sell fired by the monitor once price crosses the trigger.
    MarketOnCross,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TierState {
    Pending,
    Submitted,
    Filled,
    Skipped,
}

impl TierState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Filled | Self::Skipped)
    }

    fn can_become(self, next: TierState) -> bool {
        match (self, next) {
            (Self::Pending, Self::Submitted) => true,
            (Self::Pending | Self::Submitted, Self::Filled) => true,
            (Self::Pending | Self::Submitted, Self::Skipped) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for TierState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Submitted => write!(f, "Submitted"),
            Self::Filled => write!(f, "Filled"),
            Self::Skipped => write!(f, "Skipped"),
        }
    }
}

/// One rung of the take-profit ladder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tier {
    pub multiple: f64,
    pub trigger_price: f64,
    pub fraction: f64,
    /// Fixed share of the quantity bought, before normalisation.
    pub quantity: f64,
    pub mechanism: TierMechanism,
    pub state: TierState,
    #[serde(default)]
    pub order_id: Option<u64>,
    /// Normalised quantity actually sent with the order.
    #[serde(default)]
    pub submitted_quantity: f64,
}

impl Tier {
    /// Short label for logs, e.g. `x6`.
    pub fn label(&self) -> String {
        format!("x{}", self.multiple)
    }
}

/// Ordered take-profit targets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetLadder {
    tiers: Vec<Tier>,
}

impl TargetLadder {
    /// Build the ladder for a position of `quantity` entered at `entry_price`.
    ///
    /// The lowest `policy.limit_tiers` tiers use the LIMIT mechanism.
    pub fn build(entry_price: f64, quantity: f64, policy: &LadderPolicy) -> ExchangeResult<Self> {
        if !(entry_price > 0.0) {
            return Err(ExchangeError::ConstraintViolation(format!(
                "cannot build a ladder from entry price {entry_price}"
            )));
        }
        if policy.limit_tiers > MAX_LIMIT_TIERS {
            return Err(ExchangeError::ConstraintViolation(format!(
                "{} limit tiers exceed the ceiling of {MAX_LIMIT_TIERS}",
                policy.limit_tiers
            )));
        }

        let tier_quantity = round8(quantity * policy.tier_fraction);
        let tiers: Vec<Tier> = policy
            .multiples
            .iter()
            .enumerate()
            .map(|(i, &multiple)| Tier {
                multiple,
                trigger_price: round8(entry_price * multiple),
                fraction: policy.tier_fraction,
                quantity: tier_quantity,
                mechanism: if i < policy.limit_tiers {
                    TierMechanism::Limit
                } else {
                    TierMechanism::MarketOnCross
                },
                state: TierState::Pending,
                order_id: None,
                submitted_quantity: 0.0,
            })
            .collect();

        if tiers.windows(2).any(|w| w[1].trigger_price <= w[0].trigger_price) {
            return Err(ExchangeError::ConstraintViolation(
                "tier trigger prices must be strictly increasing".to_string(),
            ));
        }
        let total_fraction: f64 = tiers.iter().map(|t| t.fraction).sum();
        if total_fraction > 1.0 + 1e-9 {
            return Err(ExchangeError::ConstraintViolation(format!(
                "ladder sells {total_fraction} of the position"
            )));
        }

        debug!(
            entry_price,
            quantity,
            tier_quantity,
            tiers = tiers.len(),
            "ladder built"
        );
        Ok(Self { tiers })
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    pub fn tier(&self, index: usize) -> Option<&Tier> {
        self.tiers.get(index)
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    /// Indices of tiers that still need an action for `mechanism`, ascending.
    pub fn pending(&self, mechanism: TierMechanism) -> Vec<usize> {
        self.tiers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.mechanism == mechanism && t.state == TierState::Pending)
            .map(|(i, _)| i)
            .collect()
    }

    /// Move tier `index` to `next`. Illegal transitions are refused.
    pub fn transition(&mut self, index: usize, next: TierState) -> bool {
        let Some(tier) = self.tiers.get_mut(index) else {
            return false;
        };
        if !tier.state.can_become(next) {
            warn!(
                tier = %tier.label(),
                from = %tier.state,
                to = %next,
                "illegal tier transition refused"
            );
            return false;
        }
        tier.state = next;
        true
    }

    pub fn record_order(&mut self, index: usize, order_id: u64, quantity: f64) {
        if let Some(tier) = self.tiers.get_mut(index) {
            tier.order_id = Some(order_id);
            tier.submitted_quantity = quantity;
        }
    }

    /// Whether any LIMIT tier is resting on the book.
    pub fn has_open_limits(&self) -> bool {
        self.tiers
            .iter()
            .any(|t| t.mechanism == TierMechanism::Limit && t.state == TierState::Submitted)
    }

    /// Skip every tier that has not been filled. Returns how many were skipped.
    pub fn skip_unfilled(&mut self) -> usize {
        let mut skipped = 0;
        for tier in self.tiers.iter_mut().filter(|t| !t.state.is_terminal()) {
            tier.state = TierState::Skipped;
            skipped += 1;
        }
        skipped
    }

    /// Whether the highest monitored tier has reached a terminal state.
    pub fn final_tier_resolved(&self) -> bool {
        self.tiers
            .iter()
            .rev()
            .find(|t| t.mechanism == TierMechanism::MarketOnCross)
            .map(|t| t.state.is_terminal())
            .unwrap_or(true)
    }
}

// ---------------------------------------------------------------------------
// Position book
// ---------------------------------------------------------------------------

/// The single synchronized owner of position and ladder state.
#[derive(Debug, Default)]
pub struct PositionBook {
    position: Option<Position>,
    ladder: TargetLadder,
    liquidated: bool,
}

/// Shared handle to the book.
pub type SharedBook = Arc<Mutex<PositionBook>>;

pub fn new_shared_book() -> SharedBook {
    Arc::new(Mutex::new(PositionBook::default()))
}

impl PositionBook {
    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn ladder(&self) -> &TargetLadder {
        &self.ladder
    }

    pub fn ladder_mut(&mut self) -> &mut TargetLadder {
        &mut self.ladder
    }

    pub fn is_liquidated(&self) -> bool {
        self.liquidated
    }

    pub fn open(&mut self, position: Position) {
        info!(
            symbol = %position.symbol,
            quantity = position.quantity_bought,
            average_entry_price = position.average_entry_price,
            "position opened"
        );
        self.position = Some(position);
    }

    pub fn install_ladder(&mut self, ladder: TargetLadder) {
        self.ladder = ladder;
    }

    /// Record an executed sell against the position.
    pub fn record_sell(&mut self, qty: f64) {
        if let Some(pos) = self.position.as_mut() {
            pos.record_sell(qty);
            debug!(sold = qty, remaining = pos.remaining_quantity, "position reduced");
        }
    }

    /// Mark Submitted LIMIT tiers whose order is fully filled in `trades` and
    /// charge the fills to the position. Returns how many tiers filled.
    pub fn reconcile_limit_fills(&mut self, trades: &[Trade]) -> usize {
        let fills: Vec<(usize, f64)> = self
            .ladder
            .tiers()
            .iter()
            .enumerate()
            .filter(|(_, t)| t.mechanism == TierMechanism::Limit && t.state == TierState::Submitted)
            .filter_map(|(i, t)| {
                let order_id = t.order_id?;
                let filled: f64 = trades
                    .iter()
                    .filter(|tr| !tr.is_buyer && tr.order_id == order_id)
                    .map(|tr| tr.qty)
                    .sum();
                (filled > 0.0 && filled + 1e-9 >= t.submitted_quantity).then_some((i, filled))
            })
            .collect();

        let mut count = 0;
        for (index, filled) in fills {
            if self.ladder.transition(index, TierState::Filled) {
                self.record_sell(filled);
                if let Some(tier) = self.ladder.tier(index) {
                    info!(tier = %tier.label(), quantity = filled, "limit tier filled");
                }
                count += 1;
            }
        }
        count
    }

    /// Raise the liquidation flag and skip every open tier. Idempotent;
    /// returns `false` if the book was already liquidated.
    pub fn begin_liquidation(&mut self) -> bool {
        if self.liquidated {
            return false;
        }
        self.liquidated = true;
        let skipped = self.ladder.skip_unfilled();
        info!(skipped, "liquidation flag raised; ladder frozen");
        true
    }

    /// Mark the position fully sold.
    pub fn close_position(&mut self) {
        if let Some(pos) = self.position.as_mut() {
            pos.remaining_quantity = 0.0;
        }
    }
}
