// =============================================================================
// Session Context — everything fixed at startup, passed to every component
// =============================================================================
//
// Captured once before the asset is chosen:
//   - session start time (trade history is filtered against it)
//   - starting base-currency balance
//   - valuation price snapshot (base currency in quote terms)
//   - the exchange filter table
// The ending balance is the only field written later, exactly once, by the
// profit reporter.
// =============================================================================

use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::{ExchangeError, ExchangeResult};
use crate::exchange::Exchange;
use crate::normalizer::{round8, round_to};
use crate::runtime_config::SessionConfig;
use crate::types::ExchangeFilters;

#[derive(Debug)]
pub struct SessionContext {
    pub config: SessionConfig,
    pub started_at: DateTime<Utc>,
    pub starting_balance: f64,
    /// Price of one unit of base currency in the valuation currency.
    pub valuation_price: f64,
    filters: HashMap<String, ExchangeFilters>,
    ending_balance: OnceLock<f64>,
}

impl SessionContext {
    pub fn new(
        config: SessionConfig,
        started_at: DateTime<Utc>,
        starting_balance: f64,
        valuation_price: f64,
        filters: HashMap<String, ExchangeFilters>,
    ) -> Self {
        Self {
            config,
            started_at,
            starting_balance,
            valuation_price,
            filters,
            ending_balance: OnceLock::new(),
        }
    }

    /// Record the session start and fetch the startup snapshot.
    pub async fn bootstrap(exchange: &dyn Exchange, config: SessionConfig) -> ExchangeResult<Self> {
        let started_at = Utc::now();

        let starting_balance = exchange.get_balance(&config.base_asset).await?;
        let valuation_price = exchange.get_price(&config.valuation_symbol).await?;
        let filters = exchange.get_exchange_filters().await?;

        let ctx = Self::new(config, started_at, starting_balance, valuation_price, filters);
        info!(
            balance = ctx.starting_balance,
            base = %ctx.config.base_asset,
            value = ctx.to_quote(ctx.starting_balance),
            symbols = ctx.filters.len(),
            "starting pump signal bot"
        );
        Ok(ctx)
    }

    pub fn started_at_ms(&self) -> i64 {
        self.started_at.timestamp_millis()
    }

    /// Exchange ticker for `asset`, validated against the filter table.
    pub fn resolve_symbol(&self, asset: &str) -> ExchangeResult<String> {
        let symbol = self.config.symbol_for(asset);
        let filters = self.filters_for(&symbol)?;
        if !filters.trading {
            warn!(symbol = %symbol, "symbol is not in TRADING status; orders will likely be rejected");
        }
        Ok(symbol)
    }

    pub fn filters_for(&self, symbol: &str) -> ExchangeResult<&ExchangeFilters> {
        self.filters
            .get(symbol)
            .ok_or_else(|| ExchangeError::UnknownSymbol(symbol.to_string()))
    }

    /// Value an amount of base currency in the valuation currency (2 decimals).
    pub fn to_quote(&self, base_amount: f64) -> f64 {
        round_to(base_amount * self.valuation_price, 2)
    }

    /// Set the ending balance. Returns `false` if it was already set.
    pub fn close(&self, ending_balance: f64) -> bool {
        self.ending_balance.set(round8(ending_balance)).is_ok()
    }

    pub fn ending_balance(&self) -> Option<f64> {
        self.ending_balance.get().copied()
    }
}
