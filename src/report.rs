// =============================================================================
// Profit Reporter — balance delta over the session
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ExchangeError, ExchangeResult};
use crate::exchange::Exchange;
use crate::normalizer::round8;
use crate::session::SessionContext;
use crate::types::SessionOutcome;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfitReport {
    pub outcome: SessionOutcome,
    pub base_asset: String,
    pub starting_balance: f64,
    pub ending_balance: f64,
    /// `ending_balance - starting_balance`, 8 decimals.
    pub profit: f64,
    /// Profit valued at the session-start price snapshot, 2 decimals.
    pub profit_quote: f64,
}

pub fn compute_profit(starting_balance: f64, ending_balance: f64) -> f64 {
    round8(ending_balance - starting_balance)
}

/// Fetch the ending base balance and close the session. Fails if the session
/// was already closed.
pub async fn report(
    exchange: &dyn Exchange,
    ctx: &SessionContext,
    outcome: SessionOutcome,
) -> ExchangeResult<ProfitReport> {
    let ending_balance = exchange.get_balance(&ctx.config.base_asset).await?;
    if !ctx.close(ending_balance) {
        return Err(ExchangeError::ConstraintViolation(
            "session profit already reported".to_string(),
        ));
    }

    let profit = compute_profit(ctx.starting_balance, ending_balance);
    let report = ProfitReport {
        outcome,
        base_asset: ctx.config.base_asset.clone(),
        starting_balance: ctx.starting_balance,
        ending_balance,
        profit,
        profit_quote: ctx.to_quote(profit),
    };

    info!(
        outcome = %report.outcome,
        profit = report.profit,
        base = %report.base_asset,
        profit_quote = report.profit_quote,
        "net profit"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::mock::MockExchange;
    use crate::runtime_config::SessionConfig;
    use chrono::Utc;
    use std::collections::HashMap;

    #[test]
    fn profit_is_exact_balance_delta() {
        assert_eq!(compute_profit(1.0, 1.5), 0.5);
        assert_eq!(compute_profit(0.3, 0.1 + 0.2), 0.0);
        assert_eq!(compute_profit(1.0, 0.987654321), -0.01234568);
    }

    #[tokio::test]
    async fn reports_once_in_both_currencies() {
        let mock = MockExchange::new().with_balance("BTC", 1.25);
        let ctx = SessionContext::new(SessionConfig::default(), Utc::now(), 1.0, 60_000.0, HashMap::new());

        let r = report(&mock, &ctx, SessionOutcome::LadderCompleted).await.unwrap();
        assert_eq!(r.profit, 0.25);
        assert_eq!(r.profit_quote, 15_000.0);
        assert_eq!(ctx.ending_balance(), Some(1.25));

        assert!(matches!(
            report(&mock, &ctx, SessionOutcome::Liquidated).await,
            Err(ExchangeError::ConstraintViolation(_))
        ));
    }
}
