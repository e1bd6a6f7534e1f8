// =============================================================================
// Shared types used across the Pampit session engine
// =============================================================================

use serde::{Deserialize, Deserializer, Serialize};

/// Binance encodes most numbers as strings ("0.00100000"). Accept both.
pub fn de_f64_str<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StrOrNum {
        Str(String),
        Num(f64),
    }

    match StrOrNum::deserialize(deserializer)? {
        StrOrNum::Num(n) => Ok(n),
        StrOrNum::Str(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| serde::de::Error::custom(format!("failed to parse '{s}' as f64: {e}"))),
    }
}

/// Balance snapshot for a single asset from the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceInfo {
    pub asset: String,
    #[serde(default, deserialize_with = "de_f64_str")]
    pub free: f64,
    #[serde(default, deserialize_with = "de_f64_str")]
    pub locked: f64,
}

/// Trading constraints of one symbol, merged from its exchange filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeFilters {
    pub min_qty: f64,
    pub min_notional: f64,
    /// Quantity increment; `0.0` means unconstrained.
    pub step_size: f64,
    /// Price increment; `0.0` means unconstrained.
    #[serde(default)]
    pub tick_size: f64,
    /// Highest accepted limit price as a multiple of the current price.
    #[serde(default)]
    pub multiplier_up: Option<f64>,
    #[serde(default)]
    pub trading: bool,
}

impl Default for ExchangeFilters {
    fn default() -> Self {
        Self {
            min_qty: 0.0,
            min_notional: 0.0,
            step_size: 0.0,
            tick_size: 0.0,
            multiplier_up: None,
            trading: true,
        }
    }
}

/// One fill from the account trade history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    #[serde(deserialize_with = "de_f64_str")]
    pub price: f64,
    #[serde(deserialize_with = "de_f64_str")]
    pub qty: f64,
    /// Fill time, UNIX milliseconds.
    pub time: i64,
    /// Order the fill belongs to.
    #[serde(default)]
    pub order_id: u64,
    #[serde(default = "default_is_buyer")]
    pub is_buyer: bool,
}

fn default_is_buyer() -> bool {
    true
}

/// Exchange acknowledgement of a submitted order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAck {
    #[serde(default)]
    pub order_id: u64,
    #[serde(default)]
    pub client_order_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "de_f64_str")]
    pub executed_qty: f64,
    #[serde(default, deserialize_with = "de_f64_str")]
    pub cummulative_quote_qty: f64,
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionOutcome {
    /// The final monitored tier was resolved.
    LadderCompleted,
    /// The panic signal fired and liquidation ran.
    Liquidated,
}

impl std::fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LadderCompleted => write!(f, "LadderCompleted"),
            Self::Liquidated => write!(f, "Liquidated"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trade_parses_string_numbers() {
        let json = r#"{"symbol":"XYZBTC","id":28457,"orderId":100234,"price":"0.00001530","qty":"12.00000000","time":1499865549590,"isBuyer":false}"#;
        let trade: Trade = serde_json::from_str(json).unwrap();
        assert!((trade.price - 0.0000153).abs() < 1e-12);
        assert!((trade.qty - 12.0).abs() < 1e-12);
        assert_eq!(trade.time, 1_499_865_549_590);
        assert_eq!(trade.order_id, 100_234);
        assert!(!trade.is_buyer);
    }

    #[test]
    fn order_ack_tolerates_missing_fields() {
        let json = r#"{"symbol":"XYZBTC","orderId":28,"executedQty":"10.00000000"}"#;
        let ack: OrderAck = serde_json::from_str(json).unwrap();
        assert_eq!(ack.order_id, 28);
        assert!((ack.executed_qty - 10.0).abs() < 1e-12);
        assert_eq!(ack.status, "");
        assert_eq!(ack.cummulative_quote_qty, 0.0);
    }

    #[test]
    fn balance_accepts_numeric_values() {
        let json = r#"{"asset":"BTC","free":0.5,"locked":"0.1"}"#;
        let b: BalanceInfo = serde_json::from_str(json).unwrap();
        assert!((b.free - 0.5).abs() < 1e-12);
        assert!((b.locked - 0.1).abs() < 1e-12);
    }
}
