// =============================================================================
// exchangeInfo parsing — merge each symbol's filter records into one struct
// =============================================================================
//
// Binance reports a heterogeneous list of filters per symbol. We keep the
// ones that constrain a spot order:
//   LOT_SIZE                        -> minQty, stepSize
//   MIN_NOTIONAL / NOTIONAL         -> minNotional
//   PRICE_FILTER                    -> tickSize
//   PERCENT_PRICE(_BY_SIDE)         -> multiplierUp / askMultiplierUp
// MARKET_LOT_SIZE is deliberately ignored so market orders are sized with the
// same LOT_SIZE step as limit orders.
// =============================================================================

use std::collections::HashMap;

use serde::Deserialize;

use crate::types::{de_f64_str, ExchangeFilters};

#[derive(Debug, Deserialize)]
pub struct ExchangeInfo {
    #[serde(default)]
    pub symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub filters: Vec<RawFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "filterType")]
pub enum RawFilter {
    #[serde(rename = "LOT_SIZE", rename_all = "camelCase")]
    LotSize {
        #[serde(deserialize_with = "de_f64_str")]
        min_qty: f64,
        #[serde(deserialize_with = "de_f64_str")]
        step_size: f64,
    },
    #[serde(rename = "MIN_NOTIONAL", rename_all = "camelCase")]
    MinNotional {
        #[serde(deserialize_with = "de_f64_str")]
        min_notional: f64,
    },
    #[serde(rename = "NOTIONAL", rename_all = "camelCase")]
    Notional {
        #[serde(deserialize_with = "de_f64_str")]
        min_notional: f64,
    },
    #[serde(rename = "PRICE_FILTER", rename_all = "camelCase")]
    PriceFilter {
        #[serde(deserialize_with = "de_f64_str")]
        tick_size: f64,
    },
    #[serde(rename = "PERCENT_PRICE", rename_all = "camelCase")]
    PercentPrice {
        #[serde(deserialize_with = "de_f64_str")]
        multiplier_up: f64,
    },
    #[serde(rename = "PERCENT_PRICE_BY_SIDE", rename_all = "camelCase")]
    PercentPriceBySide {
        #[serde(deserialize_with = "de_f64_str")]
        ask_multiplier_up: f64,
    },
    #[serde(other)]
    Other,
}

impl SymbolInfo {
    pub fn to_filters(&self) -> ExchangeFilters {
        let mut merged = ExchangeFilters {
            trading: self.status.is_empty() || self.status == "TRADING",
            ..ExchangeFilters::default()
        };
        for filter in &self.filters {
            match filter {
                RawFilter::LotSize { min_qty, step_size } => {
                    merged.min_qty = *min_qty;
                    merged.step_size = *step_size;
                }
                RawFilter::MinNotional { min_notional } | RawFilter::Notional { min_notional } => {
                    merged.min_notional = *min_notional;
                }
                RawFilter::PriceFilter { tick_size } => merged.tick_size = *tick_size,
                RawFilter::PercentPrice { multiplier_up } => {
                    merged.multiplier_up = Some(*multiplier_up)
                }
                RawFilter::PercentPriceBySide { ask_multiplier_up } => {
                    merged.multiplier_up = Some(*ask_multiplier_up)
                }
                RawFilter::Other => {}
            }
        }
        merged
    }
}

impl ExchangeInfo {
    /// One filter record per symbol.
    pub fn filter_table(&self) -> HashMap<String, ExchangeFilters> {
        self.symbols
            .iter()
            .map(|s| (s.symbol.clone(), s.to_filters()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "timezone": "UTC",
        "symbols": [
            {
                "symbol": "XYZBTC",
                "status": "TRADING",
                "baseAsset": "XYZ",
                "filters": [
                    {"filterType": "PRICE_FILTER", "minPrice": "0.00000001", "maxPrice": "1000.00000000", "tickSize": "0.00000001"},
                    {"filterType": "PERCENT_PRICE", "multiplierUp": "5", "multiplierDown": "0.2", "avgPriceMins": 5},
                    {"filterType": "LOT_SIZE", "minQty": "1.00000000", "maxQty": "90000000.00000000", "stepSize": "1.00000000"},
                    {"filterType": "MIN_NOTIONAL", "minNotional": "0.00010000", "applyToMarket": true, "avgPriceMins": 5},
                    {"filterType": "MARKET_LOT_SIZE", "minQty": "0.00000000", "maxQty": "1000000.0", "stepSize": "0.00000000"},
                    {"filterType": "MAX_NUM_ORDERS", "maxNumOrders": 200}
                ]
            },
            {
                "symbol": "OLDBTC",
                "status": "BREAK",
                "filters": [
                    {"filterType": "LOT_SIZE", "minQty": "0.10000000", "maxQty": "1000.0", "stepSize": "0.10000000"},
                    {"filterType": "NOTIONAL", "minNotional": "0.00020000", "maxNotional": "100.0"},
                    {"filterType": "PERCENT_PRICE_BY_SIDE", "bidMultiplierUp": "5", "bidMultiplierDown": "0.2", "askMultiplierUp": "4", "askMultiplierDown": "0.2"}
                ]
            }
        ]
    }"#;

    #[test]
    fn merges_filters_per_symbol() {
        let info: ExchangeInfo = serde_json::from_str(SAMPLE).unwrap();
        let table = info.filter_table();
        assert_eq!(table.len(), 2);

        let xyz = &table["XYZBTC"];
        assert_eq!(xyz.min_qty, 1.0);
        assert_eq!(xyz.step_size, 1.0);
        assert_eq!(xyz.min_notional, 0.0001);
        assert_eq!(xyz.tick_size, 0.00000001);
        assert_eq!(xyz.multiplier_up, Some(5.0));
        assert!(xyz.trading);
    }

    #[test]
    fn market_lot_size_does_not_override_lot_size() {
        let info: ExchangeInfo = serde_json::from_str(SAMPLE).unwrap();
        let xyz = &info.filter_table()["XYZBTC"];
        assert_eq!(xyz.step_size, 1.0);
        assert_eq!(xyz.min_qty, 1.0);
    }

    #[test]
    fn newer_filter_names_are_understood() {
        let info: ExchangeInfo = serde_json::from_str(SAMPLE).unwrap();
        let old = &info.filter_table()["OLDBTC"];
        assert_eq!(old.min_notional, 0.0002);
        assert_eq!(old.multiplier_up, Some(4.0));
        assert_eq!(old.tick_size, 0.0);
        assert!(!old.trading);
    }
}
