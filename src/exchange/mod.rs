//! Exchange collaborator boundary.
//!
//! Every suspension point of a session is one of these calls. The trait is
//! dyn-compatible so the strategy can run against the signed REST client or a
//! recording mock.

#[cfg(test)]
pub mod mock;

use std::collections::HashMap;
use std::pin::Pin;

use crate::error::ExchangeResult;
use crate::types::{ExchangeFilters, OrderAck, Trade};

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

pub trait Exchange: Send + Sync {
    /// Free (unlocked) balance of `asset`. Unknown assets report `0.0`.
    fn get_balance<'a>(&'a self, asset: &'a str) -> BoxFuture<'a, ExchangeResult<f64>>;

    /// Last traded price of `symbol`.
    fn get_price<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, ExchangeResult<f64>>;

    /// Trading constraints for every listed symbol.
    fn get_exchange_filters(
        &self,
    ) -> BoxFuture<'_, ExchangeResult<HashMap<String, ExchangeFilters>>>;

    fn market_buy<'a>(&'a self, symbol: &'a str, qty: f64)
        -> BoxFuture<'a, ExchangeResult<OrderAck>>;

    fn market_sell<'a>(
        &'a self,
        symbol: &'a str,
        qty: f64,
    ) -> BoxFuture<'a, ExchangeResult<OrderAck>>;

    /// Good-till-cancelled limit sell.
    fn limit_sell<'a>(
        &'a self,
        symbol: &'a str,
        qty: f64,
        price: f64,
    ) -> BoxFuture<'a, ExchangeResult<OrderAck>>;

    /// Cancel every open order on `symbol`, returning how many were cancelled.
    fn cancel_all_orders<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, ExchangeResult<usize>>;

    /// Account fills on `symbol`, oldest first.
    fn get_trade_history<'a>(&'a self, symbol: &'a str)
        -> BoxFuture<'a, ExchangeResult<Vec<Trade>>>;
}
