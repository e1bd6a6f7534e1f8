//! Recording exchange for tests.
//!
//! Simulates free/locked balances for one or more `{ASSET}{BASE}` pairs,
//! replays a scripted price series per symbol (the last price sticks), and
//! records every order it receives. Resting limit sells can be filled as the
//! price reaches them, and a market sell can be made to suspend after raising
//! a token so tests can interleave the panic path with a sell in flight.

use std::collections::{HashMap, VecDeque};

use chrono::Utc;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{ExchangeError, ExchangeResult};
use crate::exchange::{BoxFuture, Exchange};
use crate::types::{ExchangeFilters, OrderAck, Trade};

/// An order as the mock received it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedOrder {
    pub order_id: u64,
    pub symbol: String,
    pub qty: f64,
    /// Limit price, or the market price the order filled at.
    pub price: f64,
}

#[derive(Debug, Default)]
struct MockState {
    pairs: HashMap<String, (String, String)>,
    free: HashMap<String, f64>,
    locked: HashMap<String, f64>,
    scripted_prices: HashMap<String, VecDeque<f64>>,
    last_price: HashMap<String, f64>,
    filters: HashMap<String, ExchangeFilters>,
    trades: HashMap<String, Vec<Trade>>,
    buy_fill_price: Option<f64>,
    reject_buys: bool,
    reject_limit_prices: Vec<f64>,
    reject_market_sells: bool,
    trigger_on_buy: Option<CancellationToken>,
    trigger_on_sell: Option<CancellationToken>,
    fill_limits: bool,
    sells_after_trigger: usize,
    trigger_fired: bool,
    market_buys: Vec<RecordedOrder>,
    market_sells: Vec<RecordedOrder>,
    open_limits: Vec<RecordedOrder>,
    limit_history: Vec<RecordedOrder>,
    price_calls: usize,
    cancel_calls: usize,
    next_order_id: u64,
}

impl MockState {
    fn current_price(&self, symbol: &str) -> f64 {
        self.last_price
            .get(symbol)
            .copied()
            .or_else(|| self.scripted_prices.get(symbol).and_then(|q| q.front().copied()))
            .unwrap_or(0.0)
    }

    fn pair(&self, symbol: &str) -> ExchangeResult<(String, String)> {
        self.pairs
            .get(symbol)
            .cloned()
            .ok_or_else(|| ExchangeError::UnknownSymbol(symbol.to_string()))
    }

    /// Fill every resting limit sell on `symbol` priced at or below `price`.
    fn fill_limits_up_to(&mut self, symbol: &str, price: f64) {
        let Ok((asset, base)) = self.pair(symbol) else {
            return;
        };
        let (filled, resting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.open_limits)
            .into_iter()
            .partition(|o| o.symbol == symbol && o.price <= price);
        self.open_limits = resting;
        for order in filled {
            *self.locked.entry(asset.clone()).or_default() -= order.qty;
            *self.free.entry(base.clone()).or_default() += order.qty * order.price;
            self.trades.entry(symbol.to_string()).or_default().push(Trade {
                price: order.price,
                qty: order.qty,
                time: Utc::now().timestamp_millis(),
                order_id: order.order_id,
                is_buyer: false,
            });
        }
    }

    fn ack(&mut self, qty: f64, status: &str) -> OrderAck {
        self.next_order_id += 1;
        OrderAck {
            order_id: self.next_order_id,
            client_order_id: format!("mock-{}", self.next_order_id),
            status: status.to_string(),
            executed_qty: qty,
            cummulative_quote_qty: 0.0,
        }
    }
}

fn insufficient_balance() -> ExchangeError {
    ExchangeError::OrderRejected {
        code: -2010,
        msg: "Account has insufficient balance for requested action.".to_string(),
    }
}

#[derive(Debug, Default)]
pub struct MockExchange {
    state: Mutex<MockState>,
}

impl MockExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `{asset}{base}` with its filters.
    pub fn with_pair(self, asset: &str, base: &str, filters: ExchangeFilters) -> Self {
        {
            let mut s = self.state.lock();
            let symbol = format!("{asset}{base}");
            s.pairs.insert(symbol.clone(), (asset.to_string(), base.to_string()));
            s.filters.insert(symbol, filters);
        }
        self
    }

    pub fn with_balance(self, asset: &str, amount: f64) -> Self {
        self.state.lock().free.insert(asset.to_string(), amount);
        self
    }

    pub fn with_prices(self, symbol: &str, prices: &[f64]) -> Self {
        self.state
            .lock()
            .scripted_prices
            .insert(symbol.to_string(), prices.iter().copied().collect());
        self
    }

    pub fn with_trade(self, symbol: &str, trade: Trade) -> Self {
        self.state
            .lock()
            .trades
            .entry(symbol.to_string())
            .or_default()
            .push(trade);
        self
    }

    /// Fill market buys at `price` instead of the quoted price (slippage).
    pub fn with_buy_fill_price(self, price: f64) -> Self {
        self.state.lock().buy_fill_price = Some(price);
        self
    }

    pub fn rejecting_buys(self) -> Self {
        self.state.lock().reject_buys = true;
        self
    }

    pub fn rejecting_limit_at(self, price: f64) -> Self {
        self.state.lock().reject_limit_prices.push(price);
        self
    }

    pub fn rejecting_market_sells(self) -> Self {
        self.state.lock().reject_market_sells = true;
        self
    }

    /// Cancel `token` as soon as a market buy is submitted.
    pub fn triggering_on_buy(self, token: CancellationToken) -> Self {
        self.state.lock().trigger_on_buy = Some(token);
        self
    }

    /// Cancel `token` while the first market sell is in flight, then yield
    /// before completing that sell.
    pub fn triggering_on_sell(self, token: CancellationToken) -> Self {
        self.state.lock().trigger_on_sell = Some(token);
        self
    }

    /// Fill resting limit sells whenever a quoted price reaches them.
    pub fn filling_limits(self) -> Self {
        self.state.lock().fill_limits = true;
        self
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    pub fn market_buys(&self) -> Vec<RecordedOrder> {
        self.state.lock().market_buys.clone()
    }

    pub fn market_sells(&self) -> Vec<RecordedOrder> {
        self.state.lock().market_sells.clone()
    }

    pub fn open_limits(&self) -> Vec<RecordedOrder> {
        self.state.lock().open_limits.clone()
    }

    pub fn limit_history(&self) -> Vec<RecordedOrder> {
        self.state.lock().limit_history.clone()
    }

    pub fn cancel_calls(&self) -> usize {
        self.state.lock().cancel_calls
    }

    pub fn price_calls(&self) -> usize {
        self.state.lock().price_calls
    }

    /// Market sells submitted after the sell-side trigger fired.
    pub fn sells_after_trigger(&self) -> usize {
        self.state.lock().sells_after_trigger
    }

    pub fn free_balance(&self, asset: &str) -> f64 {
        self.state.lock().free.get(asset).copied().unwrap_or(0.0)
    }
}

impl Exchange for MockExchange {
    fn get_balance<'a>(&'a self, asset: &'a str) -> BoxFuture<'a, ExchangeResult<f64>> {
        Box::pin(async move { Ok(self.state.lock().free.get(asset).copied().unwrap_or(0.0)) })
    }

    fn get_price<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, ExchangeResult<f64>> {
        Box::pin(async move {
            let mut s = self.state.lock();
            s.price_calls += 1;
            let next = s.scripted_prices.get_mut(symbol).and_then(|q| q.pop_front());
            let price = match next {
                Some(p) => p,
                None => s
                    .last_price
                    .get(symbol)
                    .copied()
                    .ok_or_else(|| ExchangeError::Network(format!("no price for {symbol}")))?,
            };
            s.last_price.insert(symbol.to_string(), price);
            if s.fill_limits {
                s.fill_limits_up_to(symbol, price);
            }
            Ok(price)
        })
    }

    fn get_exchange_filters(
        &self,
    ) -> BoxFuture<'_, ExchangeResult<HashMap<String, ExchangeFilters>>> {
        Box::pin(async move { Ok(self.state.lock().filters.clone()) })
    }

    fn market_buy<'a>(
        &'a self,
        symbol: &'a str,
        qty: f64,
    ) -> BoxFuture<'a, ExchangeResult<OrderAck>> {
        Box::pin(async move {
            let mut s = self.state.lock();
            if let Some(token) = s.trigger_on_buy.take() {
                token.cancel();
            }
            if s.reject_buys {
                return Err(ExchangeError::OrderRejected {
                    code: -1013,
                    msg: "Filter failure: MIN_NOTIONAL".to_string(),
                });
            }
            let (asset, base) = s.pair(symbol)?;
            let fill = s.buy_fill_price.unwrap_or_else(|| s.current_price(symbol));
            let cost = qty * fill;
            let base_free = s.free.get(&base).copied().unwrap_or(0.0);
            if base_free + 1e-12 < cost {
                return Err(insufficient_balance());
            }
            s.free.insert(base, base_free - cost);
            *s.free.entry(asset).or_default() += qty;
            let ack = s.ack(qty, "FILLED");
            s.trades.entry(symbol.to_string()).or_default().push(Trade {
                price: fill,
                qty,
                time: Utc::now().timestamp_millis(),
                order_id: ack.order_id,
                is_buyer: true,
            });
            s.market_buys.push(RecordedOrder {
                order_id: ack.order_id,
                symbol: symbol.to_string(),
                qty,
                price: fill,
            });
            Ok(ack)
        })
    }

    fn market_sell<'a>(
        &'a self,
        symbol: &'a str,
        qty: f64,
    ) -> BoxFuture<'a, ExchangeResult<OrderAck>> {
        Box::pin(async move {
            let trigger = self.state.lock().trigger_on_sell.take();
            if let Some(token) = trigger {
                token.cancel();
                tokio::task::yield_now().await;
                self.state.lock().trigger_fired = true;
            } else {
                let mut s = self.state.lock();
                if s.trigger_fired {
                    s.sells_after_trigger += 1;
                }
            }

            let mut s = self.state.lock();
            if s.reject_market_sells {
                return Err(insufficient_balance());
            }
            let (asset, base) = s.pair(symbol)?;
            let price = s.current_price(symbol);
            let asset_free = s.free.get(&asset).copied().unwrap_or(0.0);
            if asset_free + 1e-12 < qty {
                return Err(insufficient_balance());
            }
            s.free.insert(asset, asset_free - qty);
            *s.free.entry(base).or_default() += qty * price;
            let ack = s.ack(qty, "FILLED");
            s.market_sells.push(RecordedOrder {
                order_id: ack.order_id,
                symbol: symbol.to_string(),
                qty,
                price,
            });
            Ok(ack)
        })
    }

    fn limit_sell<'a>(
        &'a self,
        symbol: &'a str,
        qty: f64,
        price: f64,
    ) -> BoxFuture<'a, ExchangeResult<OrderAck>> {
        Box::pin(async move {
            let mut s = self.state.lock();
            if s.reject_limit_prices.iter().any(|p| (p - price).abs() < 1e-9) {
                return Err(ExchangeError::OrderRejected {
                    code: -1013,
                    msg: "Filter failure: PERCENT_PRICE".to_string(),
                });
            }
            let (asset, _) = s.pair(symbol)?;
            let asset_free = s.free.get(&asset).copied().unwrap_or(0.0);
            if asset_free + 1e-12 < qty {
                return Err(insufficient_balance());
            }
            s.free.insert(asset.clone(), asset_free - qty);
            *s.locked.entry(asset).or_default() += qty;
            let ack = s.ack(0.0, "NEW");
            let order = RecordedOrder {
                order_id: ack.order_id,
                symbol: symbol.to_string(),
                qty,
                price,
            };
            s.open_limits.push(order.clone());
            s.limit_history.push(order);
            Ok(ack)
        })
    }

    fn cancel_all_orders<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, ExchangeResult<usize>> {
        Box::pin(async move {
            let mut s = self.state.lock();
            s.cancel_calls += 1;
            let (asset, _) = s.pair(symbol)?;
            let (cancelled, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut s.open_limits)
                .into_iter()
                .partition(|o| o.symbol == symbol);
            s.open_limits = kept;
            let released: f64 = cancelled.iter().map(|o| o.qty).sum();
            *s.locked.entry(asset.clone()).or_default() -= released;
            *s.free.entry(asset).or_default() += released;
            Ok(cancelled.len())
        })
    }

    fn get_trade_history<'a>(
        &'a self,
        symbol: &'a str,
    ) -> BoxFuture<'a, ExchangeResult<Vec<Trade>>> {
        Box::pin(async move {
            Ok(self
                .state
                .lock()
                .trades
                .get(symbol)
                .cloned()
                .unwrap_or_default())
        })
    }
}
