// =============================================================================
// Binance REST API Client — HMAC-SHA256 signed requests
// =============================================================================
//
// SECURITY: The secret key is never logged or serialized. All signed requests
// include X-MBX-APIKEY as a header and a recvWindow (5 000 ms by default) to
// tolerate minor clock drift between the bot and Binance servers.
//
// Every call is attempted exactly once; failures surface as `ExchangeError`
// with Binance's own code and message when the response carries them.
// =============================================================================

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::binance::filters::ExchangeInfo;
use crate::error::{ExchangeError, ExchangeResult, CODE_UNKNOWN_ORDER};
use crate::exchange::{BoxFuture, Exchange};
use crate::runtime_config::SessionConfig;
use crate::types::{de_f64_str, BalanceInfo, ExchangeFilters, OrderAck, Trade};

type HmacSha256 = Hmac<Sha256>;

/// Trades fetched per `myTrades` call (Binance maximum).
const TRADE_HISTORY_LIMIT: u32 = 1000;

#[derive(Debug, Deserialize)]
struct AccountInfo {
    #[serde(default)]
    balances: Vec<BalanceInfo>,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    #[serde(deserialize_with = "de_f64_str")]
    price: f64,
}

/// Binance REST API client with HMAC-SHA256 request signing.
#[derive(Clone)]
pub struct BinanceClient {
    secret: String,
    base_url: String,
    recv_window_ms: u64,
    client: reqwest::Client,
}

impl BinanceClient {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    /// Create a new `BinanceClient`.
    ///
    /// # Arguments
    /// * `api_key` — Binance API key (sent as a header, never in query params).
    /// * `secret`  — Binance secret key used exclusively for HMAC signing.
    /// * `config`  — base URL, recv window and request timeout.
    pub fn new(
        api_key: impl Into<String>,
        secret: impl Into<String>,
        config: &SessionConfig,
    ) -> anyhow::Result<Self> {
        let api_key = api_key.into();

        let mut default_headers = HeaderMap::new();
        // The API key header is required for all signed endpoints.
        let val = HeaderValue::from_str(&api_key).context("API key is not a valid header value")?;
        default_headers.insert("X-MBX-APIKEY", val);

        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        debug!(base_url = %config.api_base_url, "BinanceClient initialised");

        Ok(Self {
            secret: secret.into(),
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            recv_window_ms: config.recv_window_ms,
            client,
        })
    }

    // -------------------------------------------------------------------------
    // Signing helpers
    // -------------------------------------------------------------------------

    /// Produce an HMAC-SHA256 hex signature of `query`.
    pub fn sign(&self, query: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(self.secret.as_bytes()).expect("HMAC accepts any key size");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Current UNIX timestamp in milliseconds.
    pub fn timestamp_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }

    /// Build the full query string for a signed request (appends timestamp,
    /// recvWindow, and signature).
    fn signed_query(&self, params: &str) -> String {
        let ts = Self::timestamp_ms();
        let recv = self.recv_window_ms;
        let base = if params.is_empty() {
            format!("timestamp={ts}&recvWindow={recv}")
        } else {
            format!("{params}&timestamp={ts}&recvWindow={recv}")
        };
        let sig = self.sign(&base);
        format!("{base}&signature={sig}")
    }

    // -------------------------------------------------------------------------
    // Transport
    // -------------------------------------------------------------------------

    /// Send one request and return the decoded JSON body.
    async fn send(
        &self,
        method: Method,
        path: &str,
        params: &str,
        signed: bool,
    ) -> ExchangeResult<serde_json::Value> {
        let qs = if signed {
            self.signed_query(params)
        } else {
            params.to_string()
        };
        let url = if qs.is_empty() {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}{}?{}", self.base_url, path, qs)
        };

        let resp = self
            .client
            .request(method.clone(), &url)
            .send()
            .await
            .map_err(|e| ExchangeError::Network(format!("{method} {path} request failed: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ExchangeError::Network(format!("{method} {path} body read failed: {e}")))?;
        let body: serde_json::Value =
            serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text));

        if !status.is_success() {
            return Err(classify_failure(status, &body));
        }

        Ok(body)
    }

    fn decode<T: DeserializeOwned>(body: serde_json::Value, what: &str) -> ExchangeResult<T> {
        serde_json::from_value(body)
            .map_err(|e| ExchangeError::Network(format!("malformed {what} response: {e}")))
    }

    // -------------------------------------------------------------------------
    // Orders
    // -------------------------------------------------------------------------

    /// POST /api/v3/order (signed) — submit a new order.
    ///
    /// # Arguments
    /// * `symbol`     — e.g. "XYZBTC"
    /// * `side`       — "BUY" or "SELL"
    /// * `order_type` — "LIMIT" or "MARKET"
    /// * `quantity`   — already normalised to the symbol's step size
    /// * `price`      — limit price; LIMIT orders are sent good-till-cancelled
    #[instrument(skip(self), name = "binance::place_order")]
    async fn place_order(
        &self,
        symbol: &str,
        side: &str,
        order_type: &str,
        quantity: f64,
        price: Option<f64>,
    ) -> ExchangeResult<OrderAck> {
        let client_order_id = Uuid::new_v4();
        let mut params = format!(
            "symbol={symbol}&side={side}&type={order_type}&quantity={quantity}\
             &newClientOrderId={client_order_id}&newOrderRespType=RESULT"
        );
        if let Some(p) = price {
            params.push_str(&format!("&price={p}&timeInForce=GTC"));
        }

        debug!(symbol, side, order_type, quantity, %client_order_id, "placing order");

        let body = self.send(Method::POST, "/api/v3/order", &params, true).await?;
        let ack: OrderAck = Self::decode(body, "order")?;

        info!(
            symbol,
            side,
            order_type,
            order_id = ack.order_id,
            status = %ack.status,
            executed_qty = ack.executed_qty,
            "order accepted"
        );
        Ok(ack)
    }
}

/// Map a non-2xx response to the error taxonomy.
///
/// Binance rejects business-rule violations with a 4xx status and a
/// `{"code": -2010, "msg": "..."}` body. 418/429 are rate limits and count as
/// transport failures, as does every 5xx.
pub fn classify_failure(status: StatusCode, body: &serde_json::Value) -> ExchangeError {
    let code = body.get("code").and_then(|c| c.as_i64());
    let msg = body.get("msg").and_then(|m| m.as_str());

    let rate_limited =
        status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::IM_A_TEAPOT;

    match (code, msg) {
        (Some(code), Some(msg)) if status.is_client_error() && !rate_limited => {
            ExchangeError::OrderRejected {
                code,
                msg: msg.to_string(),
            }
        }
        _ => ExchangeError::Network(format!("HTTP {status}: {body}")),
    }
}

impl Exchange for BinanceClient {
    /// GET /api/v3/account (signed), reduced to one asset's free balance.
    fn get_balance<'a>(&'a self, asset: &'a str) -> BoxFuture<'a, ExchangeResult<f64>> {
        Box::pin(async move {
            let body = self.send(Method::GET, "/api/v3/account", "", true).await?;
            let account: AccountInfo = Self::decode(body, "account")?;

            match account.balances.iter().find(|b| b.asset == asset) {
                Some(b) => {
                    debug!(asset, free = b.free, locked = b.locked, "balance retrieved");
                    Ok(b.free)
                }
                None => {
                    warn!(asset, "asset not found in balances — returning 0.0");
                    Ok(0.0)
                }
            }
        })
    }

    /// GET /api/v3/ticker/price (public).
    fn get_price<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, ExchangeResult<f64>> {
        Box::pin(async move {
            let params = format!("symbol={symbol}");
            let body = self
                .send(Method::GET, "/api/v3/ticker/price", &params, false)
                .await?;
            let ticker: TickerPrice = Self::decode(body, "ticker price")?;
            debug!(symbol, price = ticker.price, "price retrieved");
            Ok(ticker.price)
        })
    }

    /// GET /api/v3/exchangeInfo (public), every symbol.
    fn get_exchange_filters(
        &self,
    ) -> BoxFuture<'_, ExchangeResult<HashMap<String, ExchangeFilters>>> {
        Box::pin(async move {
            let body = self
                .send(Method::GET, "/api/v3/exchangeInfo", "", false)
                .await?;
            let info: ExchangeInfo = Self::decode(body, "exchangeInfo")?;
            let table = info.filter_table();
            debug!(symbols = table.len(), "exchange filters retrieved");
            Ok(table)
        })
    }

    fn market_buy<'a>(
        &'a self,
        symbol: &'a str,
        qty: f64,
    ) -> BoxFuture<'a, ExchangeResult<OrderAck>> {
        Box::pin(self.place_order(symbol, "BUY", "MARKET", qty, None))
    }

    fn market_sell<'a>(
        &'a self,
        symbol: &'a str,
        qty: f64,
    ) -> BoxFuture<'a, ExchangeResult<OrderAck>> {
        Box::pin(self.place_order(symbol, "SELL", "MARKET", qty, None))
    }

    fn limit_sell<'a>(
        &'a self,
        symbol: &'a str,
        qty: f64,
        price: f64,
    ) -> BoxFuture<'a, ExchangeResult<OrderAck>> {
        Box::pin(self.place_order(symbol, "SELL", "LIMIT", qty, Some(price)))
    }

    /// DELETE /api/v3/openOrders (signed). No open orders is not an error.
    fn cancel_all_orders<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, ExchangeResult<usize>> {
        Box::pin(async move {
            let params = format!("symbol={symbol}");
            match self
                .send(Method::DELETE, "/api/v3/openOrders", &params, true)
                .await
            {
                Ok(body) => {
                    let cancelled = body.as_array().map(|a| a.len()).unwrap_or(0);
                    debug!(symbol, cancelled, "open orders cancelled");
                    Ok(cancelled)
                }
                Err(ExchangeError::OrderRejected { code, .. }) if code == CODE_UNKNOWN_ORDER => {
                    debug!(symbol, "no open orders to cancel");
                    Ok(0)
                }
                Err(e) => Err(e),
            }
        })
    }

    /// GET /api/v3/myTrades (signed).
    fn get_trade_history<'a>(
        &'a self,
        symbol: &'a str,
    ) -> BoxFuture<'a, ExchangeResult<Vec<Trade>>> {
        Box::pin(async move {
            let params = format!("symbol={symbol}&limit={TRADE_HISTORY_LIMIT}");
            let body = self
                .send(Method::GET, "/api/v3/myTrades", &params, true)
                .await?;
            let trades: Vec<Trade> = Self::decode(body, "myTrades")?;
            debug!(symbol, count = trades.len(), "trade history retrieved");
            Ok(trades)
        })
    }
}

impl std::fmt::Debug for BinanceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceClient")
            .field("api_key", &"<redacted>")
            .field("secret", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("recv_window_ms", &self.recv_window_ms)
            .finish()
    }
}
