// =============================================================================
// Runtime Configuration — session settings and the take-profit ladder policy
// =============================================================================
//
// Loaded once at startup from an optional JSON file. All fields carry
// `#[serde(default)]` so a partial file (or none at all) yields the reference
// policy: buy with 98 % of the base balance, then exit 20 % at each of
// 3x / 4x (standing limit orders) and 6x / 8x / 10x (monitored market sells).
//
// =============================================================================

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Simultaneous open orders the exchange lets us keep on one symbol for the
/// ladder.
pub const MAX_LIMIT_TIERS: usize = 2;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_base_asset() -> String {
    "BTC".to_string()
}

fn default_valuation_symbol() -> String {
    "BTCUSDT".to_string()
}

fn default_buy_fraction() -> f64 {
    0.98
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_api_base_url() -> String {
    "https://api.binance.com".to_string()
}

fn default_recv_window_ms() -> u64 {
    5000
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_multiples() -> Vec<f64> {
    vec![3.0, 4.0, 6.0, 8.0, 10.0]
}

fn default_tier_fraction() -> f64 {
    0.20
}

fn default_limit_tiers() -> usize {
    2
}

// =============================================================================
// LadderPolicy
// =============================================================================

/// Shape of the take-profit ladder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LadderPolicy {
    /// Trigger price multiples of the entry price, strictly increasing.
    #[serde(default = "default_multiples")]
    pub multiples: Vec<f64>,

    /// Fraction of the bought quantity sold at every tier.
    #[serde(default = "default_tier_fraction")]
    pub tier_fraction: f64,

    /// How many of the lowest tiers are placed as standing limit orders. The
    /// rest are sold at market when the monitor sees them crossed.
    #[serde(default = "default_limit_tiers")]
    pub limit_tiers: usize,
}

impl Default for LadderPolicy {
    fn default() -> Self {
        Self {
            multiples: default_multiples(),
            tier_fraction: default_tier_fraction(),
            limit_tiers: default_limit_tiers(),
        }
    }
}

impl LadderPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.multiples.is_empty() {
            bail!("ladder needs at least one tier");
        }
        if self.multiples.iter().any(|m| !m.is_finite() || *m <= 0.0) {
            bail!("ladder multiples must be positive: {:?}", self.multiples);
        }
        if self.multiples.windows(2).any(|w| w[1] <= w[0]) {
            bail!(
                "ladder multiples must be strictly increasing: {:?}",
                self.multiples
            );
        }
        if self.tier_fraction <= 0.0 {
            bail!("tier_fraction must be positive, got {}", self.tier_fraction);
        }
        let total = self.tier_fraction * self.multiples.len() as f64;
        if total > 1.0 + 1e-9 {
            bail!("ladder sells {:.0}% of the position, more than 100%", total * 100.0);
        }
        if self.limit_tiers > MAX_LIMIT_TIERS {
            bail!(
                "limit_tiers = {} exceeds the exchange order ceiling of {MAX_LIMIT_TIERS}",
                self.limit_tiers
            );
        }
        if self.limit_tiers > self.multiples.len() {
            bail!("limit_tiers = {} exceeds the number of tiers", self.limit_tiers);
        }
        Ok(())
    }
}

// =============================================================================
// SessionConfig
// =============================================================================

/// Top-level configuration for one trading session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Currency every asset is quoted against (`{ASSET}{base_asset}`).
    #[serde(default = "default_base_asset")]
    pub base_asset: String,

    /// Ticker used to value the base currency in fiat terms in reports.
    #[serde(default = "default_valuation_symbol")]
    pub valuation_symbol: String,

    /// Share of the base balance spent on the entry buy; the remainder absorbs
    /// fees and slippage.
    #[serde(default = "default_buy_fraction")]
    pub buy_fraction: f64,

    /// Price monitor tick interval.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    // --- Exchange transport --------------------------------------------------
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_recv_window_ms")]
    pub recv_window_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    // --- Exit ladder ---------------------------------------------------------
    #[serde(default)]
    pub ladder: LadderPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_asset: default_base_asset(),
            valuation_symbol: default_valuation_symbol(),
            buy_fraction: default_buy_fraction(),
            poll_interval_ms: default_poll_interval_ms(),
            api_base_url: default_api_base_url(),
            recv_window_ms: default_recv_window_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            ladder: LadderPolicy::default(),
        }
    }
}

impl SessionConfig {
    /// Load `path` if it exists, otherwise the defaults. A file that exists
    /// but cannot be read or parsed is an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Load configuration from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read session config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse session config from {}", path.display()))?;

        info!(
            path = %path.display(),
            base_asset = %config.base_asset,
            multiples = ?config.ladder.multiples,
            "session config loaded"
        );

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_asset.trim().is_empty() {
            bail!("base_asset must not be empty");
        }
        if !(self.buy_fraction > 0.0 && self.buy_fraction <= 1.0) {
            bail!("buy_fraction must be in (0, 1], got {}", self.buy_fraction);
        }
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be non-zero");
        }
        self.ladder.validate().context("invalid ladder policy")
    }

    /// Exchange ticker for `asset` against the base currency.
    pub fn symbol_for(&self, asset: &str) -> String {
        format!("{}{}", asset.trim().to_uppercase(), self.base_asset.to_uppercase())
    }
}
