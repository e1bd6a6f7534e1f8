// =============================================================================
// Pampit — Main Entry Point
// =============================================================================
//
// One speculative session per run: pick an asset, buy it with the whole base
// balance, lay out the take-profit ladder and watch the price. Press Enter
// (or Ctrl+C) at any time to cancel everything and sell at market.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod binance;
mod entry;
mod error;
mod exchange;
mod exit;
mod ladder;
mod normalizer;
mod position_engine;
mod prompt;
mod report;
mod runtime_config;
mod session;
mod strategy;
mod types;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::binance::client::BinanceClient;
use crate::prompt::{arm_ctrl_c, normalize_asset, Console};
use crate::runtime_config::SessionConfig;
use crate::session::SessionContext;

/// Pump-signal session bot: market buy, tiered exits, panic sell on Enter.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Session configuration file (JSON)
    #[arg(short, long, default_value = "pampit_config.json")]
    config: String,

    /// Asset to buy; skips the interactive prompt
    #[arg(short, long)]
    asset: Option<String>,
}

fn env_credential(primary: &str, legacy: &str) -> Result<String> {
    std::env::var(primary)
        .or_else(|_| std::env::var(legacy))
        .with_context(|| format!("{primary} (or {legacy}) must be set"))
}

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Pampit — Pump Session Bot                        ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let config = SessionConfig::load_or_default(&args.config)?;
    config.validate()?;

    // ── 2. Exchange client ───────────────────────────────────────────────
    let api_key = env_credential("BINANCE_API_KEY", "APIKEY")?;
    let api_secret = env_credential("BINANCE_API_SECRET", "APISECRET")?;
    let client = BinanceClient::new(api_key, api_secret, &config)?;

    // ── 3. Session snapshot ──────────────────────────────────────────────
    let ctx = SessionContext::bootstrap(&client, config)
        .await
        .context("failed to fetch startup snapshot")?;

    // ── 4. Asset selection & panic triggers ──────────────────────────────
    let mut console = Console::stdin();
    let asset = match args.asset.as_deref() {
        Some(raw) => normalize_asset(raw).with_context(|| format!("invalid asset '{raw}'"))?,
        None => console.ask_asset().await?,
    };
    let symbol = ctx.resolve_symbol(&asset)?;
    info!(asset = %asset, symbol = %symbol, "asset selected");

    let panic = CancellationToken::new();
    let console_trigger = console.arm_panic(panic.clone());
    let ctrl_c_trigger = arm_ctrl_c(panic.clone());

    // ── 5. Run the session ───────────────────────────────────────────────
    let result = strategy::run_session(&client, &ctx, &asset, panic.clone()).await;

    console_trigger.abort();
    ctrl_c_trigger.abort();

    match result {
        Ok(report) => {
            info!(
                profit = report.profit,
                base = %report.base_asset,
                profit_quote = report.profit_quote,
                outcome = %report.outcome,
                ending_balance = ?ctx.ending_balance(),
                "Pampit session complete."
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "session aborted");
            Err(e)
        }
    }
}
