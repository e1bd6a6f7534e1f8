// =============================================================================
// Console — asset prompt and the panic-sell triggers
// =============================================================================
//
// The first line read is the asset. After that, the next line (a bare Enter)
// cancels the panic token. Ctrl+C raises the same token. Closing stdin
// disarms only the console trigger.
// =============================================================================

use std::io::Write;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Uppercase and validate a typed asset symbol.
pub fn normalize_asset(input: &str) -> Option<String> {
    let asset = input.trim().to_uppercase();
    if asset.is_empty() || !asset.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(asset)
}

pub struct Console<R> {
    lines: Lines<R>,
}

impl Console<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R> Console<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }

    /// Ask once for the asset to trade.
    pub async fn ask_asset(&mut self) -> Result<String> {
        print!("  Enter coin: ");
        std::io::stdout().flush().ok();

        let line = self
            .lines
            .next_line()
            .await
            .context("failed to read asset from stdin")?;
        let Some(line) = line else {
            bail!("stdin closed before an asset was entered");
        };
        match normalize_asset(&line) {
            Some(asset) => Ok(asset),
            None => bail!("'{}' is not a valid asset symbol", line.trim()),
        }
    }

    /// Cancel `token` on the next input line.
    pub fn arm_panic(mut self, token: CancellationToken) -> JoinHandle<()> {
        println!("\n(PRESS ENTER ANYTIME TO PANIC SELL)\n");
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                line = self.lines.next_line() => match line {
                    Ok(Some(_)) => {
                        warn!("panic sell requested from console");
                        token.cancel();
                    }
                    Ok(None) => debug!("stdin closed; console panic trigger disarmed"),
                    Err(e) => warn!(error = %e, "stdin read failed; console panic trigger disarmed"),
                },
            }
        })
    }
}

/// Cancel `token` on Ctrl+C.
pub fn arm_ctrl_c(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            res = tokio::signal::ctrl_c() => match res {
                Ok(()) => {
                    info!("Ctrl+C received, panic selling");
                    token.cancel();
                }
                Err(e) => warn!(error = %e, "failed to listen for Ctrl+C"),
            },
        }
    })
}
