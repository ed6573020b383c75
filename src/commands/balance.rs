//! Balance Command
//!
//! Fetches the account over the signed API and prints every non-zero
//! balance. Doubles as a quick credentials check.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use rsi_macd_bot::binance::{BinanceClient, ClientConfig};
use rsi_macd_bot::time_sync::{BinanceTimeSource, TimeSync};
use rsi_macd_bot::Credentials;

pub fn run(testnet: bool) -> Result<()> {
    dotenv::dotenv().ok();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(run_async(testnet))
}

async fn run_async(testnet: bool) -> Result<()> {
    let credentials = Credentials::from_env()
        .context("BINANCE_API_KEY and BINANCE_API_SECRET must be set")?;

    let clock = TimeSync::new(BinanceTimeSource::new(testnet), Duration::from_secs(60));
    if !clock.full_sync().await {
        anyhow::bail!("Clock synchronization failed");
    }

    let config = ClientConfig::default().with_testnet(testnet);
    let client = BinanceClient::new(config, Some(credentials), clock);

    let account = client.get_account().await?;
    let balances = account.non_zero_balances();

    if balances.is_empty() {
        info!("No non-zero balances");
        return Ok(());
    }

    println!("{:<10} {:>18} {:>18}", "Asset", "Free", "Locked");
    for balance in balances {
        println!(
            "{:<10} {:>18.8} {:>18.8}",
            balance.asset,
            balance.free_qty(),
            balance.locked_qty()
        );
    }

    Ok(())
}
