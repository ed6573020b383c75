//! Clock Command
//!
//! Diagnostic for clock drift against the exchange: runs a full sync and
//! reports the measured offset, then samples the server a few more times
//! so jitter is visible.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::sleep;

use rsi_macd_bot::time_sync::{local_time_ms, BinanceTimeSource, TimeSync};

const SAMPLES: usize = 3;

pub fn run(testnet: bool) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(run_async(testnet))
}

async fn run_async(testnet: bool) -> Result<()> {
    let clock = TimeSync::new(BinanceTimeSource::new(testnet), Duration::from_secs(60));

    println!("Local time:  {} ms", local_time_ms());

    if !clock.full_sync().await {
        anyhow::bail!("Clock synchronization failed");
    }
    println!("Offset:      {} ms", clock.offset_ms());
    println!("Adjusted:    {} ms", clock.adjusted_timestamp_ms());

    println!("\nSampling {} more syncs for jitter...", SAMPLES);
    for i in 1..=SAMPLES {
        sleep(Duration::from_secs(1)).await;
        if clock.full_sync().await {
            println!("  sample {}: offset {} ms", i, clock.offset_ms());
        } else {
            println!("  sample {}: sync failed", i);
        }
    }

    let offset = clock.offset_ms().abs();
    if offset > 1_000 {
        println!("\nWARNING: local clock is off by more than a second.");
        println!("Signed requests rely on the offset correction staying accurate.");
    } else {
        println!("\nLocal clock is within {} ms of the exchange.", offset.max(1));
    }

    Ok(())
}
