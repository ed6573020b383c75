//! Live Trading Command
//!
//! The main event loop: fetch klines, evaluate the signal rules, manage
//! open positions (stop loss, take profit, emergency RSI exit), place
//! orders in paper or live mode, persist state, and notify. Shuts down
//! gracefully on Ctrl+C, stopping the background clock sync last.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::time::{interval, sleep};
use tracing::{debug, error, info, warn};

use rsi_macd_bot::binance::types::OrderSide;
use rsi_macd_bot::binance::{BinanceClient, ClientConfig};
use rsi_macd_bot::common::RetryPolicy;
use rsi_macd_bot::config::Config;
use rsi_macd_bot::notify::TelegramNotifier;
use rsi_macd_bot::state_manager::SqliteStateManager;
use rsi_macd_bot::strategy::{within_trading_hours, IndicatorSnapshot, Strategy};
use rsi_macd_bot::time_sync::{BinanceTimeSource, TimeSync};
use rsi_macd_bot::types::{Position, Signal, TradeRecord};
use rsi_macd_bot::Credentials;

/// Klines fetched per symbol per cycle. Enough for the 200-period EMA
/// filter to warm up with headroom.
const KLINE_WINDOW: u32 = 250;

struct TradingBot {
    config: Config,
    client: BinanceClient,
    strategy: Strategy,
    state: SqliteStateManager,
    notifier: Option<TelegramNotifier>,
    positions: HashMap<String, Position>,
    paper_mode: bool,
    cycle_count: u64,
}

impl TradingBot {
    fn new(
        config: Config,
        client: BinanceClient,
        state: SqliteStateManager,
        paper_mode: bool,
    ) -> Self {
        let strategy = Strategy::new(config.strategy.clone());
        let notifier = if config.notifications.telegram_enabled {
            TelegramNotifier::from_env()
        } else {
            None
        };
        if notifier.is_none() {
            info!("Telegram notifications disabled");
        }

        TradingBot {
            config,
            client,
            strategy,
            state,
            notifier,
            positions: HashMap::new(),
            paper_mode,
            cycle_count: 0,
        }
    }

    /// Reload open positions persisted by a previous session
    fn recover_state(&mut self) -> Result<()> {
        for pos in self.state.open_positions()? {
            info!(
                "Recovered position: {} amount={:.6} @ {:.2}",
                pos.symbol, pos.amount, pos.entry_price
            );
            self.positions.insert(pos.symbol.clone(), pos);
        }
        info!("State recovery complete: {} open positions", self.positions.len());
        Ok(())
    }

    async fn run_cycle(&mut self) -> Result<()> {
        self.cycle_count += 1;
        info!("--- Trading cycle {} ---", self.cycle_count);

        let in_hours = within_trading_hours(
            self.config.trading.trading_hours_start,
            self.config.trading.trading_hours_end,
        );

        for symbol in self.config.trading.symbols.clone() {
            if let Err(e) = self.process_symbol(&symbol, in_hours).await {
                error!("Error processing {}: {}", symbol, e);
                if let Some(notifier) = &self.notifier {
                    notifier.notify_error(&symbol, &e.to_string()).await;
                }
            }
        }

        info!(
            "Cycle {} complete: {} open positions, clock offset {}ms",
            self.cycle_count,
            self.positions.len(),
            self.client.clock().offset_ms()
        );
        Ok(())
    }

    async fn process_symbol(&mut self, symbol: &str, in_hours: bool) -> Result<()> {
        let klines = self
            .client
            .get_klines(symbol, &self.config.trading.timeframe, KLINE_WINDOW)
            .await?;

        let Some(snapshot) = IndicatorSnapshot::compute(&klines, self.strategy.params()) else {
            debug!(symbol, candles = klines.len(), "Insufficient kline data");
            return Ok(());
        };
        let current_price = snapshot.close;

        if self.positions.contains_key(symbol) {
            self.manage_position(symbol, &snapshot).await?;
        }

        if !in_hours {
            debug!(symbol, "Outside trading hours, skipping entries");
            return Ok(());
        }

        let signal = self.strategy.evaluate(symbol, &snapshot);
        match signal {
            Signal::Buy if !self.positions.contains_key(symbol) => {
                if self.positions.len() >= self.config.trading.max_positions {
                    debug!(symbol, "Max positions reached, ignoring buy signal");
                    return Ok(());
                }
                self.open_position(symbol, current_price, &snapshot).await?;
            }
            Signal::Sell if self.positions.contains_key(symbol) => {
                info!("Sell signal for {}", symbol);
                self.close_position(symbol, current_price, "Signal", &snapshot)
                    .await?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Check stop loss, take profit, and the emergency RSI exit on an open
    /// position
    async fn manage_position(&mut self, symbol: &str, snapshot: &IndicatorSnapshot) -> Result<()> {
        let Some(pos) = self.positions.get(symbol).cloned() else {
            return Ok(());
        };
        let price = snapshot.close;

        if let Some(id) = pos.id {
            self.state.update_position_price(id, price)?;
        }

        if price <= pos.stop_loss {
            info!("Stop loss triggered for {} @ {:.2}", symbol, price);
            return self.close_position(symbol, price, "Stop Loss", snapshot).await;
        }
        if price >= pos.take_profit {
            info!("Take profit triggered for {} @ {:.2}", symbol, price);
            return self
                .close_position(symbol, price, "Take Profit", snapshot)
                .await;
        }
        if self.strategy.emergency_exit(snapshot) {
            warn!(
                "Emergency exit for {}: RSI {:.1} @ {:.2}",
                symbol, snapshot.rsi, price
            );
            return self
                .close_position(symbol, price, "Emergency RSI", snapshot)
                .await;
        }
        Ok(())
    }

    async fn open_position(
        &mut self,
        symbol: &str,
        price: f64,
        snapshot: &IndicatorSnapshot,
    ) -> Result<()> {
        let amount = self.config.trading.trade_amount_quote / price;
        let stop_loss = price * (1.0 - self.config.trading.stop_loss_pct / 100.0);
        let take_profit = price * (1.0 + self.config.trading.take_profit_pct / 100.0);

        let (fill_price, fill_amount) = if self.paper_mode {
            info!(
                "[PAPER] BUY {} amount={:.6} @ {:.2} | SL={:.2} TP={:.2}",
                symbol, amount, price, stop_loss, take_profit
            );
            (price, amount)
        } else {
            let order = self
                .client
                .place_market_order(symbol, OrderSide::Buy, amount)
                .await?;
            let fill_price = order.average_price().unwrap_or(price);
            info!(
                "[LIVE] BUY {} amount={:.6} @ {:.2} | order id {}",
                symbol,
                order.executed_quantity(),
                fill_price,
                order.order_id
            );
            (fill_price, order.executed_quantity())
        };

        let position = Position {
            id: None,
            symbol: symbol.to_string(),
            side: "buy".to_string(),
            amount: fill_amount,
            entry_price: fill_price,
            current_price: fill_price,
            stop_loss,
            take_profit,
            status: "open".to_string(),
            entry_time: Utc::now(),
        };
        let position = self.state.save_position(&position)?;
        self.positions.insert(symbol.to_string(), position);

        let trade = TradeRecord {
            id: None,
            timestamp: Utc::now(),
            symbol: symbol.to_string(),
            side: "buy".to_string(),
            amount: fill_amount,
            price: fill_price,
            total: fill_amount * fill_price,
            pnl: 0.0,
            status: "executed".to_string(),
            strategy_signal: Signal::Buy.to_string(),
            rsi_value: snapshot.rsi,
            macd_value: snapshot.macd,
            notes: if self.paper_mode { "paper" } else { "live" }.to_string(),
        };
        self.state.record_trade(&trade)?;

        if let Some(notifier) = &self.notifier {
            if self.config.notifications.notify_trades {
                notifier.notify_trade(&trade).await;
            }
        }
        Ok(())
    }

    async fn close_position(
        &mut self,
        symbol: &str,
        price: f64,
        reason: &str,
        snapshot: &IndicatorSnapshot,
    ) -> Result<()> {
        let Some(position) = self.positions.remove(symbol) else {
            return Ok(());
        };

        let fill_price = if self.paper_mode {
            price
        } else {
            match self
                .client
                .place_market_order(symbol, OrderSide::Sell, position.amount)
                .await
            {
                Ok(order) => order.average_price().unwrap_or(price),
                Err(e) => {
                    error!("Failed to close position for {}: {}", symbol, e);
                    // keep tracking the position so the next cycle retries
                    self.positions.insert(symbol.to_string(), position);
                    return Err(e.into());
                }
            }
        };

        let pnl = (fill_price - position.entry_price) * position.amount;
        let mode = if self.paper_mode { "PAPER" } else { "LIVE" };
        info!(
            "[{}] CLOSE {} amount={:.6} @ {:.2} | PnL={:+.2} | {}",
            mode, symbol, position.amount, fill_price, pnl, reason
        );

        if let Some(id) = position.id {
            self.state.close_position(id, fill_price)?;
        }

        let trade = TradeRecord {
            id: None,
            timestamp: Utc::now(),
            symbol: symbol.to_string(),
            side: "sell".to_string(),
            amount: position.amount,
            price: fill_price,
            total: position.amount * fill_price,
            pnl,
            status: "executed".to_string(),
            strategy_signal: Signal::Sell.to_string(),
            rsi_value: snapshot.rsi,
            macd_value: snapshot.macd,
            notes: reason.to_string(),
        };
        self.state.record_trade(&trade)?;

        if let Some(notifier) = &self.notifier {
            if self.config.notifications.notify_trades {
                notifier.notify_trade(&trade).await;
            }
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        info!("Initiating graceful shutdown...");

        let summary = self.state.performance_summary()?;
        info!(
            "Session totals: {} trades, {:.1}% win rate, total PnL {:+.2}",
            summary.total_trades,
            summary.win_rate(),
            summary.total_pnl
        );

        self.client.clock().stop().await;
        info!("Shutdown complete");
        Ok(())
    }
}

pub fn run(
    config_path: String,
    paper: bool,
    live: bool,
    interval_secs: u64,
    db_path: String,
) -> Result<()> {
    if !paper && !live {
        anyhow::bail!("Must specify either --paper or --live mode");
    }
    if paper && live {
        anyhow::bail!("Cannot specify both --paper and --live modes");
    }

    dotenv::dotenv().ok();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(run_async(config_path, paper, interval_secs, db_path))
}

async fn run_async(
    config_path: String,
    paper_mode: bool,
    interval_secs: u64,
    db_path: String,
) -> Result<()> {
    let config = Config::from_file(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    let mode_str = if paper_mode { "PAPER" } else { "LIVE" };
    info!("RSI+MACD trading bot starting in {} mode", mode_str);
    info!("Symbols: {}", config.trading.symbols.join(", "));
    info!("Timeframe: {}", config.trading.timeframe);
    info!(
        "Stop loss: {:.1}% | Take profit: {:.1}% | recvWindow: {}ms",
        config.trading.stop_loss_pct, config.trading.take_profit_pct, config.exchange.recv_window_ms
    );

    if !paper_mode {
        warn!("LIVE TRADING MODE - REAL MONEY AT RISK!");
        warn!("Press Ctrl+C within 10 seconds to abort...");
        for i in (1..=10).rev() {
            info!("Starting in {} seconds...", i);
            sleep(Duration::from_secs(1)).await;
        }
    }

    let credentials = if paper_mode {
        Credentials::from_env().ok()
    } else {
        Some(Credentials::from_env().context("Live mode requires API credentials")?)
    };

    let clock = TimeSync::new(
        BinanceTimeSource::new(config.exchange.testnet),
        Duration::from_secs(config.time_sync.sync_interval_seconds),
    );
    if !clock.full_sync().await {
        anyhow::bail!("Initial clock synchronization failed");
    }
    clock.start();

    let client_config = ClientConfig::default()
        .with_testnet(config.exchange.testnet)
        .with_recv_window_ms(config.exchange.recv_window_ms)
        .with_retry(RetryPolicy::default().with_max_attempts(config.exchange.max_retry_attempts))
        .with_min_request_gap(Duration::from_millis(config.exchange.min_request_gap_ms));
    let client = BinanceClient::new(client_config, credentials, clock);

    if !client.ping().await? {
        anyhow::bail!("Exchange API is not reachable");
    }

    let state = SqliteStateManager::new(&db_path)?;
    let mut bot = TradingBot::new(config, client, state, paper_mode);
    bot.recover_state()?;

    let mut cycle_interval = interval(Duration::from_secs(interval_secs));
    info!("Starting trading loop ({}s cycle)...", interval_secs);

    loop {
        tokio::select! {
            _ = cycle_interval.tick() => {
                if let Err(e) = bot.run_cycle().await {
                    error!("Trading cycle error: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, initiating shutdown...");
                break;
            }
        }
    }

    bot.shutdown().await?;
    info!("Trading session ended.");
    Ok(())
}
