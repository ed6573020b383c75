//! Exchange clock synchronization
//!
//! Binance rejects signed requests whose timestamp falls outside the server's
//! `recvWindow`, so every authenticated call must be stamped with a timestamp
//! close to *server* time, not local time. [`TimeSync`] maintains a shared
//! offset (`server_time - local_time`, in milliseconds) that callers apply via
//! [`TimeSync::adjusted_timestamp_ms`]. The offset is refreshed from the
//! exchange's public time endpoint by a background loop and on demand before
//! critical requests.
//!
//! A failed sync never resets the offset: a stale offset is still a better
//! estimate than zero.

use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Default interval between background syncs
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(60);

/// Attempts per [`TimeSync::full_sync`] before giving up
const SYNC_ATTEMPTS: u32 = 3;

/// Pause between failed attempts within one sync
const SYNC_ATTEMPT_PAUSE: Duration = Duration::from_secs(1);

/// Timeout for a single time-endpoint request
const TIME_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Base URL for the Binance spot API
pub const BINANCE_API_BASE: &str = "https://api.binance.com";

/// Base URL for the Binance spot testnet
pub const BINANCE_TESTNET_API_BASE: &str = "https://testnet.binance.vision";

/// Current local wall-clock time in milliseconds since epoch
pub fn local_time_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Estimate the server's "now" from its reported time and the observed
/// round trip: by the time the response arrives, roughly half the round
/// trip has elapsed since the server stamped it.
pub fn compensated_reference_ms(server_time_ms: i64, round_trip_ms: i64) -> i64 {
    server_time_ms + round_trip_ms / 2
}

/// An authoritative source of server time.
///
/// Abstracted as a trait so tests can substitute a deterministic or failing
/// source for the real HTTP endpoint.
pub trait TimeSource: Send + Sync + 'static {
    /// Query the source for its current time in milliseconds since epoch.
    fn server_time_ms(&self) -> impl Future<Output = Result<i64>> + Send;
}

impl<T: TimeSource> TimeSource for Arc<T> {
    fn server_time_ms(&self) -> impl Future<Output = Result<i64>> + Send {
        T::server_time_ms(self)
    }
}

/// Production [`TimeSource`] backed by Binance's public `/api/v3/time`
/// endpoint. No authentication required.
#[derive(Debug, Clone)]
pub struct BinanceTimeSource {
    client: reqwest::Client,
    url: String,
}

impl BinanceTimeSource {
    pub fn new(testnet: bool) -> Self {
        let base = if testnet {
            BINANCE_TESTNET_API_BASE
        } else {
            BINANCE_API_BASE
        };

        let client = reqwest::Client::builder()
            .timeout(TIME_REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build HTTP client");

        BinanceTimeSource {
            client,
            url: format!("{}/api/v3/time", base),
        }
    }
}

impl TimeSource for BinanceTimeSource {
    async fn server_time_ms(&self) -> Result<i64> {
        #[derive(serde::Deserialize)]
        struct TimeResponse {
            #[serde(rename = "serverTime")]
            server_time: i64,
        }

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .context("Failed to query server time")?
            .error_for_status()
            .context("Server time endpoint returned an error")?;

        let body: TimeResponse = response
            .json()
            .await
            .context("Failed to parse server time response")?;

        Ok(body.server_time)
    }
}

struct SyncWorker {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Shared clock-offset service.
///
/// Cheap to clone: clones share the same offset, sync state, and background
/// loop. Readers take atomic loads and never touch the network; all mutation
/// goes through [`TimeSync::update_offset`], driven by syncs.
pub struct TimeSync<S: TimeSource> {
    source: Arc<S>,
    /// `server_time - local_time` in ms, from the most recent successful sync
    offset_ms: Arc<AtomicI64>,
    /// Local wall-clock ms of the last successful sync; 0 = never synced
    last_sync_ms: Arc<AtomicI64>,
    sync_interval: Duration,
    /// Serializes syncs so concurrent callers cannot fire parallel requests
    sync_gate: Arc<Mutex<()>>,
    worker: Arc<std::sync::Mutex<Option<SyncWorker>>>,
}

impl<S: TimeSource> Clone for TimeSync<S> {
    fn clone(&self) -> Self {
        TimeSync {
            source: Arc::clone(&self.source),
            offset_ms: Arc::clone(&self.offset_ms),
            last_sync_ms: Arc::clone(&self.last_sync_ms),
            sync_interval: self.sync_interval,
            sync_gate: Arc::clone(&self.sync_gate),
            worker: Arc::clone(&self.worker),
        }
    }
}

impl<S: TimeSource> TimeSync<S> {
    /// Create a service with offset 0. The first sync (background or forced)
    /// establishes the real offset.
    pub fn new(source: S, sync_interval: Duration) -> Self {
        TimeSync {
            source: Arc::new(source),
            offset_ms: Arc::new(AtomicI64::new(0)),
            last_sync_ms: Arc::new(AtomicI64::new(0)),
            sync_interval,
            sync_gate: Arc::new(Mutex::new(())),
            worker: Arc::new(std::sync::Mutex::new(None)),
        }
    }

    pub fn with_default_interval(source: S) -> Self {
        Self::new(source, DEFAULT_SYNC_INTERVAL)
    }

    /// Current local time adjusted by the clock offset. Never blocks and
    /// never touches the network.
    pub fn adjusted_timestamp_ms(&self) -> i64 {
        local_time_ms() + self.offset_ms.load(Ordering::SeqCst)
    }

    /// Current offset in milliseconds, for diagnostics and logging.
    pub fn offset_ms(&self) -> i64 {
        self.offset_ms.load(Ordering::SeqCst)
    }

    /// Local wall-clock ms of the last successful sync (0 = never).
    pub fn last_sync_ms(&self) -> i64 {
        self.last_sync_ms.load(Ordering::SeqCst)
    }

    /// Replace the offset from an externally obtained reference time.
    ///
    /// The store is a single atomic swap: concurrent readers see either the
    /// old or the new offset, never a mix.
    pub fn update_offset(&self, reference_time_ms: i64) {
        let local = local_time_ms();
        let new_offset = reference_time_ms - local;
        let old_offset = self.offset_ms.swap(new_offset, Ordering::SeqCst);
        self.last_sync_ms.store(local, Ordering::SeqCst);

        info!(
            old_offset_ms = old_offset,
            new_offset_ms = new_offset,
            delta_ms = new_offset - old_offset,
            "Clock offset updated"
        );
    }

    /// Whether the offset is due for a refresh: never synced, or the
    /// configured interval has elapsed since the last successful sync.
    pub fn is_stale(&self) -> bool {
        let last = self.last_sync_ms.load(Ordering::SeqCst);
        last == 0 || local_time_ms() - last > self.sync_interval.as_millis() as i64
    }

    /// Query the time source and replace the offset. Up to [`SYNC_ATTEMPTS`]
    /// tries; on total failure the previous offset is kept and `false` is
    /// returned. Never fatal.
    pub async fn full_sync(&self) -> bool {
        let _gate = self.sync_gate.lock().await;
        self.sync_now().await
    }

    /// Sync if forced, never synced, or stale. Returns whether a sync ran
    /// and succeeded.
    ///
    /// Concurrent callers coalesce: the gate serializes syncs, and a
    /// non-forced caller that waited on the gate re-checks staleness and
    /// skips if another caller already refreshed the offset.
    pub async fn force_sync_if_needed(&self, force: bool) -> bool {
        if !force && !self.is_stale() {
            return false;
        }

        let _gate = self.sync_gate.lock().await;
        if !force && !self.is_stale() {
            debug!("Sync already performed by a concurrent caller, skipping");
            return false;
        }

        self.sync_now().await
    }

    /// One sync pass. Caller must hold `sync_gate`.
    async fn sync_now(&self) -> bool {
        for attempt in 1..=SYNC_ATTEMPTS {
            let started = Instant::now();
            match self.source.server_time_ms().await {
                Ok(server_ms) => {
                    let rtt_ms = started.elapsed().as_millis() as i64;
                    let reference = compensated_reference_ms(server_ms, rtt_ms);
                    self.update_offset(reference);
                    debug!(server_ms, rtt_ms, "Time sync complete");
                    return true;
                }
                Err(e) => {
                    warn!(attempt, max_attempts = SYNC_ATTEMPTS, error = %e, "Time source query failed");
                    if attempt < SYNC_ATTEMPTS {
                        tokio::time::sleep(SYNC_ATTEMPT_PAUSE).await;
                    }
                }
            }
        }

        warn!(
            "Time sync failed after {} attempts, keeping previous offset ({}ms)",
            SYNC_ATTEMPTS,
            self.offset_ms()
        );
        false
    }

    /// Start the periodic sync loop. Idempotent: calling while a loop is
    /// already running is a no-op.
    ///
    /// Must be called from within a tokio runtime. The loop syncs once
    /// immediately, then every `sync_interval`, until [`TimeSync::stop`].
    pub fn start(&self) {
        let mut slot = self.worker.lock().expect("sync worker lock poisoned");
        if slot.is_some() {
            debug!("Time sync loop already running");
            return;
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let sync = self.clone();
        let interval = self.sync_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = stop_rx.changed() => {
                        debug!("Time sync loop received stop signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        // full_sync reports failures itself and never panics,
                        // so one bad cycle cannot kill the loop
                        sync.full_sync().await;
                    }
                }
            }
        });

        *slot = Some(SyncWorker { stop_tx, handle });
        info!(
            interval_secs = interval.as_secs(),
            "Time sync loop started"
        );
    }

    /// Stop the periodic sync loop and wait for it to finish. Idempotent:
    /// stopping a never-started or already-stopped loop is a no-op. Safe to
    /// call from any task.
    pub async fn stop(&self) {
        let worker = self
            .worker
            .lock()
            .expect("sync worker lock poisoned")
            .take();

        let Some(SyncWorker { stop_tx, handle }) = worker else {
            return;
        };

        let _ = stop_tx.send(true);
        if let Err(e) = handle.await {
            warn!(error = %e, "Time sync loop did not shut down cleanly");
        }
        info!("Time sync loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    /// Deterministic source: reports local time shifted by a fixed amount,
    /// counting every query.
    struct ShiftedSource {
        shift_ms: i64,
        calls: AtomicU64,
    }

    impl ShiftedSource {
        fn new(shift_ms: i64) -> Self {
            ShiftedSource {
                shift_ms,
                calls: AtomicU64::new(0),
            }
        }

        fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TimeSource for Arc<ShiftedSource> {
        async fn server_time_ms(&self) -> Result<i64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(local_time_ms() + self.shift_ms)
        }
    }

    /// Source that always fails, counting every query.
    struct DeadSource {
        calls: AtomicU64,
    }

    impl DeadSource {
        fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TimeSource for Arc<DeadSource> {
        async fn server_time_ms(&self) -> Result<i64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("connection refused")
        }
    }

    #[test]
    fn test_latency_compensation() {
        // server reports 1,000,500 with a 40ms round trip: one-way delay is
        // ~20ms, so the best estimate of server "now" is 1,000,520
        assert_eq!(compensated_reference_ms(1_000_500, 40), 1_000_520);
        assert_eq!(compensated_reference_ms(1_000_500, 0), 1_000_500);
        assert_eq!(compensated_reference_ms(1_000_500, 1), 1_000_500);
    }

    #[test]
    fn test_update_offset_reflects_reference() {
        let sync = TimeSync::new(Arc::new(ShiftedSource::new(0)), DEFAULT_SYNC_INTERVAL);

        let reference = local_time_ms() + 5_000;
        sync.update_offset(reference);
        // allow a little scheduling slop around the two local_time_ms reads
        assert!((sync.offset_ms() - 5_000).abs() < 200);

        let adjusted = sync.adjusted_timestamp_ms();
        assert!((adjusted - reference).abs() < 200);
    }

    #[test]
    fn test_offset_applies_most_recent_sync() {
        let sync = TimeSync::new(Arc::new(ShiftedSource::new(0)), DEFAULT_SYNC_INTERVAL);
        let base = local_time_ms();

        sync.update_offset(base + 1_000);
        sync.update_offset(base + 3_000);
        sync.update_offset(base - 2_000);

        // the offset tracks the latest reference, moving in either direction
        assert!(sync.offset_ms() < 0);
        assert!((sync.offset_ms() + 2_000).abs() < 200);
    }

    #[tokio::test]
    async fn test_full_sync_sets_offset() {
        let source = Arc::new(ShiftedSource::new(520));
        let sync = TimeSync::new(Arc::clone(&source), DEFAULT_SYNC_INTERVAL);

        assert!(sync.full_sync().await);
        assert_eq!(source.calls(), 1);
        assert!((sync.offset_ms() - 520).abs() < 200);
        assert!(!sync.is_stale());
    }

    #[tokio::test]
    async fn test_failed_sync_keeps_previous_offset() {
        let source = Arc::new(DeadSource {
            calls: AtomicU64::new(0),
        });
        let sync = TimeSync::new(Arc::clone(&source), DEFAULT_SYNC_INTERVAL);
        sync.update_offset(local_time_ms() + 750);
        let before = sync.offset_ms();

        assert!(!sync.full_sync().await);
        assert_eq!(source.calls(), SYNC_ATTEMPTS as u64);
        // stale-but-usable: never reset to zero
        assert_eq!(sync.offset_ms(), before);
    }

    #[tokio::test]
    async fn test_force_sync_if_needed_respects_interval() {
        let source = Arc::new(ShiftedSource::new(100));
        let sync = TimeSync::new(Arc::clone(&source), Duration::from_secs(60));

        // never synced: runs
        assert!(sync.force_sync_if_needed(false).await);
        assert_eq!(source.calls(), 1);

        // fresh: no-op
        assert!(!sync.force_sync_if_needed(false).await);
        assert_eq!(source.calls(), 1);

        // forced: always runs exactly one query
        assert!(sync.force_sync_if_needed(true).await);
        assert_eq!(source.calls(), 2);
        assert!(sync.force_sync_if_needed(true).await);
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn test_stale_after_interval_elapses() {
        let source = Arc::new(ShiftedSource::new(0));
        let sync = TimeSync::new(Arc::clone(&source), Duration::from_millis(50));

        assert!(sync.full_sync().await);
        assert!(!sync.is_stale());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(sync.is_stale());
        assert!(sync.force_sync_if_needed(false).await);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_callers_coalesce() {
        let source = Arc::new(ShiftedSource::new(0));
        let sync = TimeSync::new(Arc::clone(&source), Duration::from_secs(60));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let s = sync.clone();
            handles.push(tokio::spawn(
                async move { s.force_sync_if_needed(false).await },
            ));
        }
        for h in handles {
            h.await.unwrap();
        }

        // all sixteen callers arrived while the clock was never-synced, but
        // the gate plus re-check collapses them into one network query
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_readers_never_see_torn_offset() {
        let sync = TimeSync::new(Arc::new(ShiftedSource::new(0)), DEFAULT_SYNC_INTERVAL);
        let base = local_time_ms();

        let mut readers = Vec::new();
        for _ in 0..8 {
            let s = sync.clone();
            readers.push(tokio::spawn(async move {
                for _ in 0..1_000 {
                    let off = s.offset_ms();
                    assert!(off == 0 || off.abs() > 500_000, "torn offset: {}", off);
                }
            }));
        }

        // flip between two widely separated offsets while readers spin
        for i in 0..100 {
            let shift = if i % 2 == 0 { 1_000_000 } else { -1_000_000 };
            sync.update_offset(base + shift);
            tokio::task::yield_now().await;
        }

        for r in readers {
            r.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_start_stop_idempotent() {
        let source = Arc::new(ShiftedSource::new(0));
        let sync = TimeSync::new(Arc::clone(&source), Duration::from_millis(20));

        // stopping a never-started loop is a no-op
        sync.stop().await;

        sync.start();
        sync.start(); // second start is a no-op

        tokio::time::sleep(Duration::from_millis(60)).await;
        sync.stop().await;
        sync.stop().await; // second stop is a no-op

        let calls = source.calls();
        assert!(calls >= 1, "background loop never synced");

        // loop is really stopped: no further queries
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(source.calls(), calls);
    }
}
