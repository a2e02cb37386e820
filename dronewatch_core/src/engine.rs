//! Telemetry Engine - runs the track store behind an async ingest loop.
//!
//! The engine owns the only `TrackStore` and a `Coalescer`. Producers talk to
//! it through a cloneable `EngineHandle`; consumers read published snapshots.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  submit()   ┌───────────────────────────────────────┐
//! │ FeedTransport│ ──────────► │            ingest loop                │
//! │  (pump_feed) │   mpsc      │  select! {                            │
//! └──────────────┘             │    shutdown,                          │
//!                              │    inbox.recv() -> coalescer.push,    │
//!                              │    ctx.sleep(deadline) -> apply_batch │
//!                              │  }                                    │
//!                              └──────────────────┬────────────────────┘
//!                                                 │ watch
//!                                     ┌───────────▼───────────┐
//!                                     │ Arc<FleetSnapshot>    │
//!                                     │ (render, list, count) │
//!                                     └───────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use dronewatch_core::engine::TelemetryEngine;
//! use dronewatch_env::TokioContext;
//!
//! let engine = TelemetryEngine::spawn(TokioContext::shared(), config)?;
//! engine.enable_ingest();
//! engine.submit(batch).await?;
//! let snapshot = engine.snapshot();
//! ```

use crate::batcher::Coalescer;
use crate::config::TrackerConfig;
use crate::error::TrackingError;
use crate::metrics::{FleetCounters, IngestStats};
use crate::store::{FleetSnapshot, IngestGate, TrackStore};
use crate::telemetry::UpdateBatch;
use dronewatch_env::{FeedEnvelope, FeedTransport, TrackerContext};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify};
use tracing::{info, warn};

/// Messages accepted by the ingest loop.
#[derive(Debug)]
enum Inbound {
    Batch(UpdateBatch),
    Envelope(FeedEnvelope),
    /// Merge whatever is buffered and stop; queued after earlier submissions
    Drain,
}

/// What woke the loop.
enum Event {
    Inbound(Inbound),
    Deadline,
    Drain,
    Stop,
}

/// The ingest loop. Created and started by `TelemetryEngine::spawn`.
pub struct TelemetryEngine<Ctx: TrackerContext> {
    /// Environment context (clock, sleep, spawn)
    context: Arc<Ctx>,

    /// Sole owner of the tracks
    store: TrackStore,

    /// Fixed-window batching
    coalescer: Coalescer,

    inbox: mpsc::Receiver<Inbound>,
    shutdown: Arc<Notify>,

    stats: IngestStats,
    stats_tx: watch::Sender<IngestStats>,
}

impl<Ctx: TrackerContext> TelemetryEngine<Ctx> {
    /// Build the store and start the ingest loop on `context`.
    pub fn spawn(context: Arc<Ctx>, config: TrackerConfig) -> Result<EngineHandle, TrackingError> {
        let coalescer = Coalescer::new(config.flush_window());
        let depth = config.submit_queue_depth.max(1);
        let store = TrackStore::new(config)?;

        let (tx, inbox) = mpsc::channel(depth);
        let (stats_tx, stats_rx) = watch::channel(IngestStats::default());
        let shutdown = Arc::new(Notify::new());

        let handle = EngineHandle {
            tx,
            shutdown: Arc::clone(&shutdown),
            gate: store.gate(),
            snapshots: store.subscribe(),
            stats: stats_rx,
        };

        let engine = Self {
            context: Arc::clone(&context),
            store,
            coalescer,
            inbox,
            shutdown,
            stats: IngestStats::default(),
            stats_tx,
        };
        context.spawn("telemetry-engine", engine.run());

        Ok(handle)
    }

    async fn run(mut self) {
        info!(
            window_ms = self.coalescer.window().as_millis() as u64,
            ingest_enabled = self.store.gate().is_enabled(),
            "telemetry engine started"
        );

        loop {
            // A busy inbox must not starve the window
            if self.coalescer.is_due(self.context.now()) {
                self.flush();
                self.stats_tx.send_replace(self.stats);
            }
            let wait = self.coalescer.remaining(self.context.now());

            let event = tokio::select! {
                biased;
                _ = self.shutdown.notified() => Event::Stop,
                _ = wait_for(self.context.as_ref(), wait) => Event::Deadline,
                msg = self.inbox.recv() => match msg {
                    Some(Inbound::Drain) => Event::Drain,
                    Some(msg) => Event::Inbound(msg),
                    None => Event::Stop,
                },
            };

            match event {
                Event::Inbound(msg) => self.accept(msg),
                Event::Deadline => {
                    if self.coalescer.is_due(self.context.now()) {
                        self.flush();
                    }
                }
                Event::Drain => {
                    self.flush();
                    break;
                }
                Event::Stop => break,
            }
            self.stats_tx.send_replace(self.stats);
        }

        let discarded = self.coalescer.cancel();
        if discarded > 0 {
            warn!(discarded, "shutdown discarded buffered updates");
        }
        self.stats.discarded_on_shutdown += discarded as u64;
        self.stats_tx.send_replace(self.stats);

        info!(
            flushes = self.stats.flushes,
            version = self.store.snapshot().version(),
            "telemetry engine stopped"
        );
    }

    fn accept(&mut self, msg: Inbound) {
        let batch = match msg {
            Inbound::Batch(batch) => batch,
            Inbound::Drain => return,
            Inbound::Envelope(envelope) => match UpdateBatch::decode(&envelope) {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(bytes = envelope.size(), error = %e, "rejected feed envelope");
                    self.stats.envelopes_rejected += 1;
                    return;
                }
            },
        };

        self.stats.batches_received += 1;
        self.coalescer.push(batch, self.context.now());
    }

    fn flush(&mut self) {
        if let Some(updates) = self.coalescer.take() {
            let report = self.store.apply_batch(&updates, self.context.unix_millis());
            self.stats.record(&report);
        }
    }
}

/// Sleep until the deadline, or forever when none is armed.
async fn wait_for<Ctx: TrackerContext>(context: &Ctx, wait: Option<Duration>) {
    match wait {
        Some(duration) => context.sleep(duration).await,
        None => std::future::pending::<()>().await,
    }
}

// ============================================================================
// HANDLE
// ============================================================================

/// Cloneable access to a running engine.
///
/// The loop stops on `shutdown()` or once every handle has been dropped.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Inbound>,
    shutdown: Arc<Notify>,
    gate: IngestGate,
    snapshots: watch::Receiver<Arc<FleetSnapshot>>,
    stats: watch::Receiver<IngestStats>,
}

impl EngineHandle {
    /// Queue a decoded batch for the next window.
    pub async fn submit(&self, batch: UpdateBatch) -> Result<(), TrackingError> {
        self.send(Inbound::Batch(batch)).await
    }

    /// Queue a raw envelope. Undecodable payloads are logged and counted by the loop.
    pub async fn submit_envelope(&self, envelope: FeedEnvelope) -> Result<(), TrackingError> {
        self.send(Inbound::Envelope(envelope)).await
    }

    async fn send(&self, msg: Inbound) -> Result<(), TrackingError> {
        self.tx.send(msg).await.map_err(|_| TrackingError::EngineClosed)
    }

    pub fn enable_ingest(&self) {
        self.gate.enable();
    }

    pub fn disable_ingest(&self) {
        self.gate.disable();
    }

    pub fn is_ingest_enabled(&self) -> bool {
        self.gate.is_enabled()
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<FleetSnapshot> {
        Arc::clone(&self.snapshots.borrow())
    }

    /// Receiver notified on every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<FleetSnapshot>> {
        self.snapshots.clone()
    }

    pub fn counters(&self) -> FleetCounters {
        self.snapshot().counters()
    }

    pub fn stats(&self) -> IngestStats {
        *self.stats.borrow()
    }

    /// Ask the loop to stop. Buffered, unflushed updates are discarded.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Stop after everything submitted so far has been merged.
    ///
    /// The marker is queued behind earlier submissions, so nothing already
    /// accepted by `submit` is lost; the final merge runs without waiting for
    /// the window to close. Resolves once the loop has exited.
    pub async fn drain(&self) -> Result<(), TrackingError> {
        self.send(Inbound::Drain).await?;
        self.closed().await;
        Ok(())
    }

    /// Resolves once the loop has exited.
    pub async fn closed(&self) {
        let mut stats = self.stats.clone();
        while stats.changed().await.is_ok() {}
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Forward every envelope from `transport` into the engine until the feed closes.
///
/// Returns the number of envelopes forwarded.
pub async fn pump_feed<T>(handle: &EngineHandle, transport: &T) -> Result<u64, TrackingError>
where
    T: FeedTransport + ?Sized,
{
    let source = transport.source_name();
    info!(source = %source, "feed attached");

    let mut forwarded = 0u64;
    while let Some(envelope) = transport.recv().await {
        handle.submit_envelope(envelope).await?;
        forwarded += 1;
    }

    info!(source = %source, forwarded, "feed closed");
    Ok(forwarded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::DroneUpdate;
    use async_trait::async_trait;
    use dronewatch_env::TokioContext;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;
    use std::time::SystemTime;

    fn enabled() -> TrackerConfig {
        TrackerConfig {
            ingest_enabled_at_start: true,
            ..TrackerConfig::default()
        }
    }

    fn batch(ids: &[&str]) -> UpdateBatch {
        ids.iter()
            .enumerate()
            .map(|(i, id)| DroneUpdate::at(i as f64, 2.0).with_property("registration", *id))
            .collect::<Vec<_>>()
            .into()
    }

    struct VecFeed(Mutex<Vec<FeedEnvelope>>);

    #[async_trait]
    impl FeedTransport for VecFeed {
        async fn recv(&self) -> Option<FeedEnvelope> {
            let mut queue = self.0.lock().unwrap();
            if queue.is_empty() {
                None
            } else {
                Some(queue.remove(0))
            }
        }

        fn source_name(&self) -> String {
            "vec".to_string()
        }
    }

    /// Clock that moves 10 ms on every read and never wakes a sleeper, so
    /// only the loop's own deadline check can close a window.
    struct SteppingClock(AtomicU64);

    #[async_trait]
    impl TrackerContext for SteppingClock {
        fn now(&self) -> Duration {
            Duration::from_millis(self.0.fetch_add(10, Ordering::SeqCst))
        }

        fn system_time(&self) -> SystemTime {
            SystemTime::UNIX_EPOCH + self.now()
        }

        async fn sleep(&self, _duration: Duration) {
            std::future::pending::<()>().await
        }

        fn spawn<F>(&self, _name: &str, future: F)
        where
            F: std::future::Future<Output = ()> + Send + 'static,
        {
            tokio::spawn(future);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sub_batches_coalesce_into_one_flush() {
        let engine = TelemetryEngine::spawn(TokioContext::shared(), enabled()).unwrap();
        let mut rx = engine.subscribe();

        for pair in [["a0", "a1"], ["a2", "a3"], ["a4", "a5"], ["a6", "a7"], ["a8", "a9"]] {
            engine.submit(batch(&pair)).await.unwrap();
        }

        rx.changed().await.unwrap();
        let snap = rx.borrow_and_update().clone();
        assert_eq!(snap.version(), 1);
        assert_eq!(snap.len(), 10);

        tokio::time::sleep(Duration::from_millis(500)).await;
        let stats = engine.stats();
        assert_eq!(stats.flushes, 1);
        assert_eq!(stats.batches_received, 5);
        assert_eq!(stats.updates_applied, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_windows_are_separate() {
        let engine = TelemetryEngine::spawn(TokioContext::shared(), enabled()).unwrap();

        engine.submit(batch(&["a"])).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        engine.submit(batch(&["b"])).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(engine.snapshot().version(), 2);
        assert_eq!(engine.stats().flushes, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_starts_disabled() {
        let engine = TelemetryEngine::spawn(TokioContext::shared(), TrackerConfig::default()).unwrap();
        assert!(!engine.is_ingest_enabled());

        engine.submit(batch(&["a"])).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(engine.snapshot().is_empty());
        assert_eq!(engine.stats().gated_flushes, 1);

        engine.enable_ingest();
        engine.submit(batch(&["a"])).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(engine.counters().total, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_discards_pending() {
        let engine = TelemetryEngine::spawn(TokioContext::shared(), enabled()).unwrap();

        engine.submit(batch(&["a", "b", "c"])).await.unwrap();
        tokio::task::yield_now().await;
        engine.shutdown();
        engine.closed().await;

        assert!(engine.snapshot().is_empty());
        assert_eq!(engine.stats().discarded_on_shutdown, 3);
        assert!(matches!(
            engine.submit(batch(&["d"])).await,
            Err(TrackingError::EngineClosed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pump_feed_counts_rejected_envelopes() {
        let engine = TelemetryEngine::spawn(TokioContext::shared(), enabled()).unwrap();
        let feed = VecFeed(Mutex::new(vec![
            batch(&["x"]).to_envelope(1).unwrap(),
            FeedEnvelope::from_text("not json", 2),
            batch(&["y"]).to_envelope(3).unwrap(),
        ]));

        let forwarded = pump_feed(&engine, &feed).await.unwrap();
        assert_eq!(forwarded, 3);

        tokio::time::sleep(Duration::from_millis(200)).await;
        let stats = engine.stats();
        assert_eq!(stats.envelopes_rejected, 1);
        assert_eq!(stats.batches_received, 2);
        assert_eq!(engine.snapshot().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sustained_submits_merge_every_window() {
        let engine = TelemetryEngine::spawn(TokioContext::shared(), enabled()).unwrap();

        // one batch every 20 ms for 500 ms: 6 full windows elapse
        for i in 0..25 {
            engine.submit(batch(&[&format!("d{}", i)])).await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let flushes = engine.stats().flushes;
        assert!((5..=6).contains(&flushes), "flushes = {}", flushes);
        assert_eq!(engine.snapshot().version(), flushes);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(engine.stats().batches_received, 25);
        assert_eq!(engine.snapshot().len(), 25);
    }

    #[tokio::test]
    async fn test_backlogged_inbox_still_closes_windows() {
        let clock = Arc::new(SteppingClock(AtomicU64::new(0)));
        let config = TrackerConfig {
            submit_queue_depth: 64,
            ..enabled()
        };
        let engine = TelemetryEngine::spawn(clock, config).unwrap();

        // queued before the loop first runs, so the inbox never empties
        for i in 0..40 {
            engine.submit(batch(&[&format!("d{}", i)])).await.unwrap();
        }
        engine.drain().await.unwrap();

        let stats = engine.stats();
        assert_eq!(stats.batches_received, 40);
        assert!(stats.flushes >= 5, "flushes = {}", stats.flushes);
        assert_eq!(stats.discarded_on_shutdown, 0);
        assert_eq!(engine.snapshot().len(), 40);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_merges_pending_without_waiting() {
        let engine = TelemetryEngine::spawn(TokioContext::shared(), enabled()).unwrap();
        let start = tokio::time::Instant::now();

        engine.submit(batch(&["a", "b"])).await.unwrap();
        engine.submit(batch(&["c"])).await.unwrap();
        engine.drain().await.unwrap();

        assert!(start.elapsed() < Duration::from_millis(80));
        assert_eq!(engine.snapshot().len(), 3);
        assert_eq!(engine.stats().flushes, 1);
        assert_eq!(engine.stats().discarded_on_shutdown, 0);
        assert!(engine.is_closed());
        assert!(matches!(engine.drain().await, Err(TrackingError::EngineClosed)));
    }
}
