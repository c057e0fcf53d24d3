//! Cycle scheduler: runs the fetch → filter → process cycle on a timer.
//!
//! `start()` runs one cycle immediately, then arms a fixed-interval timer.
//! Each timer tick spawns the cycle as its own task, so `stop()` only
//! disarms the timer and never cancels a cycle that is already running.
//!
//! At most one cycle is in flight at a time. A tick that fires while a
//! cycle is still running is dropped, not queued.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use crate::error::PipelineError;
use crate::pipeline::dedup::DedupStore;
use crate::pipeline::processor::{BatchReport, MentionProcessor};
use crate::pipeline::types::{Mention, MentionSource};

/// Running and in-flight flags shared by the timer and the cycles.
#[derive(Debug, Default)]
pub struct CycleState {
    running: AtomicBool,
    in_flight: AtomicBool,
}

impl CycleState {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Claim the in-flight slot. `None` if a cycle already holds it.
    fn try_begin(&self) -> Option<InFlightGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| InFlightGuard(&self.in_flight))
    }
}

/// Releases the in-flight slot on drop, including during a panic unwind.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Snapshot of scheduler counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AgentStats {
    /// Mentions handled since start (monotonic, unaffected by eviction).
    pub processed_count: u64,
    pub running: bool,
    /// Ids currently held by the dedup store.
    pub dedup_len: usize,
    pub cycles_run: u64,
    pub ticks_skipped: u64,
}

/// What a single cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub new: usize,
    pub batch: BatchReport,
}

/// Result of one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Completed(CycleReport),
    /// Another cycle was in flight.
    Skipped,
    /// The cycle failed before processing anything; already logged.
    Failed,
}

/// Scheduler settings.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Monitored handle, without `@`.
    pub handle: String,
    pub interval: Duration,
    pub dedup_capacity: usize,
}

struct SchedulerInner {
    handle: String,
    interval: Duration,
    mentions: Arc<dyn MentionSource>,
    processor: MentionProcessor,
    dedup: Mutex<DedupStore>,
    state: CycleState,
    processed_count: AtomicU64,
    dedup_len: AtomicUsize,
    cycles_run: AtomicU64,
    ticks_skipped: AtomicU64,
}

/// Drives the polling cycle for one monitored account.
pub struct CycleScheduler {
    inner: Arc<SchedulerInner>,
    timer: StdMutex<Option<JoinHandle<()>>>,
}

impl CycleScheduler {
    pub fn new(config: SchedulerConfig, mentions: Arc<dyn MentionSource>, processor: MentionProcessor) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                handle: config.handle,
                interval: config.interval,
                mentions,
                processor,
                dedup: Mutex::new(DedupStore::new(config.dedup_capacity)),
                state: CycleState::default(),
                processed_count: AtomicU64::new(0),
                dedup_len: AtomicUsize::new(0),
                cycles_run: AtomicU64::new(0),
                ticks_skipped: AtomicU64::new(0),
            }),
            timer: StdMutex::new(None),
        }
    }

    /// Run one cycle now, then every `interval`. A no-op if already running.
    pub async fn start(&self) {
        if self.inner.state.running.swap(true, Ordering::SeqCst) {
            warn!(handle = %self.inner.handle, "Agent is already running");
            return;
        }
        info!(
            handle = %self.inner.handle,
            interval_ms = self.inner.interval.as_millis() as u64,
            "Agent started"
        );

        // A panicking first cycle surfaces as a logged JoinError, not here.
        let _ = self.inner.spawn_cycle().await;

        if !self.inner.state.is_running() {
            debug!("Stopped during the first cycle, timer not armed");
            return;
        }

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move { inner.run_timer().await });
        if let Some(previous) = self.timer_slot().replace(handle) {
            previous.abort();
        }
    }

    /// Start, wait for `shutdown`, then stop.
    ///
    /// `shutdown` is polled before the first cycle begins, so it can fire
    /// while that cycle is still running.
    pub async fn run_until<F: Future>(&self, shutdown: F) -> F::Output {
        tokio::pin!(shutdown);
        let output = tokio::select! {
            biased;
            output = &mut shutdown => output,
            _ = self.start() => shutdown.await,
        };
        self.stop();
        output
    }

    /// Disarm the timer. An in-flight cycle runs to completion.
    pub fn stop(&self) {
        let was_running = self.inner.state.running.swap(false, Ordering::SeqCst);
        if let Some(timer) = self.timer_slot().take() {
            timer.abort();
        }
        if was_running {
            info!(handle = %self.inner.handle, "Agent stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.is_running()
    }

    pub fn state(&self) -> &CycleState {
        &self.inner.state
    }

    /// Run one cycle unless another is in flight.
    pub async fn tick(&self) -> TickOutcome {
        self.inner.tick().await
    }

    pub fn stats(&self) -> AgentStats {
        let inner = &self.inner;
        AgentStats {
            processed_count: inner.processed_count.load(Ordering::SeqCst),
            running: inner.state.is_running(),
            dedup_len: inner.dedup_len.load(Ordering::SeqCst),
            cycles_run: inner.cycles_run.load(Ordering::SeqCst),
            ticks_skipped: inner.ticks_skipped.load(Ordering::SeqCst),
        }
    }

    /// Handled ids in recording order, oldest first.
    pub async fn handled_ids(&self) -> Vec<String> {
        self.inner.dedup.lock().await.iter().map(str::to_string).collect()
    }

    fn timer_slot(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.timer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for CycleScheduler {
    fn drop(&mut self) {
        if let Some(timer) = self.timer_slot().take() {
            timer.abort();
        }
    }
}

impl SchedulerInner {
    async fn run_timer(self: Arc<Self>) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            if !self.state.is_running() {
                info!("Cycle timer shutting down");
                return;
            }

            let _detached = self.spawn_cycle();
        }
    }

    /// Run a cycle on its own task and log it if it panics. The returned
    /// handle resolves once the cycle has finished either way.
    fn spawn_cycle(self: &Arc<Self>) -> JoinHandle<()> {
        let inner = Arc::clone(self);
        let cycle = tokio::spawn(async move { inner.tick().await });
        tokio::spawn(async move {
            if let Err(e) = cycle.await {
                let err = PipelineError::CycleTask(e.to_string());
                error!(error = %err, "Processing cycle aborted");
            }
        })
    }

    async fn tick(&self) -> TickOutcome {
        let Some(_guard) = self.state.try_begin() else {
            self.ticks_skipped.fetch_add(1, Ordering::SeqCst);
            trace!("Previous cycle still in flight, dropping tick");
            return TickOutcome::Skipped;
        };
        self.cycles_run.fetch_add(1, Ordering::SeqCst);

        match self.run_cycle().await {
            Ok(report) => TickOutcome::Completed(report),
            Err(e) => {
                error!(error = %e, "Error in processing cycle");
                TickOutcome::Failed
            }
        }
    }

    /// Fetch → filter → process. Caller holds the in-flight slot.
    async fn run_cycle(&self) -> Result<CycleReport, PipelineError> {
        debug!(handle = %self.handle, "Checking for new mentions");
        let mentions = self
            .mentions
            .fetch_mentions(&self.handle)
            .await
            .map_err(PipelineError::MentionFetch)?;

        let mut dedup = self.dedup.lock().await;
        let fetched = mentions.len();
        let fresh: Vec<Mention> = mentions.into_iter().filter(|m| !dedup.contains(m.id())).collect();

        let mut report = CycleReport {
            fetched,
            new: fresh.len(),
            batch: BatchReport::default(),
        };
        if fresh.is_empty() {
            debug!(fetched, "No new mentions");
            return Ok(report);
        }

        info!(count = fresh.len(), "Found new mention(s)");
        report.batch = self.processor.process_batch(fresh, &mut dedup).await;

        self.processed_count
            .fetch_add(report.batch.processed as u64, Ordering::SeqCst);
        self.dedup_len.store(dedup.len(), Ordering::SeqCst);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::error::{ChannelError, OracleError};
    use crate::pipeline::types::fixtures::{mention, post};
    use crate::pipeline::types::{ActionExecutor, AgentAction, Analysis, DecisionOracle, Post, Thread, ThreadSource};

    /// Returns a fixed batch on every call, optionally after a delay.
    struct FixedMentions {
        batch: Vec<Mention>,
        delay: Duration,
        fail: bool,
    }

    #[async_trait]
    impl MentionSource for FixedMentions {
        async fn fetch_mentions(&self, _handle: &str) -> Result<Vec<Mention>, ChannelError> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(ChannelError::UnknownAccount { handle: "mybot".into() });
            }
            Ok(self.batch.clone())
        }
    }

    struct RootOnly;

    #[async_trait]
    impl ThreadSource for RootOnly {
        async fn fetch_thread(&self, conversation_id: &str) -> Result<Option<Thread>, ChannelError> {
            Ok(Thread::from_posts(vec![post(conversation_id, "root", 0)]))
        }
    }

    struct AlwaysAnalyze;

    #[async_trait]
    impl DecisionOracle for AlwaysAnalyze {
        async fn decide(&self, _text: &str, _thread: &Thread, target: &str) -> Result<Analysis, OracleError> {
            Ok(Analysis::new(AgentAction::analyze(target, None), 0.7, "ok"))
        }
    }

    struct Inert;

    #[async_trait]
    impl ActionExecutor for Inert {
        async fn post_reply(&self, _target: &str, _text: &str) -> bool {
            true
        }

        async fn search(&self, _query: &str) -> Vec<Post> {
            vec![]
        }
    }

    fn scheduler(source: FixedMentions) -> CycleScheduler {
        let processor = MentionProcessor::new(Arc::new(RootOnly), Arc::new(AlwaysAnalyze), Arc::new(Inert));
        CycleScheduler::new(
            SchedulerConfig {
                handle: "mybot".into(),
                interval: Duration::from_millis(100),
                dedup_capacity: 1000,
            },
            Arc::new(source),
            processor,
        )
    }

    fn batch(ids: &[&str]) -> Vec<Mention> {
        ids.iter().enumerate().map(|(i, id)| mention(id, "hi", i as u32)).collect()
    }

    // ── Overlap guard ───────────────────────────────────────────────

    #[test]
    fn guard_releases_slot_on_drop() {
        let state = CycleState::default();
        {
            let _guard = state.try_begin().unwrap();
            assert!(state.is_in_flight());
            assert!(state.try_begin().is_none());
        }
        assert!(!state.is_in_flight());
        assert!(state.try_begin().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_ticks_run_one_cycle() {
        let s = scheduler(FixedMentions {
            batch: batch(&["a"]),
            delay: Duration::from_millis(500),
            fail: false,
        });

        let (first, second) = tokio::join!(s.tick(), s.tick());
        assert!(matches!(first, TickOutcome::Completed(_)));
        assert_eq!(second, TickOutcome::Skipped);

        let stats = s.stats();
        assert_eq!(stats.cycles_run, 1);
        assert_eq!(stats.ticks_skipped, 1);
        assert!(!s.state().is_in_flight());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_fetch_releases_in_flight() {
        let s = scheduler(FixedMentions {
            batch: vec![],
            delay: Duration::from_millis(50),
            fail: true,
        });

        assert_eq!(s.tick().await, TickOutcome::Failed);
        assert!(!s.state().is_in_flight());
        assert!(matches!(s.tick().await, TickOutcome::Failed));
        assert_eq!(s.stats().cycles_run, 2);
    }

    // ── Cycle ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn second_cycle_filters_handled_ids() {
        let s = scheduler(FixedMentions {
            batch: batch(&["c", "b", "a"]),
            delay: Duration::ZERO,
            fail: false,
        });

        match s.tick().await {
            TickOutcome::Completed(report) => {
                assert_eq!(report.fetched, 3);
                assert_eq!(report.new, 3);
                assert_eq!(report.batch.processed, 3);
            }
            other => panic!("Expected Completed, got {:?}", other),
        }
        match s.tick().await {
            TickOutcome::Completed(report) => {
                assert_eq!(report.fetched, 3);
                assert_eq!(report.new, 0);
            }
            other => panic!("Expected Completed, got {:?}", other),
        }

        assert_eq!(s.handled_ids().await, ["a", "b", "c"]);
        let stats = s.stats();
        assert_eq!(stats.processed_count, 3);
        assert_eq!(stats.dedup_len, 3);
    }

    #[tokio::test]
    async fn processed_count_survives_eviction() {
        let processor = MentionProcessor::new(Arc::new(RootOnly), Arc::new(AlwaysAnalyze), Arc::new(Inert));
        let s = CycleScheduler::new(
            SchedulerConfig {
                handle: "mybot".into(),
                interval: Duration::from_secs(30),
                dedup_capacity: 2,
            },
            Arc::new(FixedMentions {
                batch: batch(&["c", "b", "a"]),
                delay: Duration::ZERO,
                fail: false,
            }),
            processor,
        );

        s.tick().await;
        let stats = s.stats();
        assert_eq!(stats.processed_count, 3);
        assert_eq!(stats.dedup_len, 2);
        assert_eq!(s.handled_ids().await, ["b", "c"]);
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn start_runs_immediately_and_stop_disarms() {
        let s = scheduler(FixedMentions {
            batch: vec![],
            delay: Duration::ZERO,
            fail: false,
        });
        assert!(!s.is_running());

        s.start().await;
        assert!(s.is_running());
        assert_eq!(s.stats().cycles_run, 1);

        tokio::time::sleep(Duration::from_millis(250)).await;
        let after_timer = s.stats().cycles_run;
        assert!(after_timer >= 3, "expected timer cycles, got {after_timer}");

        s.stop();
        assert!(!s.is_running());
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(s.stats().cycles_run, after_timer);
    }

    struct PanickingMentions;

    #[async_trait]
    impl MentionSource for PanickingMentions {
        async fn fetch_mentions(&self, _handle: &str) -> Result<Vec<Mention>, ChannelError> {
            panic!("mention source blew up")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_first_cycle_stays_inside_start() {
        let processor = MentionProcessor::new(Arc::new(RootOnly), Arc::new(AlwaysAnalyze), Arc::new(Inert));
        let s = CycleScheduler::new(
            SchedulerConfig {
                handle: "mybot".into(),
                interval: Duration::from_millis(100),
                dedup_capacity: 1000,
            },
            Arc::new(PanickingMentions),
            processor,
        );

        s.start().await;
        assert!(s.is_running());
        assert!(!s.state().is_in_flight());
        assert_eq!(s.stats().cycles_run, 1);

        // The timer was still armed and keeps cycling.
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(s.stats().cycles_run >= 3);
        s.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn run_until_stops_during_slow_first_cycle() {
        let s = scheduler(FixedMentions {
            batch: batch(&["a"]),
            delay: Duration::from_secs(5),
            fail: false,
        });

        let began = Instant::now();
        let signal = s
            .run_until(async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                "sigterm"
            })
            .await;

        assert_eq!(signal, "sigterm");
        assert!(began.elapsed() < Duration::from_secs(1));
        assert!(!s.is_running());
        assert!(s.state().is_in_flight());

        // The interrupted first cycle still completes and no timer cycles follow.
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(!s.state().is_in_flight());
        assert_eq!(s.handled_ids().await, ["a"]);
        assert_eq!(s.stats().cycles_run, 1);
        assert_eq!(s.stats().processed_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_a_noop() {
        let s = scheduler(FixedMentions {
            batch: vec![],
            delay: Duration::ZERO,
            fail: false,
        });
        s.start().await;
        s.start().await;
        assert_eq!(s.stats().cycles_run, 1);
        s.stop();
        s.stop();
        assert!(!s.stats().running);
    }
}
