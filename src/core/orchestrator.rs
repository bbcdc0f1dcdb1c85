//! Run lifecycle: warm-up, collection, drain and finalization.
//!
//! ```text
//! Idle → WarmingUp → Collecting → Draining → Finalizing → Done
//! ```
//!
//! The orchestrator only ever blocks on wall-clock-bounded waits. A producer
//! that misses its grace window is detached: its thread keeps running, its
//! eventual result is discarded and a fallback result takes its place.

use crate::audit::{EventRecord, Phase, Severity, SharedAuditLog};
use crate::capture::{CancelToken, CaptureResult, CollectionWindow, ProducerId, StubReason};
use crate::config::Config;
use crate::core::aggregator::{self, ReportBundle, RunContext};
use crate::devices::Devices;
use crate::error::{AggregationError, DeviceError};
use crate::producers::{fallback, Producer, ProducerContext, ProducerSet, Salvage};
use crossbeam_channel::{bounded, unbounded, Sender};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Producer name used for the orchestrator's own audit records.
pub const ORCHESTRATOR: &str = "orchestrator";

/// Countdown granularity.
const TICK: Duration = Duration::from_millis(50);

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    WarmingUp,
    Collecting,
    Draining,
    Finalizing,
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "Idle",
            RunState::WarmingUp => "WarmingUp",
            RunState::Collecting => "Collecting",
            RunState::Draining => "Draining",
            RunState::Finalizing => "Finalizing",
            RunState::Done => "Done",
        };
        f.write_str(name)
    }
}

/// Read-only view of a run's state, usable from other threads.
#[derive(Debug, Clone)]
pub struct StateHandle(Arc<Mutex<RunState>>);

impl StateHandle {
    pub fn get(&self) -> RunState {
        *self.0.lock()
    }
}

/// Everything collected before aggregation.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub window: CollectionWindow,
    /// Exactly one result per producer
    pub results: BTreeMap<ProducerId, CaptureResult>,
    /// Measured from window open to the end of the drain
    pub elapsed: Duration,
    /// Producers abandoned after their grace window
    pub detached: Vec<ProducerId>,
    /// Collection ended by external cancellation rather than the deadline
    pub interrupted: bool,
}

/// A run that reached Done.
#[derive(Debug)]
pub struct FinishedRun {
    pub run_id: Uuid,
    pub outcome: RunOutcome,
    pub events: Vec<EventRecord>,
    pub bundle: ReportBundle,
    pub written: Vec<PathBuf>,
}

/// Drives one collection run over a device set.
pub struct Orchestrator {
    config: Config,
    devices: Devices,
    audit: SharedAuditLog,
    interrupt: CancelToken,
    state: StateHandle,
}

impl Orchestrator {
    pub fn new(config: Config, devices: Devices, audit: SharedAuditLog) -> Self {
        Self {
            config,
            devices,
            audit,
            interrupt: CancelToken::new(),
            state: StateHandle(Arc::new(Mutex::new(RunState::Idle))),
        }
    }

    /// Token that ends the collecting phase early when cancelled.
    pub fn interrupt_token(&self) -> CancelToken {
        self.interrupt.clone()
    }

    pub fn state(&self) -> RunState {
        self.state.get()
    }

    /// Handle for observing the state while `run` owns the orchestrator.
    pub fn state_handle(&self) -> StateHandle {
        self.state.clone()
    }

    pub fn audit(&self) -> &SharedAuditLog {
        &self.audit
    }

    /// Run a full cycle and write the bundle to the configured output directory.
    pub fn run(mut self) -> Result<FinishedRun, AggregationError> {
        let producers = ProducerSet::from_devices(&self.devices, &self.config);
        let outcome = self.collect(producers);
        self.finalize(outcome)
    }

    fn transition(&mut self, next: RunState, detail: impl AsRef<str>) {
        let from = std::mem::replace(&mut *self.state.0.lock(), next);
        let phase = if next == RunState::Done {
            Phase::Complete
        } else {
            Phase::Start
        };
        self.audit.record(
            ORCHESTRATOR,
            phase,
            format!("{from} -> {next}: {}", detail.as_ref()),
        );
    }

    fn collect(&mut self, producers: ProducerSet) -> RunOutcome {
        let window = CollectionWindow::open(self.config.window_duration);
        let stop = CancelToken::new();
        let ctx = ProducerContext {
            window,
            cancel: stop.clone(),
            audit: self.audit.clone(),
        };
        self.transition(
            RunState::WarmingUp,
            format!("collection window of {:?} opened", window.duration()),
        );

        let ProducerSet {
            image,
            continuous,
            screenshot,
            windows,
        } = producers;
        let mut results = BTreeMap::new();
        let mut detached = Vec::new();

        // Warm-up: the camera gets a short grace so a stalled device cannot
        // eat the whole window.
        let grace = self.config.warmup_grace;
        for (id, result) in run_time_boxed(vec![image], &ctx, grace) {
            let result = result.unwrap_or_else(|| {
                self.audit.record(
                    id.name(),
                    Phase::Stub,
                    format!("warm-up exceeded {grace:?}, task detached"),
                );
                detached.push(id);
                fallback(id, StubReason::Timeout, grace, &window, &self.config)
            });
            results.insert(id, result);
        }

        self.transition(RunState::Collecting, "starting continuous producers");
        // Warm-up does not eat into continuous capture: the countdown
        // starts here, while reported elapsed time still runs from open.
        let collect_deadline = Instant::now() + window.duration();
        let (tx, rx) = unbounded();
        let mut running: Vec<(ProducerId, JoinHandle<()>)> = Vec::new();
        let mut buffers: BTreeMap<ProducerId, Arc<dyn Salvage>> = BTreeMap::new();
        for producer in continuous {
            let id = producer.id();
            if let Some(buffer) = producer.handoff() {
                buffers.insert(id, buffer);
            }
            match spawn_producer(producer, ctx.clone(), tx.clone()) {
                Ok(handle) => running.push((id, handle)),
                Err(e) => {
                    self.audit
                        .record(id.name(), Phase::Error, format!("could not start thread: {e}"));
                    results.insert(
                        id,
                        fallback(id, StubReason::NoDevice, Duration::ZERO, &window, &self.config),
                    );
                }
            }
        }
        drop(tx);

        let interrupted = self.countdown(collect_deadline);

        self.transition(
            RunState::Draining,
            if interrupted {
                "collection interrupted"
            } else {
                "collection window elapsed"
            },
        );

        // The screenshot must show the end-of-window state, so it runs
        // before the continuous producers are told to stop. Each one-shot
        // gets its own grace, screenshot first.
        let grace = self.config.screen_grace;
        for producer in [screenshot, windows] {
            for (id, result) in run_time_boxed(vec![producer], &ctx, grace) {
                let result = result.unwrap_or_else(|| {
                    self.audit.record(
                        id.name(),
                        Phase::Error,
                        format!("no result within {grace:?}, task detached"),
                    );
                    detached.push(id);
                    fallback(id, StubReason::Timeout, grace, &window, &self.config)
                });
                results.insert(id, result);
            }
        }

        stop.cancel();
        self.audit.record(
            ORCHESTRATOR,
            Phase::Complete,
            "stop signal sent to continuous producers",
        );

        let mut pending: BTreeSet<ProducerId> = running.iter().map(|(id, _)| *id).collect();
        let deadline = Instant::now() + self.config.drain_grace;
        while !pending.is_empty() {
            match rx.recv_deadline(deadline) {
                Ok((id, result)) => {
                    if pending.remove(&id) {
                        results.insert(id, result);
                    }
                }
                Err(_) => break,
            }
        }

        for (id, handle) in running {
            if pending.contains(&id) {
                // Detached: the thread is left to finish on its own.
                drop(handle);
            } else if handle.join().is_err() {
                self.audit
                    .note(id.name(), Severity::Error, "producer thread ended abnormally");
            }
        }

        let drain_grace = self.config.drain_grace;
        for id in pending {
            detached.push(id);
            let salvaged = buffers.get(&id).and_then(|buffer| buffer.salvage());
            let result = match salvaged {
                Some(payload) => {
                    self.audit.record(
                        id.name(),
                        Phase::Warning,
                        format!("did not stop within {drain_grace:?}, keeping data buffered so far"),
                    );
                    CaptureResult::success(payload).with_attr("detached", true)
                }
                None => {
                    self.audit.record(
                        id.name(),
                        Phase::Stub,
                        format!("did not stop within {drain_grace:?}, substituting stub"),
                    );
                    fallback(id, StubReason::Detached, drain_grace, &window, &self.config)
                }
            };
            results.insert(id, result);
        }

        let elapsed = window.elapsed();
        self.transition(
            RunState::Finalizing,
            format!(
                "{} results resolved after {:.2}s",
                results.len(),
                elapsed.as_secs_f64()
            ),
        );
        for id in &detached {
            self.audit.record(
                id.name(),
                Phase::Warning,
                "producer was detached; any late result is discarded",
            );
        }

        RunOutcome {
            window,
            results,
            elapsed,
            detached,
            interrupted,
        }
    }

    /// Wait until `deadline` or an external interrupt.
    ///
    /// Returns true when interrupted.
    fn countdown(&self, deadline: Instant) -> bool {
        let mut announced = None;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            if self.interrupt.is_cancelled() {
                self.audit
                    .record(ORCHESTRATOR, Phase::Warning, "external cancellation received");
                return true;
            }
            let secs = remaining.as_secs_f64().ceil() as u64;
            if announced != Some(secs) {
                announced = Some(secs);
                self.audit
                    .note(ORCHESTRATOR, Severity::Info, format!("{secs} seconds remaining"));
            }
            thread::sleep(remaining.min(TICK));
        }
    }

    fn finalize(mut self, outcome: RunOutcome) -> Result<FinishedRun, AggregationError> {
        let run_id = Uuid::new_v4();
        let events: Vec<EventRecord> = self.audit.snapshot().collect();
        let context = RunContext {
            run_id,
            started_at: outcome.window.started_at(),
            generated_at: chrono::Utc::now(),
            configured: outcome.window.duration(),
            output_dir: self.config.output_dir.clone(),
            screen_size: self.devices.screen.size(),
            hostname: hostname::get().ok().map(|h| h.to_string_lossy().into_owned()),
            interrupted: outcome.interrupted,
            detached: outcome.detached.clone(),
        };

        let written = aggregator::build(&outcome.results, &events, outcome.elapsed, &context)
            .and_then(|bundle| {
                let written = bundle.write_to(&self.config.output_dir)?;
                Ok((bundle, written))
            });

        let (bundle, written) = match written {
            Ok(done) => done,
            Err(e) => {
                self.audit
                    .record(ORCHESTRATOR, Phase::Error, format!("aggregation failed: {e}"));
                self.transition(RunState::Done, "run aborted");
                self.audit.flush();
                return Err(e);
            }
        };

        self.audit.record(
            ORCHESTRATOR,
            Phase::Success,
            format!(
                "{} artifacts written to {}",
                written.len(),
                self.config.output_dir.display()
            ),
        );
        self.transition(RunState::Done, "resources released");
        self.audit.flush();

        Ok(FinishedRun {
            run_id,
            outcome,
            events,
            bundle,
            written,
        })
    }
}

/// Start `producer` on its own thread; its result goes to `tx`.
fn spawn_producer(
    mut producer: Box<dyn Producer>,
    ctx: ProducerContext,
    tx: Sender<(ProducerId, CaptureResult)>,
) -> std::io::Result<JoinHandle<()>> {
    let id = producer.id();
    thread::Builder::new()
        .name(format!("producer-{id}"))
        .spawn(move || {
            let result = guarded_acquire(producer.as_mut(), &ctx);
            // Fails only when the producer was detached; the result is dropped.
            let _ = tx.send((id, result));
        })
}

/// Run a producer, turning a panic into a Failed result.
fn guarded_acquire(producer: &mut dyn Producer, ctx: &ProducerContext) -> CaptureResult {
    let id = producer.id();
    match panic::catch_unwind(AssertUnwindSafe(|| producer.acquire(ctx))) {
        Ok(result) => result,
        Err(_) => {
            ctx.audit.record(id.name(), Phase::Error, "producer panicked");
            CaptureResult::failed(
                DeviceError::ReadFailure("producer panicked".into()),
                "the producer thread panicked before returning a result",
            )
        }
    }
}

/// Run one-shot producers concurrently under a shared deadline.
///
/// `None` marks a producer that missed the deadline and was detached. The
/// batch runs under its own cancel token, raised on return so an abandoned
/// producer can release its device early.
fn run_time_boxed(
    producers: Vec<Box<dyn Producer>>,
    ctx: &ProducerContext,
    grace: Duration,
) -> Vec<(ProducerId, Option<CaptureResult>)> {
    let abandon = CancelToken::new();
    let ctx = ProducerContext {
        cancel: abandon.clone(),
        ..ctx.clone()
    };
    let (tx, rx) = bounded(producers.len());
    let mut order = Vec::with_capacity(producers.len());
    let mut delivered = BTreeMap::new();

    for producer in producers {
        let id = producer.id();
        order.push(id);
        if let Err(e) = spawn_producer(producer, ctx.clone(), tx.clone()) {
            ctx.audit
                .record(id.name(), Phase::Error, format!("could not start thread: {e}"));
            delivered.insert(
                id,
                CaptureResult::failed(DeviceError::Unavailable(id.name().into()), e.to_string()),
            );
        }
    }
    drop(tx);

    let deadline = Instant::now() + grace;
    while delivered.len() < order.len() {
        match rx.recv_deadline(deadline) {
            Ok((id, result)) => {
                delivered.insert(id, result);
            }
            Err(_) => break,
        }
    }

    abandon.cancel();
    order
        .into_iter()
        .map(|id| (id, delivered.remove(&id)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{create_shared_log, NullSink};
    use crate::capture::Outcome;
    use crate::producers::{Mode, ProducerContext};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Slow(ProducerId, Duration);

    impl Producer for Slow {
        fn id(&self) -> ProducerId {
            self.0
        }

        fn mode(&self) -> Mode {
            Mode::OneShot
        }

        fn acquire(&mut self, _ctx: &ProducerContext) -> CaptureResult {
            thread::sleep(self.1);
            CaptureResult::success(crate::capture::Payload::Keys(Vec::new()))
        }
    }

    struct Panicking;

    impl Producer for Panicking {
        fn id(&self) -> ProducerId {
            ProducerId::Windows
        }

        fn mode(&self) -> Mode {
            Mode::OneShot
        }

        fn acquire(&mut self, _ctx: &ProducerContext) -> CaptureResult {
            panic!("driver crashed");
        }
    }

    fn ctx() -> ProducerContext {
        ProducerContext {
            window: CollectionWindow::open(Duration::from_secs(1)),
            cancel: CancelToken::new(),
            audit: create_shared_log(Box::new(NullSink)),
        }
    }

    #[test]
    fn test_time_box_detaches_slow_producer() {
        let started = Instant::now();
        let results = run_time_boxed(
            vec![
                Box::new(Slow(ProducerId::Screenshot, Duration::from_millis(5))),
                Box::new(Slow(ProducerId::Windows, Duration::from_secs(3))),
            ],
            &ctx(),
            Duration::from_millis(200),
        );

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(results[0].0, ProducerId::Screenshot);
        assert!(results[0].1.is_some());
        assert_eq!(results[1].0, ProducerId::Windows);
        assert!(results[1].1.is_none());
    }

    #[test]
    fn test_panicking_producer_becomes_failed() {
        let ctx = ctx();
        let results = run_time_boxed(vec![Box::new(Panicking)], &ctx, Duration::from_secs(2));
        let result = results[0].1.as_ref().expect("panic should still deliver a result");
        assert_eq!(result.outcome(), Outcome::Failed);
        assert_eq!(ctx.audit.stats().errors, 1);
    }

    struct Stalled(Arc<AtomicBool>);

    impl Producer for Stalled {
        fn id(&self) -> ProducerId {
            ProducerId::Image
        }

        fn mode(&self) -> Mode {
            Mode::OneShot
        }

        fn acquire(&mut self, ctx: &ProducerContext) -> CaptureResult {
            if ctx.cancel.sleep(Duration::from_secs(5)) {
                self.0.store(true, Ordering::SeqCst);
            }
            CaptureResult::success(crate::capture::Payload::Keys(Vec::new()))
        }
    }

    #[test]
    fn test_abandoned_producer_is_told_to_stop() {
        let woken = Arc::new(AtomicBool::new(false));
        let results = run_time_boxed(
            vec![Box::new(Stalled(woken.clone()))],
            &ctx(),
            Duration::from_millis(100),
        );
        assert!(results[0].1.is_none());

        let deadline = Instant::now() + Duration::from_secs(1);
        while !woken.load(Ordering::SeqCst) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(woken.load(Ordering::SeqCst));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(RunState::WarmingUp.to_string(), "WarmingUp");
        assert_eq!(RunState::Done.to_string(), "Done");
    }
}
