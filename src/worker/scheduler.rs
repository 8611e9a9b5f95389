use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::worker::hook::PassHook;
use crate::worker::pass::{PassProcessor, PassSummary};

/// Answer to a pass trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// The guard was free; a pass is now running in the background.
    Started,
    /// A pass already holds the guard. The trigger is dropped, not queued.
    AlreadyRunning,
}

/// Point-in-time view of the worker for status displays.
#[derive(Debug, Clone)]
pub struct WorkerStatus {
    pub running: bool,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_summary: Option<PassSummary>,
}

/// Shared status fields behind short std locks; none is held across an await.
struct WorkerState {
    running: AtomicBool,
    next_run_at: Mutex<Option<DateTime<Utc>>>,
    last_summary: Mutex<Option<PassSummary>>,
}

/// Drives recurring claim passes.
///
/// The timer and every forced trigger funnel through one atomic guard, so at
/// most one pass runs at a time regardless of where the trigger came from.
pub struct ClaimWorker {
    pass: PassProcessor,
    interval: Duration,
    state: WorkerState,
    hook: Mutex<Option<Arc<dyn PassHook>>>,
}

impl ClaimWorker {
    pub fn new(pass: PassProcessor, interval: Duration) -> Self {
        Self {
            pass,
            interval,
            state: WorkerState {
                running: AtomicBool::new(false),
                next_run_at: Mutex::new(None),
                last_summary: Mutex::new(None),
            },
            hook: Mutex::new(None),
        }
    }

    /// Install the post-pass observer. Replaces any previous one.
    pub fn set_pass_hook(&self, hook: Arc<dyn PassHook>) {
        *self.hook.lock().unwrap() = Some(hook);
    }

    /// Fire a pass in the background if none is running. Used by the timer
    /// and by forced triggers alike.
    pub fn trigger(self: &Arc<Self>) -> TriggerOutcome {
        if self.try_acquire_guard().is_err() {
            debug!("Pass already running, trigger dropped");
            return TriggerOutcome::AlreadyRunning;
        }
        let worker = Arc::clone(self);
        tokio::spawn(async move {
            worker.run_guarded_pass().await;
        });
        TriggerOutcome::Started
    }

    /// Run one pass inline. Returns `None` when another pass holds the guard.
    pub async fn run_once(&self) -> Option<PassSummary> {
        if self.try_acquire_guard().is_err() {
            return None;
        }
        Some(self.run_guarded_pass().await)
    }

    /// Spawn the recurring timer. The first tick fires immediately; ticks
    /// that land mid-pass are dropped by the guard, and missed ticks are
    /// skipped rather than replayed in a burst.
    pub fn start_scheduler(self: &Arc<Self>) -> JoinHandle<()> {
        info!(
            "Claim scheduler starting, one pass every {}s",
            self.interval.as_secs()
        );
        *self.state.next_run_at.lock().unwrap() = Some(Utc::now());
        let worker = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(worker.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                worker.trigger();
            }
        })
    }

    pub fn status(&self) -> WorkerStatus {
        WorkerStatus {
            running: self.state.running.load(Ordering::SeqCst),
            next_run_at: *self.state.next_run_at.lock().unwrap(),
            last_summary: self.state.last_summary.lock().unwrap().clone(),
        }
    }

    fn try_acquire_guard(&self) -> Result<(), ()> {
        self.state
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|_| ())
    }

    /// Caller must hold the running guard. Runs the pass, then always
    /// reschedules, releases the guard and notifies the hook, in that order.
    async fn run_guarded_pass(&self) -> PassSummary {
        let summary = self.pass.run().await;

        let next = Utc::now() + chrono::Duration::seconds(self.interval.as_secs() as i64);
        *self.state.next_run_at.lock().unwrap() = Some(next);
        *self.state.last_summary.lock().unwrap() = Some(summary.clone());
        self.state.running.store(false, Ordering::SeqCst);

        let hook = self.hook.lock().unwrap().clone();
        if let Some(hook) = hook {
            if let Err(e) = hook.on_pass_complete(&summary).await {
                warn!("Pass hook failed: {:#}", e);
            }
        }
        summary
    }
}
