//! Background polling
//!
//! A [`PollController`] is a two-state machine (`Stopped`, `Running`) owned
//! by a device. Entering `Running` creates a fresh [`PollTask`]; leaving it
//! stops and discards that task. The task handle lives inside the `Running`
//! state, so state and handle always change together.
//!
//! Each tick of the task starts one poll cycle. Cycles never overlap: a tick
//! that fires while the previous cycle of the same device is still running is
//! skipped. The guard is shared across task generations, so restarting the
//! poller does not let a new cycle start next to one still in flight.

use super::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Interval used when polling is started without one
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Poller state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PollState {
    /// No background task
    Stopped,
    /// Background task ticking at the given interval
    Running(Duration),
}

impl PollState {
    /// Check if polling
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running(_))
    }

    /// Current interval, if polling
    pub fn interval(&self) -> Option<Duration> {
        match self {
            Self::Running(interval) => Some(*interval),
            Self::Stopped => None,
        }
    }
}

impl fmt::Display for PollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Running(interval) => write!(f, "running every {:?}", interval),
        }
    }
}

/// Request to the poller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollCommand {
    /// Poll at the given interval (zero means stop)
    Start(Duration),
    /// Poll at the controller's default interval
    StartDefault,
    /// Stop polling
    Stop,
}

impl From<Duration> for PollCommand {
    fn from(interval: Duration) -> Self {
        if interval.is_zero() {
            Self::Stop
        } else {
            Self::Start(interval)
        }
    }
}

/// Seconds between polls, `0` stops
impl From<u64> for PollCommand {
    fn from(secs: u64) -> Self {
        Self::from(Duration::from_secs(secs))
    }
}

/// `false` stops, `true` starts at the default interval
impl From<bool> for PollCommand {
    fn from(enabled: bool) -> Self {
        if enabled {
            Self::StartDefault
        } else {
            Self::Stop
        }
    }
}

impl FromStr for PollCommand {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "stop" | "false" | "off" => Ok(Self::Stop),
            "start" | "true" | "on" => Ok(Self::StartDefault),
            other => other
                .parse::<u64>()
                .map(Self::from)
                .map_err(|_| Error::ConfigurationConflict(format!("unrecognised poll command: {}", s))),
        }
    }
}

/// Work performed on every tick
#[async_trait]
pub trait PollCycle: Send + Sync + 'static {
    /// Run one cycle. Errors are logged and counted by the poller.
    async fn run_cycle(&self) -> Result<()>;
}

#[derive(Debug, Default)]
struct PollCounters {
    cycles_started: AtomicU64,
    cycles_completed: AtomicU64,
    cycles_failed: AtomicU64,
    ticks_skipped: AtomicU64,
    tasks_spawned: AtomicU64,
    live_tasks: AtomicUsize,
}

/// Poller statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PollStats {
    /// Cycles started
    pub cycles_started: u64,
    /// Cycles that finished without error
    pub cycles_completed: u64,
    /// Cycles that returned an error
    pub cycles_failed: u64,
    /// Ticks skipped because a cycle was still running
    pub ticks_skipped: u64,
    /// Background tasks created since the device was built
    pub tasks_spawned: u64,
    /// Background tasks currently alive
    pub live_tasks: usize,
}

/// Keeps the live task count accurate however the task ends
struct LiveTask(Arc<PollCounters>);

impl Drop for LiveTask {
    fn drop(&mut self) {
        self.0.live_tasks.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A scheduled background task ticking at a fixed interval
pub struct PollTask {
    interval: Duration,
    cycle: Arc<dyn PollCycle>,
    cycle_guard: Arc<AsyncMutex<()>>,
    counters: Arc<PollCounters>,
    active: Arc<Mutex<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl PollTask {
    fn new(
        interval: Duration,
        cycle: Arc<dyn PollCycle>,
        cycle_guard: Arc<AsyncMutex<()>>,
        counters: Arc<PollCounters>,
    ) -> Self {
        Self {
            interval,
            cycle,
            cycle_guard,
            counters,
            active: Arc::new(Mutex::new(false)),
            handle: None,
        }
    }

    /// Tick interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Check if the background task is alive
    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Spawn the background task on the current tokio runtime
    pub fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Runtime(format!("polling needs a tokio runtime: {}", e)))?;

        *self.active.lock() = true;
        self.counters.tasks_spawned.fetch_add(1, Ordering::SeqCst);
        self.counters.live_tasks.fetch_add(1, Ordering::SeqCst);

        let live = LiveTask(self.counters.clone());
        let interval = self.interval;
        let cycle = self.cycle.clone();
        let cycle_guard = self.cycle_guard.clone();
        let counters = self.counters.clone();
        let active = self.active.clone();

        self.handle = Some(runtime.spawn(async move {
            let _live = live;
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if !dispatch(&active, &cycle_guard, &cycle, &counters) {
                    break;
                }
            }
        }));
        Ok(())
    }

    /// Stop ticking. No cycle starts after this returns; a cycle already
    /// running is left to finish.
    pub fn stop(&mut self) {
        *self.active.lock() = false;
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for PollTask {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Handle one tick. Returns false once the task has been stopped.
fn dispatch(
    active: &Mutex<bool>,
    cycle_guard: &Arc<AsyncMutex<()>>,
    cycle: &Arc<dyn PollCycle>,
    counters: &Arc<PollCounters>,
) -> bool {
    // Held while spawning so stop() cannot interleave
    let active = active.lock();
    if !*active {
        return false;
    }

    match cycle_guard.clone().try_lock_owned() {
        Ok(permit) => {
            counters.cycles_started.fetch_add(1, Ordering::SeqCst);
            let cycle = cycle.clone();
            let counters = counters.clone();
            tokio::spawn(async move {
                let _permit = permit;
                match cycle.run_cycle().await {
                    Ok(()) => {
                        counters.cycles_completed.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(e) => {
                        counters.cycles_failed.fetch_add(1, Ordering::SeqCst);
                        warn!("Poll cycle failed: {}", e);
                    }
                }
            });
        }
        Err(_) => {
            counters.ticks_skipped.fetch_add(1, Ordering::SeqCst);
            debug!("Previous poll cycle still running, skipping tick");
        }
    }
    true
}

enum Slot {
    Stopped,
    Running { interval: Duration, task: PollTask },
}

/// Poller state machine
pub struct PollController {
    slot: Slot,
    cycle: Arc<dyn PollCycle>,
    cycle_guard: Arc<AsyncMutex<()>>,
    counters: Arc<PollCounters>,
    default_interval: Duration,
}

impl PollController {
    /// Create a stopped poller running `cycle` on every tick
    pub fn new(cycle: Arc<dyn PollCycle>) -> Self {
        Self {
            slot: Slot::Stopped,
            cycle,
            cycle_guard: Arc::new(AsyncMutex::new(())),
            counters: Arc::new(PollCounters::default()),
            default_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set the interval used by [`PollCommand::StartDefault`]
    pub fn with_default_interval(mut self, interval: Duration) -> Self {
        self.default_interval = interval;
        self
    }

    /// Interval used by [`PollCommand::StartDefault`]
    pub fn default_interval(&self) -> Duration {
        self.default_interval
    }

    /// Get current state
    pub fn state(&self) -> PollState {
        match &self.slot {
            Slot::Stopped => PollState::Stopped,
            Slot::Running { interval, .. } => PollState::Running(*interval),
        }
    }

    /// Get statistics
    pub fn stats(&self) -> PollStats {
        let c = &self.counters;
        PollStats {
            cycles_started: c.cycles_started.load(Ordering::SeqCst),
            cycles_completed: c.cycles_completed.load(Ordering::SeqCst),
            cycles_failed: c.cycles_failed.load(Ordering::SeqCst),
            ticks_skipped: c.ticks_skipped.load(Ordering::SeqCst),
            tasks_spawned: c.tasks_spawned.load(Ordering::SeqCst),
            live_tasks: c.live_tasks.load(Ordering::SeqCst),
        }
    }

    /// Apply a command
    pub fn apply(&mut self, command: impl Into<PollCommand>) -> Result<PollState> {
        match command.into() {
            PollCommand::Stop => Ok(self.stop()),
            PollCommand::StartDefault => self.start(self.default_interval),
            PollCommand::Start(interval) => self.start(interval),
        }
    }

    /// Start polling, or restart at a new interval if already running.
    /// A zero interval stops.
    pub fn start(&mut self, interval: Duration) -> Result<PollState> {
        if interval.is_zero() {
            return Ok(self.stop());
        }

        if let Slot::Running { task, .. } = &self.slot {
            if !task.is_active() {
                return Err(Error::ConfigurationConflict(
                    "stop polling before redefining it".to_string(),
                ));
            }
        }

        self.stop_task();

        let mut task = PollTask::new(
            interval,
            self.cycle.clone(),
            self.cycle_guard.clone(),
            self.counters.clone(),
        );
        task.start()?;
        self.slot = Slot::Running { interval, task };

        info!("Polling every {:?}", interval);
        Ok(self.state())
    }

    /// Stop polling. Stopping a stopped poller does nothing.
    pub fn stop(&mut self) -> PollState {
        if self.stop_task() {
            info!("Polling stopped");
        }
        PollState::Stopped
    }

    fn stop_task(&mut self) -> bool {
        match std::mem::replace(&mut self.slot, Slot::Stopped) {
            Slot::Running { mut task, .. } => {
                task.stop();
                true
            }
            Slot::Stopped => false,
        }
    }
}
