// scheduler.rs - Decides when a capture fires
//
// `ScheduleState` is a pure state machine fed with monotonic milliseconds and
// location fixes. `CaptureScheduler` drives it: a timer thread for time mode,
// a LocationFusion subscription for distance mode. Firing happens under the
// scheduler lock, so once `stop()` has returned no further fire can occur.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{CaptureResult, GeotrailError};
use crate::geodesy::distance_m;
use crate::location_fusion::{LocationFusion, SubscriptionId};
use crate::types::Fix;

/// Shortest delay ever scheduled between fires
pub const MIN_FIRE_DELAY_MS: u64 = 1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ScheduleMode {
    Time {
        interval_ms: u64,
        #[serde(default)]
        initial_delay_ms: u64,
    },
    Distance {
        interval_m: f64,
    },
}

impl ScheduleMode {
    pub fn name(&self) -> &'static str {
        match self {
            ScheduleMode::Time { .. } => "time",
            ScheduleMode::Distance { .. } => "distance",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SchedulePhase {
    Idle,
    /// Time mode: timer pending
    Waiting { delay_ms: u64 },
    /// Time mode: fired, waiting for the capture to complete
    Fired,
    /// Distance mode: nothing fired yet
    AwaitingFirstFix,
    /// Distance mode: reference fix recorded
    Armed,
    Stopped,
}

/// Delay until the next fire, measured from the previous fire rather than
/// from now, clamped so an overrun interval fires almost immediately.
pub fn next_fire_delay(last_fire_ms: u64, interval_ms: u64, now_ms: u64) -> u64 {
    let due = last_fire_ms.saturating_add(interval_ms);
    due.saturating_sub(now_ms).max(MIN_FIRE_DELAY_MS)
}

// ─── Pure state machine ──────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct ScheduleState {
    mode: ScheduleMode,
    phase: SchedulePhase,
    last_fired_ms: Option<u64>,
    reference: Option<Fix>,
}

impl ScheduleState {
    pub fn new(mode: ScheduleMode) -> Self {
        Self {
            mode,
            phase: SchedulePhase::Idle,
            last_fired_ms: None,
            reference: None,
        }
    }

    pub fn mode(&self) -> &ScheduleMode {
        &self.mode
    }

    pub fn phase(&self) -> SchedulePhase {
        self.phase
    }

    pub fn last_fired_ms(&self) -> Option<u64> {
        self.last_fired_ms
    }

    /// Distance mode reference fix (position of the last fire)
    pub fn reference(&self) -> Option<&Fix> {
        self.reference.as_ref()
    }

    /// Arm the schedule. Time mode returns the delay to the first fire.
    pub fn start(&mut self) -> Option<u64> {
        if self.phase != SchedulePhase::Idle {
            return None;
        }
        match self.mode {
            ScheduleMode::Time {
                initial_delay_ms, ..
            } => {
                self.phase = SchedulePhase::Waiting {
                    delay_ms: initial_delay_ms,
                };
                Some(initial_delay_ms)
            }
            ScheduleMode::Distance { .. } => {
                self.phase = SchedulePhase::AwaitingFirstFix;
                None
            }
        }
    }

    /// Timer expired. Returns `true` when a capture must fire now.
    pub fn on_timer(&mut self, now_ms: u64) -> bool {
        if !matches!(self.phase, SchedulePhase::Waiting { .. }) {
            return false;
        }
        self.phase = SchedulePhase::Fired;
        self.last_fired_ms = Some(now_ms);
        true
    }

    /// Capture finished. Time mode returns the delay to the next fire.
    pub fn on_capture_complete(&mut self, now_ms: u64) -> Option<u64> {
        let interval_ms = match self.mode {
            ScheduleMode::Time { interval_ms, .. } => interval_ms,
            ScheduleMode::Distance { .. } => return None,
        };
        if self.phase != SchedulePhase::Fired {
            return None;
        }
        let last = self.last_fired_ms.unwrap_or(now_ms);
        let delay_ms = next_fire_delay(last, interval_ms, now_ms);
        self.phase = SchedulePhase::Waiting { delay_ms };
        Some(delay_ms)
    }

    /// New best fix. Returns `true` when a capture must fire now.
    pub fn on_fix(&mut self, fix: &Fix) -> bool {
        self.on_fix_measured(fix, distance_m)
    }

    /// Same as [`on_fix`](Self::on_fix) with an injected distance function
    pub fn on_fix_measured<F>(&mut self, fix: &Fix, measure: F) -> bool
    where
        F: Fn(&Fix, &Fix) -> f64,
    {
        let interval_m = match self.mode {
            ScheduleMode::Distance { interval_m } => interval_m,
            ScheduleMode::Time { .. } => return false,
        };
        let fire = match self.phase {
            SchedulePhase::AwaitingFirstFix => true,
            SchedulePhase::Armed => match &self.reference {
                Some(reference) => measure(reference, fix) >= interval_m,
                None => true,
            },
            _ => return false,
        };
        if fire {
            self.reference = Some(fix.clone());
            self.phase = SchedulePhase::Armed;
        }
        fire
    }

    pub fn stop(&mut self) {
        self.phase = SchedulePhase::Stopped;
    }
}

// ─── Driver ──────────────────────────────────────────────────────────────────

enum Command {
    CaptureDone,
    Stop,
}

/// Handed to the fire action; dropping it reports the capture as complete
/// and lets time mode schedule the next fire.
pub struct FireCompletion {
    notify: Option<Sender<Command>>,
}

impl FireCompletion {
    fn detached() -> Self {
        Self { notify: None }
    }

    pub fn complete(self) {}
}

impl Drop for FireCompletion {
    fn drop(&mut self) {
        if let Some(tx) = self.notify.take() {
            // Timer thread already gone after stop
            let _ = tx.send(Command::CaptureDone);
        }
    }
}

/// Invoked once per fire, with the scheduler lock held; must not block
pub type FireAction = Arc<dyn Fn(FireCompletion) + Send + Sync>;

struct Shared {
    state: ScheduleState,
    stopped: bool,
    fires: u64,
}

pub struct CaptureScheduler {
    shared: Arc<Mutex<Shared>>,
    fusion: Arc<LocationFusion>,
    subscription: Mutex<Option<SubscriptionId>>,
    commands: Mutex<Option<Sender<Command>>>,
    timer: Mutex<Option<JoinHandle<()>>>,
    timer_thread: Mutex<Option<ThreadId>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CaptureScheduler {
    /// Arm the schedule and start delivering fires to `fire`
    pub fn start(
        mode: ScheduleMode,
        fusion: Arc<LocationFusion>,
        fire: FireAction,
    ) -> CaptureResult<Self> {
        let mut state = ScheduleState::new(mode.clone());
        let first_delay = state.start();

        let scheduler = Self {
            shared: Arc::new(Mutex::new(Shared {
                state,
                stopped: false,
                fires: 0,
            })),
            fusion,
            subscription: Mutex::new(None),
            commands: Mutex::new(None),
            timer: Mutex::new(None),
            timer_thread: Mutex::new(None),
        };

        match mode {
            ScheduleMode::Time { interval_ms, .. } => {
                let delay = first_delay.unwrap_or(0);
                scheduler.spawn_timer(delay, fire)?;
                info!(
                    "[scheduler] time mode: every {} ms, first fire in {} ms",
                    interval_ms, delay
                );
            }
            ScheduleMode::Distance { interval_m } => {
                scheduler.subscribe_fixes(fire);
                info!("[scheduler] distance mode: every {:.1} m", interval_m);
            }
        }
        Ok(scheduler)
    }

    fn spawn_timer(&self, first_delay_ms: u64, fire: FireAction) -> CaptureResult<()> {
        let (tx, rx) = channel::unbounded();
        let shared = Arc::clone(&self.shared);
        let completion_tx = tx.clone();

        let handle = thread::Builder::new()
            .name("geotrail-scheduler".into())
            .spawn(move || run_timer(shared, rx, completion_tx, fire, first_delay_ms))
            .map_err(|e| GeotrailError::Internal(format!("scheduler thread: {}", e)))?;

        *lock(&self.timer_thread) = Some(handle.thread().id());
        *lock(&self.timer) = Some(handle);
        *lock(&self.commands) = Some(tx);
        Ok(())
    }

    fn subscribe_fixes(&self, fire: FireAction) {
        let shared = Arc::clone(&self.shared);
        let id = self.fusion.subscribe(Arc::new(move |best: Option<&Fix>| {
            let fix = match best {
                Some(fix) => fix,
                None => return,
            };
            let mut guard = lock(&shared);
            if guard.stopped {
                return;
            }
            if guard.state.on_fix(fix) {
                guard.fires += 1;
                debug!(
                    "[scheduler] distance fire #{} at ({:.6}, {:.6})",
                    guard.fires, fix.latitude, fix.longitude
                );
                fire(FireCompletion::detached());
            }
        }));
        *lock(&self.subscription) = Some(id);
    }

    /// Cancel pending fires and detach from location updates. Idempotent.
    pub fn stop(&self) {
        {
            let mut guard = lock(&self.shared);
            if guard.stopped {
                return;
            }
            guard.stopped = true;
            guard.state.stop();
        }

        if let Some(id) = lock(&self.subscription).take() {
            self.fusion.unsubscribe(id);
        }
        if let Some(tx) = lock(&self.commands).take() {
            let _ = tx.send(Command::Stop);
        }

        let handle = lock(&self.timer).take();
        let on_timer_thread = *lock(&self.timer_thread) == Some(thread::current().id());
        if let Some(handle) = handle {
            if !on_timer_thread && handle.join().is_err() {
                warn!("[scheduler] timer thread panicked");
            }
        }
        info!("[scheduler] stopped after {} fires", self.fire_count());
    }

    pub fn is_stopped(&self) -> bool {
        lock(&self.shared).stopped
    }

    pub fn fire_count(&self) -> u64 {
        lock(&self.shared).fires
    }

    pub fn phase(&self) -> SchedulePhase {
        lock(&self.shared).state.phase()
    }
}

impl Drop for CaptureScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_timer(
    shared: Arc<Mutex<Shared>>,
    rx: Receiver<Command>,
    completion_tx: Sender<Command>,
    fire: FireAction,
    first_delay_ms: u64,
) {
    let epoch = Instant::now();
    let now_ms = || epoch.elapsed().as_millis() as u64;
    let mut deadline = Some(epoch + Duration::from_millis(first_delay_ms));

    loop {
        let received = match deadline {
            Some(at) => rx.recv_timeout(at.saturating_duration_since(Instant::now())),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(Command::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(Command::CaptureDone) => {
                let mut guard = lock(&shared);
                if guard.stopped {
                    break;
                }
                if let Some(delay) = guard.state.on_capture_complete(now_ms()) {
                    debug!("[scheduler] next fire in {} ms", delay);
                    deadline = Some(Instant::now() + Duration::from_millis(delay));
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                deadline = None;
                let mut guard = lock(&shared);
                if guard.stopped {
                    break;
                }
                if guard.state.on_timer(now_ms()) {
                    guard.fires += 1;
                    debug!("[scheduler] time fire #{}", guard.fires);
                    fire(FireCompletion {
                        notify: Some(completion_tx.clone()),
                    });
                }
            }
        }
    }
    debug!("[scheduler] timer thread exiting");
}
