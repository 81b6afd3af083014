// session.rs - Session boundary and pipeline wiring
//
// A `Session` owns the long-lived pieces (location fusion, orientation,
// camera parameters, provider health) and, while running, one scheduler, two
// queues and two worker threads. `start()` validates before creating
// anything; `stop()` tears down in order: scheduler, location feeds, queues,
// workers.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Instant;

use chrono::{Local, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::capture::{
    CameraParams, CameraParamsCell, CaptureJob, CaptureTrigger, OrientationTracker,
};
use crate::codec::ImageCodec;
use crate::config::SessionConfig;
use crate::error::{CaptureResult, GeotrailError};
use crate::health_monitor::LocationHealth;
use crate::live_status::LiveStatus;
use crate::location_fusion::LocationFusion;
use crate::processing::ProcessingWorker;
use crate::queue::{CaptureQueue, Pushed, UploadQueue, CAPTURE_QUEUE_CAPACITY};
use crate::remote::RemoteStore;
use crate::scheduler::{CaptureScheduler, FireAction, FireCompletion};
use crate::stats::{PipelineStats, StatsSnapshot};
use crate::storage::PhotoStore;
use crate::types::{Fix, LocationSource, Orientation};
use crate::upload::UploadWorker;

/// Receives every raw fix a feed produces
pub type FixSink = Arc<dyn Fn(Fix) + Send + Sync>;

/// One platform location provider
pub trait LocationFeed: Send + Sync {
    fn source(&self) -> LocationSource;
    fn subscribe(&self, sink: FixSink) -> CaptureResult<()>;
    fn unsubscribe(&self);
}

/// External collaborators the pipeline is wired to
#[derive(Clone)]
pub struct Collaborators {
    pub trigger: Arc<dyn CaptureTrigger>,
    pub feeds: Vec<Arc<dyn LocationFeed>>,
    pub store: Arc<dyn PhotoStore>,
    pub codec: Arc<dyn ImageCodec>,
    pub remote: Arc<dyn RemoteStore>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Running => "running",
            SessionState::Stopping => "stopping",
            SessionState::Stopped => "stopped",
        }
    }
}

struct Running {
    config: SessionConfig,
    session_dir: PathBuf,
    started: Instant,
    scheduler: CaptureScheduler,
    captures: Arc<CaptureQueue>,
    uploads: Arc<UploadQueue>,
    processor: JoinHandle<()>,
    uploader: JoinHandle<()>,
    feeds: Vec<Arc<dyn LocationFeed>>,
}

pub struct Session {
    collaborators: Collaborators,
    fusion: Arc<LocationFusion>,
    orientation: Arc<OrientationTracker>,
    camera: Arc<CameraParamsCell>,
    health: Arc<LocationHealth>,
    stats: Mutex<Arc<PipelineStats>>,
    state: Mutex<SessionState>,
    running: Mutex<Option<Running>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Session {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            collaborators,
            fusion: Arc::new(LocationFusion::new()),
            orientation: Arc::new(OrientationTracker::new()),
            camera: Arc::new(CameraParamsCell::new()),
            health: Arc::new(LocationHealth::new()),
            stats: Mutex::new(Arc::new(PipelineStats::new())),
            state: Mutex::new(SessionState::Idle),
            running: Mutex::new(None),
        }
    }

    /// Validate `config` and bring the pipeline up.
    ///
    /// Configuration errors are returned before any directory, thread or
    /// subscription exists.
    pub fn start(&self, config: SessionConfig) -> CaptureResult<()> {
        config.validate()?;

        let mut running = lock(&self.running);
        if running.is_some() || self.state() == SessionState::Stopping {
            return Err(GeotrailError::AlreadyRunning);
        }

        let started_ms = Utc::now().timestamp_millis();
        let session_dir = config.storage_root.join(format!("session_{}", started_ms));
        self.collaborators.store.ensure_dir(&session_dir)?;

        let stats = Arc::new(PipelineStats::new());
        *lock(&self.stats) = Arc::clone(&stats);

        let captures = Arc::new(CaptureQueue::bounded(CAPTURE_QUEUE_CAPACITY));
        let uploads = Arc::new(UploadQueue::unbounded());

        let processor = ProcessingWorker::new(
            Arc::clone(&self.collaborators.store),
            Arc::clone(&self.collaborators.codec),
            config.device.clone(),
            Arc::clone(&self.camera),
            session_dir.clone(),
            Arc::clone(&uploads),
            Arc::clone(&stats),
        )
        .spawn(Arc::clone(&captures))?;

        let uploader = UploadWorker::new(
            Arc::clone(&self.collaborators.store),
            Arc::clone(&self.collaborators.codec),
            Arc::clone(&self.collaborators.remote),
            config.upload_scale,
            config.storage_root.join("cache"),
            Arc::clone(&stats),
        )
        .spawn(Arc::clone(&uploads));

        let uploader = match uploader {
            Ok(handle) => handle,
            Err(e) => {
                captures.halt();
                uploads.halt();
                let _ = processor.join();
                return Err(e);
            }
        };

        let mut feeds = Vec::new();
        for feed in &self.collaborators.feeds {
            match feed.subscribe(self.fix_sink()) {
                Ok(()) => {
                    self.health.source(feed.source()).set_available(true);
                    feeds.push(Arc::clone(feed));
                }
                // A missing provider only means fewer fixes
                Err(e) => warn!("[session] {} feed unavailable: {}", feed.source(), e),
            }
        }

        let fire = self.fire_action(Arc::clone(&captures), Arc::clone(&stats));
        let scheduler =
            match CaptureScheduler::start(config.mode.clone(), Arc::clone(&self.fusion), fire) {
                Ok(scheduler) => scheduler,
                Err(e) => {
                    feeds.iter().for_each(|feed| feed.unsubscribe());
                    captures.halt();
                    uploads.halt();
                    let _ = processor.join();
                    let _ = uploader.join();
                    return Err(e);
                }
            };

        info!(
            "[session] started: {} mode, upload scale {}, dir {}",
            config.mode.name(),
            config.upload_scale,
            session_dir.display()
        );

        *running = Some(Running {
            config,
            session_dir,
            started: Instant::now(),
            scheduler,
            captures,
            uploads,
            processor,
            uploader,
            feeds,
        });
        *lock(&self.state) = SessionState::Running;
        Ok(())
    }

    /// Stop firing, detach location feeds and quiesce both workers.
    ///
    /// Jobs already popped finish; queued ones are abandoned. Calling this
    /// on a stopped session is a no-op.
    pub fn stop(&self) {
        // `start()` must not see an empty slot until Stopping is visible
        let (running, abandoned) = {
            let mut slot = lock(&self.running);
            let running = match slot.take() {
                Some(running) => running,
                None => return,
            };

            running.scheduler.stop();
            for feed in &running.feeds {
                feed.unsubscribe();
            }

            let abandoned = running.captures.len() + running.uploads.len();
            running.captures.halt();
            running.uploads.halt();
            *lock(&self.state) = SessionState::Stopping;
            (running, abandoned)
        };

        if running.processor.join().is_err() {
            warn!("[session] processor thread panicked");
        }
        if running.uploader.join().is_err() {
            warn!("[session] uploader thread panicked");
        }

        *lock(&self.state) = SessionState::Stopped;
        info!(
            "[session] stopped after {:.1}s, {} queued jobs abandoned",
            running.started.elapsed().as_secs_f64(),
            abandoned
        );
    }

    fn fix_sink(&self) -> FixSink {
        let fusion = Arc::clone(&self.fusion);
        let health = Arc::clone(&self.health);
        Arc::new(move |fix: Fix| {
            health.source(fix.source).record_fix();
            fusion.update(fix);
        })
    }

    fn fire_action(&self, captures: Arc<CaptureQueue>, stats: Arc<PipelineStats>) -> FireAction {
        let trigger = Arc::clone(&self.collaborators.trigger);
        let fusion = Arc::clone(&self.fusion);
        let orientation = Arc::clone(&self.orientation);

        Arc::new(move |done: FireCompletion| {
            stats.record_fire();
            let captured_at = Local::now();
            let orientation = orientation.snapshot();
            let fix = fusion.best_fix();
            let captures = Arc::clone(&captures);
            let stats = Arc::clone(&stats);

            trigger.request_capture(Box::new(move |frame| {
                match frame {
                    Ok(data) => {
                        let job = CaptureJob {
                            data,
                            captured_at,
                            orientation,
                            fix,
                        };
                        match captures.push(job) {
                            Pushed::Queued => {}
                            Pushed::Evicted(old) => {
                                stats.record_eviction();
                                debug!(
                                    "[session] capture queue full, dropped frame from {}",
                                    old.captured_at
                                );
                            }
                            Pushed::Rejected(_) => debug!("[session] frame arrived after stop"),
                        }
                    }
                    Err(e) => {
                        stats.record_capture_failure();
                        warn!("[session] capture failed: {}", e);
                    }
                }
                done.complete();
            }));
        })
    }

    // ─── Platform inputs ─────────────────────────────────────────────────────

    /// Feed a fix from a provider the platform drives directly
    pub fn push_fix(&self, fix: Fix) {
        (self.fix_sink())(fix);
    }

    pub fn set_provider_available(&self, source: LocationSource, available: bool) {
        self.health.source(source).set_available(available);
    }

    /// Raw sensor degrees; negative means unknown and keeps the last value
    pub fn set_device_orientation(&self, degrees: i32) -> Orientation {
        self.orientation.on_sensor_degrees(degrees)
    }

    pub fn set_camera_params(&self, params: CameraParams) {
        self.camera.publish(params);
    }

    // ─── Queries ─────────────────────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    pub fn stats(&self) -> StatsSnapshot {
        lock(&self.stats).snapshot()
    }

    /// File name of the most recently persisted photo
    pub fn last_saved(&self) -> Option<String> {
        lock(&self.stats).last_saved()
    }

    pub fn best_fix(&self) -> Option<Fix> {
        self.fusion.best_fix()
    }

    pub fn providers_available(&self) -> bool {
        self.health.providers_available()
    }

    pub fn fusion(&self) -> &Arc<LocationFusion> {
        &self.fusion
    }

    pub fn health(&self) -> &Arc<LocationHealth> {
        &self.health
    }

    pub fn session_dir(&self) -> Option<PathBuf> {
        lock(&self.running)
            .as_ref()
            .map(|r| r.session_dir.clone())
    }

    pub fn live_status(&self) -> LiveStatus {
        let mut status = LiveStatus::new(self.state().as_str());
        status.apply_stats(&self.stats());
        status.providers_available = self.providers_available();
        status.best_fix = self.best_fix();
        status.orientation_deg = self.orientation.snapshot().degrees();

        if let Some(running) = lock(&self.running).as_ref() {
            status.mode = Some(running.config.mode.name().to_string());
            status.uptime_seconds = running.started.elapsed().as_secs();
            status.session_dir = Some(path_string(&running.session_dir));
            status.capture_queue_len = running.captures.len();
            status.upload_queue_len = running.uploads.len();
        }
        status
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

fn path_string(path: &Path) -> String {
    path.display().to_string()
}
