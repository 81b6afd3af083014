// processing.rs - Capture queue consumer
//
// Pops raw frames, fixes up orientation, persists the bytes under the session
// directory, stamps the tag set and hands the path to the upload queue. A
// failed job is logged and dropped; the loop carries on with the next one.

use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, info, warn};

use crate::capture::{CameraParamsCell, CaptureJob, DeviceInfo};
use crate::codec::ImageCodec;
use crate::error::{CaptureResult, GeotrailError};
use crate::metadata::{photo_filename, PhotoTags};
use crate::queue::{CaptureQueue, Pushed, UploadQueue};
use crate::stats::PipelineStats;
use crate::storage::PhotoStore;
use crate::types::Orientation;

/// Rotation is needed when the device was upright but the frame is landscape
pub fn needs_rotation(orientation: Orientation, width: u32, height: u32) -> bool {
    orientation.is_upright() && width > height
}

pub struct ProcessingWorker {
    store: Arc<dyn PhotoStore>,
    codec: Arc<dyn ImageCodec>,
    device: DeviceInfo,
    camera: Arc<CameraParamsCell>,
    session_dir: PathBuf,
    uploads: Arc<UploadQueue>,
    stats: Arc<PipelineStats>,
}

impl ProcessingWorker {
    pub fn new(
        store: Arc<dyn PhotoStore>,
        codec: Arc<dyn ImageCodec>,
        device: DeviceInfo,
        camera: Arc<CameraParamsCell>,
        session_dir: PathBuf,
        uploads: Arc<UploadQueue>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            store,
            codec,
            device,
            camera,
            session_dir,
            uploads,
            stats,
        }
    }

    pub fn spawn(self, captures: Arc<CaptureQueue>) -> CaptureResult<JoinHandle<()>> {
        thread::Builder::new()
            .name("geotrail-processor".into())
            .spawn(move || self.run(&captures))
            .map_err(|e| GeotrailError::Internal(format!("processor thread: {}", e)))
    }

    /// Drain `captures` until the queue is halted
    pub fn run(&self, captures: &CaptureQueue) {
        info!("[processor] started, writing to {}", self.session_dir.display());
        while let Some(job) = captures.pop() {
            if let Err(e) = self.handle(job) {
                warn!("[processor] job dropped: {}", e);
                self.stats.record_processing_failure();
            }
        }
        info!("[processor] stopped");
    }

    fn handle(&self, job: CaptureJob) -> CaptureResult<()> {
        let path = self.process(&job)?;
        if let Pushed::Rejected(path) = self.uploads.push(path) {
            debug!("[processor] upload queue halted, {} not queued", path.display());
        }
        Ok(())
    }

    /// Persist one capture with its tags and return the written path
    pub fn process(&self, job: &CaptureJob) -> CaptureResult<PathBuf> {
        let (data, dimensions) = self.normalize(job);

        self.store.ensure_dir(&self.session_dir)?;
        let file_name = self.free_name(&photo_filename(&job.captured_at));
        let path = self.session_dir.join(&file_name);
        self.store.write(&path, &data)?;

        let camera = self.camera.current();
        let tags = PhotoTags::for_capture(job, &self.device, camera.as_ref(), dimensions);
        self.store.write_metadata(&path, &tags)?;

        self.stats.record_written(&file_name);
        debug!(
            "[processor] saved {} ({} bytes, geotag: {})",
            file_name,
            data.len(),
            job.fix.is_some()
        );
        Ok(path)
    }

    /// `name`, or `<stem>_<n>.jpg` when a capture in the same millisecond
    /// already took it. Only this worker writes to the session directory.
    fn free_name(&self, name: &str) -> String {
        if !self.store.exists(&self.session_dir.join(name)) {
            return name.to_string();
        }
        let stem = name.trim_end_matches(".jpg");
        (1..)
            .map(|n| format!("{}_{}.jpg", stem, n))
            .find(|candidate| !self.store.exists(&self.session_dir.join(candidate)))
            .unwrap_or_else(|| name.to_string())
    }

    /// Rotate to portrait when needed. Bytes the codec cannot read are kept
    /// as they are, without known dimensions.
    fn normalize<'a>(&self, job: &'a CaptureJob) -> (Cow<'a, [u8]>, Option<(u32, u32)>) {
        let (width, height) = match self.codec.dimensions(&job.data) {
            Ok(dims) => dims,
            Err(e) => {
                warn!("[processor] unreadable frame, storing as-is: {}", e);
                return (Cow::Borrowed(&job.data), None);
            }
        };

        if !needs_rotation(job.orientation, width, height) {
            return (Cow::Borrowed(&job.data), Some((width, height)));
        }
        match self.codec.rotate90(&job.data) {
            Ok(rotated) => {
                debug!(
                    "[processor] rotated {}x{} -> {}x{}",
                    width, height, rotated.width, rotated.height
                );
                (Cow::Owned(rotated.data), Some((rotated.width, rotated.height)))
            }
            Err(e) => {
                warn!("[processor] rotation failed, storing unrotated: {}", e);
                (Cow::Borrowed(&job.data), Some((width, height)))
            }
        }
    }
}
