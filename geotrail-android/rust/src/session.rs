use std::path::PathBuf;
use std::sync::Arc;

use geotrail_rs::{
    CameraParams, Collaborators, DirectoryRemote, Fix, JpegCodec, LiveStatus, LocalPhotoStore,
    LocationSource, Orientation, Session, SessionConfig, SessionState,
};
use log::info;

use crate::capture_bridge::PolledCaptureTrigger;
use crate::error::{BridgeError, JResult};

/// Pipeline session plus the camera handshake the app drives
pub struct AndroidSession {
    session: Session,
    camera: Arc<PolledCaptureTrigger>,
}

impl AndroidSession {
    /// Photos are delivered by copying them into `outbox_dir`, which the
    /// app's sync client watches.
    pub fn new(outbox_dir: impl Into<PathBuf>) -> Self {
        let camera = Arc::new(PolledCaptureTrigger::new());
        let session = Session::new(Collaborators {
            trigger: camera.clone(),
            // Fixes arrive through push_fix
            feeds: Vec::new(),
            store: Arc::new(LocalPhotoStore::new()),
            codec: Arc::new(JpegCodec::default()),
            remote: Arc::new(DirectoryRemote::new(outbox_dir)),
        });
        Self { session, camera }
    }

    /// Start from a JSON `SessionConfig`
    pub fn start(&self, config_json: &str) -> JResult<()> {
        let config: SessionConfig = serde_json::from_str(config_json)
            .map_err(|e| BridgeError::InvalidParameters(format!("session config: {}", e)))?;
        self.session.start(config)?;
        info!("[jni] session started");
        Ok(())
    }

    pub fn stop(&self) -> JResult<()> {
        if !self.session.is_running() {
            return Err(geotrail_rs::GeotrailError::NotRunning.into());
        }
        self.session.stop();
        // Drop a request the app never answered
        self.camera.cancel();
        info!("[jni] session stopped");
        Ok(())
    }

    pub fn push_fix(&self, fix: Fix) {
        self.session.push_fix(fix);
    }

    pub fn set_provider_available(&self, provider: i32, available: bool) -> JResult<()> {
        let source = LocationSource::from_code(provider).ok_or_else(|| {
            BridgeError::InvalidParameters(format!("unknown provider code {}", provider))
        })?;
        self.session.set_provider_available(source, available);
        Ok(())
    }

    pub fn set_device_orientation(&self, degrees: i32) -> Orientation {
        self.session.set_device_orientation(degrees)
    }

    pub fn set_camera_params(&self, params: CameraParams) {
        self.session.set_camera_params(params);
    }

    pub fn camera(&self) -> &PolledCaptureTrigger {
        &self.camera
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn status(&self) -> LiveStatus {
        self.session.live_status()
    }

    pub fn status_json(&self) -> JResult<String> {
        self.status()
            .to_json()
            .map_err(|e| BridgeError::JniError(format!("status serialisation: {}", e)))
    }
}
