// capture.rs - What the platform camera hands to the pipeline
//
// The camera itself lives outside this crate. It is reached through the
// `CaptureTrigger` trait and answers asynchronously with encoded bytes.
// Device orientation and camera parameters are published by the platform
// at any time and snapshotted when a capture fires or a job is processed.

use std::sync::{Mutex, PoisonError, RwLock};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::CaptureResult;
use crate::types::{Fix, Orientation};

/// One raw capture on its way to local storage
#[derive(Clone, Debug)]
pub struct CaptureJob {
    pub data: Vec<u8>,
    pub captured_at: DateTime<Local>,
    pub orientation: Orientation,
    /// Best fix at fire time, `None` means no geotag
    pub fix: Option<Fix>,
}

/// Completion callback handed to the camera; called exactly once
pub type FrameCallback = Box<dyn FnOnce(CaptureResult<Vec<u8>>) + Send>;

/// External camera collaborator
pub trait CaptureTrigger: Send + Sync {
    /// Start a capture. `deliver` may run on any thread, now or later.
    fn request_capture(&self, deliver: FrameCallback);
}

// ─── Device orientation ──────────────────────────────────────────────────────

/// Latest quantised device orientation
#[derive(Debug, Default)]
pub struct OrientationTracker {
    current: Mutex<Orientation>,
}

impl OrientationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a raw sensor reading in degrees. Negative readings are ignored.
    pub fn on_sensor_degrees(&self, degrees: i32) -> Orientation {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(quantised) = Orientation::from_sensor_degrees(degrees) {
            *current = quantised;
        }
        *current
    }

    pub fn snapshot(&self) -> Orientation {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ─── Camera parameters ───────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashMode {
    #[default]
    Off,
    Auto,
    On,
    Torch,
}

impl FlashMode {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => FlashMode::Auto,
            "on" | "red-eye" => FlashMode::On,
            "torch" => FlashMode::Torch,
            _ => FlashMode::Off,
        }
    }

    /// EXIF Flash value: 0 = did not fire
    pub fn exif_value(self) -> u16 {
        match self {
            FlashMode::Off => 0,
            _ => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WhiteBalance {
    #[default]
    Auto,
    Manual,
}

impl WhiteBalance {
    /// Anything other than "auto" is a fixed preset
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("auto") {
            WhiteBalance::Auto
        } else {
            WhiteBalance::Manual
        }
    }

    pub fn exif_value(self) -> u16 {
        match self {
            WhiteBalance::Auto => 0,
            WhiteBalance::Manual => 1,
        }
    }
}

/// Best-effort camera settings copied into photo metadata
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraParams {
    pub flash: FlashMode,
    pub focal_length_mm: Option<f64>,
    pub white_balance: Option<WhiteBalance>,
    pub aperture: Option<String>,
}

/// Latest published camera parameters, `None` until the camera reports
#[derive(Debug, Default)]
pub struct CameraParamsCell {
    params: RwLock<Option<CameraParams>>,
}

impl CameraParamsCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, params: CameraParams) {
        *self.params.write().unwrap_or_else(PoisonError::into_inner) = Some(params);
    }

    pub fn current(&self) -> Option<CameraParams> {
        self.params
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Make/model written into every photo
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub make: String,
    pub model: String,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            make: "geotrail".to_string(),
            model: std::env::consts::ARCH.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orientation_tracker_ignores_unknown() {
        let tracker = OrientationTracker::new();
        assert_eq!(tracker.snapshot(), Orientation::Deg0);
        assert_eq!(tracker.on_sensor_degrees(100), Orientation::Deg90);
        assert_eq!(tracker.on_sensor_degrees(-1), Orientation::Deg90);
        assert_eq!(tracker.snapshot(), Orientation::Deg90);
    }

    #[test]
    fn test_camera_param_parsing() {
        assert_eq!(FlashMode::parse("off").exif_value(), 0);
        assert_eq!(FlashMode::parse("AUTO"), FlashMode::Auto);
        assert_eq!(FlashMode::parse("torch").exif_value(), 1);
        assert_eq!(WhiteBalance::parse("auto").exif_value(), 0);
        assert_eq!(WhiteBalance::parse("daylight"), WhiteBalance::Manual);
    }

    #[test]
    fn test_params_cell() {
        let cell = CameraParamsCell::new();
        assert!(cell.current().is_none());
        cell.publish(CameraParams {
            flash: FlashMode::On,
            focal_length_mm: Some(4.2),
            ..CameraParams::default()
        });
        assert_eq!(cell.current().unwrap().flash, FlashMode::On);
    }
}
