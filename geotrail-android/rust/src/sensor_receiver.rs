use geotrail_rs::{CameraParams, FlashMode, Fix, LocationSource, WhiteBalance};
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, JResult};

/// Location from Android LocationManager, as handed over by Kotlin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationSample {
    pub provider: i32,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub accuracy: f64,
    pub speed: f64,
    /// Location.getTime(), ms since epoch
    pub time_ms: i64,
}

impl LocationSample {
    pub fn into_fix(self) -> JResult<Fix> {
        let source = LocationSource::from_code(self.provider).ok_or_else(|| {
            BridgeError::InvalidParameters(format!("unknown provider code {}", self.provider))
        })?;
        if !(-90.0..=90.0).contains(&self.latitude) || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(BridgeError::InvalidParameters(format!(
                "coordinates out of range: {}, {}",
                self.latitude, self.longitude
            )));
        }
        Ok(Fix::new(
            source,
            self.latitude,
            self.longitude,
            self.altitude,
            self.accuracy,
            self.speed,
            self.time_ms,
        ))
    }
}

/// Camera.Parameters snapshot; absent values arrive as null / non-positive
#[derive(Debug, Clone, Default)]
pub struct CameraSample {
    pub flash_mode: Option<String>,
    pub focal_length_mm: f64,
    pub white_balance: Option<String>,
    pub aperture: Option<String>,
}

impl CameraSample {
    pub fn into_params(self) -> CameraParams {
        CameraParams {
            flash: self
                .flash_mode
                .as_deref()
                .map(FlashMode::parse)
                .unwrap_or_default(),
            focal_length_mm: (self.focal_length_mm.is_finite() && self.focal_length_mm > 0.0)
                .then_some(self.focal_length_mm),
            white_balance: self.white_balance.as_deref().map(WhiteBalance::parse),
            aperture: self.aperture.filter(|a| !a.trim().is_empty()),
        }
    }
}
