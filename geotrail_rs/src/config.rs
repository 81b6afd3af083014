use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::capture::DeviceInfo;
use crate::error::{CaptureResult, GeotrailError};
use crate::scheduler::ScheduleMode;

/// Everything a session needs to start
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(flatten)]
    pub mode: ScheduleMode,
    /// Linear scale applied before upload, in (0, 1]
    #[serde(default = "default_upload_scale")]
    pub upload_scale: f64,
    /// Session directories are created under this root
    pub storage_root: PathBuf,
    #[serde(default)]
    pub device: DeviceInfo,
}

fn default_upload_scale() -> f64 {
    1.0
}

impl SessionConfig {
    pub fn time(interval_ms: u64, initial_delay_ms: u64, storage_root: impl Into<PathBuf>) -> Self {
        Self {
            mode: ScheduleMode::Time {
                interval_ms,
                initial_delay_ms,
            },
            upload_scale: 1.0,
            storage_root: storage_root.into(),
            device: DeviceInfo::default(),
        }
    }

    pub fn distance(interval_m: f64, storage_root: impl Into<PathBuf>) -> Self {
        Self {
            mode: ScheduleMode::Distance { interval_m },
            upload_scale: 1.0,
            storage_root: storage_root.into(),
            device: DeviceInfo::default(),
        }
    }

    pub fn with_upload_scale(mut self, scale: f64) -> Self {
        self.upload_scale = scale;
        self
    }

    pub fn from_json_file(path: &Path) -> CaptureResult<Self> {
        let json = fs::read_to_string(path)
            .map_err(|e| GeotrailError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&json)
            .map_err(|e| GeotrailError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CaptureResult<()> {
        match self.mode {
            ScheduleMode::Time { interval_ms, .. } if interval_ms == 0 => {
                return Err(GeotrailError::InvalidConfig(
                    "time interval must be positive".into(),
                ));
            }
            ScheduleMode::Distance { interval_m } if !(interval_m.is_finite() && interval_m > 0.0) => {
                return Err(GeotrailError::InvalidConfig(format!(
                    "distance interval must be positive, got {}",
                    interval_m
                )));
            }
            _ => {}
        }

        if !(self.upload_scale.is_finite() && self.upload_scale > 0.0 && self.upload_scale <= 1.0) {
            return Err(GeotrailError::InvalidConfig(format!(
                "upload scale must be in (0, 1], got {}",
                self.upload_scale
            )));
        }
        if self.storage_root.as_os_str().is_empty() {
            return Err(GeotrailError::InvalidConfig("storage root is empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation() {
        assert!(SessionConfig::time(1000, 500, "/tmp/g").validate().is_ok());
        assert!(SessionConfig::distance(100.0, "/tmp/g").validate().is_ok());

        let bad = [
            SessionConfig::time(0, 0, "/tmp/g"),
            SessionConfig::distance(0.0, "/tmp/g"),
            SessionConfig::distance(f64::NAN, "/tmp/g"),
            SessionConfig::time(1000, 0, "/tmp/g").with_upload_scale(0.0),
            SessionConfig::time(1000, 0, "/tmp/g").with_upload_scale(1.5),
            SessionConfig::time(1000, 0, ""),
        ];
        for config in bad {
            let err = config.validate().unwrap_err();
            assert!(err.is_config_error(), "{:?}", config);
        }
    }

    #[test]
    fn test_json_shape() {
        let json = r#"{
            "mode": "distance",
            "interval_m": 25.0,
            "upload_scale": 0.5,
            "storage_root": "/sdcard/geotrail"
        }"#;
        let config: SessionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.mode, ScheduleMode::Distance { interval_m: 25.0 });
        assert_eq!(config.upload_scale, 0.5);

        let json = r#"{"mode": "time", "interval_ms": 5000, "storage_root": "out"}"#;
        let config: SessionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            config.mode,
            ScheduleMode::Time {
                interval_ms: 5000,
                initial_delay_ms: 0
            }
        );
        assert_eq!(config.upload_scale, 1.0);
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, r#"{"mode": "time", "interval_ms": 0, "storage_root": "out"}"#).unwrap();
        assert!(SessionConfig::from_json_file(&path).unwrap_err().is_config_error());
        assert!(SessionConfig::from_json_file(&dir.path().join("none.json")).is_err());
    }
}
