// metadata.rs - Photo tag set written alongside every persisted capture
//
// Tags are keyed by their EXIF names and hold EXIF-formatted string values
// (rationals as "num/den", dates as "yyyy:MM:dd"). Binary EXIF encoding is
// left to the storage collaborator.

use std::collections::BTreeMap;

use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::capture::{CameraParams, CaptureJob, DeviceInfo};
use crate::geodesy::{
    from_dms_rational, latitude_ref, longitude_ref, signed_coordinate, to_dms_rational,
};
use crate::types::Fix;

pub const TAG_APERTURE: &str = "FNumber";
pub const TAG_DATETIME: &str = "DateTime";
pub const TAG_EXPOSURE_TIME: &str = "ExposureTime";
pub const TAG_FLASH: &str = "Flash";
pub const TAG_FOCAL_LENGTH: &str = "FocalLength";
pub const TAG_GPS_ALTITUDE: &str = "GPSAltitude";
pub const TAG_GPS_ALTITUDE_REF: &str = "GPSAltitudeRef";
pub const TAG_GPS_DATESTAMP: &str = "GPSDateStamp";
pub const TAG_GPS_LATITUDE: &str = "GPSLatitude";
pub const TAG_GPS_LATITUDE_REF: &str = "GPSLatitudeRef";
pub const TAG_GPS_LONGITUDE: &str = "GPSLongitude";
pub const TAG_GPS_LONGITUDE_REF: &str = "GPSLongitudeRef";
pub const TAG_GPS_PROCESSING_METHOD: &str = "GPSProcessingMethod";
pub const TAG_GPS_TIMESTAMP: &str = "GPSTimeStamp";
pub const TAG_IMAGE_WIDTH: &str = "ImageWidth";
pub const TAG_IMAGE_LENGTH: &str = "ImageLength";
pub const TAG_ISO: &str = "ISOSpeedRatings";
pub const TAG_MAKE: &str = "Make";
pub const TAG_MODEL: &str = "Model";
pub const TAG_ORIENTATION: &str = "Orientation";
pub const TAG_WHITE_BALANCE: &str = "WhiteBalance";

/// Tags carried over to a downsampled copy. Pixel dimensions are recomputed.
pub const RESIZE_COPY_TAGS: [&str; 19] = [
    TAG_APERTURE,
    TAG_DATETIME,
    TAG_EXPOSURE_TIME,
    TAG_FLASH,
    TAG_FOCAL_LENGTH,
    TAG_GPS_ALTITUDE,
    TAG_GPS_ALTITUDE_REF,
    TAG_GPS_DATESTAMP,
    TAG_GPS_LATITUDE,
    TAG_GPS_LATITUDE_REF,
    TAG_GPS_LONGITUDE,
    TAG_GPS_LONGITUDE_REF,
    TAG_GPS_PROCESSING_METHOD,
    TAG_GPS_TIMESTAMP,
    TAG_ISO,
    TAG_MAKE,
    TAG_MODEL,
    TAG_ORIENTATION,
    TAG_WHITE_BALANCE,
];

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhotoTags {
    tags: BTreeMap<String, String>,
}

impl PhotoTags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the full tag set for a freshly processed capture.
    ///
    /// `dimensions` are those of the bytes actually written; `None` when the
    /// codec could not read them.
    pub fn for_capture(
        job: &CaptureJob,
        device: &DeviceInfo,
        camera: Option<&CameraParams>,
        dimensions: Option<(u32, u32)>,
    ) -> Self {
        let mut tags = Self::new();

        if let Some(fix) = &job.fix {
            tags.set_location(fix);
        }
        if let Some((width, height)) = dimensions {
            tags.set_dimensions(width, height);
        }
        tags.set(TAG_DATETIME, exif_datetime(&job.captured_at));
        tags.set(TAG_MAKE, device.make.as_str());
        tags.set(TAG_MODEL, device.model.as_str());
        if let Some(params) = camera {
            tags.set_camera(params);
        }
        tags
    }

    pub fn set(&mut self, tag: &str, value: impl Into<String>) {
        self.tags.insert(tag.to_string(), value.into());
    }

    pub fn get(&self, tag: &str) -> Option<&str> {
        self.tags.get(tag).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tags.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn set_location(&mut self, fix: &Fix) {
        self.set(TAG_GPS_LATITUDE, to_dms_rational(fix.latitude));
        self.set(TAG_GPS_LATITUDE_REF, latitude_ref(fix.latitude));
        self.set(TAG_GPS_LONGITUDE, to_dms_rational(fix.longitude));
        self.set(TAG_GPS_LONGITUDE_REF, longitude_ref(fix.longitude));

        let altitude = fix.altitude.round();
        self.set(TAG_GPS_ALTITUDE_REF, if altitude < 0.0 { "1" } else { "0" });
        self.set(TAG_GPS_ALTITUDE, format!("{}/1", altitude.abs() as i64));

        if let Some(taken) = Utc.timestamp_millis_opt(fix.timestamp_ms).single() {
            self.set(TAG_GPS_DATESTAMP, taken.format("%Y:%m:%d").to_string());
            self.set(TAG_GPS_TIMESTAMP, taken.format("%-H/1,%-M/1,%-S/1").to_string());
        }
        self.set(TAG_GPS_PROCESSING_METHOD, fix.source.name());
    }

    fn set_dimensions(&mut self, width: u32, height: u32) {
        self.set(TAG_IMAGE_WIDTH, width.to_string());
        self.set(TAG_IMAGE_LENGTH, height.to_string());
    }

    fn set_camera(&mut self, params: &CameraParams) {
        self.set(TAG_FLASH, params.flash.exif_value().to_string());
        if let Some(focal) = params.focal_length_mm.filter(|f| f.is_finite() && *f > 0.0) {
            self.set(TAG_FOCAL_LENGTH, format!("{}/1000", (focal * 1000.0).round() as i64));
        }
        if let Some(wb) = params.white_balance {
            self.set(TAG_WHITE_BALANCE, wb.exif_value().to_string());
        }
        if let Some(aperture) = params.aperture.as_deref().filter(|a| !a.is_empty()) {
            self.set(TAG_APERTURE, aperture);
        }
    }

    /// Tag set for a downsampled copy: whitelisted tags plus new dimensions
    pub fn resized(&self, width: u32, height: u32) -> Self {
        let mut copy = Self::new();
        for tag in RESIZE_COPY_TAGS {
            if let Some(value) = self.get(tag) {
                copy.set(tag, value);
            }
        }
        copy.set_dimensions(width, height);
        copy
    }

    /// Signed decimal latitude decoded from the DMS tags
    pub fn latitude(&self) -> Option<f64> {
        let unsigned = from_dms_rational(self.get(TAG_GPS_LATITUDE)?)?;
        Some(signed_coordinate(unsigned, self.get(TAG_GPS_LATITUDE_REF)?))
    }

    pub fn longitude(&self) -> Option<f64> {
        let unsigned = from_dms_rational(self.get(TAG_GPS_LONGITUDE)?)?;
        Some(signed_coordinate(unsigned, self.get(TAG_GPS_LONGITUDE_REF)?))
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        let width = self.get(TAG_IMAGE_WIDTH)?.parse().ok()?;
        let height = self.get(TAG_IMAGE_LENGTH)?.parse().ok()?;
        Some((width, height))
    }
}

pub fn exif_datetime<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format("%Y:%m:%d %H:%M:%S").to_string()
}

/// `yyyy-MM-dd_HH-mm-ss_SSS.jpg` in local time
pub fn photo_filename(captured_at: &DateTime<Local>) -> String {
    captured_at.format("%Y-%m-%d_%H-%M-%S_%3f.jpg").to_string()
}
