use serde::{Deserialize, Serialize};
use std::fmt;

/// Location provider channel a fix came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationSource {
    Gps,
    Network,
    Passive,
}

impl LocationSource {
    pub const ALL: [LocationSource; 3] = [
        LocationSource::Gps,
        LocationSource::Network,
        LocationSource::Passive,
    ];

    pub fn index(self) -> usize {
        match self {
            LocationSource::Gps => 0,
            LocationSource::Network => 1,
            LocationSource::Passive => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            LocationSource::Gps => "gps",
            LocationSource::Network => "network",
            LocationSource::Passive => "passive",
        }
    }

    /// Map the integer codes used across the JNI boundary
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(LocationSource::Gps),
            1 => Some(LocationSource::Network),
            2 => Some(LocationSource::Passive),
            _ => None,
        }
    }
}

impl fmt::Display for LocationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single location reading.
///
/// `accuracy` is the radius of 68% confidence in metres (smaller is better),
/// `timestamp_ms` is wall-clock milliseconds since the Unix epoch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub source: LocationSource,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub accuracy: f64,
    pub speed: f64,
    pub timestamp_ms: i64,
}

impl Fix {
    pub fn new(
        source: LocationSource,
        latitude: f64,
        longitude: f64,
        altitude: f64,
        accuracy: f64,
        speed: f64,
        timestamp_ms: i64,
    ) -> Self {
        Self {
            source,
            latitude,
            longitude,
            altitude,
            accuracy,
            speed,
            timestamp_ms,
        }
    }
}

/// Device rotation at capture time, quantised to right angles
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Orientation {
    /// Quantise a raw orientation sensor reading (0..360).
    /// Negative readings mean "unknown" and yield `None`.
    pub fn from_sensor_degrees(degrees: i32) -> Option<Self> {
        if degrees < 0 {
            return None;
        }
        let degrees = degrees % 360;
        let quantised = if degrees <= 45 || degrees > 315 {
            Orientation::Deg0
        } else if degrees <= 135 {
            Orientation::Deg90
        } else if degrees <= 225 {
            Orientation::Deg180
        } else {
            Orientation::Deg270
        };
        Some(quantised)
    }

    pub fn degrees(self) -> u16 {
        match self {
            Orientation::Deg0 => 0,
            Orientation::Deg90 => 90,
            Orientation::Deg180 => 180,
            Orientation::Deg270 => 270,
        }
    }

    pub fn from_degrees(degrees: u16) -> Option<Self> {
        match degrees {
            0 => Some(Orientation::Deg0),
            90 => Some(Orientation::Deg90),
            180 => Some(Orientation::Deg180),
            270 => Some(Orientation::Deg270),
            _ => None,
        }
    }

    /// Portrait-held device: the stored image must be taller than wide
    pub fn is_upright(self) -> bool {
        matches!(self, Orientation::Deg0 | Orientation::Deg180)
    }
}
