// geodesy.rs - distances between fixes and EXIF-style coordinate encoding
//
// Coordinates are stored in photo metadata as three unsigned rationals
// (degrees, minutes, seconds) plus a hemisphere letter. Seconds carry three
// decimal places, so the encoding resolves 1/1000 of an arc-second.

use geo::{GeodesicDistance, Point};

use crate::types::Fix;

/// Denominator used for the seconds rational
pub const DMS_SECONDS_DENOMINATOR: i64 = 1000;

/// Geodesic (WGS84 ellipsoid) distance between two fixes in metres
pub fn distance_m(from: &Fix, to: &Fix) -> f64 {
    distance_between(from.latitude, from.longitude, to.latitude, to.longitude)
}

/// Geodesic distance in metres between two lat/lon pairs given in degrees
pub fn distance_between(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let a = Point::new(lon1, lat1);
    let b = Point::new(lon2, lat2);
    a.geodesic_distance(&b)
}

pub fn latitude_ref(latitude: f64) -> &'static str {
    if latitude < 0.0 {
        "S"
    } else {
        "N"
    }
}

pub fn longitude_ref(longitude: f64) -> &'static str {
    if longitude < 0.0 {
        "W"
    } else {
        "E"
    }
}

/// Encode a latitude or longitude as `D/1,M/1,S/1000` (sign dropped).
///
/// -79.948862 becomes `79/1,56/1,55903/1000`.
pub fn to_dms_rational(value: f64) -> String {
    let mut rem = value.abs();
    let degrees = rem.trunc() as i64;
    rem = (rem - degrees as f64) * 60.0;
    let minutes = rem.trunc() as i64;
    rem = (rem - minutes as f64) * 60.0;
    let millis = (rem * DMS_SECONDS_DENOMINATOR as f64).trunc() as i64;

    format!(
        "{}/1,{}/1,{}/{}",
        degrees, minutes, millis, DMS_SECONDS_DENOMINATOR
    )
}

/// Decode a `D/1,M/1,S/1000` triple into unsigned decimal degrees.
/// Tolerates a trailing comma and arbitrary (non-zero) denominators.
pub fn from_dms_rational(encoded: &str) -> Option<f64> {
    let parts: Vec<f64> = encoded
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(parse_rational)
        .collect::<Option<Vec<_>>>()?;

    if parts.len() != 3 {
        return None;
    }
    Some(parts[0] + parts[1] / 60.0 + parts[2] / 3600.0)
}

/// Apply the hemisphere letter to an unsigned decoded coordinate
pub fn signed_coordinate(unsigned: f64, reference: &str) -> f64 {
    match reference {
        "S" | "W" => -unsigned,
        _ => unsigned,
    }
}

fn parse_rational(part: &str) -> Option<f64> {
    let (num, den) = match part.split_once('/') {
        Some((n, d)) => (n.trim().parse::<f64>().ok()?, d.trim().parse::<f64>().ok()?),
        None => (part.parse::<f64>().ok()?, 1.0),
    };
    if den == 0.0 {
        return None;
    }
    Some(num / den)
}
