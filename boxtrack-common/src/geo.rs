//! Geospatial checks: great-circle distance and destination proximity
//!
//! A scan counts as "at destination" when it lies within a fixed tolerance
//! of the shipment's nominal destination, widened by the accuracy radius the
//! capture device reported for that fix.

use serde::{Deserialize, Serialize};

use crate::models::{Coordinates, Scan, ScanPoint};
use crate::{Error, Result};

/// Earth radius used for haversine distances (WGS-84 equatorial radius)
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Base distance from the destination within which a scan counts as arrived
pub const DESTINATION_TOLERANCE_M: f64 = 5_000.0;

/// Highest zoom level returned by [`zoom_level`]
pub const MAX_ZOOM: u8 = 20;

/// Metres per pixel at zoom 0 on a 256 px Web Mercator tile
const METERS_PER_PIXEL_Z0: f64 = 156_543.033_92;

/// Great-circle (haversine) distance between two points, in metres
pub fn distance(a: &Coordinates, b: &Coordinates) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    // Rounding can push h marginally past 1.0 for antipodal points
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Whether a scan point lies within `tolerance_m` (+ its accuracy) of the destination
pub fn is_within_tolerance(destination: &Coordinates, point: &ScanPoint, tolerance_m: f64) -> bool {
    let threshold = tolerance_m + point.accuracy_m();
    distance(destination, &point.coordinates()) <= threshold
}

/// Whether a scan point counts as "at destination"
///
/// True iff the distance is at most 5000 m plus the reported accuracy
/// (0 when absent).
pub fn is_at_destination(destination: &Coordinates, point: &ScanPoint) -> bool {
    is_within_tolerance(destination, point, DESTINATION_TOLERANCE_M)
}

/// Persistence instruction for a scan whose destination flag flipped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanFlagUpdate {
    pub scan_id: String,
    #[serde(rename = "finalDestination")]
    pub at_destination: bool,
}

/// Recompute `at_destination` for every scan of one shipment
///
/// Scans whose flag changes are updated in place and reported; scans that
/// already agree with the destination are left untouched. Running it twice
/// returns nothing the second time.
pub fn reclassify_scans(
    destination: &Coordinates,
    scans: &mut [Scan],
    tolerance_m: f64,
) -> Vec<ScanFlagUpdate> {
    scans
        .iter_mut()
        .filter_map(|scan| {
            let at_destination = is_within_tolerance(destination, &scan.location.coords, tolerance_m);
            if at_destination == scan.at_destination {
                return None;
            }
            scan.at_destination = at_destination;
            Some(ScanFlagUpdate {
                scan_id: scan.id.clone(),
                at_destination,
            })
        })
        .collect()
}

/// Geographic center of a set of points (mean of unit vectors)
pub fn center(points: &[Coordinates]) -> Result<Coordinates> {
    if points.is_empty() {
        return Err(Error::EmptyCoordinates("center"));
    }

    let (mut x, mut y, mut z) = (0.0_f64, 0.0_f64, 0.0_f64);
    for point in points {
        let lat = point.latitude.to_radians();
        let lon = point.longitude.to_radians();
        x += lat.cos() * lon.cos();
        y += lat.cos() * lon.sin();
        z += lat.sin();
    }

    let n = points.len() as f64;
    let (x, y, z) = (x / n, y / n, z / n);
    let longitude = y.atan2(x);
    let latitude = z.atan2((x * x + y * y).sqrt());

    Ok(Coordinates::new(latitude.to_degrees(), longitude.to_degrees()))
}

/// Axis-aligned bounding box of a set of points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub south_west: Coordinates,
    pub north_east: Coordinates,
}

impl Bounds {
    /// Length of the box diagonal, in degrees
    pub fn diagonal_degrees(&self) -> f64 {
        let d_lat = self.north_east.latitude - self.south_west.latitude;
        let d_lon = self.north_east.longitude - self.south_west.longitude;
        (d_lat * d_lat + d_lon * d_lon).sqrt()
    }
}

pub fn bounds(points: &[Coordinates]) -> Result<Bounds> {
    let first = points.first().ok_or(Error::EmptyCoordinates("bounds"))?;

    let mut south_west = *first;
    let mut north_east = *first;
    for point in &points[1..] {
        south_west.latitude = south_west.latitude.min(point.latitude);
        south_west.longitude = south_west.longitude.min(point.longitude);
        north_east.latitude = north_east.latitude.max(point.latitude);
        north_east.longitude = north_east.longitude.max(point.longitude);
    }

    Ok(Bounds {
        south_west,
        north_east,
    })
}

/// Map zoom level that fits every point, clamped to `0..=MAX_ZOOM`
pub fn zoom_level(points: &[Coordinates]) -> Result<u8> {
    let diagonal = bounds(points)
        .map_err(|_| Error::EmptyCoordinates("zoom_level"))?
        .diagonal_degrees();

    if diagonal <= 0.0 {
        return Ok(MAX_ZOOM);
    }

    let zoom = ((METERS_PER_PIXEL_Z0 * 360.0) / diagonal / 200_000.0).log2().round();
    Ok(zoom.clamp(0.0, MAX_ZOOM as f64) as u8)
}
