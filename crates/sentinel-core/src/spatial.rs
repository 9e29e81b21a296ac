//! Spatial math for geofence evaluation.
//!
//! Distances between geographic points use the haversine formula. Polygon work
//! happens in a local East-North plane anchored at a reference point, with
//! latitude-aware meters-per-degree scaling.

use crate::models::GeoPoint;

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two points in meters.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Horizontal distance between two positions in meters.
pub fn distance_m(a: &GeoPoint, b: &GeoPoint) -> f64 {
    haversine_distance(a.latitude, a.longitude, b.latitude, b.longitude)
}

/// Meters per degree of latitude at a given latitude (WGS84 approximation).
pub fn meters_per_deg_lat(lat_deg: f64) -> f64 {
    let lat_rad = lat_deg.to_radians();
    111_132.954 - 559.822 * (2.0 * lat_rad).cos() + 1.175 * (4.0 * lat_rad).cos()
        - 0.0023 * (6.0 * lat_rad).cos()
}

/// Meters per degree of longitude at a given latitude (WGS84 approximation).
pub fn meters_per_deg_lon(lat_deg: f64) -> f64 {
    let lat_rad = lat_deg.to_radians();
    111_412.84 * lat_rad.cos() - 93.5 * (3.0 * lat_rad).cos() + 0.118 * (5.0 * lat_rad).cos()
}

/// Initial bearing from point 1 to point 2 in radians (0 = north, π/2 = east).
pub fn bearing(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let x = delta_lambda.sin() * phi2.cos();
    let y = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lambda.cos();

    x.atan2(y)
}

/// Offset a position by distance and bearing along a great circle.
pub fn offset_by_bearing(lat: f64, lon: f64, distance_m: f64, bearing_rad: f64) -> (f64, f64) {
    if distance_m.abs() <= f64::EPSILON {
        return (lat, lon);
    }

    let lat1 = lat.to_radians();
    let lon1 = lon.to_radians();
    let angular_distance = distance_m / EARTH_RADIUS_M;

    let sin_lat1 = lat1.sin();
    let cos_lat1 = lat1.cos();
    let sin_ad = angular_distance.sin();
    let cos_ad = angular_distance.cos();

    let sin_lat2 = sin_lat1 * cos_ad + cos_lat1 * sin_ad * bearing_rad.cos();
    let lat2 = sin_lat2.clamp(-1.0, 1.0).asin();

    let y = bearing_rad.sin() * sin_ad * cos_lat1;
    let x = cos_ad - sin_lat1 * sin_lat2;
    let mut lon2 = lon1 + y.atan2(x);
    lon2 =
        (lon2 + std::f64::consts::PI).rem_euclid(2.0 * std::f64::consts::PI) - std::f64::consts::PI;

    (lat2.to_degrees(), lon2.to_degrees())
}

/// Move `point` toward or away from `anchor` so it ends up `distance_m` from it.
///
/// Keeps the original altitude.
pub fn point_at_distance_from(anchor: &GeoPoint, toward: &GeoPoint, distance_m: f64) -> GeoPoint {
    let heading = bearing(
        anchor.latitude,
        anchor.longitude,
        toward.latitude,
        toward.longitude,
    );
    let (lat, lon) = offset_by_bearing(anchor.latitude, anchor.longitude, distance_m, heading);
    GeoPoint {
        latitude: lat,
        longitude: lon,
        altitude: toward.altitude,
    }
}

/// Local East-North tangent plane in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalFrame {
    origin_lat: f64,
    origin_lon: f64,
    m_per_deg_lat: f64,
    m_per_deg_lon: f64,
}

impl LocalFrame {
    pub fn new(origin_lat: f64, origin_lon: f64) -> Self {
        Self {
            origin_lat,
            origin_lon,
            m_per_deg_lat: meters_per_deg_lat(origin_lat).max(1e-9),
            m_per_deg_lon: meters_per_deg_lon(origin_lat).max(1e-9),
        }
    }

    /// (east, north) offset of a point from the origin.
    pub fn project(&self, point: &GeoPoint) -> (f64, f64) {
        (
            (point.longitude - self.origin_lon) * self.m_per_deg_lon,
            (point.latitude - self.origin_lat) * self.m_per_deg_lat,
        )
    }

    pub fn unproject(&self, east_m: f64, north_m: f64) -> GeoPoint {
        GeoPoint::new(
            self.origin_lat + north_m / self.m_per_deg_lat,
            self.origin_lon + east_m / self.m_per_deg_lon,
        )
    }

    /// Relative error of this frame's east-west scale at another latitude.
    ///
    /// North-south scale varies far less and is dominated by this term.
    pub fn scale_error_at(&self, lat_deg: f64) -> f64 {
        let local = meters_per_deg_lon(lat_deg).max(1e-9);
        (self.m_per_deg_lon / local - 1.0).abs()
    }
}

/// Closest point on segment `a`-`b` to `p` in planar coordinates.
pub fn closest_point_on_segment(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> (f64, f64) {
    let sx = b.0 - a.0;
    let sy = b.1 - a.1;
    let seg_len_sq = sx * sx + sy * sy;
    if seg_len_sq < 1e-12 {
        return a;
    }
    let t = (((p.0 - a.0) * sx + (p.1 - a.1) * sy) / seg_len_sq).clamp(0.0, 1.0);
    (a.0 + t * sx, a.1 + t * sy)
}

pub fn planar_distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

pub(crate) fn segments_intersect_2d(
    a1: (f64, f64),
    a2: (f64, f64),
    b1: (f64, f64),
    b2: (f64, f64),
) -> bool {
    // Tolerance in meters on locally projected coordinates.
    const EPS_M: f64 = 1e-6;

    fn orient(p: (f64, f64), q: (f64, f64), r: (f64, f64)) -> f64 {
        (q.0 - p.0) * (r.1 - p.1) - (q.1 - p.1) * (r.0 - p.0)
    }

    fn within(a: f64, b: f64, value: f64) -> bool {
        let min = a.min(b) - EPS_M;
        let max = a.max(b) + EPS_M;
        value >= min && value <= max
    }

    fn on_segment(p: (f64, f64), q: (f64, f64), r: (f64, f64)) -> bool {
        within(p.0, q.0, r.0) && within(p.1, q.1, r.1)
    }

    let o1 = orient(a1, a2, b1);
    let o2 = orient(a1, a2, b2);
    let o3 = orient(b1, b2, a1);
    let o4 = orient(b1, b2, a2);

    if o1.abs() <= EPS_M && on_segment(a1, a2, b1) {
        return true;
    }
    if o2.abs() <= EPS_M && on_segment(a1, a2, b2) {
        return true;
    }
    if o3.abs() <= EPS_M && on_segment(b1, b2, a1) {
        return true;
    }
    if o4.abs() <= EPS_M && on_segment(b1, b2, a2) {
        return true;
    }

    let a_crosses = (o1 > EPS_M && o2 < -EPS_M) || (o1 < -EPS_M && o2 > EPS_M);
    let b_crosses = (o3 > EPS_M && o4 < -EPS_M) || (o3 < -EPS_M && o4 > EPS_M);
    a_crosses && b_crosses
}
