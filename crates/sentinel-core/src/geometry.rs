//! Geometry engine: buffered containment tests for circles and polygons.
//!
//! Shapes are validated when constructed, so every query on a built shape is
//! total. A point on an edge (within [`EDGE_TOLERANCE_M`]) is classified as
//! `InBuffer`, never `Outside`.
//!
//! Circles are measured with the haversine distance. Polygons are measured in
//! a local tangent plane centered on the vertex mean; the buffer band is the
//! exact planar offset of the ring (distance to the nearest edge, rounded
//! corners). The plane's scale drifts from the true ground scale away from its
//! origin latitude, so the band is widened by the worst drift over the
//! polygon's vertices. The widened band is never narrower than the requested
//! buffer; the excess is `buffer * scale_error`, e.g. about 3e-4 of the buffer
//! for a 2 km polygon at 60° latitude.

use serde::Serialize;

use crate::error::GeometryError;
use crate::models::{ContainmentResult, GeoPoint};
use crate::spatial::{
    closest_point_on_segment, distance_m, planar_distance, point_at_distance_from,
    segments_intersect_2d, LocalFrame,
};

/// Distance from an edge under which a point counts as lying on it.
pub const EDGE_TOLERANCE_M: f64 = 1e-3;

/// Smallest ring area accepted for a polygon.
const MIN_POLYGON_AREA_M2: f64 = 1.0;

/// Extra clearance added when pushing a point out of an exclusion zone.
const EXIT_MARGIN_M: f64 = 1.0;

/// Containment plus signed distance to the boundary edge (positive inside).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub containment: ContainmentResult,
    pub depth_m: f64,
}

fn classify(depth_m: f64, buffer_m: f64) -> ContainmentResult {
    if depth_m.abs() <= EDGE_TOLERANCE_M {
        ContainmentResult::InBuffer
    } else if depth_m > 0.0 {
        ContainmentResult::Inside
    } else if -depth_m <= buffer_m {
        ContainmentResult::InBuffer
    } else {
        ContainmentResult::Outside
    }
}

fn check_buffer(buffer_m: f64) -> Result<(), GeometryError> {
    if !buffer_m.is_finite() || buffer_m < 0.0 {
        return Err(GeometryError::invalid(
            "",
            format!("buffer must be a non-negative distance, got {buffer_m}"),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Circle {
    center: GeoPoint,
    radius_m: f64,
    buffer_m: f64,
}

impl Circle {
    pub fn new(center: GeoPoint, radius_m: f64, buffer_m: f64) -> Result<Self, GeometryError> {
        if !center.is_valid() {
            return Err(GeometryError::invalid(
                "",
                format!(
                    "center {},{} is out of range",
                    center.latitude, center.longitude
                ),
            ));
        }
        if !radius_m.is_finite() || radius_m <= 0.0 {
            return Err(GeometryError::invalid(
                "",
                format!("radius must be positive, got {radius_m}"),
            ));
        }
        check_buffer(buffer_m)?;
        Ok(Self {
            center: GeoPoint::new(center.latitude, center.longitude),
            radius_m,
            buffer_m,
        })
    }

    pub fn center(&self) -> GeoPoint {
        self.center
    }

    pub fn radius_m(&self) -> f64 {
        self.radius_m
    }

    pub fn buffer_m(&self) -> f64 {
        self.buffer_m
    }

    pub fn measure(&self, point: &GeoPoint) -> Measurement {
        let depth_m = self.radius_m - distance_m(&self.center, point);
        Measurement {
            containment: classify(depth_m, self.buffer_m),
            depth_m,
        }
    }

    fn pull_inward(&self, point: &GeoPoint) -> GeoPoint {
        let target = (self.radius_m - self.buffer_m).max(0.0);
        if distance_m(&self.center, point) <= EDGE_TOLERANCE_M || target <= 0.0 {
            return self.center;
        }
        point_at_distance_from(&self.center, point, target)
    }

    fn push_outward(&self, point: &GeoPoint) -> GeoPoint {
        let target = self.radius_m + 2.0 * self.buffer_m + EXIT_MARGIN_M;
        if distance_m(&self.center, point) <= EDGE_TOLERANCE_M {
            // Any direction works from the center; pick north.
            let north = GeoPoint::new(self.center.latitude + 1e-6, self.center.longitude);
            return point_at_distance_from(&self.center, &north, target);
        }
        point_at_distance_from(&self.center, point, target)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Polygon {
    vertices: Vec<GeoPoint>,
    buffer_m: f64,
    #[serde(skip)]
    frame: LocalFrame,
    #[serde(skip)]
    ring: Vec<(f64, f64)>,
    effective_buffer_m: f64,
    /// Ring winds counter-clockwise in the east-north plane
    #[serde(skip)]
    counter_clockwise: bool,
}

impl Polygon {
    /// Validate and build a polygon. The ring may be given open or closed.
    pub fn new(vertices: Vec<GeoPoint>, buffer_m: f64) -> Result<Self, GeometryError> {
        check_buffer(buffer_m)?;
        if let Some(bad) = vertices.iter().find(|v| !v.is_valid()) {
            return Err(GeometryError::invalid(
                "",
                format!("vertex {},{} is out of range", bad.latitude, bad.longitude),
            ));
        }

        let mut vertices: Vec<GeoPoint> = vertices
            .into_iter()
            .map(|v| GeoPoint::new(v.latitude, v.longitude))
            .collect();
        if vertices.len() > 3 && vertices.first() == vertices.last() {
            vertices.pop();
        }
        if vertices.len() < 3 {
            return Err(GeometryError::invalid(
                "",
                format!("polygon needs at least 3 vertices, got {}", vertices.len()),
            ));
        }

        let count = vertices.len() as f64;
        let origin_lat = vertices.iter().map(|v| v.latitude).sum::<f64>() / count;
        let origin_lon = vertices.iter().map(|v| v.longitude).sum::<f64>() / count;
        let frame = LocalFrame::new(origin_lat, origin_lon);
        let ring: Vec<(f64, f64)> = vertices.iter().map(|v| frame.project(v)).collect();

        validate_ring(&ring)?;

        let area = signed_area(&ring);
        let scale_error = vertices
            .iter()
            .map(|v| frame.scale_error_at(v.latitude))
            .fold(0.0_f64, f64::max);

        Ok(Self {
            vertices,
            buffer_m,
            frame,
            ring,
            effective_buffer_m: buffer_m * (1.0 + scale_error),
            counter_clockwise: area > 0.0,
        })
    }

    pub fn vertices(&self) -> &[GeoPoint] {
        &self.vertices
    }

    pub fn buffer_m(&self) -> f64 {
        self.buffer_m
    }

    /// Buffer actually applied, including the projection allowance.
    pub fn effective_buffer_m(&self) -> f64 {
        self.effective_buffer_m
    }

    pub fn measure(&self, point: &GeoPoint) -> Measurement {
        let q = self.frame.project(point);
        let (closest, _) = self.nearest_edge_point(q);
        let distance = planar_distance(q, closest);
        let depth_m = if self.ring_contains(q) {
            distance
        } else {
            -distance
        };
        Measurement {
            containment: classify(depth_m, self.effective_buffer_m),
            depth_m,
        }
    }

    fn ring_contains(&self, (x, y): (f64, f64)) -> bool {
        let n = self.ring.len();
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (xi, yi) = self.ring[i];
            let (xj, yj) = self.ring[j];
            if ((yi > y) != (yj > y)) && (x < (xj - xi) * (y - yi) / (yj - yi) + xi) {
                inside = !inside;
            }
            j = i;
        }
        inside
    }

    fn nearest_edge_point(&self, q: (f64, f64)) -> ((f64, f64), usize) {
        let n = self.ring.len();
        let mut best = (self.ring[0], 0usize);
        let mut best_distance = f64::INFINITY;
        for i in 0..n {
            let candidate = closest_point_on_segment(q, self.ring[i], self.ring[(i + 1) % n]);
            let distance = planar_distance(q, candidate);
            if distance < best_distance {
                best_distance = distance;
                best = (candidate, i);
            }
        }
        best
    }

    /// Unit normal of edge `index` pointing into the polygon.
    fn inward_normal(&self, index: usize) -> (f64, f64) {
        let a = self.ring[index];
        let b = self.ring[(index + 1) % self.ring.len()];
        let (dx, dy) = (b.0 - a.0, b.1 - a.1);
        let len = (dx * dx + dy * dy).sqrt().max(1e-12);
        if self.counter_clockwise {
            (-dy / len, dx / len)
        } else {
            (dy / len, -dx / len)
        }
    }

    fn pull_inward(&self, point: &GeoPoint) -> GeoPoint {
        let q = self.frame.project(point);
        let (closest, edge) = self.nearest_edge_point(q);
        let (nx, ny) = self.inward_normal(edge);
        let candidate = (
            closest.0 + nx * self.buffer_m,
            closest.1 + ny * self.buffer_m,
        );
        if self.buffer_m <= 0.0 || self.ring_contains(candidate) {
            return self.frame.unproject(candidate.0, candidate.1);
        }

        // Concave corner: step toward the vertex mean instead.
        let toward_origin = (-closest.0, -closest.1);
        let len = planar_distance(closest, (0.0, 0.0));
        if len > EDGE_TOLERANCE_M && self.ring_contains((0.0, 0.0)) {
            let step = self.buffer_m.min(len);
            let fallback = (
                closest.0 + toward_origin.0 / len * step,
                closest.1 + toward_origin.1 / len * step,
            );
            return self.frame.unproject(fallback.0, fallback.1);
        }
        self.frame.unproject(closest.0, closest.1)
    }

    fn push_outward(&self, point: &GeoPoint) -> GeoPoint {
        let q = self.frame.project(point);
        let (closest, edge) = self.nearest_edge_point(q);
        let (nx, ny) = self.inward_normal(edge);
        let distance = 2.0 * self.effective_buffer_m + EXIT_MARGIN_M;
        self.frame
            .unproject(closest.0 - nx * distance, closest.1 - ny * distance)
    }
}

fn signed_area(ring: &[(f64, f64)]) -> f64 {
    let n = ring.len();
    let mut twice_area = 0.0;
    for i in 0..n {
        let (x1, y1) = ring[i];
        let (x2, y2) = ring[(i + 1) % n];
        twice_area += x1 * y2 - x2 * y1;
    }
    twice_area / 2.0
}

fn validate_ring(ring: &[(f64, f64)]) -> Result<(), GeometryError> {
    let n = ring.len();

    for i in 0..n {
        if planar_distance(ring[i], ring[(i + 1) % n]) <= EDGE_TOLERANCE_M {
            return Err(GeometryError::invalid(
                "",
                format!("vertices {} and {} coincide", i, (i + 1) % n),
            ));
        }
    }

    if signed_area(ring).abs() < MIN_POLYGON_AREA_M2 {
        return Err(GeometryError::invalid(
            "",
            "vertices are collinear (ring has no area)",
        ));
    }

    for i in 0..n {
        let a = ring[i];
        let b = ring[(i + 1) % n];
        let c = ring[(i + 2) % n];
        let cross = (b.0 - a.0) * (c.1 - b.1) - (b.1 - a.1) * (c.0 - b.0);
        let dot = (b.0 - a.0) * (c.0 - b.0) + (b.1 - a.1) * (c.1 - b.1);
        if cross.abs() <= 1e-9 && dot < 0.0 {
            return Err(GeometryError::invalid(
                "",
                format!("ring folds back on itself at vertex {}", (i + 1) % n),
            ));
        }
    }

    for i in 0..n {
        for j in (i + 2)..n {
            if i == 0 && j == n - 1 {
                continue;
            }
            if segments_intersect_2d(ring[i], ring[(i + 1) % n], ring[j], ring[(j + 1) % n]) {
                return Err(GeometryError::invalid(
                    "",
                    format!("edges {i} and {j} intersect (ring is not simple)"),
                ));
            }
        }
    }

    Ok(())
}

/// A boundary shape with its safety buffer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Boundary {
    Circle(Circle),
    Polygon(Polygon),
}

impl Boundary {
    pub fn measure(&self, point: &GeoPoint) -> Measurement {
        match self {
            Boundary::Circle(circle) => circle.measure(point),
            Boundary::Polygon(polygon) => polygon.measure(point),
        }
    }

    pub fn contains(&self, point: &GeoPoint) -> ContainmentResult {
        self.measure(point).containment
    }

    /// Buffer band width used for classification.
    pub fn buffer_m(&self) -> f64 {
        match self {
            Boundary::Circle(circle) => circle.buffer_m,
            Boundary::Polygon(polygon) => polygon.effective_buffer_m,
        }
    }

    /// Projection onto the boundary, pulled inward by the buffer.
    pub fn nearest_safe_point(&self, point: &GeoPoint) -> GeoPoint {
        match self {
            Boundary::Circle(circle) => circle.pull_inward(point),
            Boundary::Polygon(polygon) => polygon.pull_inward(point),
        }
    }

    /// Projection onto the boundary, pushed outward past the buffer band.
    pub fn nearest_exit_point(&self, point: &GeoPoint) -> GeoPoint {
        match self {
            Boundary::Circle(circle) => circle.push_outward(point),
            Boundary::Polygon(polygon) => polygon.push_outward(point),
        }
    }
}

pub fn contains_circle(point: &GeoPoint, circle: &Circle) -> ContainmentResult {
    circle.measure(point).containment
}

pub fn contains_polygon(point: &GeoPoint, polygon: &Polygon) -> ContainmentResult {
    polygon.measure(point).containment
}
