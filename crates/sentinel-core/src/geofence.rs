//! Geofence monitor: evaluates vehicle positions against the active zone set.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::error::GeometryError;
use crate::geometry::{Boundary, Circle, Polygon};
use crate::models::{
    AltitudeStatus, BreachKind, ContainmentResult, GeoPoint, GeofenceBreach, GeofenceStatus,
    VehicleState,
};
use crate::spatial::distance_m;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneRole {
    /// Area the vehicle may operate in
    #[default]
    Permitted,
    /// No-fly area
    Exclusion,
}

/// A named boundary with its role.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Zone {
    pub name: String,
    pub role: ZoneRole,
    pub boundary: Boundary,
}

impl Zone {
    pub fn circle(
        name: &str,
        role: ZoneRole,
        center: GeoPoint,
        radius_m: f64,
        buffer_m: f64,
    ) -> Result<Self, GeometryError> {
        let circle = Circle::new(center, radius_m, buffer_m).map_err(|e| e.for_zone(name))?;
        Ok(Self {
            name: name.to_string(),
            role,
            boundary: Boundary::Circle(circle),
        })
    }

    pub fn polygon(
        name: &str,
        role: ZoneRole,
        vertices: Vec<GeoPoint>,
        buffer_m: f64,
    ) -> Result<Self, GeometryError> {
        let polygon = Polygon::new(vertices, buffer_m).map_err(|e| e.for_zone(name))?;
        Ok(Self {
            name: name.to_string(),
            role,
            boundary: Boundary::Polygon(polygon),
        })
    }

    /// Verdict and safety clearance of a point relative to this zone alone.
    ///
    /// Clearance is positive when the point is on the safe side: depth inside a
    /// permitted zone, distance beyond the buffer band of an exclusion zone.
    fn judge(&self, point: &GeoPoint) -> Verdict {
        let measured = self.boundary.measure(point);
        match self.role {
            ZoneRole::Permitted => Verdict {
                containment: measured.containment,
                clearance_m: measured.depth_m,
            },
            ZoneRole::Exclusion => Verdict {
                containment: match measured.containment {
                    ContainmentResult::Inside => ContainmentResult::Outside,
                    ContainmentResult::InBuffer => ContainmentResult::InBuffer,
                    ContainmentResult::Outside => ContainmentResult::Inside,
                },
                clearance_m: -measured.depth_m - self.boundary.buffer_m(),
            },
        }
    }

    fn safe_point_from(&self, point: &GeoPoint) -> GeoPoint {
        match self.role {
            ZoneRole::Permitted => self.boundary.nearest_safe_point(point),
            ZoneRole::Exclusion => self.boundary.nearest_exit_point(point),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Verdict {
    containment: ContainmentResult,
    clearance_m: f64,
}

/// Validated set of zones plus the altitude band.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeofenceSet {
    zones: Vec<Zone>,
    min_altitude_m: f64,
    max_altitude_m: f64,
}

impl GeofenceSet {
    pub fn new(
        zones: Vec<Zone>,
        min_altitude_m: f64,
        max_altitude_m: f64,
    ) -> Result<Self, GeometryError> {
        if !min_altitude_m.is_finite() || !max_altitude_m.is_finite() || min_altitude_m >= max_altitude_m
        {
            return Err(GeometryError::InvalidAltitudeBand {
                min_m: min_altitude_m,
                max_m: max_altitude_m,
            });
        }
        let mut names = HashSet::new();
        for zone in &zones {
            if !names.insert(zone.name.as_str()) {
                return Err(GeometryError::DuplicateZone(zone.name.clone()));
            }
        }
        if !zones.iter().any(|zone| zone.role == ZoneRole::Permitted) {
            return Err(GeometryError::NoPermittedZone);
        }
        Ok(Self {
            zones,
            min_altitude_m,
            max_altitude_m,
        })
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn min_altitude_m(&self) -> f64 {
        self.min_altitude_m
    }

    pub fn max_altitude_m(&self) -> f64 {
        self.max_altitude_m
    }

    pub fn clamp_altitude(&self, altitude_m: f64) -> f64 {
        altitude_m.clamp(self.min_altitude_m, self.max_altitude_m)
    }

    pub fn altitude_status(&self, altitude_m: Option<f64>) -> AltitudeStatus {
        match altitude_m {
            Some(alt) if alt < self.min_altitude_m => AltitudeStatus::BelowFloor,
            Some(alt) if alt > self.max_altitude_m => AltitudeStatus::AboveCeiling,
            _ => AltitudeStatus::Within,
        }
    }

    /// Aggregate verdict: union over permitted zones, worst over exclusion zones.
    fn judge(&self, point: &GeoPoint) -> (usize, Verdict) {
        let mut best_permitted: Option<(usize, Verdict)> = None;
        let mut worst_exclusion: Option<(usize, Verdict)> = None;

        for (index, zone) in self.zones.iter().enumerate() {
            let verdict = zone.judge(point);
            match zone.role {
                ZoneRole::Permitted => {
                    let better = best_permitted.map_or(true, |(_, best)| {
                        (verdict.containment, -verdict.clearance_m)
                            < (best.containment, -best.clearance_m)
                    });
                    if better {
                        best_permitted = Some((index, verdict));
                    }
                }
                ZoneRole::Exclusion => {
                    let worse = worst_exclusion.map_or(true, |(_, worst)| {
                        (verdict.containment, -verdict.clearance_m)
                            > (worst.containment, -worst.clearance_m)
                    });
                    if worse {
                        worst_exclusion = Some((index, verdict));
                    }
                }
            }
        }

        // GeofenceSet::new guarantees a permitted zone.
        let permitted = best_permitted.unwrap_or((
            0,
            Verdict {
                containment: ContainmentResult::Outside,
                clearance_m: f64::NEG_INFINITY,
            },
        ));
        match worst_exclusion {
            Some(exclusion)
                if (exclusion.1.containment, -exclusion.1.clearance_m)
                    > (permitted.1.containment, -permitted.1.clearance_m) =>
            {
                exclusion
            }
            _ => permitted,
        }
    }

    /// Closest point that the set classifies as not Outside, preferring Inside.
    fn nearest_safe_point(&self, point: &GeoPoint, limiting: usize) -> GeoPoint {
        let mut candidates: Vec<GeoPoint> = self
            .zones
            .iter()
            .filter(|zone| {
                zone.role == ZoneRole::Permitted
                    || zone.judge(point).containment != ContainmentResult::Inside
            })
            .map(|zone| zone.safe_point_from(point))
            .collect();
        // Chain corrections once: a point pushed out of one zone may land in another.
        let second_pass: Vec<GeoPoint> = candidates
            .iter()
            .map(|candidate| {
                let (index, verdict) = self.judge(candidate);
                if verdict.containment == ContainmentResult::Inside {
                    *candidate
                } else {
                    self.zones[index].safe_point_from(candidate)
                }
            })
            .collect();
        candidates.extend(second_pass);

        let mut best: Option<(ContainmentResult, f64, GeoPoint)> = None;
        for candidate in candidates {
            let containment = self.judge(&candidate).1.containment;
            if containment == ContainmentResult::Outside {
                continue;
            }
            let distance = distance_m(point, &candidate);
            let replace = best.map_or(true, |(best_containment, best_distance, _)| {
                (containment, distance) < (best_containment, best_distance)
            });
            if replace {
                best = Some((containment, distance, candidate));
            }
        }

        match best {
            Some((_, _, safe)) => safe,
            None => self.zones[limiting].safe_point_from(point),
        }
    }
}

/// Holds the active zone set and the hysteresis memory.
#[derive(Debug, Clone)]
pub struct GeofenceMonitor {
    set: GeofenceSet,
    hysteresis: bool,
    last: Option<ContainmentResult>,
}

impl GeofenceMonitor {
    pub fn new(set: GeofenceSet, hysteresis: bool) -> Self {
        Self {
            set,
            hysteresis,
            last: None,
        }
    }

    pub fn zones(&self) -> &[Zone] {
        self.set.zones()
    }

    pub fn set(&self) -> &GeofenceSet {
        &self.set
    }

    pub fn last_containment(&self) -> Option<ContainmentResult> {
        self.last
    }

    /// Swap in a validated set. Hysteresis memory starts over.
    pub fn replace(&mut self, set: GeofenceSet, hysteresis: bool) {
        info!(zones = set.zones().len(), hysteresis, "Geofence replaced");
        self.set = set;
        self.hysteresis = hysteresis;
        self.last = None;
    }

    /// Stateless classification, without hysteresis.
    pub fn check_point(&self, point: &GeoPoint) -> GeofenceStatus {
        self.status_for(point, None)
    }

    /// Evaluate a telemetry sample. Updates hysteresis memory.
    pub fn evaluate(&mut self, state: &VehicleState) -> GeofenceStatus {
        let previous = if self.hysteresis { self.last } else { None };
        let status = self.status_for(&state.position, previous);

        if self.last != Some(status.containment) {
            match status.containment {
                ContainmentResult::Outside => warn!(
                    zone = %status.zone,
                    depth_m = status.depth_m,
                    "Vehicle outside geofence"
                ),
                ContainmentResult::InBuffer => debug!(zone = %status.zone, "Vehicle in buffer band"),
                ContainmentResult::Inside => info!(zone = %status.zone, "Vehicle inside geofence"),
            }
        }
        self.last = Some(status.containment);
        status
    }

    fn status_for(&self, point: &GeoPoint, previous: Option<ContainmentResult>) -> GeofenceStatus {
        let (limiting, verdict) = self.set.judge(point);
        let zone = &self.set.zones[limiting];

        let mut containment = verdict.containment;
        if containment == ContainmentResult::Inside
            && previous.is_some_and(|prev| prev != ContainmentResult::Inside)
            && verdict.clearance_m <= zone.boundary.buffer_m() / 2.0
        {
            containment = ContainmentResult::InBuffer;
        }

        let altitude = self.set.altitude_status(point.altitude);
        let safe_altitude = self
            .set
            .clamp_altitude(point.altitude.unwrap_or(self.set.min_altitude_m));
        let horizontal_safe = if containment == ContainmentResult::Inside {
            *point
        } else {
            self.set.nearest_safe_point(point, limiting)
        };
        let nearest_safe_point = horizontal_safe.at_altitude(safe_altitude);

        let mut breaches = Vec::new();
        if containment == ContainmentResult::Outside {
            breaches.push(GeofenceBreach {
                kind: BreachKind::Horizontal,
                zone: zone.name.clone(),
                nearest_safe_point,
                breach_distance_m: (-verdict.clearance_m).max(0.0),
            });
        }
        let altitude_kind = match altitude {
            AltitudeStatus::BelowFloor => Some(BreachKind::AltitudeLow),
            AltitudeStatus::AboveCeiling => Some(BreachKind::AltitudeHigh),
            AltitudeStatus::Within => None,
        };
        if let Some(kind) = altitude_kind {
            breaches.push(GeofenceBreach {
                kind,
                zone: zone.name.clone(),
                nearest_safe_point,
                breach_distance_m: 0.0,
            });
        }

        GeofenceStatus {
            zone: zone.name.clone(),
            containment,
            nearest_safe_point,
            depth_m: verdict.clearance_m,
            altitude,
            breaches,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::offset_by_bearing;
    use std::f64::consts::PI;

    const LAT: f64 = 37.7749;
    const LON: f64 = -122.4194;

    fn at(distance_m: f64, bearing: f64, altitude: f64) -> GeoPoint {
        let (lat, lon) = offset_by_bearing(LAT, LON, distance_m, bearing);
        GeoPoint::with_altitude(lat, lon, altitude)
    }

    fn vehicle(position: GeoPoint) -> VehicleState {
        VehicleState {
            position,
            heading_deg: 0.0,
            speed_mps: 0.0,
            battery_percent: 80.0,
            link_healthy: true,
            armed: true,
            timestamp_ms: 0,
        }
    }

    fn single_circle() -> GeofenceSet {
        let zone = Zone::circle("Main Area", ZoneRole::Permitted, GeoPoint::new(LAT, LON), 100.0, 5.0)
            .unwrap();
        GeofenceSet::new(vec![zone], 2.0, 30.0).unwrap()
    }

    #[test]
    fn outside_raises_breach_with_safe_point() {
        let mut monitor = GeofenceMonitor::new(single_circle(), true);
        let status = monitor.evaluate(&vehicle(at(110.0, 0.0, 10.0)));
        assert_eq!(status.containment, ContainmentResult::Outside);
        let breach = status.horizontal_breach().unwrap();
        assert_eq!(breach.zone, "Main Area");
        assert!((breach.breach_distance_m - 10.0).abs() < 0.01);

        let safe = monitor.check_point(&breach.nearest_safe_point);
        assert_eq!(safe.containment, ContainmentResult::Inside);
        assert_eq!(breach.nearest_safe_point.altitude, Some(10.0));
    }

    #[test]
    fn hysteresis_requires_half_buffer_to_reenter() {
        let mut monitor = GeofenceMonitor::new(single_circle(), true);
        assert_eq!(
            monitor.evaluate(&vehicle(at(110.0, 1.0, 10.0))).containment,
            ContainmentResult::Outside
        );
        // 1m inside the edge: raw Inside, but not past buffer/2 = 2.5m.
        assert_eq!(
            monitor.evaluate(&vehicle(at(99.0, 1.0, 10.0))).containment,
            ContainmentResult::InBuffer
        );
        assert_eq!(
            monitor.evaluate(&vehicle(at(97.0, 1.0, 10.0))).containment,
            ContainmentResult::Inside
        );
        // Once Inside, shallow points are Inside again.
        assert_eq!(
            monitor.evaluate(&vehicle(at(99.0, 1.0, 10.0))).containment,
            ContainmentResult::Inside
        );
    }

    #[test]
    fn hysteresis_can_be_disabled() {
        let mut monitor = GeofenceMonitor::new(single_circle(), false);
        monitor.evaluate(&vehicle(at(110.0, 1.0, 10.0)));
        assert_eq!(
            monitor.evaluate(&vehicle(at(99.0, 1.0, 10.0))).containment,
            ContainmentResult::Inside
        );
    }

    #[test]
    fn replace_forgets_previous_containment() {
        let mut monitor = GeofenceMonitor::new(single_circle(), true);
        monitor.evaluate(&vehicle(at(110.0, 1.0, 10.0)));
        assert_eq!(monitor.last_containment(), Some(ContainmentResult::Outside));

        monitor.replace(single_circle(), true);
        assert_eq!(monitor.last_containment(), None);
        // No breach memory, so a shallow point is plainly Inside.
        assert_eq!(
            monitor.evaluate(&vehicle(at(99.0, 1.0, 10.0))).containment,
            ContainmentResult::Inside
        );
    }

    #[test]
    fn permitted_zones_combine_by_union() {
        let main = Zone::circle("Main Area", ZoneRole::Permitted, GeoPoint::new(LAT, LON), 100.0, 5.0)
            .unwrap();
        let (lat, lon) = offset_by_bearing(LAT, LON, 150.0, 0.0);
        let north = Zone::circle("North", ZoneRole::Permitted, GeoPoint::new(lat, lon), 100.0, 5.0)
            .unwrap();
        let set = GeofenceSet::new(vec![main, north], 2.0, 30.0).unwrap();
        let monitor = GeofenceMonitor::new(set, true);

        let status = monitor.check_point(&at(200.0, 0.0, 10.0));
        assert_eq!(status.containment, ContainmentResult::Inside);
        assert_eq!(status.zone, "North");
    }

    #[test]
    fn exclusion_zone_is_a_breach() {
        let main = Zone::circle("Main Area", ZoneRole::Permitted, GeoPoint::new(LAT, LON), 100.0, 5.0)
            .unwrap();
        let (lat, lon) = offset_by_bearing(LAT, LON, 40.0, PI / 2.0);
        let tower = Zone::circle("Tower", ZoneRole::Exclusion, GeoPoint::new(lat, lon), 10.0, 3.0)
            .unwrap();
        let set = GeofenceSet::new(vec![main, tower], 2.0, 30.0).unwrap();
        let monitor = GeofenceMonitor::new(set, true);

        let status = monitor.check_point(&at(38.0, PI / 2.0, 10.0));
        assert_eq!(status.containment, ContainmentResult::Outside);
        assert_eq!(status.zone, "Tower");
        let escape = monitor.check_point(&status.nearest_safe_point);
        assert_eq!(escape.containment, ContainmentResult::Inside);

        let near = monitor.check_point(&at(40.0 + 12.0, PI / 2.0, 10.0));
        assert_eq!(near.containment, ContainmentResult::InBuffer);
    }

    #[test]
    fn altitude_is_checked_independently() {
        let monitor = GeofenceMonitor::new(single_circle(), true);
        let status = monitor.check_point(&at(10.0, 0.0, 45.0));
        assert_eq!(status.containment, ContainmentResult::Inside);
        assert_eq!(status.altitude, AltitudeStatus::AboveCeiling);
        let breach = status.altitude_breach().unwrap();
        assert_eq!(breach.kind, BreachKind::AltitudeHigh);
        assert_eq!(breach.nearest_safe_point.altitude, Some(30.0));
        assert!(status.horizontal_breach().is_none());
    }

    #[test]
    fn set_validation() {
        let zone = || {
            Zone::circle("A", ZoneRole::Permitted, GeoPoint::new(LAT, LON), 100.0, 5.0).unwrap()
        };
        assert_eq!(
            GeofenceSet::new(vec![zone(), zone()], 2.0, 30.0),
            Err(GeometryError::DuplicateZone("A".to_string()))
        );
        assert!(matches!(
            GeofenceSet::new(vec![zone()], 30.0, 2.0),
            Err(GeometryError::InvalidAltitudeBand { .. })
        ));
        let exclusion =
            Zone::circle("X", ZoneRole::Exclusion, GeoPoint::new(LAT, LON), 10.0, 0.0).unwrap();
        assert_eq!(
            GeofenceSet::new(vec![exclusion], 2.0, 30.0),
            Err(GeometryError::NoPermittedZone)
        );
        let bad = Zone::circle("Broken", ZoneRole::Permitted, GeoPoint::new(LAT, LON), 0.0, 5.0);
        assert!(matches!(
            bad,
            Err(GeometryError::InvalidGeometry { zone, .. }) if zone == "Broken"
        ));
    }
}
