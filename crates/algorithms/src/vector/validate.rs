//! Geometry validation and repair
//!
//! A polygon ring is valid when it is closed, has at least four coordinates
//! and no two non-adjacent segments intersect. Repair deduplicates
//! consecutive coordinates and closes rings, then validates again.

use geo::{
    Coord, Geometry, Intersects, Line, LineString, MultiLineString, MultiPolygon, Polygon,
    RemoveRepeatedPoints,
};
use geoverlay_core::Feature;
use serde::Serialize;
use std::borrow::Cow;
use thiserror::Error;
use tracing::warn;

use super::classify::{ClassifiedFeature, SkippedFeature};
use super::measurements::{area_m2, vertex_count};
use super::relate::to_multipolygon;

/// Outcome of validating one feature
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Validation {
    pub valid: bool,
    /// Problems that make the geometry unusable
    pub issues: Vec<String>,
    /// Problems tolerated as-is (out-of-range coordinates)
    pub warnings: Vec<String>,
}

/// Why a feature could not be repaired
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RepairError {
    #[error("feature has no geometry")]
    MissingGeometry,

    #[error("geometry could not be repaired: {}", .issues.join("; "))]
    Unrecoverable { issues: Vec<String> },
}

/// A feature that passed validation, possibly after repair
#[derive(Debug, Clone)]
pub struct Validated<'a> {
    pub feature: Cow<'a, Feature>,
    pub repaired: bool,
}

/// Check a feature's geometry.
pub fn validate(feature: &Feature) -> Validation {
    match &feature.geometry {
        Some(geom) => validate_geometry(geom),
        None => Validation {
            valid: false,
            issues: vec!["Missing geometry".to_string()],
            warnings: Vec::new(),
        },
    }
}

/// Check a geometry.
pub fn validate_geometry(geom: &Geometry<f64>) -> Validation {
    let mut report = Validation::default();
    check_geometry(geom, &mut report);
    report.valid = report.issues.is_empty();
    report
}

/// Try to turn a feature into a valid one.
///
/// Returns a new feature; the input is untouched.
pub fn repair(feature: &Feature) -> Result<Feature, RepairError> {
    let geom = feature.geometry.as_ref().ok_or(RepairError::MissingGeometry)?;
    let cleaned = clean_geometry(geom);

    let report = validate_geometry(&cleaned);
    if !report.valid {
        return Err(RepairError::Unrecoverable {
            issues: report.issues,
        });
    }

    Ok(Feature {
        geometry: Some(cleaned),
        properties: feature.properties.clone(),
        id: feature.id.clone(),
    })
}

/// Borrow the feature when it is already valid, repair it otherwise.
pub fn ensure_valid(feature: &Feature) -> Result<Validated<'_>, RepairError> {
    if validate(feature).valid {
        return Ok(Validated {
            feature: Cow::Borrowed(feature),
            repaired: false,
        });
    }
    repair(feature).map(|f| Validated {
        feature: Cow::Owned(f),
        repaired: true,
    })
}

/// Reject features whose vertex count exceeds the execution budget.
pub fn check_budget(geom: &Geometry<f64>, max_vertices: Option<usize>) -> Result<(), String> {
    match max_vertices {
        Some(max) if vertex_count(geom) > max => Err(format!(
            "Geometry has {} vertices, budget is {max}",
            vertex_count(geom)
        )),
        _ => Ok(()),
    }
}

/// A polygon feature that survived validation, ready for boolean ops
#[derive(Debug, Clone)]
pub struct PreparedPolygon<'a> {
    pub index: usize,
    pub feature: Cow<'a, Feature>,
    pub shape: MultiPolygon<f64>,
    /// Spherical area in m²
    pub area: f64,
    pub repaired: bool,
}

/// Budget-check, validate and repair polygon features.
///
/// Anything that cannot be used is appended to `skipped`.
pub fn prepare_polygons<'a>(
    polygons: &[ClassifiedFeature<'a>],
    max_vertices: Option<usize>,
    skipped: &mut Vec<SkippedFeature>,
) -> Vec<PreparedPolygon<'a>> {
    let mut out = Vec::with_capacity(polygons.len());

    for item in polygons {
        let Some(geom) = item.geometry() else {
            skipped.push(SkippedFeature::new(item.index, "Missing geometry"));
            continue;
        };
        if let Err(reason) = check_budget(geom, max_vertices) {
            warn!("Feature {}: {}", item.index + 1, reason);
            skipped.push(SkippedFeature::new(item.index, reason));
            continue;
        }

        let validated = match ensure_valid(item.feature) {
            Ok(v) => v,
            Err(e) => {
                warn!("Feature {}: {}", item.index + 1, e);
                skipped.push(SkippedFeature::new(item.index, e.to_string()));
                continue;
            }
        };

        let Some(shape) = validated.feature.geometry.as_ref().and_then(to_multipolygon) else {
            skipped.push(SkippedFeature::new(item.index, "Not a polygon"));
            continue;
        };
        let area = if validated.repaired {
            area_m2(&Geometry::MultiPolygon(shape.clone()))
        } else {
            item.measure
        };

        out.push(PreparedPolygon {
            index: item.index,
            feature: validated.feature,
            shape,
            area,
            repaired: validated.repaired,
        });
    }

    out
}

fn check_geometry(geom: &Geometry<f64>, report: &mut Validation) {
    match geom {
        Geometry::Point(p) => check_coord(p.0, report),
        Geometry::MultiPoint(mp) => {
            if mp.0.is_empty() {
                report.issues.push("MultiPoint has no points".into());
            }
            mp.iter().for_each(|p| check_coord(p.0, report));
        }
        Geometry::LineString(ls) => check_line_string(ls, "LineString", report),
        Geometry::MultiLineString(mls) => {
            if mls.0.is_empty() {
                report.issues.push("MultiLineString has no parts".into());
            }
            for (i, ls) in mls.iter().enumerate() {
                check_line_string(ls, &format!("LineString {}", i + 1), report);
            }
        }
        Geometry::Polygon(p) => check_polygon(p, "Polygon", report),
        Geometry::MultiPolygon(mp) => {
            if mp.0.is_empty() {
                report.issues.push("MultiPolygon has no parts".into());
            }
            for (i, p) in mp.iter().enumerate() {
                check_polygon(p, &format!("Polygon {}", i + 1), report);
            }
        }
        Geometry::GeometryCollection(gc) => gc.iter().for_each(|g| check_geometry(g, report)),
        Geometry::Line(_) | Geometry::Rect(_) | Geometry::Triangle(_) => {
            geo::CoordsIter::coords_iter(geom).for_each(|c| check_coord(c, report))
        }
    }
}

fn check_coord(c: Coord<f64>, report: &mut Validation) {
    if !c.x.is_finite() || !c.y.is_finite() {
        report
            .issues
            .push(format!("Non-finite coordinate ({}, {})", c.x, c.y));
        return;
    }
    if !(-180.0..=180.0).contains(&c.x) || !(-90.0..=90.0).contains(&c.y) {
        report
            .warnings
            .push(format!("Coordinate ({}, {}) outside lon/lat range", c.x, c.y));
    }
}

fn check_line_string(ls: &LineString<f64>, label: &str, report: &mut Validation) {
    if ls.0.len() < 2 {
        report
            .issues
            .push(format!("{label} has {} coordinates, needs at least 2", ls.0.len()));
    }
    ls.0.iter().for_each(|c| check_coord(*c, report));
}

fn check_polygon(p: &Polygon<f64>, label: &str, report: &mut Validation) {
    check_ring(p.exterior(), &format!("{label} exterior ring"), report);
    for (i, hole) in p.interiors().iter().enumerate() {
        check_ring(hole, &format!("{label} hole {}", i + 1), report);
    }
}

fn check_ring(ring: &LineString<f64>, label: &str, report: &mut Validation) {
    let n = ring.0.len();
    ring.0.iter().for_each(|c| check_coord(*c, report));

    if n < 4 {
        report
            .issues
            .push(format!("{label} has {n} coordinates, needs at least 4"));
        return;
    }
    if !ring.is_closed() {
        report.issues.push(format!("{label} is not closed"));
        return;
    }
    if let Some((i, j)) = first_self_intersection(ring) {
        report.issues.push(format!(
            "{label} self-intersects between segments {} and {}",
            i + 1,
            j + 1
        ));
    }
}

/// Pairwise test over non-adjacent segments of a closed ring
fn first_self_intersection(ring: &LineString<f64>) -> Option<(usize, usize)> {
    let segments: Vec<Line<f64>> = ring.lines().collect();
    let n = segments.len();

    for i in 0..n {
        for j in (i + 2)..n {
            // First and last segments share the closing vertex
            if i == 0 && j == n - 1 {
                continue;
            }
            if segments[i].intersects(&segments[j]) {
                return Some((i, j));
            }
        }
    }
    None
}

fn clean_geometry(geom: &Geometry<f64>) -> Geometry<f64> {
    match geom {
        Geometry::Polygon(p) => Geometry::Polygon(clean_polygon(p)),
        Geometry::MultiPolygon(mp) => {
            Geometry::MultiPolygon(MultiPolygon::new(mp.iter().map(clean_polygon).collect()))
        }
        Geometry::LineString(ls) => Geometry::LineString(ls.remove_repeated_points()),
        Geometry::MultiLineString(mls) => Geometry::MultiLineString(MultiLineString::new(
            mls.iter().map(|ls| ls.remove_repeated_points()).collect(),
        )),
        Geometry::MultiPoint(mp) => Geometry::MultiPoint(mp.remove_repeated_points()),
        other => other.clone(),
    }
}

/// Deduplicate consecutive coordinates; `Polygon::new` closes every ring.
fn clean_polygon(p: &Polygon<f64>) -> Polygon<f64> {
    Polygon::new(
        p.exterior().remove_repeated_points(),
        p.interiors().iter().map(|r| r.remove_repeated_points()).collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{line_string, point, polygon};

    fn square() -> Polygon<f64> {
        polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 1.0),
            (x: 0.0, y: 0.0),
        ]
    }

    fn bowtie() -> Polygon<f64> {
        polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 1.0, y: 0.0),
            (x: 0.0, y: 1.0),
            (x: 0.0, y: 0.0),
        ]
    }

    #[test]
    fn test_valid_square() {
        let report = validate(&Feature::new(square()));
        assert!(report.valid, "{:?}", report.issues);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_bowtie_is_invalid_and_unrecoverable() {
        let f = Feature::new(bowtie());
        let report = validate(&f);
        assert!(!report.valid);
        assert!(report.issues[0].contains("self-intersects"));

        assert!(matches!(repair(&f), Err(RepairError::Unrecoverable { .. })));
    }

    #[test]
    fn test_repeated_vertices_are_repaired() {
        let dup = polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 1.0),
            (x: 0.0, y: 0.0),
        ];
        let f = Feature::new(dup).with_property("name", "dup");
        assert!(!validate(&f).valid);

        let fixed = repair(&f).unwrap();
        assert!(validate(&fixed).valid);
        assert_eq!(fixed.name(), Some("dup"));

        let v = ensure_valid(&f).unwrap();
        assert!(v.repaired);
    }

    #[test]
    fn test_ensure_valid_borrows_valid_feature() {
        let f = Feature::new(square());
        let v = ensure_valid(&f).unwrap();
        assert!(!v.repaired);
        assert!(matches!(v.feature, Cow::Borrowed(_)));
    }

    #[test]
    fn test_degenerate_ring() {
        let thin = Polygon::new(line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0)], vec![]);
        let report = validate_geometry(&Geometry::Polygon(thin));
        assert!(!report.valid);
        assert!(report.issues[0].contains("needs at least 4"));
    }

    #[test]
    fn test_short_line_and_missing_geometry() {
        let ls = LineString::new(vec![Coord { x: 0.0, y: 0.0 }]);
        assert!(!validate_geometry(&Geometry::LineString(ls)).valid);

        assert!(!validate(&Feature::empty()).valid);
        assert_eq!(repair(&Feature::empty()), Err(RepairError::MissingGeometry));
    }

    #[test]
    fn test_vertex_budget() {
        let geom = Geometry::Polygon(square());
        assert!(check_budget(&geom, None).is_ok());
        assert!(check_budget(&geom, Some(5)).is_ok());
        assert_eq!(
            check_budget(&geom, Some(4)),
            Err("Geometry has 5 vertices, budget is 4".to_string())
        );
    }

    #[test]
    fn test_prepare_polygons_skips_bad_input() {
        use crate::vector::classify::classify;

        let features = vec![
            Feature::new(square()),
            Feature::new(bowtie()),
            Feature::new(point!(x: 0.0, y: 0.0)),
        ];
        let classified = classify(&features);
        let mut skipped = Vec::new();
        let prepared = prepare_polygons(&classified.polygons, None, &mut skipped);

        assert_eq!(prepared.len(), 1);
        assert_eq!(prepared[0].index, 0);
        assert!(!prepared[0].repaired);
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].index, 1);
    }

    #[test]
    fn test_out_of_range_is_only_a_warning() {
        let report = validate_geometry(&Geometry::Point(point!(x: 200.0, y: 10.0)));
        assert!(report.valid);
        assert_eq!(report.warnings.len(), 1);

        let report = validate_geometry(&Geometry::Point(point!(x: f64::NAN, y: 10.0)));
        assert!(!report.valid);
    }
}
