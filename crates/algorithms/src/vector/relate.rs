//! Spatial predicates and guarded boolean primitives
//!
//! The planar boolean operations in `geo` can panic on degenerate input.
//! Every call goes through [`guarded`], which turns a panic into a
//! [`Error::Geometry`] so a single bad pair never takes a batch down.

use geo::coordinate_position::CoordPos;
use geo::dimensions::Dimensions;
use geo::relate::IntersectionMatrix;
use geo::{
    BooleanOps, Coord, CoordinatePosition, Geometry, Intersects, MultiPolygon,
    Point, Polygon, Relate,
};
use geoverlay_core::{Error, Result};
use serde::Serialize;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Relationship between an accumulator and an incoming polygon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Relationship {
    /// No shared point
    Separate,
    /// Shared boundary only
    Touches,
    /// Shared interior
    Intersects,
}

impl Relationship {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relationship::Separate => "separate",
            Relationship::Touches => "touches",
            Relationship::Intersects => "intersects",
        }
    }

    /// Touching and intersecting shapes are merged; separate ones are not
    pub fn is_connected(&self) -> bool {
        !matches!(self, Relationship::Separate)
    }
}

/// Binary spatial predicates accepted by the polygon join
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Predicate {
    #[default]
    Intersects,
    Contains,
    Within,
    Overlaps,
    Touches,
}

impl std::str::FromStr for Predicate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "intersects" => Ok(Predicate::Intersects),
            "contains" => Ok(Predicate::Contains),
            "within" => Ok(Predicate::Within),
            "overlaps" => Ok(Predicate::Overlaps),
            "touches" => Ok(Predicate::Touches),
            other => Err(Error::InvalidParameter {
                name: "relation",
                value: other.to_string(),
                reason: "expected intersects, contains, within, overlaps or touches".into(),
            }),
        }
    }
}

/// Run a geometry primitive, converting a panic into an error.
pub fn guarded<T>(label: &str, f: impl FnOnce() -> T) -> Result<T> {
    catch_unwind(AssertUnwindSafe(f))
        .map_err(|payload| Error::Geometry(format!("{label} failed: {}", panic_message(&payload))))
}

/// Best-effort text of a panic payload
pub fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Polygonal view of a geometry; `None` for anything without area.
pub fn to_multipolygon(geom: &Geometry<f64>) -> Option<MultiPolygon<f64>> {
    match geom {
        Geometry::Polygon(p) => Some(MultiPolygon::new(vec![p.clone()])),
        Geometry::MultiPolygon(mp) => Some(mp.clone()),
        Geometry::Rect(r) => Some(MultiPolygon::new(vec![r.to_polygon()])),
        Geometry::Triangle(t) => Some(MultiPolygon::new(vec![t.to_polygon()])),
        _ => None,
    }
}

/// Single polygon for one part, multipolygon otherwise; `None` when empty.
pub fn from_parts(mut parts: Vec<Polygon<f64>>) -> Option<Geometry<f64>> {
    match parts.len() {
        0 => None,
        1 => parts.pop().map(Geometry::Polygon),
        _ => Some(Geometry::MultiPolygon(MultiPolygon::new(parts))),
    }
}

pub fn union(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>> {
    guarded("union", || a.union(b))
}

pub fn intersection(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>> {
    guarded("intersection", || a.intersection(b))
}

pub fn difference(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>> {
    guarded("difference", || a.difference(b))
}

/// DE-9IM matrix of two geometries
pub fn relate(a: &Geometry<f64>, b: &Geometry<f64>) -> Result<IntersectionMatrix> {
    guarded("relate", || a.relate(b))
}

/// Classify how two polygonal shapes relate.
pub fn relationship(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> Result<Relationship> {
    let matrix = guarded("relate", || a.relate(b))?;
    Ok(classify_matrix(&matrix))
}

fn classify_matrix(matrix: &IntersectionMatrix) -> Relationship {
    if !matrix.is_intersects() {
        Relationship::Separate
    } else if interiors_meet(matrix) {
        Relationship::Intersects
    } else {
        Relationship::Touches
    }
}

fn interiors_meet(matrix: &IntersectionMatrix) -> bool {
    matrix.get(CoordPos::Inside, CoordPos::Inside) != Dimensions::Empty
}

/// Evaluate a predicate as `a <predicate> b`.
pub fn evaluate(predicate: Predicate, a: &Geometry<f64>, b: &Geometry<f64>) -> Result<bool> {
    if predicate == Predicate::Intersects {
        return guarded("intersects", || a.intersects(b));
    }
    let m = relate(a, b)?;
    Ok(match predicate {
        Predicate::Intersects => m.is_intersects(),
        Predicate::Contains => m.is_contains(),
        Predicate::Within => m.is_within(),
        Predicate::Touches => m.is_intersects() && !interiors_meet(&m),
        Predicate::Overlaps => interiors_meet(&m) && !m.is_within() && !m.is_contains(),
    })
}

/// Point-in-polygon with the boundary counted as inside
pub fn covers_point(polygon: &MultiPolygon<f64>, point: &Point<f64>) -> bool {
    polygon.intersects(point)
}

/// Whether a coordinate lies exactly on a polygon's boundary
pub fn on_boundary(polygon: &MultiPolygon<f64>, coord: Coord<f64>) -> bool {
    polygon.coordinate_position(&coord) == CoordPos::OnBoundary
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{point, polygon, Area};

    fn square(x0: f64, y0: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: x0, y: y0),
            (x: x0 + size, y: y0),
            (x: x0 + size, y: y0 + size),
            (x: x0, y: y0 + size),
            (x: x0, y: y0),
        ]])
    }

    #[test]
    fn test_relationships() {
        let a = square(0.0, 0.0, 1.0);
        assert_eq!(relationship(&a, &square(0.5, 0.5, 1.0)).unwrap(), Relationship::Intersects);
        assert_eq!(relationship(&a, &square(1.0, 0.0, 1.0)).unwrap(), Relationship::Touches);
        assert_eq!(relationship(&a, &square(5.0, 5.0, 1.0)).unwrap(), Relationship::Separate);
    }

    #[test]
    fn test_guarded_boolean_ops() {
        let a = square(0.0, 0.0, 2.0);
        let b = square(1.0, 1.0, 2.0);
        let i = intersection(&a, &b).unwrap();
        assert!((i.unsigned_area() - 1.0).abs() < 1e-9);

        let d = difference(&a, &b).unwrap();
        assert!((d.unsigned_area() - 3.0).abs() < 1e-9);

        let u = union(&a, &b).unwrap();
        assert!((u.unsigned_area() - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_guarded_catches_panic() {
        let r: Result<()> = guarded("boom", || panic!("degenerate"));
        match r {
            Err(Error::Geometry(msg)) => assert!(msg.contains("degenerate")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_predicates() {
        let outer = Geometry::MultiPolygon(square(0.0, 0.0, 4.0));
        let inner = Geometry::MultiPolygon(square(1.0, 1.0, 1.0));
        let side = Geometry::MultiPolygon(square(4.0, 0.0, 1.0));
        let half = Geometry::MultiPolygon(square(3.0, 3.0, 2.0));

        assert!(evaluate(Predicate::Contains, &outer, &inner).unwrap());
        assert!(evaluate(Predicate::Within, &inner, &outer).unwrap());
        assert!(evaluate(Predicate::Touches, &outer, &side).unwrap());
        assert!(!evaluate(Predicate::Overlaps, &outer, &side).unwrap());
        assert!(evaluate(Predicate::Overlaps, &outer, &half).unwrap());
        assert!(!evaluate(Predicate::Overlaps, &outer, &inner).unwrap());
        assert!("crosses".parse::<Predicate>().is_err());
    }

    #[test]
    fn test_boundary_counts_as_inside() {
        let sq = square(0.0, 0.0, 1.0);
        assert!(covers_point(&sq, &point!(x: 1.0, y: 0.5)));
        assert!(on_boundary(&sq, Coord { x: 1.0, y: 0.5 }));
        assert!(!on_boundary(&sq, Coord { x: 0.5, y: 0.5 }));
        assert!(!covers_point(&sq, &point!(x: 2.0, y: 0.5)));
    }

    #[test]
    fn test_from_parts() {
        assert!(from_parts(vec![]).is_none());
        let one = from_parts(square(0.0, 0.0, 1.0).0).unwrap();
        assert!(matches!(one, Geometry::Polygon(_)));
    }
}
