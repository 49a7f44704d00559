//! Axis-aligned bounding box in longitude/latitude

use geo::BoundingRect;
use geo_types::{Geometry, LineString, Polygon};
use serde::{Deserialize, Serialize};

/// `[minLng, minLat, maxLng, maxLat]`
///
/// Always derived from the current geometry, never stored as a source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BBox {
    pub min_lng: f64,
    pub min_lat: f64,
    pub max_lng: f64,
    pub max_lat: f64,
}

impl BBox {
    pub fn new(min_lng: f64, min_lat: f64, max_lng: f64, max_lat: f64) -> Self {
        Self { min_lng, min_lat, max_lng, max_lat }
    }

    /// Envelope of a geometry, `None` for empty geometries
    pub fn of(geom: &Geometry<f64>) -> Option<Self> {
        geom.bounding_rect().map(|rect| BBox {
            min_lng: rect.min().x,
            min_lat: rect.min().y,
            max_lng: rect.max().x,
            max_lat: rect.max().y,
        })
    }

    pub fn width(&self) -> f64 {
        self.max_lng - self.min_lng
    }

    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.min_lng + self.max_lng) / 2.0, (self.min_lat + self.max_lat) / 2.0)
    }

    pub fn contains_point(&self, lng: f64, lat: f64) -> bool {
        lng >= self.min_lng && lng <= self.max_lng && lat >= self.min_lat && lat <= self.max_lat
    }

    pub fn intersects(&self, other: &BBox) -> bool {
        self.min_lng <= other.max_lng
            && self.max_lng >= other.min_lng
            && self.min_lat <= other.max_lat
            && self.max_lat >= other.min_lat
    }

    /// Smallest box covering both
    pub fn merge(&self, other: &BBox) -> BBox {
        BBox {
            min_lng: self.min_lng.min(other.min_lng),
            min_lat: self.min_lat.min(other.min_lat),
            max_lng: self.max_lng.max(other.max_lng),
            max_lat: self.max_lat.max(other.max_lat),
        }
    }

    pub fn to_polygon(&self) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![
                (self.min_lng, self.min_lat),
                (self.max_lng, self.min_lat),
                (self.max_lng, self.max_lat),
                (self.min_lng, self.max_lat),
                (self.min_lng, self.min_lat),
            ]),
            vec![],
        )
    }
}

impl From<[f64; 4]> for BBox {
    fn from(a: [f64; 4]) -> Self {
        BBox::new(a[0], a[1], a[2], a[3])
    }
}

impl From<BBox> for [f64; 4] {
    fn from(b: BBox) -> Self {
        [b.min_lng, b.min_lat, b.max_lng, b.max_lat]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{point, Coord};

    #[test]
    fn test_bbox_of_polygon() {
        let bb = BBox::new(1.0, 2.0, 5.0, 8.0);
        let poly = bb.to_polygon();

        let coords = &poly.exterior().0;
        assert_eq!(coords.len(), 5);
        assert_eq!(coords[0], Coord { x: 1.0, y: 2.0 });

        assert_eq!(BBox::of(&Geometry::Polygon(poly)), Some(bb));
    }

    #[test]
    fn test_bbox_contains_and_intersects() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(5.0, 5.0, 15.0, 15.0);
        let c = BBox::new(20.0, 20.0, 30.0, 30.0);

        assert!(a.contains_point(5.0, 5.0));
        assert!(!a.contains_point(15.0, 5.0));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert_eq!(a.merge(&c), BBox::new(0.0, 0.0, 30.0, 30.0));
    }

    #[test]
    fn test_bbox_point_is_degenerate() {
        let bb = BBox::of(&Geometry::Point(point!(x: 3.0, y: 4.0))).unwrap();
        assert_eq!(bb.width(), 0.0);
        assert_eq!(bb.height(), 0.0);
        assert_eq!(bb.center(), (3.0, 4.0));
    }

    #[test]
    fn test_bbox_serializes_as_array() {
        let text = serde_json::to_string(&BBox::new(-1.0, -2.0, 3.0, 4.0)).unwrap();
        assert_eq!(text, "[-1.0,-2.0,3.0,4.0]");
    }
}
