//! Geometric measurements: area, length, centroid

use geo::{
    Centroid as GeoCentroid, ChamberlainDuquetteArea, CoordsIter, Geometry, Haversine, Length,
    LineString, Point, Polygon,
};

/// Area of a geometry in square meters.
///
/// Uses the Chamberlain-Duquette spherical approximation on lon/lat
/// coordinates. Holes are subtracted whatever their winding. Non-areal
/// geometries have zero area.
pub fn area_m2(geom: &Geometry<f64>) -> f64 {
    match geom {
        Geometry::Polygon(p) => polygon_area_m2(p),
        Geometry::MultiPolygon(mp) => mp.0.iter().map(polygon_area_m2).sum(),
        Geometry::Rect(r) => polygon_area_m2(&r.to_polygon()),
        Geometry::Triangle(t) => polygon_area_m2(&t.to_polygon()),
        Geometry::GeometryCollection(gc) => gc.0.iter().map(area_m2).sum(),
        Geometry::Point(_)
        | Geometry::Line(_)
        | Geometry::LineString(_)
        | Geometry::MultiPoint(_)
        | Geometry::MultiLineString(_) => 0.0,
    }
}

// CD's signed hole handling assumes holes wound like the exterior;
// GeoJSON and boolean-op output wind them the other way.
fn polygon_area_m2(polygon: &Polygon<f64>) -> f64 {
    let holes: f64 = polygon.interiors().iter().map(ring_area_m2).sum();
    (ring_area_m2(polygon.exterior()) - holes).max(0.0)
}

fn ring_area_m2(ring: &LineString<f64>) -> f64 {
    Polygon::new(ring.clone(), vec![]).chamberlain_duquette_unsigned_area()
}

/// Length of a linear geometry in kilometers (haversine).
pub fn length_km(geom: &Geometry<f64>) -> f64 {
    let meters = match geom {
        Geometry::LineString(ls) => ls.length::<Haversine>(),
        Geometry::MultiLineString(mls) => mls.0.iter().map(|ls| ls.length::<Haversine>()).sum(),
        Geometry::Line(l) => l.length::<Haversine>(),
        _ => 0.0,
    };
    meters / 1000.0
}

/// Geometric center of a geometry
pub fn centroid(geom: &Geometry<f64>) -> Option<Point<f64>> {
    geom.centroid()
}

/// Number of coordinates in a geometry
pub fn vertex_count(geom: &Geometry<f64>) -> usize {
    geom.coords_count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::{LineString, MultiLineString, Polygon};

    /// 0.01° square at the equator, roughly 1.11 km on a side
    fn small_square() -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![
                (0.0, 0.0), (0.01, 0.0), (0.01, 0.01), (0.0, 0.01), (0.0, 0.0),
            ]),
            vec![],
        )
    }

    #[test]
    fn test_area_square_meters() {
        let a = area_m2(&Geometry::Polygon(small_square()));
        // (0.01° * 111.32 km)^2 ≈ 1.239 km²
        assert_relative_eq!(a, 1.2392e6, max_relative = 0.01);
    }

    #[test]
    fn test_area_non_polygon() {
        let line = Geometry::LineString(LineString::from(vec![(0.0, 0.0), (10.0, 10.0)]));
        assert_eq!(area_m2(&line), 0.0);
    }

    #[test]
    fn test_hole_is_subtracted_for_either_winding() {
        let outer = LineString::from(vec![
            (0.0, 0.0), (0.04, 0.0), (0.04, 0.04), (0.0, 0.04), (0.0, 0.0),
        ]);
        let ccw_hole = LineString::from(vec![
            (0.01, 0.01), (0.02, 0.01), (0.02, 0.02), (0.01, 0.02), (0.01, 0.01),
        ]);
        let mut cw_hole = ccw_hole.clone();
        cw_hole.0.reverse();

        let solid = area_m2(&Geometry::Polygon(Polygon::new(outer.clone(), vec![])));
        let hole = area_m2(&Geometry::Polygon(Polygon::new(ccw_hole.clone(), vec![])));
        let cw = area_m2(&Geometry::Polygon(Polygon::new(outer.clone(), vec![cw_hole])));
        let ccw = area_m2(&Geometry::Polygon(Polygon::new(outer, vec![ccw_hole])));

        assert!(cw < solid);
        assert_relative_eq!(cw, solid - hole, max_relative = 1e-9);
        assert_relative_eq!(ccw, cw, max_relative = 1e-9);
    }

    #[test]
    fn test_length_km_equator_degree() {
        let line = Geometry::LineString(LineString::from(vec![(0.0, 0.0), (1.0, 0.0)]));
        // One degree of longitude at the equator on the mean-radius sphere
        assert_relative_eq!(length_km(&line), 111.195, max_relative = 1e-3);
    }

    #[test]
    fn test_length_multiline_sums_parts() {
        let single = Geometry::LineString(LineString::from(vec![(0.0, 0.0), (0.0, 1.0)]));
        let mls = Geometry::MultiLineString(MultiLineString::new(vec![
            LineString::from(vec![(0.0, 0.0), (0.0, 1.0)]),
            LineString::from(vec![(5.0, 0.0), (5.0, 1.0)]),
        ]));
        assert_relative_eq!(length_km(&mls), 2.0 * length_km(&single), max_relative = 1e-9);
    }

    #[test]
    fn test_centroid_and_vertices() {
        let poly = Geometry::Polygon(small_square());
        let c = centroid(&poly).unwrap();
        assert_relative_eq!(c.x(), 0.005, epsilon = 1e-12);
        assert_relative_eq!(c.y(), 0.005, epsilon = 1e-12);
        assert_eq!(vertex_count(&poly), 5);
    }
}
