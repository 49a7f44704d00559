//! Bucketing of heterogeneous feature lists by shape

use geo::Geometry;
use geoverlay_core::Feature;
use serde::Serialize;

use super::measurements::{area_m2, length_km};

/// A feature kept by the classifier, with its position in the input
#[derive(Debug, Clone, Copy)]
pub struct ClassifiedFeature<'a> {
    pub index: usize,
    pub feature: &'a Feature,
    /// Length in km for lines, area in m² for polygons, zero for points
    pub measure: f64,
}

impl<'a> ClassifiedFeature<'a> {
    pub fn geometry(&self) -> Option<&'a Geometry<f64>> {
        self.feature.geometry.as_ref()
    }
}

/// Input list a skipped feature's index points into, for operations that
/// take more than one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputRole {
    /// The flat feature list handed to the dispatcher
    Input,
    Points,
    Polygons,
    Sources,
    Targets,
}

/// A feature that was left out of an operation, and why
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedFeature {
    pub index: usize,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<InputRole>,
}

impl SkippedFeature {
    pub fn new(index: usize, reason: impl Into<String>) -> Self {
        Self {
            index,
            reason: reason.into(),
            source: None,
        }
    }

    pub fn from_input(self, role: InputRole) -> Self {
        Self {
            source: Some(role),
            ..self
        }
    }
}

/// Order skipped features by input list, then by position.
pub fn sort_skipped(skipped: &mut [SkippedFeature]) {
    skipped.sort_by_key(|s| (s.source, s.index));
}

/// Per-class feature counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureTypeCounts {
    pub points: usize,
    pub lines: usize,
    pub polygons: usize,
    pub unsupported: usize,
}

impl FeatureTypeCounts {
    pub fn total(&self) -> usize {
        self.points + self.lines + self.polygons + self.unsupported
    }
}

/// Features sorted into points, lines and polygons
#[derive(Debug, Clone, Default)]
pub struct Classified<'a> {
    pub points: Vec<ClassifiedFeature<'a>>,
    pub lines: Vec<ClassifiedFeature<'a>>,
    pub polygons: Vec<ClassifiedFeature<'a>>,
    pub unsupported: Vec<SkippedFeature>,
}

impl Classified<'_> {
    pub fn counts(&self) -> FeatureTypeCounts {
        FeatureTypeCounts {
            points: self.points.len(),
            lines: self.lines.len(),
            polygons: self.polygons.len(),
            unsupported: self.unsupported.len(),
        }
    }
}

/// Sort features by geometry class, keeping input order inside each bucket.
///
/// Features without geometry and collection-like geometries end up in
/// `unsupported` and take no part in any operation.
pub fn classify(features: &[Feature]) -> Classified<'_> {
    let mut out = Classified::default();

    for (index, feature) in features.iter().enumerate() {
        let Some(geom) = feature.geometry.as_ref() else {
            out.unsupported.push(SkippedFeature::new(index, "Missing geometry"));
            continue;
        };

        let entry = |measure| ClassifiedFeature {
            index,
            feature,
            measure,
        };

        match geom {
            Geometry::Point(_) | Geometry::MultiPoint(_) => out.points.push(entry(0.0)),
            Geometry::LineString(_) | Geometry::MultiLineString(_) => {
                out.lines.push(entry(length_km(geom)))
            }
            Geometry::Polygon(_) | Geometry::MultiPolygon(_) => {
                out.polygons.push(entry(area_m2(geom)))
            }
            Geometry::Line(_)
            | Geometry::Rect(_)
            | Geometry::Triangle(_)
            | Geometry::GeometryCollection(_) => out.unsupported.push(SkippedFeature::new(
                index,
                format!(
                    "Unsupported geometry type: {}",
                    geoverlay_core::vector::geometry_type_name(geom)
                ),
            )),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{line_string, point, polygon, GeometryCollection};

    #[test]
    fn test_classify_buckets() {
        let features = vec![
            Feature::new(point!(x: 0.0, y: 0.0)),
            Feature::new(line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0)]),
            Feature::new(polygon![
                (x: 0.0, y: 0.0),
                (x: 0.01, y: 0.0),
                (x: 0.01, y: 0.01),
                (x: 0.0, y: 0.0),
            ]),
            Feature::new(geo::Geometry::GeometryCollection(GeometryCollection::<f64>::new_from(vec![]))),
            Feature::empty(),
        ];

        let c = classify(&features);
        assert_eq!(
            c.counts(),
            FeatureTypeCounts {
                points: 1,
                lines: 1,
                polygons: 1,
                unsupported: 2
            }
        );
        assert_eq!(c.lines[0].index, 1);
        assert!((c.lines[0].measure - 111.195).abs() < 0.2);
        assert!(c.polygons[0].measure > 0.0);
        assert_eq!(c.unsupported[0].reason, "Unsupported geometry type: GeometryCollection");
        assert_eq!(c.unsupported[1].reason, "Missing geometry");
        assert_eq!(c.counts().total(), 5);
    }
}
