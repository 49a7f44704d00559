//! Buffer operations
//!
//! Create buffer zones around geometries. Each feature is projected into a
//! local equirectangular frame in meters centred on its bounding box, buffered
//! there, and projected back to lon/lat:
//! - points become circles
//! - lines become the union of one capsule per segment
//! - polygons grow by the union with capsules around every ring, or shrink
//!   by the difference with them when the distance is negative

use geo::{
    BoundingRect, ConvexHull, Coord, Geometry, LineString, MapCoords, MultiPoint, MultiPolygon,
    Point, Polygon,
};
use geoverlay_core::{
    Algorithm, Error, Feature, FeatureCollection, OperationOptions, Result, Units,
};
use serde::Serialize;
use std::f64::consts::PI;
use std::time::Instant;
use tracing::{info, warn};

use super::classify::{classify, FeatureTypeCounts};
use super::measurements::{area_m2, length_km};
use super::relate::{self, from_parts, to_multipolygon};
use super::result::{timestamp, InputValidation, OperationMetadata, OperationResult};
use super::validate::{check_budget, ensure_valid};
use crate::maybe_rayon::*;

/// Mean earth radius in meters, the sphere used for lengths
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Parameters for buffer operations
#[derive(Debug, Clone, PartialEq)]
pub struct BufferParams {
    /// Buffer distance in `units` (positive = expand, negative = shrink)
    pub distance: f64,
    pub units: Units,
    /// Number of segments approximating a full circle (default: 8)
    pub steps: usize,
}

impl Default for BufferParams {
    fn default() -> Self {
        Self {
            distance: 1000.0,
            units: Units::Meters,
            steps: 8,
        }
    }
}

impl BufferParams {
    pub fn distance_meters(&self) -> f64 {
        self.distance * self.units.to_meters()
    }
}

/// Per-feature buffer trace
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferStep {
    pub feature_index: usize,
    pub feature_type: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub method: String,
    /// m², polygons only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_area: Option<f64>,
    /// km, lines only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_length: Option<f64>,
    pub buffered_area: f64,
    /// Percentage growth over the original area
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_growth: Option<f64>,
    /// The inward buffer removed the whole polygon
    pub empty: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferMetadata {
    pub distance: f64,
    pub units: String,
    pub distance_meters: f64,
    pub buffer_width: f64,
    pub buffer_direction: String,
    pub steps: usize,
    pub input_feature_count: usize,
    pub feature_types: FeatureTypeCounts,
    pub successful_buffers: usize,
    pub failed_buffers: usize,
    pub empty_results: usize,
    pub total_original_area: f64,
    pub total_buffered_area: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_growth_percentage: Option<f64>,
    /// Milliseconds
    pub total_execution_time: f64,
    pub buffer_steps: Vec<BufferStep>,
}

/// Buffer operation
pub struct Buffer;

impl Algorithm for Buffer {
    type Input = Vec<Feature>;
    type Output = OperationResult;
    type Params = BufferParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Buffer"
    }

    fn description(&self) -> &'static str {
        "Create buffer zones of a given distance around features"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        let options = OperationOptions::default()
            .with_units(params.units.as_str())
            .with_steps(params.steps);
        buffer(&input, params.distance, &options)
    }
}

/// Buffer every feature independently.
///
/// `distance` is in `options.units`. One feature failing does not stop the
/// others; the failure is recorded in `bufferSteps`.
pub fn buffer(features: &[Feature], distance: f64, options: &OperationOptions) -> Result<OperationResult> {
    if features.is_empty() {
        return Err(Error::InsufficientFeatures {
            operation: "Buffer",
            required: 1,
            actual: 0,
        });
    }
    if !distance.is_finite() {
        return Err(Error::InvalidParameter {
            name: "distance",
            value: distance.to_string(),
            reason: "buffer distance must be a finite number".into(),
        });
    }

    let started = Instant::now();
    let report = validate_buffer_input(features, distance, options);
    let (units, _) = options.parsed_units();
    let params = BufferParams {
        distance,
        units,
        steps: options.steps,
    };
    let meters = params.distance_meters();

    let outcomes: Vec<FeatureOutcome> = (0..features.len())
        .into_par_iter()
        .map(|i| buffer_feature(i, &features[i], &params, options.max_vertices))
        .collect();

    let mut result = FeatureCollection::new();
    let mut steps = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        if let Some(f) = outcome.feature {
            result.push(f);
        }
        steps.push(outcome.step);
    }

    let successful = steps.iter().filter(|s| s.success).count();
    let total_original_area: f64 = steps.iter().filter_map(|s| s.original_area).sum();
    let total_buffered_area: f64 = steps.iter().filter(|s| s.success).map(|s| s.buffered_area).sum();

    let metadata = BufferMetadata {
        distance,
        units: units.as_str().to_string(),
        distance_meters: meters,
        buffer_width: distance * 2.0,
        buffer_direction: direction(meters).to_string(),
        steps: options.steps,
        input_feature_count: features.len(),
        feature_types: classify(features).counts(),
        successful_buffers: successful,
        failed_buffers: steps.len() - successful,
        empty_results: steps.iter().filter(|s| s.empty).count(),
        total_original_area,
        total_buffered_area,
        area_growth_percentage: (total_original_area > 0.0)
            .then(|| (total_buffered_area - total_original_area) / total_original_area * 100.0),
        total_execution_time: started.elapsed().as_secs_f64() * 1000.0,
        buffer_steps: steps,
    };

    info!(
        "Buffer {} {}: {}/{} features buffered",
        distance,
        units.as_str(),
        metadata.successful_buffers,
        metadata.input_feature_count
    );

    Ok(
        OperationResult::success("buffer", result, OperationMetadata::Buffer(metadata))
            .with_warnings(report.warnings),
    )
}

/// Check buffer input without running it.
pub fn validate_buffer_input(
    features: &[Feature],
    distance: f64,
    options: &OperationOptions,
) -> InputValidation {
    let classified = classify(features);
    let mut report = InputValidation {
        counts: classified.counts(),
        ..Default::default()
    };

    if features.is_empty() {
        report.errors.push("Buffer requires at least 1 feature".into());
    }
    if !distance.is_finite() {
        report.errors.push("Buffer distance must be a finite number".into());
    } else if distance == 0.0 {
        report
            .warnings
            .push("Buffer distance is 0 - no buffering will occur".into());
    } else if distance < 0.0 && report.counts.points + report.counts.lines > 0 {
        report
            .warnings
            .push("Negative buffer distance only applies to polygons".into());
    }
    if options.steps < 3 {
        report
            .warnings
            .push("Buffer steps should be at least 3 for smooth circles".into());
    }
    if let (_, Some(warning)) = options.parsed_units() {
        report.warnings.push(warning);
    }
    report.details.push(format!(
        "{} {} with {} steps",
        distance, options.units, options.steps
    ));

    report.finish()
}

fn direction(meters: f64) -> &'static str {
    if meters > 0.0 {
        "outward"
    } else if meters < 0.0 {
        "inward"
    } else {
        "none"
    }
}

struct FeatureOutcome {
    feature: Option<Feature>,
    step: BufferStep,
}

fn buffer_feature(
    index: usize,
    feature: &Feature,
    params: &BufferParams,
    max_vertices: Option<usize>,
) -> FeatureOutcome {
    let feature_type = feature.geometry_type().unwrap_or("None").to_string();
    let geom = feature.geometry.as_ref();
    let is_areal = matches!(geom, Some(Geometry::Polygon(_) | Geometry::MultiPolygon(_)));
    let is_linear = matches!(geom, Some(Geometry::LineString(_) | Geometry::MultiLineString(_)));

    let mut step = BufferStep {
        feature_index: index,
        feature_type,
        success: false,
        error: None,
        method: method_name(geom, params.distance_meters()).to_string(),
        original_area: geom.filter(|_| is_areal).map(area_m2),
        original_length: geom.filter(|_| is_linear).map(length_km),
        buffered_area: 0.0,
        area_growth: None,
        empty: false,
    };

    let buffered = prepare(feature, max_vertices)
        .and_then(|valid| buffer_geometry(&valid, params.distance_meters(), params.steps));

    match buffered {
        Ok(Some(geometry)) => {
            let area = area_m2(&geometry);
            step.success = true;
            step.buffered_area = area;
            step.area_growth = step
                .original_area
                .filter(|a| *a > 0.0)
                .map(|a| (area - a) / a * 100.0);

            let mut out = Feature {
                geometry: Some(geometry),
                properties: feature.properties.clone(),
                id: feature.id.clone(),
            };
            out.set_property("operation", "buffer");
            out.set_property("bufferDate", timestamp());
            out.set_property("bufferDistance", params.distance);
            out.set_property("bufferUnits", params.units.as_str());
            out.set_property("bufferSteps", params.steps);
            out.set_property("originalType", step.feature_type.clone());
            out.set_property("bufferedArea", area);
            FeatureOutcome {
                feature: Some(out),
                step,
            }
        }
        Ok(None) => {
            step.success = true;
            step.empty = true;
            FeatureOutcome {
                feature: None,
                step,
            }
        }
        Err(e) => {
            warn!("Feature {}: buffer failed: {}", index + 1, e);
            step.error = Some(e.to_string());
            FeatureOutcome {
                feature: None,
                step,
            }
        }
    }
}

fn prepare(feature: &Feature, max_vertices: Option<usize>) -> Result<Geometry<f64>> {
    let geom = feature
        .geometry
        .as_ref()
        .ok_or_else(|| Error::Geometry("feature has no geometry".into()))?;
    check_budget(geom, max_vertices).map_err(Error::Geometry)?;

    let valid = ensure_valid(feature).map_err(|e| Error::Geometry(e.to_string()))?;
    valid
        .feature
        .geometry
        .clone()
        .ok_or_else(|| Error::Geometry("feature has no geometry".into()))
}

fn method_name(geom: Option<&Geometry<f64>>, meters: f64) -> &'static str {
    if meters == 0.0 {
        return "none";
    }
    match geom {
        Some(Geometry::Point(_) | Geometry::MultiPoint(_)) => "circle",
        Some(Geometry::LineString(_) | Geometry::MultiLineString(_)) => "corridor",
        Some(Geometry::Polygon(_) | Geometry::MultiPolygon(_)) if meters > 0.0 => "outward-offset",
        Some(Geometry::Polygon(_) | Geometry::MultiPolygon(_)) => "inward-offset",
        _ => "unsupported",
    }
}

/// Buffer a lon/lat geometry by `meters`.
///
/// Returns `Ok(None)` when an inward buffer consumes the whole polygon.
/// A zero distance returns the geometry unchanged.
pub fn buffer_geometry(geom: &Geometry<f64>, meters: f64, steps: usize) -> Result<Option<Geometry<f64>>> {
    if meters == 0.0 {
        return Ok(Some(geom.clone()));
    }

    let projection = LocalProjection::centered_on(geom)
        .ok_or_else(|| Error::Geometry("cannot buffer an empty geometry".into()))?;
    let local = projection.forward(geom);
    let radius = meters.abs();

    let buffered = match &local {
        Geometry::Point(_) | Geometry::MultiPoint(_) | Geometry::LineString(_)
        | Geometry::MultiLineString(_)
            if meters < 0.0 =>
        {
            return Err(Error::InvalidParameter {
                name: "distance",
                value: meters.to_string(),
                reason: "negative buffer distance is only valid for polygons".into(),
            })
        }
        Geometry::Point(p) => MultiPolygon::new(vec![circle(p.0, radius, steps)]),
        Geometry::MultiPoint(mp) => {
            union_all(mp.iter().map(|p| circle(p.0, radius, steps)).collect())?
        }
        Geometry::LineString(ls) => union_all(corridor(ls, radius, steps))?,
        Geometry::MultiLineString(mls) => {
            union_all(mls.iter().flat_map(|ls| corridor(ls, radius, steps)).collect())?
        }
        Geometry::Polygon(_) | Geometry::MultiPolygon(_) => {
            let shape = to_multipolygon(&local)
                .ok_or_else(|| Error::Geometry("not a polygon".into()))?;
            let rings = union_all(ring_capsules(&shape, radius, steps))?;
            if meters > 0.0 {
                relate::union(&shape, &rings)?
            } else {
                relate::difference(&shape, &rings)?
            }
        }
        other => {
            return Err(Error::UnsupportedCombination(format!(
                "Cannot buffer geometry type {}",
                geoverlay_core::vector::geometry_type_name(other)
            )))
        }
    };

    Ok(from_parts(projection.inverse(&buffered).0))
}

/// Create a circular buffer around a lon/lat point, radius in meters.
pub fn buffer_point(point: &Point<f64>, params: &BufferParams) -> Polygon<f64> {
    let projection = LocalProjection::at(point.0);
    let ring = circle(Coord { x: 0.0, y: 0.0 }, params.distance_meters().abs(), params.steps);
    projection.inverse_polygon(&ring)
}

/// Circle approximated with `steps` vertices.
///
/// Vertices sit on the circumscribed circle so the polygon covers the disk.
fn circle(center: Coord<f64>, radius: f64, steps: usize) -> Polygon<f64> {
    let n = steps.max(3);
    let r = radius / (PI / n as f64).cos();

    let mut coords = Vec::with_capacity(n + 1);
    for i in 0..n {
        let angle = 2.0 * PI * i as f64 / n as f64;
        coords.push(Coord {
            x: center.x + r * angle.cos(),
            y: center.y + r * angle.sin(),
        });
    }
    // Close the ring
    coords.push(coords[0]);

    Polygon::new(LineString::new(coords), vec![])
}

/// Segment capsule: convex hull of the circles at both ends
fn capsule(a: Coord<f64>, b: Coord<f64>, radius: f64, steps: usize) -> Polygon<f64> {
    if a == b {
        return circle(a, radius, steps);
    }
    let points: Vec<Point<f64>> = circle(a, radius, steps)
        .exterior()
        .points()
        .chain(circle(b, radius, steps).exterior().points())
        .collect();
    MultiPoint::new(points).convex_hull()
}

fn corridor(ls: &LineString<f64>, radius: f64, steps: usize) -> Vec<Polygon<f64>> {
    match ls.0.as_slice() {
        [] => Vec::new(),
        [only] => vec![circle(*only, radius, steps)],
        _ => ls.lines().map(|l| capsule(l.start, l.end, radius, steps)).collect(),
    }
}

fn ring_capsules(shape: &MultiPolygon<f64>, radius: f64, steps: usize) -> Vec<Polygon<f64>> {
    shape
        .iter()
        .flat_map(|p| std::iter::once(p.exterior()).chain(p.interiors()))
        .flat_map(|ring| corridor(ring, radius, steps))
        .collect()
}

/// Pairwise tree reduction of polygon unions
fn union_all(polygons: Vec<Polygon<f64>>) -> Result<MultiPolygon<f64>> {
    let mut level: Vec<MultiPolygon<f64>> = polygons
        .into_iter()
        .map(|p| MultiPolygon::new(vec![p]))
        .collect();

    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        let mut it = level.into_iter();
        while let Some(a) = it.next() {
            match it.next() {
                Some(b) => next.push(relate::union(&a, &b)?),
                None => next.push(a),
            }
        }
        level = next;
    }

    Ok(level.pop().unwrap_or_else(|| MultiPolygon::new(vec![])))
}

/// Equirectangular frame in meters around a reference coordinate
#[derive(Debug, Clone, Copy)]
struct LocalProjection {
    origin: Coord<f64>,
    /// Meters per degree of longitude at the origin latitude
    mx: f64,
    /// Meters per degree of latitude
    my: f64,
}

impl LocalProjection {
    fn at(origin: Coord<f64>) -> Self {
        let my = EARTH_RADIUS_M * PI / 180.0;
        let mx = my * origin.y.to_radians().cos().max(1e-6);
        Self { origin, mx, my }
    }

    fn centered_on(geom: &Geometry<f64>) -> Option<Self> {
        geom.bounding_rect().map(|r| Self::at(r.center()))
    }

    fn to_local(&self, c: Coord<f64>) -> Coord<f64> {
        Coord {
            x: (c.x - self.origin.x) * self.mx,
            y: (c.y - self.origin.y) * self.my,
        }
    }

    fn to_lonlat(&self, c: Coord<f64>) -> Coord<f64> {
        Coord {
            x: self.origin.x + c.x / self.mx,
            y: self.origin.y + c.y / self.my,
        }
    }

    fn forward(&self, geom: &Geometry<f64>) -> Geometry<f64> {
        let p = *self;
        geom.map_coords(move |c| p.to_local(c))
    }

    fn inverse(&self, shape: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        let p = *self;
        shape.map_coords(move |c| p.to_lonlat(c))
    }

    fn inverse_polygon(&self, polygon: &Polygon<f64>) -> Polygon<f64> {
        let p = *self;
        polygon.map_coords(move |c| p.to_lonlat(c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::{line_string, point, polygon};

    fn square_feature(size: f64) -> Feature {
        Feature::new(polygon![
            (x: 0.0, y: 0.0),
            (x: size, y: 0.0),
            (x: size, y: size),
            (x: 0.0, y: size),
            (x: 0.0, y: 0.0),
        ])
    }

    #[test]
    fn test_buffer_point_circle() {
        let params = BufferParams {
            distance: 1000.0,
            units: Units::Meters,
            steps: 64,
        };
        let polygon = buffer_point(&point!(x: 10.0, y: 45.0), &params);

        // Area should approximate π * r²
        let expected = PI * 1000.0 * 1000.0;
        let actual = area_m2(&Geometry::Polygon(polygon));
        assert_relative_eq!(actual, expected, max_relative = 0.01);
    }

    #[test]
    fn test_buffer_point_vertex_count() {
        let params = BufferParams {
            distance: 1.0,
            units: Units::Kilometers,
            steps: 32,
        };
        let polygon = buffer_point(&point!(x: 5.0, y: 5.0), &params);

        // Should have steps + 1 coordinates (closed ring)
        assert_eq!(polygon.exterior().0.len(), 33);
    }

    #[test]
    fn test_buffer_distance_affects_size() {
        let p = Geometry::Point(point!(x: 0.0, y: 0.0));
        let small = buffer_geometry(&p, 100.0, 16).unwrap().unwrap();
        let big = buffer_geometry(&p, 500.0, 16).unwrap().unwrap();
        assert!(area_m2(&big) > area_m2(&small) * 20.0);
    }

    #[test]
    fn test_line_corridor() {
        let line = Feature::new(line_string![(x: 0.0, y: 0.0), (x: 0.01, y: 0.0), (x: 0.01, y: 0.01)]);
        let r = buffer(&[line], 100.0, &OperationOptions::default()).unwrap();
        let m = r.metadata.as_buffer().unwrap();

        assert_eq!(r.result.len(), 1);
        assert_eq!(m.buffer_width, 200.0);
        assert_eq!(m.buffer_steps[0].method, "corridor");
        // Two ~1.1 km legs, 200 m wide
        let area = m.buffer_steps[0].buffered_area;
        assert!(area > 2.0 * 1113.0 * 200.0 * 0.9, "area {area}");
    }

    #[test]
    fn test_polygon_outward_and_inward() {
        let sq = square_feature(0.01);
        let original = area_m2(sq.geometry.as_ref().unwrap());

        let out = buffer(&[sq.clone()], 100.0, &OperationOptions::default()).unwrap();
        let grown = area_m2(out.result.features[0].geometry.as_ref().unwrap());
        assert!(grown > original);
        assert_eq!(out.metadata.as_buffer().unwrap().buffer_direction, "outward");

        let inward = buffer(&[sq], -100.0, &OperationOptions::default()).unwrap();
        let shrunk = area_m2(inward.result.features[0].geometry.as_ref().unwrap());
        assert!(shrunk < original);
    }

    #[test]
    fn test_inward_buffer_can_erase() {
        let tiny = square_feature(0.001);
        let r = buffer(&[tiny], -500.0, &OperationOptions::default()).unwrap();
        let m = r.metadata.as_buffer().unwrap();

        assert!(r.success);
        assert!(r.result.is_empty());
        assert_eq!(m.empty_results, 1);
        assert_eq!(m.failed_buffers, 0);
    }

    #[test]
    fn test_zero_distance_warns() {
        let p = Feature::new(point!(x: 1.0, y: 1.0));
        let r = buffer(&[p.clone()], 0.0, &OperationOptions::default()).unwrap();

        assert_eq!(r.result.features[0].geometry, p.geometry);
        assert!(r
            .warnings
            .contains(&"Buffer distance is 0 - no buffering will occur".to_string()));
    }

    #[test]
    fn test_negative_point_is_per_feature_failure() {
        let features = vec![Feature::new(point!(x: 1.0, y: 1.0)), square_feature(0.01)];
        let r = buffer(&features, -10.0, &OperationOptions::default()).unwrap();
        let m = r.metadata.as_buffer().unwrap();

        assert_eq!(m.failed_buffers, 1);
        assert_eq!(m.successful_buffers, 1);
        assert!(!m.buffer_steps[0].success);
        assert_eq!(r.result.len(), 1);
    }

    #[test]
    fn test_units_and_invalid_distance() {
        let p = Feature::new(point!(x: 0.0, y: 0.0));
        let km = buffer(&[p.clone()], 1.0, &OperationOptions::default().with_units("kilometers"))
            .unwrap();
        assert_eq!(km.metadata.as_buffer().unwrap().distance_meters, 1000.0);

        let odd = buffer(&[p.clone()], 1.0, &OperationOptions::default().with_units("leagues"))
            .unwrap();
        assert!(odd.warnings.iter().any(|w| w.contains("Unusual units")));

        assert!(buffer(&[p], f64::NAN, &OperationOptions::default()).is_err());
        assert!(buffer(&[], 10.0, &OperationOptions::default()).is_err());
    }

    #[test]
    fn test_low_steps_warning() {
        let report = validate_buffer_input(
            &[Feature::new(point!(x: 0.0, y: 0.0))],
            10.0,
            &OperationOptions::default().with_steps(2),
        );
        assert!(report.valid);
        assert_eq!(
            report.warnings,
            vec!["Buffer steps should be at least 3 for smooth circles".to_string()]
        );
    }
}
