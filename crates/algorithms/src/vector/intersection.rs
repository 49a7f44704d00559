//! Intersection of feature pairs
//!
//! Dispatch is by geometry class pair:
//! - polygon × polygon: planar intersection
//! - polygon × line: inside vertex runs of the line, falling back to the
//!   boundary crossing points when no run has two vertices
//! - polygon × point: the points that fall inside (boundary included)
//! - line × line: crossing points and collinear overlaps

use geo::line_intersection::{line_intersection, LineIntersection};
use geo::{Coord, Geometry, Intersects, LineString, MultiPolygon, Point};
use geoverlay_core::{
    Algorithm, AttributeValue, BBox, Error, Feature, FeatureCollection, OperationOptions,
    Properties, Result,
};
use serde::Serialize;
use std::borrow::Cow;
use tracing::{debug, info, warn};

use super::classify::{classify, FeatureTypeCounts, SkippedFeature};
use super::measurements::{area_m2, length_km};
use super::relate::{self, covers_point, from_parts, to_multipolygon};
use super::result::{timestamp, InputValidation, OperationMetadata, OperationResult};
use super::validate::{check_budget, ensure_valid, validate};
use crate::maybe_rayon::*;

/// Statistics for one pairwise intersection
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntersectionMetadata {
    pub intersects: bool,
    pub intersection_type: String,
    pub feature1_type: String,
    pub feature2_type: String,
    pub output_features: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intersection_area: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area1: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area2: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlap_percentage1: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlap_percentage2: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_intersected_length: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_line_length: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polygon_area: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intersection_points: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points_inside: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<BBox>,
}

/// Outcome of one pair inside a multi-feature run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairResult {
    pub feature1_index: usize,
    pub feature2_index: usize,
    pub success: bool,
    pub intersects: bool,
    pub output_features: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intersection_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiIntersectionMetadata {
    pub input_feature_count: usize,
    pub feature_types: FeatureTypeCounts,
    pub total_pairs: usize,
    pub intersecting_pairs: usize,
    pub failed_pairs: usize,
    pub output_features: usize,
    pub pairwise_results: Vec<PairResult>,
    pub skipped: Vec<SkippedFeature>,
}

/// Intersection operation over a feature list
pub struct Intersection;

impl Algorithm for Intersection {
    type Input = Vec<Feature>;
    type Output = OperationResult;
    type Params = OperationOptions;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Intersection"
    }

    fn description(&self) -> &'static str {
        "Compute the shared area, segments or points of features"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        match input.as_slice() {
            [a, b] => intersection(a, b, &params),
            _ => multiple_intersection(&input, &params),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Point,
    Line,
    Polygon,
}

fn shape_of(feature: &Feature, label: &str) -> Result<Shape> {
    match feature.geometry.as_ref() {
        None => Err(Error::InvalidParameter {
            name: "feature",
            value: label.to_string(),
            reason: "feature has no geometry".into(),
        }),
        Some(Geometry::Point(_) | Geometry::MultiPoint(_)) => Ok(Shape::Point),
        Some(Geometry::LineString(_) | Geometry::MultiLineString(_)) => Ok(Shape::Line),
        Some(Geometry::Polygon(_) | Geometry::MultiPolygon(_)) => Ok(Shape::Polygon),
        Some(other) => Err(Error::UnsupportedCombination(format!(
            "{label} has unsupported geometry type {}",
            geoverlay_core::vector::geometry_type_name(other)
        ))),
    }
}

/// Intersect two features.
///
/// Disjoint inputs are a success with no output features and
/// `metadata.intersects == false`.
pub fn intersection(a: &Feature, b: &Feature, options: &OperationOptions) -> Result<OperationResult> {
    let (result, metadata) = intersect_pair(a, b, options)?;
    info!(
        "Intersection ({}): {} output feature(s)",
        metadata.intersection_type,
        result.len()
    );
    Ok(OperationResult::success(
        "intersection",
        result,
        OperationMetadata::Intersection(metadata),
    ))
}

fn intersect_pair(
    a: &Feature,
    b: &Feature,
    options: &OperationOptions,
) -> Result<(FeatureCollection, IntersectionMetadata)> {
    let shapes = (shape_of(a, "Feature 1")?, shape_of(b, "Feature 2")?);
    for f in [a, b] {
        if let Some(geom) = f.geometry.as_ref() {
            check_budget(geom, options.max_vertices).map_err(Error::Geometry)?;
        }
    }

    let (result, mut metadata) = match shapes {
        (Shape::Polygon, Shape::Polygon) => polygon_polygon(a, b)?,
        (Shape::Polygon, Shape::Line) => polygon_line(a, b)?,
        (Shape::Line, Shape::Polygon) => polygon_line(b, a)?,
        (Shape::Polygon, Shape::Point) => polygon_point(a, b)?,
        (Shape::Point, Shape::Polygon) => polygon_point(b, a)?,
        (Shape::Line, Shape::Line) => line_line(a, b)?,
        _ => {
            return Err(Error::UnsupportedCombination(format!(
                "Unsupported geometry combination: {} x {}",
                a.geometry_type().unwrap_or("unknown"),
                b.geometry_type().unwrap_or("unknown")
            )))
        }
    };

    metadata.feature1_type = a.geometry_type().unwrap_or_default().to_string();
    metadata.feature2_type = b.geometry_type().unwrap_or_default().to_string();
    metadata.output_features = result.len();
    Ok((result, metadata))
}

/// Validated polygonal shape of a feature, repaired when needed
fn polygon_shape<'a>(feature: &'a Feature, label: &str) -> Result<(Cow<'a, Feature>, MultiPolygon<f64>)> {
    let validated = ensure_valid(feature).map_err(|e| Error::Geometry(format!("{label}: {e}")))?;
    let shape = validated
        .feature
        .geometry
        .as_ref()
        .and_then(to_multipolygon)
        .ok_or_else(|| Error::Geometry(format!("{label} is not a polygon")))?;
    Ok((validated.feature, shape))
}

fn polygon_polygon(a: &Feature, b: &Feature) -> Result<(FeatureCollection, IntersectionMetadata)> {
    let (fa, sa) = polygon_shape(a, "Feature 1")?;
    let (fb, sb) = polygon_shape(b, "Feature 2")?;
    let area1 = area_m2(&Geometry::MultiPolygon(sa.clone()));
    let area2 = area_m2(&Geometry::MultiPolygon(sb.clone()));

    let mut metadata = IntersectionMetadata {
        intersection_type: "polygon-polygon".into(),
        area1: Some(area1),
        area2: Some(area2),
        ..Default::default()
    };

    if !relate::guarded("intersects", || sa.intersects(&sb))? {
        metadata.message = Some("Polygons do not intersect".into());
        return Ok((FeatureCollection::new(), metadata));
    }
    metadata.intersects = true;

    let shared = relate::intersection(&sa, &sb)?;
    let Some(geometry) = from_parts(shared.0) else {
        metadata.message = Some("Polygons touch but share no area".into());
        metadata.intersection_area = Some(0.0);
        return Ok((FeatureCollection::new(), metadata));
    };

    let area = area_m2(&geometry);
    let pct1 = percentage(area, area1);
    let pct2 = percentage(area, area2);
    metadata.intersection_area = Some(area);
    metadata.overlap_percentage1 = Some(pct1);
    metadata.overlap_percentage2 = Some(pct2);
    metadata.bounds = BBox::of(&geometry);

    let mut props = merged_properties(&fa.properties, &fb.properties);
    props.insert("operation".into(), "intersection".into());
    props.insert("intersectionDate".into(), timestamp().into());
    props.insert("intersectionArea".into(), area.into());
    props.insert("overlapPercentage1".into(), pct1.into());
    props.insert("overlapPercentage2".into(), pct2.into());
    props.insert("feature1Properties".into(), AttributeValue::Object(fa.properties.clone()));
    props.insert("feature2Properties".into(), AttributeValue::Object(fb.properties.clone()));

    let result = vec![Feature::new(geometry).with_properties(props)].into();
    Ok((result, metadata))
}

fn polygon_line(poly: &Feature, line: &Feature) -> Result<(FeatureCollection, IntersectionMetadata)> {
    let (fp, shape) = polygon_shape(poly, "Polygon")?;
    let line_geom = line
        .geometry
        .as_ref()
        .ok_or_else(|| Error::Geometry("Line has no geometry".into()))?;
    let parts = line_parts(line_geom);

    let mut metadata = IntersectionMetadata {
        intersection_type: "polygon-line".into(),
        original_line_length: Some(length_km(line_geom)),
        polygon_area: Some(area_m2(&Geometry::MultiPolygon(shape.clone()))),
        total_intersected_length: Some(0.0),
        intersection_points: Some(0),
        ..Default::default()
    };

    if !relate::guarded("intersects", || shape.intersects(line_geom))? {
        metadata.message = Some("Line does not intersect polygon".into());
        return Ok((FeatureCollection::new(), metadata));
    }
    metadata.intersects = true;

    let crossings: Vec<Point<f64>> = parts
        .iter()
        .flat_map(|ls| boundary_crossings(ls, &shape))
        .collect();
    metadata.intersection_points = Some(crossings.len());

    let runs: Vec<LineString<f64>> = parts.iter().flat_map(|ls| inside_runs(ls, &shape)).collect();

    let mut result = FeatureCollection::new();
    let mut total_km = 0.0;

    if runs.is_empty() {
        debug!("No inside run of two vertices; emitting {} crossing points", crossings.len());
        for (i, p) in crossings.into_iter().enumerate() {
            let mut props = line_output_properties(&fp, line);
            props.insert("pointIndex".into(), i.into());
            result.push(Feature::new(p).with_properties(props));
        }
    } else {
        for (i, run) in runs.into_iter().enumerate() {
            let geom = Geometry::LineString(run);
            let km = length_km(&geom);
            total_km += km;

            let mut props = line_output_properties(&fp, line);
            props.insert("segmentIndex".into(), i.into());
            props.insert("lengthKm".into(), km.into());
            result.push(Feature::new(geom).with_properties(props));
        }
    }

    metadata.total_intersected_length = Some(total_km);
    metadata.bounds = result.bounds();
    Ok((result, metadata))
}

fn line_output_properties(poly: &Feature, line: &Feature) -> Properties {
    let mut props = line.properties.clone();
    props.insert("operation".into(), "intersection".into());
    props.insert("intersectionDate".into(), timestamp().into());
    props.insert("polygonProperties".into(), AttributeValue::Object(poly.properties.clone()));
    props.insert("lineProperties".into(), AttributeValue::Object(line.properties.clone()));
    props
}

fn polygon_point(poly: &Feature, point: &Feature) -> Result<(FeatureCollection, IntersectionMetadata)> {
    let (fp, shape) = polygon_shape(poly, "Polygon")?;
    let points = match point.geometry.as_ref() {
        Some(Geometry::Point(p)) => vec![*p],
        Some(Geometry::MultiPoint(mp)) => mp.0.clone(),
        _ => Vec::new(),
    };

    let mut result = FeatureCollection::new();
    for p in points.iter().filter(|p| covers_point(&shape, p)) {
        let mut props = point.properties.clone();
        props.insert("operation".into(), "intersection".into());
        props.insert("intersectionDate".into(), timestamp().into());
        props.insert("polygonProperties".into(), AttributeValue::Object(fp.properties.clone()));
        result.push(Feature::new(*p).with_properties(props));
    }

    let metadata = IntersectionMetadata {
        intersects: !result.is_empty(),
        intersection_type: "polygon-point".into(),
        points_inside: Some(result.len()),
        polygon_area: Some(area_m2(&Geometry::MultiPolygon(shape))),
        message: result.is_empty().then(|| "Point is outside polygon".to_string()),
        bounds: result.bounds(),
        ..Default::default()
    };
    Ok((result, metadata))
}

fn line_line(a: &Feature, b: &Feature) -> Result<(FeatureCollection, IntersectionMetadata)> {
    let empty = Geometry::LineString(LineString::new(vec![]));
    let la = line_parts(a.geometry.as_ref().unwrap_or(&empty));
    let lb = line_parts(b.geometry.as_ref().unwrap_or(&empty));

    let mut points: Vec<Coord<f64>> = Vec::new();
    let mut overlaps: Vec<LineString<f64>> = Vec::new();

    for s1 in la.iter().flat_map(|ls| ls.lines()) {
        for s2 in lb.iter().flat_map(|ls| ls.lines()) {
            match line_intersection(s1, s2) {
                Some(LineIntersection::SinglePoint { intersection, .. }) => {
                    push_unique(&mut points, intersection)
                }
                Some(LineIntersection::Collinear { intersection }) => {
                    if intersection.start == intersection.end {
                        push_unique(&mut points, intersection.start);
                    } else {
                        overlaps.push(LineString::new(vec![intersection.start, intersection.end]));
                    }
                }
                None => {}
            }
        }
    }

    // Points lying on an overlap are already represented by it
    points.retain(|c| !overlaps.iter().any(|ls| ls.intersects(c)));

    let base = merged_properties(&a.properties, &b.properties);
    let mut result = FeatureCollection::new();
    let crossing_count = points.len();

    for (i, c) in points.into_iter().enumerate() {
        let mut props = base.clone();
        props.insert("operation".into(), "intersection".into());
        props.insert("intersectionDate".into(), timestamp().into());
        props.insert("crossingIndex".into(), i.into());
        result.push(Feature::new(Point::from(c)).with_properties(props));
    }
    for (i, ls) in overlaps.into_iter().enumerate() {
        let mut props = base.clone();
        props.insert("operation".into(), "intersection".into());
        props.insert("intersectionDate".into(), timestamp().into());
        props.insert("overlapIndex".into(), i.into());
        result.push(Feature::new(ls).with_properties(props));
    }

    let metadata = IntersectionMetadata {
        intersects: !result.is_empty(),
        intersection_type: "line-line".into(),
        intersection_points: Some(crossing_count),
        message: result.is_empty().then(|| "Lines do not intersect".to_string()),
        bounds: result.bounds(),
        ..Default::default()
    };
    Ok((result, metadata))
}

/// Intersect every applicable pair in a mixed feature list.
///
/// A failing pair is recorded and skipped; it never aborts the run.
pub fn multiple_intersection(
    features: &[Feature],
    options: &OperationOptions,
) -> Result<OperationResult> {
    if features.len() < 2 {
        return Err(Error::InsufficientFeatures {
            operation: "Intersection",
            required: 2,
            actual: features.len(),
        });
    }

    let classified = classify(features);
    let polys: Vec<usize> = classified.polygons.iter().map(|c| c.index).collect();
    let lines: Vec<usize> = classified.lines.iter().map(|c| c.index).collect();
    let points: Vec<usize> = classified.points.iter().map(|c| c.index).collect();

    let mut jobs: Vec<(usize, usize)> = Vec::new();
    for (k, &i) in polys.iter().enumerate() {
        jobs.extend(polys[k + 1..].iter().map(|&j| (i, j)));
        jobs.extend(lines.iter().map(|&j| (i, j)));
        jobs.extend(points.iter().map(|&j| (i, j)));
    }
    for (k, &i) in lines.iter().enumerate() {
        jobs.extend(lines[k + 1..].iter().map(|&j| (i, j)));
    }

    if jobs.is_empty() {
        let c = classified.counts();
        return Err(Error::UnsupportedCombination(format!(
            "Unsupported feature combination: {} polygons, {} lines, {} points",
            c.polygons, c.lines, c.points
        )));
    }

    let (result, mut metadata) = run_pairs(features, &jobs, options);
    metadata.feature_types = classified.counts();
    metadata.skipped = classified.unsupported;

    info!(
        "Multiple intersection: {}/{} pairs intersect, {} output feature(s)",
        metadata.intersecting_pairs,
        metadata.total_pairs,
        result.len()
    );
    Ok(OperationResult::success(
        "intersection",
        result,
        OperationMetadata::MultiIntersection(metadata),
    ))
}

/// Intersect every pair of polygon features.
pub fn find_all_intersections(
    features: &[Feature],
    options: &OperationOptions,
) -> Result<OperationResult> {
    let classified = classify(features);
    let polys: Vec<usize> = classified.polygons.iter().map(|c| c.index).collect();
    if polys.len() < 2 {
        return Err(Error::InsufficientFeatures {
            operation: "Finding intersections",
            required: 2,
            actual: polys.len(),
        });
    }

    let jobs: Vec<(usize, usize)> = polys
        .iter()
        .enumerate()
        .flat_map(|(k, &i)| polys[k + 1..].iter().map(move |&j| (i, j)))
        .collect();

    let (result, mut metadata) = run_pairs(features, &jobs, options);
    metadata.feature_types = classified.counts();
    metadata.skipped = classified
        .unsupported
        .into_iter()
        .chain(
            classified
                .points
                .iter()
                .chain(&classified.lines)
                .map(|c| SkippedFeature::new(c.index, "Not a polygon")),
        )
        .collect();
    metadata.skipped.sort_by_key(|s| s.index);

    Ok(OperationResult::success(
        "intersection",
        result,
        OperationMetadata::MultiIntersection(metadata),
    ))
}

/// Evaluate pairs in parallel, then assemble in job order.
fn run_pairs(
    features: &[Feature],
    jobs: &[(usize, usize)],
    options: &OperationOptions,
) -> (FeatureCollection, MultiIntersectionMetadata) {
    let outcomes: Vec<Result<(FeatureCollection, IntersectionMetadata)>> = jobs
        .to_vec()
        .into_par_iter()
        .map(|(i, j)| intersect_pair(&features[i], &features[j], options))
        .collect();

    let mut result = FeatureCollection::new();
    let mut metadata = MultiIntersectionMetadata {
        input_feature_count: features.len(),
        total_pairs: jobs.len(),
        ..Default::default()
    };

    for (pair_index, (&(i, j), outcome)) in jobs.iter().zip(outcomes).enumerate() {
        match outcome {
            Ok((fc, meta)) => {
                if meta.intersects {
                    metadata.intersecting_pairs += 1;
                }
                metadata.pairwise_results.push(PairResult {
                    feature1_index: i,
                    feature2_index: j,
                    success: true,
                    intersects: meta.intersects,
                    output_features: fc.len(),
                    intersection_type: Some(meta.intersection_type),
                    error: None,
                });
                for mut f in fc {
                    f.set_property("pairIndex", pair_index);
                    f.set_property("feature1Index", i);
                    f.set_property("feature2Index", j);
                    result.push(f);
                }
            }
            Err(e) => {
                warn!("Intersection of features {} and {} failed: {}", i + 1, j + 1, e);
                metadata.failed_pairs += 1;
                metadata.pairwise_results.push(PairResult {
                    feature1_index: i,
                    feature2_index: j,
                    success: false,
                    intersects: false,
                    output_features: 0,
                    intersection_type: None,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    metadata.output_features = result.len();
    (result, metadata)
}

/// Check intersection input without running it.
pub fn validate_intersection_input(features: &[Feature]) -> InputValidation {
    let classified = classify(features);
    let counts = classified.counts();
    let mut report = InputValidation {
        counts,
        ..Default::default()
    };

    if features.len() < 2 {
        report.errors.push("Intersection requires at least 2 features".into());
    } else {
        let applicable = (counts.polygons >= 2)
            || (counts.polygons >= 1 && counts.lines + counts.points >= 1)
            || counts.lines >= 2;
        if !applicable {
            report.errors.push(format!(
                "Unsupported feature combination: {} polygons, {} lines, {} points",
                counts.polygons, counts.lines, counts.points
            ));
        }
    }

    for item in &classified.polygons {
        let v = validate(item.feature);
        if !v.valid {
            report.warnings.push(format!(
                "Feature {} has invalid geometry: {}",
                item.index + 1,
                v.issues.join("; ")
            ));
        }
    }
    if counts.unsupported > 0 {
        report
            .warnings
            .push(format!("{} unsupported features will be ignored", counts.unsupported));
    }
    report.details.push(format!(
        "{} polygons, {} lines, {} points",
        counts.polygons, counts.lines, counts.points
    ));

    report.finish()
}

/// `first` wins over `second` on key collision
fn merged_properties(first: &Properties, second: &Properties) -> Properties {
    let mut props = second.clone();
    props.extend(first.iter().map(|(k, v)| (k.clone(), v.clone())));
    props
}

fn percentage(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole * 100.0
    } else {
        0.0
    }
}

fn line_parts(geom: &Geometry<f64>) -> Vec<LineString<f64>> {
    match geom {
        Geometry::LineString(ls) => vec![ls.clone()],
        Geometry::MultiLineString(mls) => mls.0.clone(),
        _ => Vec::new(),
    }
}

/// Maximal runs of at least two consecutive vertices inside the polygon
fn inside_runs(line: &LineString<f64>, shape: &MultiPolygon<f64>) -> Vec<LineString<f64>> {
    let mut runs = Vec::new();
    let mut current: Vec<Coord<f64>> = Vec::new();

    for c in line.coords() {
        if covers_point(shape, &Point::from(*c)) {
            current.push(*c);
        } else {
            if current.len() >= 2 {
                runs.push(LineString::new(std::mem::take(&mut current)));
            }
            current.clear();
        }
    }
    if current.len() >= 2 {
        runs.push(LineString::new(current));
    }
    runs
}

/// Points where the line meets any ring of the polygon
fn boundary_crossings(line: &LineString<f64>, shape: &MultiPolygon<f64>) -> Vec<Point<f64>> {
    let mut out: Vec<Coord<f64>> = Vec::new();

    for polygon in shape {
        let rings = std::iter::once(polygon.exterior()).chain(polygon.interiors());
        for ring in rings {
            for edge in ring.lines() {
                for seg in line.lines() {
                    match line_intersection(seg, edge) {
                        Some(LineIntersection::SinglePoint { intersection, .. }) => {
                            push_unique(&mut out, intersection)
                        }
                        Some(LineIntersection::Collinear { intersection }) => {
                            push_unique(&mut out, intersection.start);
                            push_unique(&mut out, intersection.end);
                        }
                        None => {}
                    }
                }
            }
        }
    }

    out.into_iter().map(Point::from).collect()
}

fn push_unique(out: &mut Vec<Coord<f64>>, c: Coord<f64>) {
    if !out.contains(&c) {
        out.push(c);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{line_string, point, polygon, Polygon};

    fn square(x0: f64, y0: f64, size: f64) -> Polygon<f64> {
        polygon![
            (x: x0, y: y0),
            (x: x0 + size, y: y0),
            (x: x0 + size, y: y0 + size),
            (x: x0, y: y0 + size),
            (x: x0, y: y0),
        ]
    }

    fn opts() -> OperationOptions {
        OperationOptions::default()
    }

    #[test]
    fn test_overlapping_polygons() {
        let a = Feature::new(square(0.0, 0.0, 0.02)).with_property("name", "a");
        let b = Feature::new(square(0.01, 0.0, 0.02))
            .with_property("name", "b")
            .with_property("zone", "B");
        let r = intersection(&a, &b, &opts()).unwrap();
        let m = r.metadata.as_intersection().unwrap();

        assert!(m.intersects);
        assert_eq!(r.result.len(), 1);
        let pct = m.overlap_percentage1.unwrap();
        assert!((pct - 50.0).abs() < 0.5, "overlap {pct}");

        let out = &r.result.features[0];
        assert_eq!(out.name(), Some("a"));
        assert_eq!(out.get_property("zone"), Some(&AttributeValue::from("B")));
        assert!(out.get_property("feature2Properties").is_some());
    }

    #[test]
    fn test_disjoint_polygons_empty_success() {
        let a = Feature::new(square(0.0, 0.0, 1.0));
        let b = Feature::new(square(5.0, 5.0, 1.0));
        let r = intersection(&a, &b, &opts()).unwrap();

        assert!(r.success);
        assert!(r.result.is_empty());
        let m = r.metadata.as_intersection().unwrap();
        assert!(!m.intersects);
        assert_eq!(m.message.as_deref(), Some("Polygons do not intersect"));
    }

    #[test]
    fn test_polygon_line_inside_run() {
        let poly = Feature::new(square(0.0, 0.0, 1.0));
        let line = Feature::new(line_string![
            (x: -1.0, y: 0.5),
            (x: 0.2, y: 0.5),
            (x: 0.5, y: 0.5),
            (x: 0.8, y: 0.5),
            (x: 2.0, y: 0.5),
        ]);
        let r = intersection(&line, &poly, &opts()).unwrap();
        let m = r.metadata.as_intersection().unwrap();

        assert!(m.intersects);
        assert_eq!(r.result.len(), 1);
        assert_eq!(r.result.features[0].geometry_type(), Some("LineString"));
        assert_eq!(m.intersection_points, Some(2));
        assert!(m.total_intersected_length.unwrap() > 0.0);
    }

    #[test]
    fn test_polygon_line_falls_back_to_crossing_points() {
        let poly = Feature::new(square(0.0, 0.0, 1.0));
        let line = Feature::new(line_string![(x: -1.0, y: 0.5), (x: 2.0, y: 0.5)]);
        let r = intersection(&poly, &line, &opts()).unwrap();

        assert_eq!(r.result.len(), 2);
        assert!(r.result.iter().all(|f| f.geometry_type() == Some("Point")));
    }

    #[test]
    fn test_polygon_line_outside() {
        let poly = Feature::new(square(0.0, 0.0, 1.0));
        let line = Feature::new(line_string![(x: 5.0, y: 5.0), (x: 6.0, y: 6.0)]);
        let r = intersection(&poly, &line, &opts()).unwrap();

        assert!(r.result.is_empty());
        assert!(!r.metadata.as_intersection().unwrap().intersects);
    }

    #[test]
    fn test_polygon_point() {
        let poly = Feature::new(square(0.0, 0.0, 1.0)).with_property("name", "field");
        let inside = Feature::new(point!(x: 0.5, y: 0.5));
        let outside = Feature::new(point!(x: 3.0, y: 0.5));

        let r = intersection(&poly, &inside, &opts()).unwrap();
        assert_eq!(r.result.len(), 1);
        assert!(r.result.features[0].get_property("polygonProperties").is_some());

        let r = intersection(&outside, &poly, &opts()).unwrap();
        assert!(r.result.is_empty());
    }

    #[test]
    fn test_line_line_crossing() {
        let a = Feature::new(line_string![(x: 0.0, y: 0.0), (x: 2.0, y: 2.0)]);
        let b = Feature::new(line_string![(x: 0.0, y: 2.0), (x: 2.0, y: 0.0)]);
        let r = intersection(&a, &b, &opts()).unwrap();

        assert_eq!(r.result.len(), 1);
        assert_eq!(
            r.result.features[0].geometry,
            Some(Geometry::Point(point!(x: 1.0, y: 1.0)))
        );
    }

    #[test]
    fn test_point_point_unsupported() {
        let a = Feature::new(point!(x: 0.0, y: 0.0));
        let r = intersection(&a, &a.clone(), &opts());
        assert!(matches!(r, Err(Error::UnsupportedCombination(_))));
    }

    #[test]
    fn test_multiple_intersection_skips_failures() {
        let features = vec![
            Feature::new(square(0.0, 0.0, 1.0)),
            Feature::new(square(0.5, 0.5, 1.0)),
            Feature::new(square(10.0, 10.0, 1.0)),
            Feature::new(point!(x: 0.25, y: 0.25)),
        ];
        let r = multiple_intersection(&features, &opts()).unwrap();
        let m = r.metadata.as_multi_intersection().unwrap();

        // 3 polygon pairs + 3 polygon-point pairs
        assert_eq!(m.total_pairs, 6);
        assert_eq!(m.intersecting_pairs, 2);
        assert_eq!(r.result.len(), 2);
        assert!(r.result.features[0].get_property("pairIndex").is_some());
    }

    #[test]
    fn test_find_all_intersections_order() {
        let features = vec![
            Feature::new(square(0.0, 0.0, 1.0)),
            Feature::new(square(0.5, 0.0, 1.0)),
            Feature::new(square(1.2, 0.0, 1.0)),
        ];
        let r = find_all_intersections(&features, &opts()).unwrap();
        let m = r.metadata.as_multi_intersection().unwrap();

        assert_eq!(m.total_pairs, 3);
        assert_eq!(m.intersecting_pairs, 2);
        let pairs: Vec<(usize, usize)> = m
            .pairwise_results
            .iter()
            .map(|p| (p.feature1_index, p.feature2_index))
            .collect();
        assert_eq!(pairs, vec![(0, 1), (0, 2), (1, 2)]);
    }

    #[test]
    fn test_validate_input() {
        let r = validate_intersection_input(&[Feature::new(point!(x: 0.0, y: 0.0))]);
        assert_eq!(r.errors, vec!["Intersection requires at least 2 features".to_string()]);

        let pts = vec![
            Feature::new(point!(x: 0.0, y: 0.0)),
            Feature::new(point!(x: 1.0, y: 0.0)),
        ];
        assert!(!validate_intersection_input(&pts).valid);
    }
}
