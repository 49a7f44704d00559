//! Spatial joins
//!
//! - [`spatial_join`]: attach polygon attributes to the points inside them
//! - [`count_points_in_polygons`]: per-polygon point counts and densities
//! - [`polygon_spatial_join`]: polygon-to-polygon join on a predicate,
//!   with optional aggregation of the matched targets' numeric properties
//!
//! Point membership is boundary-inclusive. A MultiPoint is represented by
//! its first point.

use std::collections::BTreeMap;

use geo::{Geometry, Point};
use geoverlay_core::{
    Algorithm, AttributeValue, Error, Feature, FeatureCollection, OperationOptions, Properties,
    Result,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::classify::{
    classify, sort_skipped, Classified, ClassifiedFeature, InputRole, SkippedFeature,
};
use super::relate::{self, covers_point, Predicate};
use super::result::{timestamp, OperationMetadata, OperationResult};
use super::validate::{prepare_polygons, PreparedPolygon};

/// Points found inside one polygon
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolygonStatistics {
    pub polygon_index: usize,
    pub point_count: usize,
    /// m²
    pub polygon_area: f64,
    /// Points per m²
    pub point_density: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnmatchedPoint {
    pub point_index: usize,
    pub coordinates: [f64; 2],
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpatialJoinMetadata {
    pub join_type: String,
    pub input_points: usize,
    pub input_polygons: usize,
    pub output_features: usize,
    pub total_points: usize,
    /// Points inside at least one polygon
    pub matched_points: usize,
    pub unmatched_count: usize,
    pub match_percentage: f64,
    pub polygon_statistics: Vec<PolygonStatistics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unmatched_points: Option<Vec<UnmatchedPoint>>,
    pub skipped: Vec<SkippedFeature>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointCountMetadata {
    pub total_polygons: usize,
    pub total_points: usize,
    pub points_within_polygons: usize,
    pub points_outside_polygons: usize,
    pub average_points_per_polygon: f64,
    pub min_points_per_polygon: usize,
    pub max_points_per_polygon: usize,
    pub empty_polygons: usize,
    pub skipped: Vec<SkippedFeature>,
}

/// How matched target properties are summarised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Sum,
    Average,
    Min,
    Max,
    Count,
}

impl Aggregation {
    fn suffix(&self) -> &'static str {
        match self {
            Aggregation::Sum => "sum",
            Aggregation::Average => "avg",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
            Aggregation::Count => "count",
        }
    }

    fn apply(&self, values: &[f64]) -> AttributeValue {
        match self {
            Aggregation::Sum => values.iter().sum::<f64>().into(),
            Aggregation::Average => (values.iter().sum::<f64>() / values.len() as f64).into(),
            Aggregation::Min => values.iter().copied().fold(f64::INFINITY, f64::min).into(),
            Aggregation::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max).into(),
            Aggregation::Count => values.len().into(),
        }
    }
}

impl std::str::FromStr for Aggregation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sum" => Ok(Aggregation::Sum),
            "average" | "mean" | "avg" => Ok(Aggregation::Average),
            "min" => Ok(Aggregation::Min),
            "max" => Ok(Aggregation::Max),
            "count" => Ok(Aggregation::Count),
            other => Err(Error::InvalidParameter {
                name: "aggregation",
                value: other.to_string(),
                reason: "expected sum, average, mean, min, max or count".into(),
            }),
        }
    }
}

/// Parameters for [`polygon_spatial_join`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolygonJoinParams {
    pub relation: Predicate,
    pub aggregation: Option<Aggregation>,
    pub max_vertices: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolygonJoinMetadata {
    pub spatial_relation: Predicate,
    pub input_sources: usize,
    pub input_targets: usize,
    pub output_features: usize,
    pub relationship_counts: BTreeMap<String, usize>,
    pub failed_checks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<Aggregation>,
    pub skipped: Vec<SkippedFeature>,
}

/// Point-in-polygon join
pub struct SpatialJoin;

impl Algorithm for SpatialJoin {
    /// (points, polygons)
    type Input = (Vec<Feature>, Vec<Feature>);
    type Output = OperationResult;
    type Params = OperationOptions;
    type Error = Error;

    fn name(&self) -> &'static str {
        "SpatialJoin"
    }

    fn description(&self) -> &'static str {
        "Attach polygon attributes to the points that fall inside them"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        let (points, polygons) = input;
        spatial_join(&points, &polygons, &params)
    }
}

/// Representative location of a point feature
fn representative(feature: &Feature) -> Option<Point<f64>> {
    match feature.geometry.as_ref()? {
        Geometry::Point(p) => Some(*p),
        Geometry::MultiPoint(mp) => mp.0.first().copied(),
        _ => None,
    }
}

struct Membership<'f> {
    points: Vec<(ClassifiedFeature<'f>, Point<f64>)>,
    /// Indices into `points` of the matches, per polygon
    hits: Vec<Vec<usize>>,
    /// Matching polygon positions, per point
    matches: Vec<Vec<usize>>,
}

/// Test every point against every polygon.
fn membership<'f>(
    points: &[ClassifiedFeature<'f>],
    polygons: &[PreparedPolygon<'_>],
    first_only: bool,
    skipped: &mut Vec<SkippedFeature>,
) -> Membership<'f> {
    let mut located = Vec::with_capacity(points.len());
    for item in points {
        match representative(item.feature) {
            Some(p) if p.x().is_finite() && p.y().is_finite() => located.push((*item, p)),
            _ => skipped.push(
                SkippedFeature::new(item.index, "Point has no usable coordinates")
                    .from_input(InputRole::Points),
            ),
        }
    }

    let mut hits = vec![Vec::new(); polygons.len()];
    let mut matches = Vec::with_capacity(located.len());
    for (pi, (_, p)) in located.iter().enumerate() {
        let mut found = Vec::new();
        for (gi, poly) in polygons.iter().enumerate() {
            if covers_point(&poly.shape, p) {
                found.push(gi);
                hits[gi].push(pi);
                if first_only {
                    break;
                }
            }
        }
        matches.push(found);
    }

    Membership {
        points: located,
        hits,
        matches,
    }
}

fn split_inputs<'a>(
    points: &'a [Feature],
    polygons: &'a [Feature],
    max_vertices: Option<usize>,
) -> Result<(Vec<ClassifiedFeature<'a>>, Vec<PreparedPolygon<'a>>, Vec<SkippedFeature>)> {
    if points.is_empty() {
        return Err(Error::NoValidFeatures("No point features provided".into()));
    }
    if polygons.is_empty() {
        return Err(Error::NoValidFeatures("No polygon features provided".into()));
    }

    let point_classes = classify(points);
    let polygon_classes = classify(polygons);

    let mut skipped = point_classes.unsupported.clone();
    for item in point_classes.lines.iter().chain(&point_classes.polygons) {
        skipped.push(SkippedFeature::new(item.index, "Not a point"));
    }
    let mut skipped: Vec<SkippedFeature> = skipped
        .into_iter()
        .map(|s| s.from_input(InputRole::Points))
        .collect();

    let mut polygon_skipped = polygon_classes.unsupported.clone();
    for item in polygon_classes.points.iter().chain(&polygon_classes.lines) {
        polygon_skipped.push(SkippedFeature::new(item.index, "Not a polygon"));
    }
    let prepared = prepare_polygons(&polygon_classes.polygons, max_vertices, &mut polygon_skipped);
    for s in &polygon_skipped {
        warn!("Polygon {} skipped: {}", s.index + 1, s.reason);
    }

    if point_classes.points.is_empty() {
        return Err(Error::NoValidFeatures("No valid point features provided".into()));
    }
    if prepared.is_empty() {
        return Err(Error::NoValidFeatures("No valid polygon features provided".into()));
    }

    skipped.extend(
        polygon_skipped
            .into_iter()
            .map(|s| s.from_input(InputRole::Polygons)),
    );
    Ok((point_classes.points, prepared, skipped))
}

fn statistics(polygons: &[PreparedPolygon<'_>], hits: &[Vec<usize>]) -> Vec<PolygonStatistics> {
    polygons
        .iter()
        .zip(hits)
        .map(|(poly, hits)| PolygonStatistics {
            polygon_index: poly.index,
            point_count: hits.len(),
            polygon_area: poly.area,
            point_density: density(hits.len(), poly.area),
        })
        .collect()
}

fn density(count: usize, area: f64) -> f64 {
    if area > 0.0 {
        count as f64 / area
    } else {
        0.0
    }
}

/// Join points to the polygons containing them.
///
/// Each joined feature keeps the point geometry and properties, adds the
/// polygon's properties under `polygon_<key>` and a `spatialJoin`
/// provenance object. With `allow_multiple_matches` a point inside several
/// polygons yields one feature per polygon; otherwise the first match wins.
pub fn spatial_join(
    points: &[Feature],
    polygons: &[Feature],
    options: &OperationOptions,
) -> Result<OperationResult> {
    let (point_items, prepared, mut skipped) =
        split_inputs(points, polygons, options.max_vertices)?;
    let m = membership(&point_items, &prepared, !options.allow_multiple_matches, &mut skipped);
    let join_date = timestamp();

    let mut result = FeatureCollection::new();
    let mut unmatched = Vec::new();
    for ((item, p), found) in m.points.iter().zip(&m.matches) {
        if found.is_empty() {
            unmatched.push(UnmatchedPoint {
                point_index: item.index,
                coordinates: [p.x(), p.y()],
            });
            continue;
        }
        for &gi in found {
            let poly = &prepared[gi];
            let mut f = item.feature.clone();
            for (key, value) in &poly.feature.properties {
                f.set_property(format!("polygon_{key}"), value.clone());
            }
            let mut provenance = Properties::new();
            provenance.insert("joinDate".into(), join_date.as_str().into());
            provenance.insert("pointIndex".into(), item.index.into());
            provenance.insert("polygonIndex".into(), poly.index.into());
            provenance.insert("operation".into(), "point-in-polygon".into());
            f.set_property("spatialJoin", provenance);
            result.push(f);
        }
    }

    let total = m.points.len();
    let matched = total - unmatched.len();
    debug!("Spatial join: {} of {} points matched", matched, total);

    sort_skipped(&mut skipped);
    let metadata = SpatialJoinMetadata {
        join_type: "point-in-polygon".into(),
        input_points: points.len(),
        input_polygons: polygons.len(),
        output_features: result.len(),
        total_points: total,
        matched_points: matched,
        unmatched_count: unmatched.len(),
        match_percentage: percentage(matched, total),
        polygon_statistics: statistics(&prepared, &m.hits),
        unmatched_points: options.include_unmatched.then_some(unmatched),
        skipped,
    };

    info!(
        "Spatial join: {} features from {} points and {} polygons",
        metadata.output_features, total, prepared.len()
    );
    Ok(OperationResult::success(
        "spatial-join",
        result,
        OperationMetadata::SpatialJoin(metadata),
    ))
}

/// Count the points inside each polygon.
///
/// Every usable polygon appears in the output, with `pointCount: 0` when
/// nothing falls inside it. A point inside overlapping polygons counts
/// once for each of them.
pub fn count_points_in_polygons(
    points: &[Feature],
    polygons: &[Feature],
    options: &OperationOptions,
) -> Result<OperationResult> {
    let (point_items, prepared, mut skipped) =
        split_inputs(points, polygons, options.max_vertices)?;
    let m = membership(&point_items, &prepared, false, &mut skipped);
    let stats = statistics(&prepared, &m.hits);
    let total_points = m.points.len();
    let count_date = timestamp();

    let mut result = FeatureCollection::new();
    for (poly, stat) in prepared.iter().zip(&stats) {
        let mut f = poly.feature.clone().into_owned();
        f.set_property("pointCount", stat.point_count);
        f.set_property("pointDensity", stat.point_density);
        f.set_property("polygonArea", stat.polygon_area);
        let mut provenance = Properties::new();
        provenance.insert("countDate".into(), count_date.as_str().into());
        provenance.insert("polygonIndex".into(), poly.index.into());
        provenance.insert("totalPoints".into(), total_points.into());
        f.set_property("countOperation", provenance);
        result.push(f);
    }

    let counts: Vec<usize> = stats.iter().map(|s| s.point_count).collect();
    let within = m.matches.iter().filter(|found| !found.is_empty()).count();
    sort_skipped(&mut skipped);
    let metadata = PointCountMetadata {
        total_polygons: prepared.len(),
        total_points,
        points_within_polygons: within,
        points_outside_polygons: total_points - within,
        average_points_per_polygon: counts.iter().sum::<usize>() as f64 / counts.len() as f64,
        min_points_per_polygon: counts.iter().copied().min().unwrap_or(0),
        max_points_per_polygon: counts.iter().copied().max().unwrap_or(0),
        empty_polygons: counts.iter().filter(|&&c| c == 0).count(),
        skipped,
    };

    info!(
        "Point count: {} points across {} polygons ({} empty)",
        total_points, metadata.total_polygons, metadata.empty_polygons
    );
    Ok(OperationResult::success(
        "count-points",
        result,
        OperationMetadata::PointCount(metadata),
    ))
}

/// Summarise the numeric properties of `targets` with `method`.
///
/// Produces `<key>_<suffix>` for every numeric key seen, plus `feature_count`.
pub fn aggregate_properties(targets: &[&Feature], method: Aggregation) -> Properties {
    let mut out = Properties::new();
    if targets.is_empty() {
        return out;
    }

    let mut values: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for feature in targets {
        for (key, value) in &feature.properties {
            if let Some(v) = value.as_f64().filter(|v| v.is_finite()) {
                values.entry(key.as_str()).or_default().push(v);
            }
        }
    }
    for (key, vals) in values {
        out.insert(format!("{key}_{}", method.suffix()), method.apply(&vals));
    }
    out.insert("feature_count".into(), targets.len().into());
    out
}

/// Join polygons to the target polygons they relate to under `params.relation`.
///
/// Sources with no match are dropped from the output.
pub fn polygon_spatial_join(
    sources: &[Feature],
    targets: &[Feature],
    params: &PolygonJoinParams,
) -> Result<OperationResult> {
    let source_classes = classify(sources);
    let target_classes = classify(targets);
    let mut source_skipped = non_polygons(&source_classes);
    let source_polys =
        prepare_polygons(&source_classes.polygons, params.max_vertices, &mut source_skipped);
    let mut target_skipped = non_polygons(&target_classes);
    let target_polys =
        prepare_polygons(&target_classes.polygons, params.max_vertices, &mut target_skipped);

    if source_polys.is_empty() || target_polys.is_empty() {
        return Err(Error::NoValidFeatures(
            "Insufficient valid polygon features".into(),
        ));
    }
    let mut skipped: Vec<SkippedFeature> = source_skipped
        .into_iter()
        .map(|s| s.from_input(InputRole::Sources))
        .chain(target_skipped.into_iter().map(|s| s.from_input(InputRole::Targets)))
        .collect();

    let relation = params.relation;
    let join_date = timestamp();
    let mut relationship_counts: BTreeMap<String, usize> = [
        Predicate::Intersects,
        Predicate::Contains,
        Predicate::Within,
        Predicate::Overlaps,
        Predicate::Touches,
    ]
    .iter()
    .map(|p| (predicate_name(*p).to_string(), 0))
    .collect();
    let mut failed_checks = 0;

    let mut result = FeatureCollection::new();
    for source in &source_polys {
        let a = Geometry::MultiPolygon(source.shape.clone());
        let mut matched: Vec<&PreparedPolygon<'_>> = Vec::new();
        for target in &target_polys {
            let b = Geometry::MultiPolygon(target.shape.clone());
            match relate::evaluate(relation, &a, &b) {
                Ok(true) => matched.push(target),
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        "Relationship check failed for source {} and target {}: {}",
                        source.index, target.index, e
                    );
                    failed_checks += 1;
                }
            }
        }
        if matched.is_empty() {
            continue;
        }
        *relationship_counts
            .entry(predicate_name(relation).to_string())
            .or_default() += matched.len();

        let matches: Vec<AttributeValue> = matched
            .iter()
            .map(|t| {
                let mut m = Properties::new();
                m.insert("targetIndex".into(), t.index.into());
                m.insert("targetProperties".into(), t.feature.properties.clone().into());
                AttributeValue::Object(m)
            })
            .collect();
        let mut provenance = Properties::new();
        provenance.insert("joinDate".into(), join_date.as_str().into());
        provenance.insert("sourceIndex".into(), source.index.into());
        provenance.insert("relationshipType".into(), predicate_name(relation).into());
        provenance.insert("matchCount".into(), matched.len().into());
        provenance.insert("matches".into(), AttributeValue::Array(matches));

        let mut f = source.feature.clone().into_owned();
        f.set_property("spatialJoin", provenance);
        if let Some(method) = params.aggregation {
            let targets: Vec<&Feature> = matched.iter().map(|t| t.feature.as_ref()).collect();
            f.set_property("aggregated", aggregate_properties(&targets, method));
        }
        result.push(f);
    }

    sort_skipped(&mut skipped);
    let metadata = PolygonJoinMetadata {
        spatial_relation: relation,
        input_sources: source_polys.len(),
        input_targets: target_polys.len(),
        output_features: result.len(),
        relationship_counts,
        failed_checks,
        aggregation: params.aggregation,
        skipped,
    };
    info!(
        "Polygon join ({}): {} of {} sources matched",
        predicate_name(relation),
        metadata.output_features,
        metadata.input_sources
    );
    Ok(OperationResult::success(
        "polygon-spatial-join",
        result,
        OperationMetadata::PolygonJoin(metadata),
    ))
}

fn non_polygons(classes: &Classified<'_>) -> Vec<SkippedFeature> {
    let mut skipped = classes.unsupported.clone();
    for item in classes.points.iter().chain(&classes.lines) {
        skipped.push(SkippedFeature::new(item.index, "Not a polygon"));
    }
    skipped
}

fn predicate_name(p: Predicate) -> &'static str {
    match p {
        Predicate::Intersects => "intersects",
        Predicate::Contains => "contains",
        Predicate::Within => "within",
        Predicate::Overlaps => "overlaps",
        Predicate::Touches => "touches",
    }
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole > 0 {
        part as f64 / whole as f64 * 100.0
    } else {
        0.0
    }
}
