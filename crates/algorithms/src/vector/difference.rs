//! Difference: subtract polygons from a primary feature set
//!
//! The mode depends on what the input holds:
//! - two or more polygons: the first is the primary, the rest are
//!   subtracted in input order
//! - one polygon plus points: keep the points outside the polygon
//! - one polygon plus lines: drop the lines lying within the polygon
//!
//! Lines that merely cross the polygon are kept whole and flagged
//! `intersects: true, clipped: false`.

use geo::{Geometry, MultiPolygon, Point};
use geoverlay_core::{
    Algorithm, Error, Feature, FeatureCollection, OperationOptions, Result,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::classify::{classify, Classified, ClassifiedFeature, FeatureTypeCounts, SkippedFeature};
use super::measurements::area_m2;
use super::relate::{self, covers_point, from_parts, on_boundary};
use super::result::{timestamp, InputValidation, OperationMetadata, OperationResult};
use super::validate::{prepare_polygons, validate, PreparedPolygon};

/// Which difference was performed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DifferenceMode {
    #[default]
    PolygonPolygon,
    PointPolygon,
    LinePolygon,
}

impl DifferenceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DifferenceMode::PolygonPolygon => "polygon-polygon",
            DifferenceMode::PointPolygon => "point-polygon",
            DifferenceMode::LinePolygon => "line-polygon",
        }
    }
}

/// One subtraction from the running primary polygon
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DifferenceStep {
    pub step: usize,
    pub subtractor_index: usize,
    pub relationship: String,
    pub intersects: bool,
    pub overlaps: bool,
    pub contains: bool,
    pub within: bool,
    pub area_before: f64,
    pub area_after: f64,
    pub area_removed: f64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Membership of one point in one subtracting polygon
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainmentCheck {
    pub polygon_index: usize,
    pub within: bool,
    pub on_boundary: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointAnalysis {
    pub point_index: usize,
    pub retained: bool,
    pub checks: Vec<ContainmentCheck>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineAnalysis {
    pub line_index: usize,
    /// km
    pub original_length: f64,
    /// km
    pub final_length: f64,
    /// Percentage of the original length kept
    pub length_retained: f64,
    pub fully_removed: bool,
    pub intersects: bool,
    pub clipped: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DifferenceMetadata {
    pub operation_type: DifferenceMode,
    pub input_feature_count: usize,
    pub feature_types: FeatureTypeCounts,
    pub features_removed: usize,
    pub features_retained: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    // polygon-polygon
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_area: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_area: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area_removed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention_percentage: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub difference_steps: Vec<DifferenceStep>,
    pub failed_steps: usize,
    // point-polygon
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclusion_rate: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub point_analysis: Vec<PointAnalysis>,
    // line-polygon
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_length: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_length: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub line_analysis: Vec<LineAnalysis>,
    pub skipped: Vec<SkippedFeature>,
}

/// Difference operation
pub struct Difference;

impl Algorithm for Difference {
    type Input = Vec<Feature>;
    type Output = OperationResult;
    type Params = OperationOptions;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Difference"
    }

    fn description(&self) -> &'static str {
        "Subtract polygons from a primary polygon, point set or line set"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        difference(&input, &params)
    }
}

fn select_mode(classified: &Classified<'_>) -> Result<DifferenceMode> {
    let c = classified.counts();
    if c.polygons >= 2 {
        Ok(DifferenceMode::PolygonPolygon)
    } else if c.polygons == 1 && c.points > 0 {
        Ok(DifferenceMode::PointPolygon)
    } else if c.polygons == 1 && c.lines > 0 {
        Ok(DifferenceMode::LinePolygon)
    } else {
        Err(Error::UnsupportedCombination(format!(
            "Unsupported feature combination: {} polygons, {} lines, {} points",
            c.polygons, c.lines, c.points
        )))
    }
}

/// Subtract polygons according to the mode implied by the input.
pub fn difference(features: &[Feature], options: &OperationOptions) -> Result<OperationResult> {
    if features.len() < 2 {
        return Err(Error::InsufficientFeatures {
            operation: "Difference",
            required: 2,
            actual: features.len(),
        });
    }

    let classified = classify(features);
    let mode = select_mode(&classified)?;
    let mut skipped = classified.unsupported.clone();

    let polygons = prepare_polygons(&classified.polygons, options.max_vertices, &mut skipped);
    if polygons.is_empty() {
        return Err(Error::NoValidFeatures(
            "No valid polygon features remaining after validation".into(),
        ));
    }

    let (result, mut metadata) = match mode {
        DifferenceMode::PolygonPolygon => {
            for item in classified.points.iter().chain(&classified.lines) {
                skipped.push(SkippedFeature::new(item.index, "Not a polygon"));
            }
            polygon_polygon(&polygons, subtract)
        }
        DifferenceMode::PointPolygon => {
            for item in &classified.lines {
                skipped.push(SkippedFeature::new(item.index, "Lines ignored in point difference"));
            }
            point_filter(&classified.points, &polygons)
        }
        DifferenceMode::LinePolygon => line_filter(&classified.lines, &polygons),
    };

    skipped.sort_by_key(|s| s.index);
    metadata.operation_type = mode;
    metadata.input_feature_count = features.len();
    metadata.feature_types = classified.counts();
    metadata.skipped = skipped;

    info!(
        "Difference ({}): {} retained, {} removed",
        mode.as_str(),
        metadata.features_retained,
        metadata.features_removed
    );
    Ok(OperationResult::success(
        "difference",
        result,
        OperationMetadata::Difference(metadata),
    ))
}

/// Subtract every later polygon from the first, in order.
///
/// A step whose `subtract_step` fails is recorded and skipped; the
/// remaining shape carries over unchanged.
fn polygon_polygon(
    polygons: &[PreparedPolygon<'_>],
    subtract_step: impl Fn(&MultiPolygon<f64>, &MultiPolygon<f64>) -> Result<Subtraction>,
) -> (FeatureCollection, DifferenceMetadata) {
    let primary = &polygons[0];
    let mut current: Option<MultiPolygon<f64>> = Some(primary.shape.clone());
    let mut area = primary.area;
    let mut steps = Vec::new();

    for (step, sub) in polygons.iter().enumerate().skip(1) {
        let Some(shape) = current.as_ref() else {
            break;
        };

        match subtract_step(shape, &sub.shape) {
            Ok(outcome) => {
                let area_after = outcome
                    .remaining
                    .as_ref()
                    .map(|mp| area_m2(&Geometry::MultiPolygon(mp.clone())))
                    .unwrap_or(0.0);
                debug!(
                    "Difference step {}: {} ({:.1} -> {:.1} m²)",
                    step, outcome.relationship, area, area_after
                );
                steps.push(DifferenceStep {
                    step,
                    subtractor_index: sub.index,
                    relationship: outcome.relationship.to_string(),
                    intersects: outcome.intersects,
                    overlaps: outcome.overlaps,
                    contains: outcome.contains,
                    within: outcome.within,
                    area_before: area,
                    area_after,
                    area_removed: (area - area_after).max(0.0),
                    success: true,
                    error: None,
                });
                current = outcome.remaining;
                area = area_after;
            }
            Err(e) => {
                warn!("Difference step {} skipped: {}", step, e);
                steps.push(DifferenceStep {
                    step,
                    subtractor_index: sub.index,
                    relationship: "unknown".into(),
                    intersects: false,
                    overlaps: false,
                    contains: false,
                    within: false,
                    area_before: area,
                    area_after: area,
                    area_removed: 0.0,
                    success: false,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    let geometry = current.and_then(|mp| from_parts(mp.0));
    let final_area = geometry.as_ref().map(area_m2).unwrap_or(0.0);
    let retention = percentage(final_area, primary.area);

    let mut metadata = DifferenceMetadata {
        primary_index: Some(primary.index),
        original_area: Some(primary.area),
        final_area: Some(final_area),
        area_removed: Some((primary.area - final_area).max(0.0)),
        retention_percentage: Some(retention),
        failed_steps: steps.iter().filter(|s| !s.success).count(),
        difference_steps: steps,
        ..Default::default()
    };

    let mut result = FeatureCollection::new();
    match geometry {
        Some(geometry) => {
            let mut f = Feature::new(geometry).with_properties(primary.feature.properties.clone());
            f.set_property("operation", "difference");
            f.set_property("differenceDate", timestamp());
            f.set_property("originalArea", primary.area);
            f.set_property("finalArea", final_area);
            f.set_property("areaRemoved", primary.area - final_area);
            f.set_property("retentionPercentage", retention);
            f.set_property("subtractedFeatures", polygons.len() - 1);
            result.push(f);
            metadata.features_retained = 1;
        }
        None => {
            metadata.features_removed = 1;
            metadata.message = Some("Primary polygon was entirely removed".into());
        }
    }

    (result, metadata)
}

struct Subtraction {
    relationship: &'static str,
    intersects: bool,
    overlaps: bool,
    contains: bool,
    within: bool,
    remaining: Option<MultiPolygon<f64>>,
}

fn subtract(primary: &MultiPolygon<f64>, subtractor: &MultiPolygon<f64>) -> Result<Subtraction> {
    let m = relate::relate(
        &Geometry::MultiPolygon(primary.clone()),
        &Geometry::MultiPolygon(subtractor.clone()),
    )?;
    let mut out = Subtraction {
        relationship: "separate",
        intersects: m.is_intersects(),
        overlaps: false,
        contains: m.is_contains(),
        within: m.is_within(),
        remaining: Some(primary.clone()),
    };

    if out.within {
        out.relationship = "within";
        out.remaining = None;
        return Ok(out);
    }
    if !out.intersects {
        return Ok(out);
    }

    let shape_relation = relate::relationship(primary, subtractor)?;
    out.overlaps = shape_relation == relate::Relationship::Intersects && !out.contains;
    out.relationship = match (out.contains, out.overlaps) {
        (true, _) => "contains",
        (false, true) => "overlaps",
        (false, false) => "touches",
    };

    if shape_relation == relate::Relationship::Intersects {
        let diff = relate::difference(primary, subtractor)?;
        out.remaining = (!diff.0.is_empty()).then_some(diff);
    }
    Ok(out)
}

/// Representative points of a point feature
fn points_of(feature: &Feature) -> Vec<Point<f64>> {
    match feature.geometry.as_ref() {
        Some(Geometry::Point(p)) => vec![*p],
        Some(Geometry::MultiPoint(mp)) => mp.0.clone(),
        _ => Vec::new(),
    }
}

fn point_filter(
    points: &[ClassifiedFeature<'_>],
    polygons: &[PreparedPolygon<'_>],
) -> (FeatureCollection, DifferenceMetadata) {
    let mut result = FeatureCollection::new();
    let mut analysis = Vec::with_capacity(points.len());

    for item in points {
        let coords = points_of(item.feature);
        let checks: Vec<ContainmentCheck> = polygons
            .iter()
            .map(|poly| ContainmentCheck {
                polygon_index: poly.index,
                within: coords.iter().any(|p| covers_point(&poly.shape, p)),
                on_boundary: coords.iter().any(|p| on_boundary(&poly.shape, p.0)),
            })
            .collect();

        let retained = checks.iter().all(|c| !c.within);
        if retained {
            let mut f = item.feature.clone();
            f.set_property("operation", "difference");
            f.set_property("differenceDate", timestamp());
            result.push(f);
        }
        analysis.push(PointAnalysis {
            point_index: item.index,
            retained,
            checks,
        });
    }

    let total = points.len();
    let kept = result.len();
    let metadata = DifferenceMetadata {
        features_retained: kept,
        features_removed: total - kept,
        retention_rate: Some(percentage(kept as f64, total as f64)),
        exclusion_rate: Some(percentage((total - kept) as f64, total as f64)),
        point_analysis: analysis,
        message: (kept == 0).then(|| "All points fall inside the subtracting polygon".to_string()),
        ..Default::default()
    };
    (result, metadata)
}

fn line_filter(
    lines: &[ClassifiedFeature<'_>],
    polygons: &[PreparedPolygon<'_>],
) -> (FeatureCollection, DifferenceMetadata) {
    let mut result = FeatureCollection::new();
    let mut analysis = Vec::with_capacity(lines.len());

    for item in lines {
        let Some(geom) = item.geometry() else {
            continue;
        };

        let mut within = false;
        let mut intersects = false;
        for poly in polygons {
            let shape = Geometry::MultiPolygon(poly.shape.clone());
            match relate::relate(geom, &shape) {
                Ok(m) => {
                    within |= m.is_within();
                    intersects |= m.is_intersects();
                }
                Err(e) => warn!("Line {}: relate failed: {}", item.index + 1, e),
            }
        }

        let original = item.measure;
        if !within {
            let mut f = item.feature.clone();
            f.set_property("operation", "difference");
            f.set_property("differenceDate", timestamp());
            result.push(f);
        }
        analysis.push(LineAnalysis {
            line_index: item.index,
            original_length: original,
            final_length: if within { 0.0 } else { original },
            length_retained: if within { 0.0 } else { 100.0 },
            fully_removed: within,
            intersects: intersects && !within,
            clipped: false,
        });
    }

    let original_length: f64 = analysis.iter().map(|a| a.original_length).sum();
    let final_length: f64 = analysis.iter().map(|a| a.final_length).sum();
    let metadata = DifferenceMetadata {
        features_retained: result.len(),
        features_removed: lines.len() - result.len(),
        original_length: Some(original_length),
        final_length: Some(final_length),
        retention_percentage: Some(percentage(final_length, original_length)),
        line_analysis: analysis,
        ..Default::default()
    };
    (result, metadata)
}

/// Check difference input without running it.
pub fn validate_difference_input(features: &[Feature]) -> InputValidation {
    let classified = classify(features);
    let mut report = InputValidation {
        counts: classified.counts(),
        ..Default::default()
    };

    if features.len() < 2 {
        report.errors.push("Difference requires at least 2 features".into());
    } else {
        match select_mode(&classified) {
            Ok(mode) => report.details.push(format!("Mode: {}", mode.as_str())),
            Err(e) => report.errors.push(e.to_string()),
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
    if classified.counts().lines > 0 && classified.counts().polygons == 1 {
        report
            .warnings
            .push("Lines crossing the polygon are kept whole, not clipped".into());
    }

    report.finish()
}

fn percentage(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole * 100.0
    } else {
        0.0
    }
}
