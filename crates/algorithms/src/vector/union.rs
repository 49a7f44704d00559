//! Union: fold polygons into disjoint clusters
//!
//! The accumulator is kept as a list of disjoint parts. Each incoming
//! polygon is merged with every part it touches or overlaps; parts it does
//! not reach are carried forward unchanged. The first feature's properties
//! win on key collision.

use geo::{Geometry, MultiPolygon, Polygon};
use geoverlay_core::{
    Algorithm, AttributeValue, BBox, Error, Feature, FeatureCollection, OperationOptions,
    Properties, Result,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::classify::{classify, FeatureTypeCounts, SkippedFeature};
use super::measurements::{area_m2, centroid};
use super::relate::{self, from_parts, Relationship};
use super::result::{timestamp, InputValidation, OperationMetadata, OperationResult};
use super::validate::{prepare_polygons, validate, PreparedPolygon};

/// One fold step
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnionStep {
    pub step: usize,
    /// Position of the incoming feature in the input
    pub feature_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationship: Option<Relationship>,
    /// Accumulator parts merged with the incoming feature
    pub merged_parts: usize,
    /// Accumulator parts carried forward untouched
    pub carried_parts: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Accumulator area after the step, m²
    pub area_after: f64,
}

/// Relationship between one pair of inputs
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairDetail {
    pub feature1_index: usize,
    pub feature2_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationship: Option<Relationship>,
}

/// Pairwise relationship matrix over the valid inputs
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairwiseAnalysis {
    pub total_pairs: usize,
    pub intersecting_pairs: usize,
    pub touching_pairs: usize,
    pub separate_pairs: usize,
    pub pair_details: Vec<PairDetail>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnionMetadata {
    pub input_feature_count: usize,
    pub valid_feature_count: usize,
    pub repaired_count: usize,
    pub feature_types: FeatureTypeCounts,
    pub output_type: String,
    pub output_parts: usize,
    /// Sum of the valid inputs' areas, m²
    pub total_input_area: f64,
    /// Area of the union, m²
    pub total_area: f64,
    /// Output area as a percentage of input area
    pub area_efficiency: f64,
    /// Input area dissolved by overlaps, m²
    pub overlap_reduction: f64,
    pub bounds: Option<BBox>,
    pub centroid: Option<[f64; 2]>,
    pub union_steps: Vec<UnionStep>,
    pub failed_steps: usize,
    pub skipped: Vec<SkippedFeature>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<PairwiseAnalysis>,
}

/// Union operation
pub struct Union;

impl Algorithm for Union {
    type Input = Vec<Feature>;
    type Output = OperationResult;
    type Params = OperationOptions;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Union"
    }

    fn description(&self) -> &'static str {
        "Merge polygons into one feature, dissolving shared boundaries"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        union(&input, &params)
    }
}

/// Union all polygon features into a single feature.
///
/// A single input is returned as-is. Non-polygon and unrepairable inputs
/// are skipped and reported in the metadata.
pub fn union(features: &[Feature], options: &OperationOptions) -> Result<OperationResult> {
    run(features, options, false)
}

/// [`union`] plus a pairwise relationship matrix in the metadata.
pub fn union_with_analysis(
    features: &[Feature],
    options: &OperationOptions,
) -> Result<OperationResult> {
    run(features, options, true)
}

/// Check union input without running it.
pub fn validate_union_input(features: &[Feature]) -> InputValidation {
    let classified = classify(features);
    let mut report = InputValidation {
        counts: classified.counts(),
        ..Default::default()
    };

    if features.is_empty() {
        report.errors.push("Union requires at least 1 feature".into());
    }
    if !features.is_empty() && classified.polygons.is_empty() {
        report.errors.push("No valid polygon features found for union".into());
    }
    if classified.counts().points + classified.counts().lines > 0 {
        report.warnings.push(format!(
            "{} non-polygon features will be ignored",
            classified.counts().points + classified.counts().lines
        ));
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
    for skip in &classified.unsupported {
        report
            .details
            .push(format!("Feature {}: {}", skip.index + 1, skip.reason));
    }

    report.finish()
}

fn run(features: &[Feature], options: &OperationOptions, analyze: bool) -> Result<OperationResult> {
    if features.is_empty() {
        return Err(Error::InsufficientFeatures {
            operation: "Union",
            required: 1,
            actual: 0,
        });
    }
    if features.len() == 1 {
        return Ok(single(&features[0]));
    }

    let classified = classify(features);
    let mut skipped = classified.unsupported.clone();
    for item in classified.points.iter().chain(&classified.lines) {
        skipped.push(SkippedFeature::new(
            item.index,
            format!(
                "Skipping non-polygon feature: {}",
                item.feature.geometry_type().unwrap_or("unknown")
            ),
        ));
    }
    if classified.polygons.is_empty() {
        return Err(Error::NoValidFeatures(
            "No valid polygon features found for union".into(),
        ));
    }

    let prepared = prepare_polygons(&classified.polygons, options.max_vertices, &mut skipped);
    if prepared.is_empty() {
        return Err(Error::NoValidFeatures(
            "No valid features remaining after validation".into(),
        ));
    }
    skipped.sort_by_key(|s| s.index);

    let analysis = analyze.then(|| pairwise_analysis(&prepared));

    let (parts, steps) = fold(&prepared, merge);
    let geometry = from_parts(parts.clone());
    let total_input_area: f64 = prepared.iter().map(|p| p.area).sum();
    let total_area = area_m2(&Geometry::MultiPolygon(MultiPolygon::new(parts.clone())));
    let area_efficiency = if total_input_area > 0.0 {
        total_area / total_input_area * 100.0
    } else {
        100.0
    };

    let metadata = UnionMetadata {
        input_feature_count: features.len(),
        valid_feature_count: prepared.len(),
        repaired_count: prepared.iter().filter(|p| p.repaired).count(),
        feature_types: classified.counts(),
        output_type: match parts.len() {
            1 => "Polygon".to_string(),
            _ => "MultiPolygon".to_string(),
        },
        output_parts: parts.len(),
        total_input_area,
        total_area,
        area_efficiency,
        overlap_reduction: (total_input_area - total_area).max(0.0),
        bounds: geometry.as_ref().and_then(BBox::of),
        centroid: geometry.as_ref().and_then(centroid).map(|c| [c.x(), c.y()]),
        failed_steps: steps.iter().filter(|s| !s.success).count(),
        union_steps: steps,
        skipped,
        analysis,
    };

    info!(
        "Union: {} valid of {} features -> {} part(s), {:.1}% area efficiency",
        metadata.valid_feature_count,
        metadata.input_feature_count,
        metadata.output_parts,
        metadata.area_efficiency
    );

    let mut result = FeatureCollection::new();
    if let Some(geometry) = geometry {
        let properties = output_properties(&prepared, &metadata, options);
        result.push(Feature::new(geometry).with_properties(properties));
    }

    Ok(OperationResult::success(
        "union",
        result,
        OperationMetadata::Union(metadata),
    ))
}

/// Identity result for a single feature
fn single(feature: &Feature) -> OperationResult {
    let geometry = feature.geometry.as_ref();
    let area = geometry.map(area_m2).unwrap_or(0.0);

    let metadata = UnionMetadata {
        input_feature_count: 1,
        valid_feature_count: 1,
        feature_types: classify(std::slice::from_ref(feature)).counts(),
        output_type: feature.geometry_type().unwrap_or("None").to_string(),
        output_parts: 1,
        total_input_area: area,
        total_area: area,
        area_efficiency: 100.0,
        bounds: feature.bounds(),
        centroid: geometry.and_then(centroid).map(|c| [c.x(), c.y()]),
        ..Default::default()
    };

    let mut out = feature.clone();
    out.set_property("operation", "union");
    out.set_property("unionDate", timestamp());
    out.set_property("inputFeatureCount", 1usize);
    out.set_property("totalArea", area);

    OperationResult::success("union", vec![out].into(), OperationMetadata::Union(metadata))
}

/// Left fold over the prepared polygons.
///
/// A step whose `combine` fails is recorded and skipped; the accumulator
/// carries over unchanged.
fn fold(
    prepared: &[PreparedPolygon<'_>],
    combine: impl Fn(&[Polygon<f64>], &MultiPolygon<f64>) -> Result<Merged>,
) -> (Vec<Polygon<f64>>, Vec<UnionStep>) {
    let mut parts = prepared[0].shape.0.clone();
    let mut steps = Vec::with_capacity(prepared.len().saturating_sub(1));

    for (step, incoming) in prepared.iter().enumerate().skip(1) {
        match combine(&parts, &incoming.shape) {
            Ok(merged) => {
                debug!(
                    "Union step {}: feature {} {} ({} merged, {} carried)",
                    step,
                    incoming.index + 1,
                    merged.relationship.as_str(),
                    merged.merged_parts,
                    merged.carried_parts
                );
                parts = merged.parts;
                steps.push(UnionStep {
                    step,
                    feature_index: incoming.index,
                    relationship: Some(merged.relationship),
                    merged_parts: merged.merged_parts,
                    carried_parts: merged.carried_parts,
                    success: true,
                    error: None,
                    area_after: parts_area(&parts),
                });
            }
            Err(e) => {
                warn!("Union step {} skipped: {}", step, e);
                steps.push(UnionStep {
                    step,
                    feature_index: incoming.index,
                    relationship: None,
                    merged_parts: 0,
                    carried_parts: parts.len(),
                    success: false,
                    error: Some(e.to_string()),
                    area_after: parts_area(&parts),
                });
            }
        }
    }

    (parts, steps)
}

struct Merged {
    parts: Vec<Polygon<f64>>,
    relationship: Relationship,
    merged_parts: usize,
    carried_parts: usize,
}

/// Combine the accumulator parts with one incoming shape.
fn merge(parts: &[Polygon<f64>], incoming: &MultiPolygon<f64>) -> Result<Merged> {
    let accumulator = MultiPolygon::new(parts.to_vec());
    let relationship = relate::relationship(&accumulator, incoming)?;

    if !relationship.is_connected() {
        let mut out = parts.to_vec();
        out.extend(incoming.0.iter().cloned());
        return Ok(Merged {
            carried_parts: parts.len(),
            parts: out,
            relationship,
            merged_parts: 0,
        });
    }

    let mut cluster = incoming.clone();
    let mut pending: Vec<Polygon<f64>> = parts.to_vec();
    let mut merged_parts = 0;

    // Merging can bring the cluster into contact with a part tested earlier
    loop {
        let mut carried = Vec::with_capacity(pending.len());
        let before = merged_parts;

        for part in pending {
            let single = MultiPolygon::new(vec![part]);
            if relate::relationship(&single, &cluster)?.is_connected() {
                cluster = relate::union(&cluster, &single)?;
                merged_parts += 1;
            } else {
                carried.extend(single.0);
            }
        }

        pending = carried;
        if merged_parts == before || pending.is_empty() {
            break;
        }
    }

    let carried_parts = pending.len();
    pending.extend(cluster.0);
    Ok(Merged {
        parts: pending,
        relationship,
        merged_parts,
        carried_parts,
    })
}

fn parts_area(parts: &[Polygon<f64>]) -> f64 {
    area_m2(&Geometry::MultiPolygon(MultiPolygon::new(parts.to_vec())))
}

fn pairwise_analysis(prepared: &[PreparedPolygon<'_>]) -> PairwiseAnalysis {
    let mut analysis = PairwiseAnalysis::default();

    for (i, a) in prepared.iter().enumerate() {
        for b in &prepared[i + 1..] {
            let relationship = relate::relationship(&a.shape, &b.shape).ok();
            match relationship {
                Some(Relationship::Intersects) => analysis.intersecting_pairs += 1,
                Some(Relationship::Touches) => analysis.touching_pairs += 1,
                Some(Relationship::Separate) => analysis.separate_pairs += 1,
                None => {}
            }
            analysis.total_pairs += 1;
            analysis.pair_details.push(PairDetail {
                feature1_index: a.index,
                feature2_index: b.index,
                relationship,
            });
        }
    }

    analysis
}

/// First-wins merge of source properties, overlaid with computed fields
fn output_properties(
    prepared: &[PreparedPolygon<'_>],
    metadata: &UnionMetadata,
    options: &OperationOptions,
) -> Properties {
    let mut props = Properties::new();
    for p in prepared {
        for (k, v) in &p.feature.properties {
            props.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }

    let names: Vec<&str> = prepared.iter().filter_map(|p| p.feature.name()).collect();

    props.insert("operation".into(), "union".into());
    props.insert("unionDate".into(), timestamp().into());
    props.insert("inputFeatureCount".into(), metadata.input_feature_count.into());
    props.insert("validFeatureCount".into(), metadata.valid_feature_count.into());
    props.insert("totalArea".into(), metadata.total_area.into());
    props.insert("totalInputArea".into(), metadata.total_input_area.into());
    props.insert("areaEfficiency".into(), metadata.area_efficiency.into());
    props.insert("overlapReduction".into(), metadata.overlap_reduction.into());
    if !names.is_empty() {
        props.insert("sourceNames".into(), names.join(", ").into());
    }
    if options.preserve_properties {
        let sources = prepared
            .iter()
            .map(|p| AttributeValue::Object(p.feature.properties.clone()))
            .collect();
        props.insert("sourceProperties".into(), AttributeValue::Array(sources));
    }

    props
}
