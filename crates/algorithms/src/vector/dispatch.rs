//! Operation dispatcher
//!
//! Resolves an operation name, gathers the features of the selected layers
//! and runs the operation. Nothing escapes as an error or a panic: every
//! failure comes back as an `OperationResult` with `success: false`.

use geoverlay_core::{
    AttributeValue, Error, Feature, FeatureCollection, Layer, LayerSource, OperationOptions,
    Result,
};
use tracing::{error, info};

use super::buffer::buffer;
use super::classify::{classify, InputRole, SkippedFeature};
use super::difference::difference;
use super::intersection::{intersection, multiple_intersection};
use super::relate::guarded;
use super::result::{OperationMetadata, OperationResult};
use super::spatial_join::{count_points_in_polygons, spatial_join};
use super::union::union;

/// Buffer distance used when the options carry none
pub const DEFAULT_BUFFER_DISTANCE: f64 = 1000.0;

/// Operations reachable through the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Union,
    Intersection,
    Difference,
    Buffer,
    SpatialJoin,
    CountPoints,
}

impl OperationKind {
    pub const ALL: [OperationKind; 6] = [
        OperationKind::Union,
        OperationKind::Intersection,
        OperationKind::Difference,
        OperationKind::Buffer,
        OperationKind::SpatialJoin,
        OperationKind::CountPoints,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Union => "union",
            OperationKind::Intersection => "intersection",
            OperationKind::Difference => "difference",
            OperationKind::Buffer => "buffer",
            OperationKind::SpatialJoin => "spatial-join",
            OperationKind::CountPoints => "count-points",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OperationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        OperationKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| Error::UnknownOperation(s.to_string()))
    }
}

/// Run `operation` over every feature of `layers`.
pub fn execute(operation: &str, layers: &[Layer], options: &OperationOptions) -> OperationResult {
    let features: Vec<Feature> = layers
        .iter()
        .flat_map(|layer| layer.data.iter().cloned())
        .collect();
    execute_features(operation, &features, options)
}

/// Run `operation` over a flat feature list.
pub fn execute_features(
    operation: &str,
    features: &[Feature],
    options: &OperationOptions,
) -> OperationResult {
    let outcome = operation.parse::<OperationKind>().and_then(|kind| {
        if features.is_empty() {
            return Err(Error::NoValidFeatures(
                "No features found in selected layers".into(),
            ));
        }
        guarded(operation, || run(kind, features, options))?
    });

    match outcome {
        Ok(result) => {
            info!("{}", result.message());
            result
        }
        Err(e) => {
            error!("Operation '{}' failed: {}", operation, e);
            OperationResult::failure(operation, &e, features.len())
        }
    }
}

fn run(kind: OperationKind, features: &[Feature], options: &OperationOptions) -> Result<OperationResult> {
    match kind {
        OperationKind::Union => union(features, options),
        OperationKind::Intersection => {
            if features.len() < 2 {
                return Err(Error::InsufficientFeatures {
                    operation: "Intersection",
                    required: 2,
                    actual: features.len(),
                });
            }
            if features.len() == 2 {
                intersection(&features[0], &features[1], options)
            } else {
                multiple_intersection(features, options)
            }
        }
        OperationKind::Difference => difference(features, options),
        OperationKind::Buffer => {
            let distance = options.distance.unwrap_or(DEFAULT_BUFFER_DISTANCE);
            buffer(features, distance, options)
        }
        OperationKind::SpatialJoin => {
            let (points, polygons, dropped) = split_points_polygons(features);
            spatial_join(&points, &polygons, options).map(|r| with_dropped(r, dropped))
        }
        OperationKind::CountPoints => {
            let (points, polygons, dropped) = split_points_polygons(features);
            count_points_in_polygons(&points, &polygons, options).map(|r| with_dropped(r, dropped))
        }
    }
}

/// Point-like and polygon-like features, plus the rest as skipped entries
/// indexed into `features`.
pub fn split_points_polygons(
    features: &[Feature],
) -> (Vec<Feature>, Vec<Feature>, Vec<SkippedFeature>) {
    let classes = classify(features);
    let points = classes.points.iter().map(|c| c.feature.clone()).collect();
    let polygons = classes.polygons.iter().map(|c| c.feature.clone()).collect();

    let mut dropped = classes.unsupported;
    for item in &classes.lines {
        dropped.push(SkippedFeature::new(item.index, "Neither a point nor a polygon"));
    }
    dropped.sort_by_key(|s| s.index);
    let dropped = dropped
        .into_iter()
        .map(|s| s.from_input(InputRole::Input))
        .collect();
    (points, polygons, dropped)
}

fn with_dropped(mut result: OperationResult, mut dropped: Vec<SkippedFeature>) -> OperationResult {
    let skipped = match &mut result.metadata {
        OperationMetadata::SpatialJoin(m) => Some(&mut m.skipped),
        OperationMetadata::PointCount(m) => Some(&mut m.skipped),
        _ => None,
    };
    if let Some(skipped) = skipped {
        dropped.append(skipped);
        *skipped = dropped;
    }
    result
}

/// Wrap a successful result in a new result layer.
///
/// Returns `None` for failed results. The layer's `properties` carry the
/// operation name, the input layer names, the output feature count and the
/// operation metadata folded in at the top level.
pub fn result_layer(
    result: &OperationResult,
    inputs: &[Layer],
    name: impl Into<String>,
) -> Option<Layer> {
    if !result.success {
        return None;
    }

    let mut properties = match AttributeValue::from(result.metadata.to_value()) {
        AttributeValue::Object(map) => map,
        _ => Default::default(),
    };
    properties.insert("operation".into(), result.operation.as_str().into());
    properties.insert(
        "inputLayers".into(),
        AttributeValue::Array(inputs.iter().map(|l| l.name.as_str().into()).collect()),
    );
    properties.insert("featureCount".into(), result.result.len().into());
    properties.insert(
        "createdDate".into(),
        chrono::Local::now().format("%Y-%m-%d").to_string().into(),
    );

    let data: FeatureCollection = result.result.clone();
    Some(Layer::new(name, data, LayerSource::Result).with_properties(properties))
}
