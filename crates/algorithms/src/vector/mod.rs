//! Vector overlay operations
//!
//! - Validation and repair of input geometry
//! - Classification of mixed feature lists into points, lines and polygons
//! - Union, intersection, difference, buffer and spatial joins
//! - A name-based dispatcher producing uniform results

mod buffer;
mod classify;
mod difference;
mod dispatch;
mod intersection;
mod measurements;
mod relate;
mod result;
mod spatial_join;
mod union;
mod validate;

pub use buffer::{
    buffer, buffer_geometry, buffer_point, validate_buffer_input, Buffer, BufferMetadata,
    BufferParams, BufferStep,
};
pub use classify::{
    classify, Classified, ClassifiedFeature, FeatureTypeCounts, InputRole, SkippedFeature,
};
pub use difference::{
    difference, validate_difference_input, ContainmentCheck, Difference, DifferenceMetadata,
    DifferenceMode, DifferenceStep, LineAnalysis, PointAnalysis,
};
pub use dispatch::{
    execute, execute_features, result_layer, split_points_polygons, OperationKind,
    DEFAULT_BUFFER_DISTANCE,
};
pub use intersection::{
    find_all_intersections, intersection, multiple_intersection, validate_intersection_input,
    Intersection, IntersectionMetadata, MultiIntersectionMetadata, PairResult,
};
pub use measurements::{area_m2, centroid, length_km, vertex_count};
pub use relate::{covers_point, evaluate, on_boundary, relate, relationship, Predicate, Relationship};
pub use result::{FailureDebug, InputValidation, OperationMetadata, OperationResult};
pub use spatial_join::{
    aggregate_properties, count_points_in_polygons, polygon_spatial_join, spatial_join,
    Aggregation, PointCountMetadata, PolygonJoinMetadata, PolygonJoinParams, PolygonStatistics,
    SpatialJoin, SpatialJoinMetadata, UnmatchedPoint,
};
pub use union::{
    union, union_with_analysis, validate_union_input, PairDetail, PairwiseAnalysis, Union,
    UnionMetadata, UnionStep,
};
pub use validate::{
    check_budget, ensure_valid, prepare_polygons, repair, validate, validate_geometry,
    PreparedPolygon, RepairError, Validated, Validation,
};
