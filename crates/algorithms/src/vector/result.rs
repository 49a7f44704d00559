//! Uniform operation result shape

use geoverlay_core::{Error, FeatureCollection};
use serde::Serialize;

use super::buffer::BufferMetadata;
use super::classify::FeatureTypeCounts;
use super::difference::DifferenceMetadata;
use super::intersection::{IntersectionMetadata, MultiIntersectionMetadata};
use super::spatial_join::{PointCountMetadata, PolygonJoinMetadata, SpatialJoinMetadata};
use super::union::UnionMetadata;

/// Operation-specific statistics
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(untagged)]
pub enum OperationMetadata {
    #[default]
    None,
    Union(UnionMetadata),
    Intersection(IntersectionMetadata),
    MultiIntersection(MultiIntersectionMetadata),
    Difference(DifferenceMetadata),
    Buffer(BufferMetadata),
    SpatialJoin(SpatialJoinMetadata),
    PointCount(PointCountMetadata),
    PolygonJoin(PolygonJoinMetadata),
}

macro_rules! metadata_accessor {
    ($name:ident, $variant:ident, $ty:ty) => {
        pub fn $name(&self) -> Option<&$ty> {
            match self {
                OperationMetadata::$variant(m) => Some(m),
                _ => None,
            }
        }
    };
}

impl OperationMetadata {
    metadata_accessor!(as_union, Union, UnionMetadata);
    metadata_accessor!(as_intersection, Intersection, IntersectionMetadata);
    metadata_accessor!(as_multi_intersection, MultiIntersection, MultiIntersectionMetadata);
    metadata_accessor!(as_difference, Difference, DifferenceMetadata);
    metadata_accessor!(as_buffer, Buffer, BufferMetadata);
    metadata_accessor!(as_spatial_join, SpatialJoin, SpatialJoinMetadata);
    metadata_accessor!(as_point_count, PointCount, PointCountMetadata);
    metadata_accessor!(as_polygon_join, PolygonJoin, PolygonJoinMetadata);

    /// Metadata as a JSON value; `Null` when the operation recorded none.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Diagnostics attached to a failed dispatch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureDebug {
    pub error_type: String,
    pub error_message: String,
    pub input_feature_count: usize,
}

/// What every operation returns.
///
/// Empty intersections, unmatched joins and skipped features are all
/// `success: true`; only malformed calls and caught primitive failures
/// produce `success: false`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    pub success: bool,
    pub operation: String,
    #[serde(skip)]
    pub result: FeatureCollection,
    pub metadata: OperationMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<FailureDebug>,
}

impl OperationResult {
    pub fn success(
        operation: impl Into<String>,
        result: FeatureCollection,
        metadata: OperationMetadata,
    ) -> Self {
        Self {
            success: true,
            operation: operation.into(),
            result,
            metadata,
            error: None,
            warnings: Vec::new(),
            debug: None,
        }
    }

    /// Failed call with diagnostics and no partial output
    pub fn failure(operation: impl Into<String>, error: &Error, input_feature_count: usize) -> Self {
        Self::failure_message(operation, error.kind(), error.to_string(), input_feature_count)
    }

    pub fn failure_message(
        operation: impl Into<String>,
        error_type: impl Into<String>,
        message: impl Into<String>,
        input_feature_count: usize,
    ) -> Self {
        let message = message.into();
        Self {
            success: false,
            operation: operation.into(),
            result: FeatureCollection::new(),
            metadata: OperationMetadata::None,
            error: Some(message.clone()),
            warnings: Vec::new(),
            debug: Some(FailureDebug {
                error_type: error_type.into(),
                error_message: message,
                input_feature_count,
            }),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    pub fn feature_count(&self) -> usize {
        self.result.len()
    }

    /// One-line summary for logs and toasts
    pub fn message(&self) -> String {
        match (&self.error, self.success) {
            (_, true) => format!(
                "{} completed successfully: {} features created",
                self.operation,
                self.result.len()
            ),
            (Some(e), false) => e.clone(),
            (None, false) => format!("{} failed", self.operation),
        }
    }
}

/// Pre-flight report on an operation's input
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputValidation {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub counts: FeatureTypeCounts,
    pub details: Vec<String>,
}

impl InputValidation {
    pub(crate) fn finish(mut self) -> Self {
        self.valid = self.errors.is_empty();
        self
    }
}

/// Current time as RFC 3339, used for provenance stamps
pub(crate) fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_shape() {
        let err = Error::UnknownOperation("dissolve".into());
        let r = OperationResult::failure("dissolve", &err, 3);

        assert!(!r.success);
        assert!(r.result.is_empty());
        assert_eq!(r.error.as_deref(), Some("Unknown operation: dissolve"));

        let debug = r.debug.unwrap();
        assert_eq!(debug.error_type, "UnknownOperation");
        assert_eq!(debug.input_feature_count, 3);
    }

    #[test]
    fn test_serializes_camel_case_without_result() {
        let r = OperationResult::success("union", FeatureCollection::new(), OperationMetadata::None)
            .with_warnings(vec!["careful".into()]);
        let v = serde_json::to_value(&r).unwrap();

        assert_eq!(v["success"], true);
        assert_eq!(v["warnings"][0], "careful");
        assert!(v.get("result").is_none());
        assert!(v.get("error").is_none());
        assert!(v["metadata"].is_null());
    }
}
