//! # geoverlay Algorithms
//!
//! Vector overlay operations over `geoverlay_core` features.
//!
//! ## Operations
//!
//! - **union**: merge polygons into one feature
//! - **intersection**: shared geometry of polygon, line and point pairs
//! - **difference**: subtract polygons from polygons, points or lines
//! - **buffer**: grow or shrink features by a distance
//! - **spatial join**: points in polygons, point counts, polygon joins
//!
//! Every operation returns an [`vector::OperationResult`]. The dispatcher
//! in [`vector::execute`] runs them by name over a set of layers, and
//! [`manager::LayerManager`] keeps those layers.

pub mod manager;
mod maybe_rayon;
pub mod vector;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::manager::LayerManager;
    pub use crate::vector::{
        buffer, count_points_in_polygons, difference, execute, find_all_intersections,
        intersection, multiple_intersection, polygon_spatial_join, spatial_join, union,
        union_with_analysis, Aggregation, Buffer, BufferParams, Difference, Intersection,
        OperationKind, OperationMetadata, OperationResult, PolygonJoinParams, Predicate,
        SpatialJoin, Union,
    };
    pub use geoverlay_core::prelude::*;
}
