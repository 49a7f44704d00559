//! # geoverlay Core
//!
//! Core types, traits and I/O for the geoverlay vector engine.
//!
//! This crate provides:
//! - `Feature` / `FeatureCollection`: geometry plus free-form attributes
//! - `Layer`: a named, toggleable container for one feature collection
//! - `OperationOptions`: the configuration keys every operation accepts
//! - `Algorithm` trait for a consistent operation API
//! - GeoJSON ingestion and export

pub mod error;
pub mod io;
pub mod layer;
pub mod options;
pub mod vector;

pub use error::{Error, Result};
pub use layer::{Layer, LayerId, LayerMetadata, LayerSource};
pub use options::{OperationOptions, Units};
pub use vector::{AttributeValue, BBox, Feature, FeatureCollection, Properties};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::layer::{Layer, LayerId, LayerSource};
    pub use crate::options::{OperationOptions, Units};
    pub use crate::vector::{AttributeValue, BBox, Feature, FeatureCollection, Properties};
    pub use crate::Algorithm;
}

/// Core trait for all operations in geoverlay.
///
/// Operations are pure functions that transform input data according to parameters.
pub trait Algorithm {
    /// Input type for the operation
    type Input;
    /// Output type for the operation
    type Output;
    /// Parameters controlling operation behavior
    type Params: Default;
    /// Error type for operation execution
    type Error: std::error::Error;

    /// Returns the operation name
    fn name(&self) -> &'static str;

    /// Returns a description of what the operation does
    fn description(&self) -> &'static str;

    /// Execute the operation
    fn execute(&self, input: Self::Input, params: Self::Params) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters
    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}
