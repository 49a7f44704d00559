//! I/O for vector data
//!
//! Ingestion is byte decoding only: geometries come out with the structural
//! shape of the model, and geometric validity is left to the validator.

mod geojson_io;

pub use geojson_io::{
    collection_to_geojson, parse_feature_collection, read_feature_collection,
    to_geojson_string, write_feature_collection,
};
