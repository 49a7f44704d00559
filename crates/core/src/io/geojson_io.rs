//! GeoJSON reading and writing

use geojson::{feature::Id, GeoJson, JsonObject};
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::vector::{AttributeValue, Feature, FeatureCollection, Properties};

/// Parse a GeoJSON document into a feature collection.
///
/// Accepts a FeatureCollection, a single Feature, or a bare Geometry.
/// Features whose geometry cannot be represented are kept with no geometry
/// so the classifier can report them as unsupported.
pub fn parse_feature_collection(text: &str) -> Result<FeatureCollection> {
    let doc: GeoJson = text.parse()?;

    let features = match doc {
        GeoJson::FeatureCollection(fc) => fc.features,
        GeoJson::Feature(f) => vec![f],
        GeoJson::Geometry(g) => vec![geojson::Feature {
            bbox: None,
            geometry: Some(g),
            id: None,
            properties: None,
            foreign_members: None,
        }],
    };

    Ok(features.into_iter().enumerate().map(|(i, f)| convert_feature(i, f)).collect())
}

/// Read a GeoJSON file into a feature collection
pub fn read_feature_collection<P: AsRef<Path>>(path: P) -> Result<FeatureCollection> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let fc = parse_feature_collection(&text)?;
    debug!("Read {} features from {}", fc.len(), path.display());
    Ok(fc)
}

/// Convert a feature collection into a `geojson::FeatureCollection`
pub fn collection_to_geojson(fc: &FeatureCollection) -> geojson::FeatureCollection {
    geojson::FeatureCollection {
        bbox: None,
        features: fc.iter().map(export_feature).collect(),
        foreign_members: None,
    }
}

/// Serialize a feature collection as pretty-printed GeoJSON
pub fn to_geojson_string(fc: &FeatureCollection) -> Result<String> {
    Ok(serde_json::to_string_pretty(&collection_to_geojson(fc))?)
}

/// Write a feature collection to a GeoJSON file
pub fn write_feature_collection<P: AsRef<Path>>(fc: &FeatureCollection, path: P) -> Result<()> {
    std::fs::write(path.as_ref(), to_geojson_string(fc)?)?;
    Ok(())
}

fn convert_feature(index: usize, f: geojson::Feature) -> Feature {
    let geometry = f.geometry.and_then(|g| {
        geo_types::Geometry::<f64>::try_from(g)
            .map_err(|e| warn!("Feature {}: unreadable geometry ({})", index + 1, e))
            .ok()
    });

    let properties: Properties = f
        .properties
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| (k, AttributeValue::from(v)))
        .collect();

    let id = f.id.map(|id| match id {
        Id::String(s) => s,
        Id::Number(n) => n.to_string(),
    });

    Feature { geometry, properties, id }
}

fn export_feature(f: &Feature) -> geojson::Feature {
    let properties: JsonObject = f
        .properties
        .iter()
        .map(|(k, v)| (k.clone(), serde_json::Value::from(v)))
        .collect();

    geojson::Feature {
        bbox: None,
        geometry: f
            .geometry
            .as_ref()
            .map(|g| geojson::Geometry::new(geojson::Value::from(g))),
        id: f.id.clone().map(Id::String),
        properties: Some(properties),
        foreign_members: None,
    }
}

impl From<&FeatureCollection> for geojson::FeatureCollection {
    fn from(fc: &FeatureCollection) -> Self {
        collection_to_geojson(fc)
    }
}
