//! Layers: named, toggleable containers for one feature collection

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::vector::{BBox, FeatureCollection, Properties};

/// Colors handed out to new layers, cycled in order.
pub const LAYER_PALETTE: [&str; 10] = [
    "#e6194b", "#3cb44b", "#4363d8", "#f58231", "#911eb4",
    "#42d4f4", "#f032e6", "#bfef45", "#469990", "#9a6324",
];

/// Layer identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct LayerId(pub u64);

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a layer's data came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerSource {
    #[default]
    Uploaded,
    Drawn,
    Result,
}

/// Summary derived from the layer's data
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerMetadata {
    pub feature_count: usize,
    pub geometry_types: BTreeSet<String>,
    pub bounds: Option<BBox>,
}

impl LayerMetadata {
    pub fn from_collection(data: &FeatureCollection) -> Self {
        Self {
            feature_count: data.len(),
            geometry_types: data.geometry_types(),
            bounds: data.bounds(),
        }
    }
}

/// A named feature collection plus display and provenance state.
///
/// A layer owns its data exclusively. Operations read layers and produce
/// new ones; changes to an existing layer are whole-value replacements.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    pub visible: bool,
    pub color: String,
    pub data: FeatureCollection,
    pub metadata: LayerMetadata,
    pub selected_for_operation: bool,
    pub source: LayerSource,
    /// Provenance for result layers (operation name, input layers, statistics)
    pub properties: Properties,
}

impl Layer {
    /// Create a visible, unselected layer. Metadata is derived from `data`.
    pub fn new(name: impl Into<String>, data: FeatureCollection, source: LayerSource) -> Self {
        let metadata = LayerMetadata::from_collection(&data);
        Self {
            id: LayerId::default(),
            name: name.into(),
            visible: true,
            color: LAYER_PALETTE[0].to_string(),
            data,
            metadata,
            selected_for_operation: false,
            source,
            properties: Properties::new(),
        }
    }

    pub fn with_properties(self, properties: Properties) -> Self {
        Self { properties, ..self }
    }

    /// Replace the data and recompute the derived metadata
    pub fn with_data(self, data: FeatureCollection) -> Self {
        let metadata = LayerMetadata::from_collection(&data);
        Self {
            data,
            metadata,
            ..self
        }
    }

    /// Current envelope, recomputed from the geometry
    pub fn bounds(&self) -> Option<BBox> {
        self.data.bounds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::Feature;
    use geo_types::point;

    #[test]
    fn test_new_layer_derives_metadata() {
        let data: FeatureCollection = vec![
            Feature::new(point!(x: 0.0, y: 0.0)),
            Feature::new(point!(x: 2.0, y: 1.0)),
        ]
        .into();
        let layer = Layer::new("wells", data, LayerSource::Drawn);

        assert!(layer.visible);
        assert!(!layer.selected_for_operation);
        assert_eq!(layer.metadata.feature_count, 2);
        assert!(layer.metadata.geometry_types.contains("Point"));
        assert_eq!(layer.metadata.bounds, Some(BBox::new(0.0, 0.0, 2.0, 1.0)));
    }

    #[test]
    fn test_with_data_recomputes_metadata() {
        let layer = Layer::new("empty", FeatureCollection::new(), LayerSource::Uploaded);
        assert_eq!(layer.metadata.bounds, None);

        let layer = layer.with_data(vec![Feature::new(point!(x: 5.0, y: 5.0))].into());
        assert_eq!(layer.metadata.feature_count, 1);
        assert_eq!(layer.bounds(), Some(BBox::new(5.0, 5.0, 5.0, 5.0)));
    }

    #[test]
    fn test_source_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&LayerSource::Result).unwrap(), "\"result\"");
    }
}
