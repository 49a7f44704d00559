//! Layer manager: the ordered set of layers an operation can draw from

use geoverlay_core::layer::LAYER_PALETTE;
use geoverlay_core::{Error, FeatureCollection, Layer, LayerId, LayerSource, OperationOptions, Result};
use tracing::{debug, info, warn};

use crate::vector::{execute, result_layer, OperationResult};

/// Owns every layer and hands out ids and colors.
///
/// Ids are monotonic and never reused. Colors cycle through
/// [`LAYER_PALETTE`] in insertion order.
#[derive(Debug, Default)]
pub struct LayerManager {
    layers: Vec<Layer>,
    next_id: u64,
}

impl LayerManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self, mut layer: Layer) -> LayerId {
        self.next_id += 1;
        let id = LayerId(self.next_id);
        layer.id = id;
        layer.color = LAYER_PALETTE[(self.next_id as usize - 1) % LAYER_PALETTE.len()].to_string();
        debug!("Layer {} '{}' added ({} features)", id, layer.name, layer.data.len());
        self.layers.push(layer);
        id
    }

    /// Add a layer built from `data`.
    pub fn add(&mut self, name: impl Into<String>, data: FeatureCollection, source: LayerSource) -> LayerId {
        self.allocate(Layer::new(name, data, source))
    }

    pub fn remove(&mut self, id: LayerId) -> Option<Layer> {
        let pos = self.layers.iter().position(|l| l.id == id)?;
        Some(self.layers.remove(pos))
    }

    pub fn get(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    fn get_mut(&mut self, id: LayerId) -> Result<&mut Layer> {
        self.layers
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| Error::Other(format!("Layer {id} not found")))
    }

    /// Flip visibility; returns the new state.
    pub fn toggle_visibility(&mut self, id: LayerId) -> Result<bool> {
        let layer = self.get_mut(id)?;
        layer.visible = !layer.visible;
        Ok(layer.visible)
    }

    pub fn rename(&mut self, id: LayerId, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidParameter {
                name: "name",
                value: name,
                reason: "layer name must not be empty".into(),
            });
        }
        self.get_mut(id)?.name = name;
        Ok(())
    }

    pub fn set_selected_for_operation(&mut self, id: LayerId, selected: bool) -> Result<()> {
        self.get_mut(id)?.selected_for_operation = selected;
        Ok(())
    }

    /// Layers selected for the next operation, in insertion order
    pub fn selected_for_operation(&self) -> Vec<&Layer> {
        self.layers.iter().filter(|l| l.selected_for_operation).collect()
    }

    /// Run `operation` over the selected layers.
    ///
    /// On success a result layer named `<operation>_result_<HH:MM:SS>` is
    /// appended and its id returned next to the result. Input layers are
    /// left untouched.
    pub fn run_operation(
        &mut self,
        operation: &str,
        options: &OperationOptions,
    ) -> (OperationResult, Option<LayerId>) {
        let selected: Vec<Layer> = self.selected_for_operation().into_iter().cloned().collect();
        let result = execute(operation, &selected, options);
        if !result.success {
            warn!("{}", result.message());
            return (result, None);
        }

        let name = format!(
            "{}_result_{}",
            operation,
            chrono::Local::now().format("%H:%M:%S")
        );
        let id = result_layer(&result, &selected, name).map(|layer| self.allocate(layer));
        info!("{}", result.message());
        (result, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{point, polygon};
    use geoverlay_core::Feature;

    fn square(x0: f64) -> FeatureCollection {
        vec![Feature::new(polygon![
            (x: x0, y: 0.0),
            (x: x0 + 0.02, y: 0.0),
            (x: x0 + 0.02, y: 0.02),
            (x: x0, y: 0.02),
            (x: x0, y: 0.0),
        ])]
        .into()
    }

    #[test]
    fn test_ids_and_colors() {
        let mut m = LayerManager::new();
        let a = m.add("a", FeatureCollection::new(), LayerSource::Drawn);
        let b = m.add("b", FeatureCollection::new(), LayerSource::Drawn);
        m.remove(a);
        let c = m.add("c", FeatureCollection::new(), LayerSource::Drawn);

        assert!(a < b && b < c);
        assert_eq!(m.len(), 2);
        assert_eq!(m.get(b).unwrap().color, LAYER_PALETTE[1]);
        assert_eq!(m.get(c).unwrap().color, LAYER_PALETTE[2]);
    }

    #[test]
    fn test_toggle_rename_select() {
        let mut m = LayerManager::new();
        let id = m.add("wells", FeatureCollection::new(), LayerSource::Uploaded);

        assert!(!m.toggle_visibility(id).unwrap());
        m.rename(id, "bores").unwrap();
        assert_eq!(m.get(id).unwrap().name, "bores");
        assert!(m.rename(id, "  ").is_err());
        assert!(m.toggle_visibility(LayerId(99)).is_err());

        m.set_selected_for_operation(id, true).unwrap();
        assert_eq!(m.selected_for_operation().len(), 1);
    }

    #[test]
    fn test_run_operation_appends_result_layer() {
        let mut m = LayerManager::new();
        let a = m.add("a", square(0.0), LayerSource::Drawn);
        let b = m.add("b", square(0.01), LayerSource::Drawn);
        m.add("ignored", vec![Feature::new(point!(x: 5.0, y: 5.0))].into(), LayerSource::Drawn);
        m.set_selected_for_operation(a, true).unwrap();
        m.set_selected_for_operation(b, true).unwrap();

        let (result, id) = m.run_operation("union", &OperationOptions::default());
        assert!(result.success);

        let layer = m.get(id.unwrap()).unwrap();
        assert!(layer.name.starts_with("union_result_"));
        assert_eq!(layer.source, LayerSource::Result);
        assert!(!layer.selected_for_operation);
        assert_eq!(m.len(), 4);
        assert_eq!(m.get(a).unwrap().data.len(), 1);
    }

    #[test]
    fn test_failed_operation_adds_nothing() {
        let mut m = LayerManager::new();
        let a = m.add("a", square(0.0), LayerSource::Drawn);
        m.set_selected_for_operation(a, true).unwrap();

        let (result, id) = m.run_operation("dissolve", &OperationOptions::default());
        assert!(!result.success);
        assert!(id.is_none());
        assert_eq!(m.len(), 1);
    }
}
