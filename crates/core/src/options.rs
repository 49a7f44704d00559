//! Operation options
//!
//! The recognized configuration keys are `distance`, `units`, `steps`,
//! `allowMultipleMatches`, `includeUnmatched`, `preserveProperties` and
//! `maxVertices`. Anything else in an options map is ignored.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Distance units accepted by the buffer operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Meters,
    Kilometers,
    Miles,
    Feet,
}

impl Units {
    /// Lenient parse: unknown names fall back to meters and return `None`
    /// in the second slot so the caller can emit a warning.
    pub fn parse_lenient(name: &str) -> (Units, Option<String>) {
        match name.trim().to_lowercase().as_str() {
            "meters" | "metres" | "m" => (Units::Meters, None),
            "kilometers" | "kilometres" | "km" => (Units::Kilometers, None),
            "miles" | "mi" => (Units::Miles, None),
            "feet" | "ft" => (Units::Feet, None),
            _ => (
                Units::Meters,
                Some(format!("Unusual units specified: {name}")),
            ),
        }
    }

    /// Conversion factor to meters
    pub fn to_meters(&self) -> f64 {
        match self {
            Units::Meters => 1.0,
            Units::Kilometers => 1000.0,
            Units::Miles => 1609.344,
            Units::Feet => 0.3048,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Units::Meters => "meters",
            Units::Kilometers => "kilometers",
            Units::Miles => "miles",
            Units::Feet => "feet",
        }
    }
}

/// Options shared by every operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OperationOptions {
    /// Buffer distance, in `units`
    pub distance: Option<f64>,
    /// Buffer units as given by the caller
    pub units: String,
    /// Segments used to approximate a full circle
    pub steps: usize,
    /// Spatial join: emit one joined feature per matching polygon
    pub allow_multiple_matches: bool,
    /// Spatial join: report unmatched points in metadata
    pub include_unmatched: bool,
    /// Keep source properties on union/intersection outputs
    pub preserve_properties: bool,
    /// Features with more vertices than this are skipped as per-feature failures
    pub max_vertices: Option<usize>,
}

impl Default for OperationOptions {
    fn default() -> Self {
        Self {
            distance: None,
            units: "meters".to_string(),
            steps: 8,
            allow_multiple_matches: false,
            include_unmatched: false,
            preserve_properties: false,
            max_vertices: None,
        }
    }
}

impl OperationOptions {
    /// Build options from a JSON object; unrecognized keys are ignored.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        if !value.is_object() && !value.is_null() {
            return Err(Error::InvalidParameter {
                name: "options",
                value: value.to_string(),
                reason: "options must be a JSON object".into(),
            });
        }
        if value.is_null() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn with_distance(mut self, distance: f64) -> Self {
        self.distance = Some(distance);
        self
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = units.into();
        self
    }

    pub fn with_steps(mut self, steps: usize) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_multiple_matches(mut self, allow: bool) -> Self {
        self.allow_multiple_matches = allow;
        self
    }

    pub fn with_unmatched(mut self, include: bool) -> Self {
        self.include_unmatched = include;
        self
    }

    pub fn with_preserved_properties(mut self, preserve: bool) -> Self {
        self.preserve_properties = preserve;
        self
    }

    pub fn with_max_vertices(mut self, max: usize) -> Self {
        self.max_vertices = Some(max);
        self
    }

    /// Parsed units plus an optional warning for unrecognized names
    pub fn parsed_units(&self) -> (Units, Option<String>) {
        Units::parse_lenient(&self.units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let o = OperationOptions::default();
        assert_eq!(o.steps, 8);
        assert_eq!(o.units, "meters");
        assert!(!o.allow_multiple_matches);
        assert!(o.distance.is_none());
    }

    #[test]
    fn test_from_json_ignores_unknown_keys() {
        let o = OperationOptions::from_json(json!({
            "distance": 250.0,
            "units": "kilometers",
            "allowMultipleMatches": true,
            "colorScheme": "viridis"
        }))
        .unwrap();

        assert_eq!(o.distance, Some(250.0));
        assert_eq!(o.parsed_units(), (Units::Kilometers, None));
        assert!(o.allow_multiple_matches);
        assert_eq!(o.steps, 8);
    }

    #[test]
    fn test_from_json_rejects_non_object() {
        assert!(OperationOptions::from_json(json!([1, 2])).is_err());
        assert_eq!(
            OperationOptions::from_json(serde_json::Value::Null).unwrap(),
            OperationOptions::default()
        );
    }

    #[test]
    fn test_unusual_units_warn() {
        let (units, warning) = Units::parse_lenient("furlongs");
        assert_eq!(units, Units::Meters);
        assert_eq!(warning.as_deref(), Some("Unusual units specified: furlongs"));
        assert!((Units::Miles.to_meters() - 1609.344).abs() < 1e-9);
    }
}
