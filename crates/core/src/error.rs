//! Error types for geoverlay

use thiserror::Error;

/// Main error type for geoverlay operations.
///
/// Only malformed calls end up here. Data-quality problems inside a batch
/// (an unrepairable polygon, a failed pairwise step) are recorded in the
/// operation's metadata instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(String),

    #[error("{} requires at least {}", .operation, feature_count(.required))]
    InsufficientFeatures {
        operation: &'static str,
        required: usize,
        actual: usize,
    },

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("{0}")]
    UnsupportedCombination(String),

    #[error("{0}")]
    NoValidFeatures(String),

    #[error("Geometry error: {0}")]
    Geometry(String),

    #[error("{0}")]
    Other(String),
}

fn feature_count(n: &usize) -> String {
    if *n == 1 {
        "1 feature".to_string()
    } else {
        format!("{n} features")
    }
}

impl Error {
    /// Short variant name, used for failure diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Io(_) => "Io",
            Error::Json(_) => "Json",
            Error::GeoJson(_) => "GeoJson",
            Error::InsufficientFeatures { .. } => "InsufficientFeatures",
            Error::InvalidParameter { .. } => "InvalidParameter",
            Error::UnknownOperation(_) => "UnknownOperation",
            Error::UnsupportedCombination(_) => "UnsupportedCombination",
            Error::NoValidFeatures(_) => "NoValidFeatures",
            Error::Geometry(_) => "Geometry",
            Error::Other(_) => "Other",
        }
    }
}

impl From<geojson::Error> for Error {
    fn from(e: geojson::Error) -> Self {
        Error::GeoJson(e.to_string())
    }
}

/// Result type alias for geoverlay operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_features_message() {
        let e = Error::InsufficientFeatures {
            operation: "Union",
            required: 1,
            actual: 0,
        };
        assert_eq!(e.to_string(), "Union requires at least 1 feature");

        let e = Error::InsufficientFeatures {
            operation: "Difference",
            required: 2,
            actual: 1,
        };
        assert_eq!(e.to_string(), "Difference requires at least 2 features");
    }

    #[test]
    fn test_unknown_operation_message() {
        let e = Error::UnknownOperation("dissolve".into());
        assert_eq!(e.to_string(), "Unknown operation: dissolve");
        assert_eq!(e.kind(), "UnknownOperation");
    }
}
