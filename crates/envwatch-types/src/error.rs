//! Error types for envwatch-types.

use thiserror::Error;

/// Errors raised while parsing or validating envwatch values.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ParseError {
    /// Unknown provider kind name.
    #[error("Unknown provider kind: {0}")]
    UnknownKind(String),

    /// Unknown data source name.
    #[error("Unknown data source: {0}")]
    UnknownSource(String),

    /// Coordinates outside the valid WGS84 range.
    #[error("Invalid coordinates: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinates { latitude: f64, longitude: f64 },
}

/// Result type alias using envwatch-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
