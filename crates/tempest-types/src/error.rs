//! Error types for decoding in tempest-types.

use thiserror::Error;

/// Errors that can occur when decoding positional telemetry arrays.
///
/// This error type is transport-agnostic: the same positional schemas are
/// carried over the LAN broadcast and the cloud push channel.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// A positional array was shorter than its schema requires.
    #[error("{message}: requires {expected} elements, got {actual}")]
    WrongLength {
        /// Message type the schema belongs to (e.g. `obs_st`).
        message: &'static str,
        /// Minimum number of elements the schema requires.
        expected: usize,
        /// Number of elements actually present.
        actual: usize,
    },

    /// A positional element was neither a number nor null.
    #[error("{message}: element {index} is not a number")]
    NotANumber {
        /// Message type the schema belongs to.
        message: &'static str,
        /// Zero-based index of the offending element.
        index: usize,
    },

    /// A decoded value is outside its valid domain.
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

/// Result type alias using tempest-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
