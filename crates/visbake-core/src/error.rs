//! Error types for the visibility compilers.

use thiserror::Error;

/// Build-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid build options
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// Invalid input data (scene geometry, entities)
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Out of bounds access
    #[error("Out of bounds: {0}")]
    OutOfBounds(String),

    /// A build invariant was violated; the build cannot continue.
    #[error("Invariant violated: {0}")]
    Invariant(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
