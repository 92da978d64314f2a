//! Common error types for BoxTrack

use thiserror::Error;

/// Common result type for BoxTrack operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across BoxTrack crates
///
/// "No data" is never an error: empty shipment populations, missing
/// milestone records and absent content all produce empty values.
#[derive(Error, Debug)]
pub enum Error {
    /// Empty coordinate list passed to a center/bounds/zoom helper
    #[error("Empty coordinate list passed to {0}")]
    EmptyCoordinates(&'static str),

    /// Cutoff or timestamp value that cannot be interpreted
    #[error("Invalid time value: {0}")]
    InvalidTime(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
