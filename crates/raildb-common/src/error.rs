//! Error types for RailDB.

use thiserror::Error;

/// Result type alias using RailError.
pub type Result<T> = std::result::Result<T, RailError>;

/// Errors that can occur in RailDB operations.
///
/// User-visible refusals (bad session, unknown train, sold out, ...) are
/// not errors; domain operations report those through their return value.
/// Every variant here is fatal to the command that raised it.
#[derive(Debug, Error)]
pub enum RailError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Page store errors
    #[error("Invalid page id: {0}")]
    InvalidPageId(u32),

    #[error("Short read on page {page_id}: got {got} of {expected} bytes")]
    ShortRead {
        page_id: u32,
        got: usize,
        expected: usize,
    },

    // Persistent counter errors
    #[error("Meta slab exhausted: offset {offset} + {len} exceeds slab size")]
    MetaSlabFull { offset: usize, len: usize },

    // Logical violations: these indicate bugs or on-disk corruption,
    // never user mistakes.
    #[error("B+ tree corrupted: {0}")]
    TreeCorrupted(String),

    #[error("Seat inventory corrupted: {0}")]
    SeatCorrupted(String),

    #[error("Order store corrupted: {0}")]
    OrderCorrupted(String),

    #[error("Station dictionary corrupted: {0}")]
    StationCorrupted(String),
}
