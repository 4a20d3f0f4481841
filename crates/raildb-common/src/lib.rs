//! RailDB common types, errors, and utilities.
//!
//! This crate provides shared definitions used across all RailDB components.

pub mod config;
pub mod error;
pub mod fixed;
pub mod page;
pub mod time;

pub use config::StorageConfig;
pub use error::{RailError, Result};
pub use fixed::{djb2, FixedStr};
pub use page::{FixedCodec, PageId, INVALID_PAGE_ID, PAGE_SIZE};
pub use time::DateTime;
