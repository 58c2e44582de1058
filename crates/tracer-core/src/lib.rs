//! Canonical IDs, shared error types, and repository walking shared by the
//! static index, change-set analyser, call-site locator, and interactive
//! tracer.

pub mod canonical;
pub mod error;
pub mod walk;

pub use canonical::{is_top_level_name, CanonicalId, TOP_LEVEL_SENTINELS};
pub use error::{Result, TracerError};
