//! Call-site locator: given a canonical function id, walks the repository
//! and reports every place that function is called.

pub mod import_match;
pub mod locator;
pub mod types;
pub mod visitor;

pub use locator::locate;
pub use types::CallSite;
