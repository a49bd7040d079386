//! Utility functions shared by the engine and rule implementations.

pub mod paths;

#[doc(inline)]
pub use paths::normalize_path;
