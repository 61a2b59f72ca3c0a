//! Crate-wide error composition.
//!
//! `config` and `logging` live at the crate root (`crate::config`,
//! `crate::logging`) rather than under here, matching this codebase's
//! existing layout; this module holds only the `CurveTreeError`
//! composition that reaches across all of them.

pub mod error;

pub use error::{CurveTreeError, Result};
