//! # DubList Common Library
//!
//! Shared code for the dub reconciliation tools including:
//! - Catalog/language identifiers and on-disk document shapes
//! - Whole-file JSON persistence with corruption tolerance
//! - Language canonicalization
//! - Data folder layout
//! - Bootstrap configuration loading

pub mod config;
pub mod error;
pub mod json_store;
pub mod language;
pub mod layout;
pub mod model;

pub use error::{Error, Result};
pub use language::{canonicalize_language, LanguageKey};
pub use layout::DataLayout;
pub use model::{CatalogId, FactSet};
