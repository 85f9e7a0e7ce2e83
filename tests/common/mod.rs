//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestCatalog, BAND_A_URL};
//!
//! #[test]
//! fn test_band_is_imported() {
//!     let catalog = TestCatalog::imported().unwrap();
//!     // open catalog.relational_db or catalog.document_db
//! }
//! ```

mod constants;
mod fixtures;

pub use constants::*;
#[allow(unused_imports)]
pub use fixtures::{read_test_bands, write_source_files, TestCatalog};
