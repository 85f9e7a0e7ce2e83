//! Source data: tolerant field parsing, delimited file reading and extraction
//! of canonical band records.

pub mod parse;
pub mod reader;
pub mod records;

pub use parse::{parse, FieldKind, FieldValue, Parsed};
pub use reader::SourceTables;
pub use records::{extract, Album, Band, Extraction, Membership};
