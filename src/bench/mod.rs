//! Query optimization benchmark over both catalog models.

pub mod document_queries;
pub mod harness;
pub mod levels;
pub mod relational_queries;

pub use document_queries::{add_record_album_to_top_band, DocumentTarget, RecordAlbum};
pub use harness::{measure, run_ladder, verify_agreement, BenchError, BenchTarget, LevelAnswer, LevelReport};
pub use levels::{OptimizationLevel, TimeWindow, TopAnswer};
pub use relational_queries::RelationalTarget;
