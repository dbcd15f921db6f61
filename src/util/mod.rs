//! Leaf utilities shared across the compilation pipeline: path sanitation
//! and collision-avoiding path construction, and JSON-Schema display-hint
//! compaction.

pub mod path;
pub mod schema_hint;

pub use path::{sanitize_segment, PathBuilder};
pub use schema_hint::{compact_hint, RefHintTable};
