//! In-memory collection implementing the find seam.
//!
//! Evaluates the native filter subset the translator emits, plus the logical
//! operators callers may pass through. No persistence and no ranking.

mod collection;
mod cursor;
mod eval;
mod parse;
mod types;

pub use collection::{MemoryCollection, MemoryQuery};
pub use cursor::Cursor;
pub use eval::{compare_bson, compare_docs, eval_filter, project};
pub use parse::{parse_filter, parse_projection, tokenize_search};
pub use types::{CmpOp, Filter, Projection, TextSearch};
