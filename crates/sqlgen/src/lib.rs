//! Template-first SQL generation for decision queries.
//!
//! A routed intent selects the most specific matching template; topic values
//! pass through the tag normalizer before binding; when nothing matches, a
//! disjunctive multi-field text search takes over. Every user-influenced
//! value is a bound positional parameter — the statement body never embeds
//! one, and [`verify_parameterized`] rejects any query where that fails.

mod builder;
mod error;
mod template;

pub use builder::{verify_parameterized, QueryGenerator};
pub use error::{GenerationError, Result};
pub use template::{select, QueryTemplate, TEMPLATES};
