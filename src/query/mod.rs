//! Query layer - the engines behind every transport.
//!
//! All engines borrow an immutable [`ConfigVocabulary`](crate::vocab::ConfigVocabulary)
//! and validate request parameters against it before touching a store.

pub mod classify;
pub mod engine;
pub mod expression;

pub use classify::ClassificationEngine;
pub use engine::QueryEngine;
pub use expression::ExpressionEngine;
