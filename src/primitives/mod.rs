//! Low-level primitives
//!
//! Grammar registration and loading, line tokenization, and the mapping of
//! token scopes to styles.

pub mod grammar;
pub mod highlighter;
pub mod scope_style;
pub mod tokenizer;
