//! Grammar registry module with separated pure types and I/O operations.
//!
//! This module is split into:
//! - `types`: Registry bookkeeping (languages, scopes, injections), no I/O
//! - `source`: Grammar sources and their memoizing resolution
//! - `composite`: Compiling resolved grammars into one syntect `SyntaxSet`
//! - `registry`: The async `GrammarRegistry` tying the above together
//! - `loader`: File I/O behind the `GrammarLoader` trait
//!
//! # Example
//!
//! ```ignore
//! use textmate_bind::primitives::grammar::{GrammarRegistry, GrammarSource, LoadPolicy};
//!
//! let registry = GrammarRegistry::new();
//! registry.add_grammar("source.x", GrammarSource::from_yaml("source.x", yaml)?);
//! registry.activate_language("source.x", "x", LoadPolicy::Now).await?;
//! let grammar = registry.load_grammar("x").await?;
//! ```

mod composite;
mod loader;
mod registry;
mod source;
mod types;

pub use composite::{referenced_scopes, GrammarSet};
pub use loader::*;
pub use registry::*;
pub use source::{parse_definition, GrammarFactory, GrammarFuture, GrammarReloader, GrammarSource};
pub use types::*;
