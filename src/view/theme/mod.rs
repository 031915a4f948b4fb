//! Theme module with separated pure types and I/O operations.
//!
//! This module is split into:
//! - `types`: Theme data, compilation, scope matching and CSS generation
//! - `loader`: I/O operations with `ThemeLoader` trait abstraction
//!
//! # Example
//!
//! ```ignore
//! use textmate_bind::view::theme::{CompiledTheme, LocalThemeLoader, RawTheme};
//!
//! let raw = RawTheme::load(&LocalThemeLoader, Path::new("themes/solar.json"))?;
//! let theme = CompiledTheme::compile(&raw)?;
//! let css = theme.css_text();
//! ```

mod loader;
mod types;

pub use loader::*;
pub use types::*;
