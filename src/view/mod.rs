//! View layer
//!
//! Theme data and the stylesheets generated from it.

pub mod theme;
