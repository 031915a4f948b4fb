//! Services
//!
//! The binding coordinator and its collaborators: the editor-facing traits,
//! the update queue and theme stylesheet accounting.

pub mod coordinator;
pub mod editor;
pub mod styled_html;
pub mod theme_resources;
#[cfg(feature = "runtime")]
pub mod tracing_setup;
pub mod update_queue;
