//! Theme loading with I/O abstraction.
//!
//! This module provides the `ThemeLoader` trait for reading theme files from
//! various sources, and `LocalThemeLoader` as the default filesystem-based
//! implementation.

use std::io;
use std::path::{Path, PathBuf};

use super::types::RawTheme;
use crate::error::BridgeError;

/// Trait for reading theme files from various sources.
pub trait ThemeLoader: Send + Sync {
    /// Read theme JSON content.
    fn read_theme(&self, path: &Path) -> io::Result<String>;

    /// List theme files in a directory.
    fn available_themes(&self, dir: &Path) -> Vec<PathBuf>;
}

/// Default implementation using local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalThemeLoader;

impl ThemeLoader for LocalThemeLoader {
    fn read_theme(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn available_themes(&self, dir: &Path) -> Vec<PathBuf> {
        let mut themes = Vec::new();
        if let Ok(entries) = std::fs::read_dir(dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "json") {
                    themes.push(path);
                }
            }
        }
        themes.sort();
        themes
    }
}

impl RawTheme {
    /// Load a theme from a JSON file using a ThemeLoader.
    pub fn load(loader: &dyn ThemeLoader, path: &Path) -> Result<Self, BridgeError> {
        let content = loader
            .read_theme(path)
            .map_err(|e| BridgeError::InvalidTheme {
                theme: path.display().to_string(),
                message: format!("Failed to read theme file: {e}"),
            })?;
        serde_json::from_str(&content).map_err(|e| BridgeError::InvalidTheme {
            theme: path.display().to_string(),
            message: format!("Failed to parse theme file: {e}"),
        })
    }
}
