//! Grammar loading with I/O abstraction.
//!
//! `GrammarLoader` reads grammar files; `LocalGrammarLoader` is the
//! filesystem-backed default. Sources built here defer all I/O until the
//! registry first resolves them.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::source::{parse_definition, GrammarSource};
use crate::error::BridgeError;

/// File extension of grammar files picked up from a directory
pub const GRAMMAR_EXTENSION: &str = "sublime-syntax";

/// Trait for reading grammar files from various sources.
pub trait GrammarLoader: Send + Sync {
    /// Read file contents as string.
    fn read_file(&self, path: &Path) -> io::Result<String>;

    /// List entries in a directory.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;
}

/// Default implementation using local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalGrammarLoader;

impl GrammarLoader for LocalGrammarLoader {
    fn read_file(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(path)? {
            entries.push(entry?.path());
        }
        entries.sort();
        Ok(entries)
    }
}

impl GrammarSource {
    /// A source that reads and parses `path` when it is resolved.
    ///
    /// A failed read or parse is retried the next time the grammar is
    /// needed, so a file that appears later is picked up.
    pub fn from_file(loader: Arc<dyn GrammarLoader>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        GrammarSource::reloadable(move |scope_name| {
            let scope_name = scope_name.to_string();
            let loader = Arc::clone(&loader);
            let path = path.clone();
            GrammarSource::pending(async move {
                tracing::debug!("Loading grammar '{}' from {:?}", scope_name, path);
                let yaml = loader
                    .read_file(&path)
                    .map_err(|e| BridgeError::GrammarLoad {
                        scope_name: scope_name.clone(),
                        message: format!("{}: {}", path.display(), e),
                    })?;
                parse_definition(&scope_name, &yaml)
            })
        })
    }
}

/// Parse every grammar file in `dir`, keyed by the scope each one declares.
///
/// Files that fail to read or parse are logged and skipped.
pub fn load_grammar_dir(loader: &dyn GrammarLoader, dir: &Path) -> Vec<(String, GrammarSource)> {
    let entries = match loader.read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Failed to read grammars directory {:?}: {}", dir, e);
            return Vec::new();
        }
    };

    let mut grammars = Vec::new();
    for path in entries {
        if path.extension().and_then(|e| e.to_str()) != Some(GRAMMAR_EXTENSION) {
            continue;
        }
        let label = path.display().to_string();
        let def = match loader
            .read_file(&path)
            .map_err(|e| e.to_string())
            .and_then(|yaml| parse_definition(&label, &yaml).map_err(|e| e.to_string()))
        {
            Ok(def) => def,
            Err(e) => {
                tracing::warn!("Skipping grammar {:?}: {}", path, e);
                continue;
            }
        };
        let scope_name = def.scope.build_string();
        tracing::debug!("Found grammar '{}' in {:?}", scope_name, path);
        grammars.push((scope_name, GrammarSource::Static(def)));
    }

    tracing::info!("Loaded {} grammars from {:?}", grammars.len(), dir);
    grammars
}
