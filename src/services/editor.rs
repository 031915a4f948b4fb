//! The editor widget as seen by the binding coordinator.
//!
//! The coordinator reads `mode` / `theme` options from editor instances,
//! defines modes in the editor's mode table and attaches stylesheets to a
//! style root. Real widgets implement the traits here; the in-memory
//! implementations back the CLI and the tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::primitives::tokenizer::{ModeDefinition, StyledLine};

/// Handle of an attached editor instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub(crate) u64);

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "editor#{}", self.0)
    }
}

/// Notifications an editor instance forwards to the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorEvent {
    /// The instance was just created
    Attached,
    /// An option changed; only `mode` and `theme` matter
    OptionChanged(String),
    /// The instance now shows a different document
    DocumentSwapped,
}

/// One live editing surface
pub trait EditorInstance: Send + Sync {
    /// Current `mode` option: a language id
    fn mode(&self) -> Option<String>;

    /// Current `theme` option; `None` means `"default"`
    fn theme(&self) -> Option<String>;

    /// Set `mode` to its current value so the editor re-tokenizes with the
    /// freshly defined mode. Editors report this as a `mode` option change.
    fn reapply_mode(&self);
}

/// The editor's global table of named modes
pub trait ModeTable: Send + Sync {
    fn define_mode(&self, language_id: &str, mode: ModeDefinition);
}

/// Identifies a stylesheet attached to a [`StyleRoot`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StyleNodeId(pub u64);

/// Where theme stylesheets are attached
pub trait StyleRoot: Send + Sync {
    fn append_stylesheet(&self, theme_name: &str, css: &str) -> StyleNodeId;
    fn remove_stylesheet(&self, node: StyleNodeId);
}

/// An editor instance without a UI
#[derive(Debug, Default)]
pub struct HeadlessEditor {
    options: Mutex<EditorOptions>,
    events: Mutex<Vec<EditorEvent>>,
}

#[derive(Debug, Default)]
struct EditorOptions {
    mode: Option<String>,
    theme: Option<String>,
    text: String,
}

impl HeadlessEditor {
    pub fn new(mode: Option<&str>, theme: Option<&str>) -> Self {
        Self {
            options: Mutex::new(EditorOptions {
                mode: mode.map(str::to_owned),
                theme: theme.map(str::to_owned),
                text: String::new(),
            }),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn set_mode(&self, mode: Option<&str>) {
        self.options.lock().mode = mode.map(str::to_owned);
        self.emit(EditorEvent::OptionChanged("mode".to_string()));
    }

    pub fn set_theme(&self, theme: Option<&str>) {
        self.options.lock().theme = theme.map(str::to_owned);
        self.emit(EditorEvent::OptionChanged("theme".to_string()));
    }

    /// Replace the document
    pub fn swap_doc(&self, text: impl Into<String>) {
        self.options.lock().text = text.into();
        self.emit(EditorEvent::DocumentSwapped);
    }

    pub fn text(&self) -> String {
        self.options.lock().text.clone()
    }

    /// Events emitted since the last call
    pub fn take_events(&self) -> Vec<EditorEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Highlight the current document with the mode defined for its language
    pub fn highlight(&self, modes: &ModeRegistry) -> Option<Vec<StyledLine>> {
        let (mode, text) = {
            let options = self.options.lock();
            (options.mode.clone()?, options.text.clone())
        };
        modes.get(&mode).map(|m| m.highlight_text(&text))
    }

    fn emit(&self, event: EditorEvent) {
        self.events.lock().push(event);
    }
}

impl EditorInstance for HeadlessEditor {
    fn mode(&self) -> Option<String> {
        self.options.lock().mode.clone()
    }

    fn theme(&self) -> Option<String> {
        self.options.lock().theme.clone()
    }

    fn reapply_mode(&self) {
        self.emit(EditorEvent::OptionChanged("mode".to_string()));
    }
}

/// In-memory mode table
#[derive(Debug, Default)]
pub struct ModeRegistry {
    modes: Mutex<HashMap<String, (ModeDefinition, usize)>>,
}

impl ModeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, language_id: &str) -> Option<ModeDefinition> {
        self.modes.lock().get(language_id).map(|(mode, _)| mode.clone())
    }

    /// How many times a mode has been (re)defined for `language_id`
    pub fn definitions(&self, language_id: &str) -> usize {
        self.modes.lock().get(language_id).map_or(0, |(_, count)| *count)
    }
}

impl ModeTable for ModeRegistry {
    fn define_mode(&self, language_id: &str, mode: ModeDefinition) {
        let mut modes = self.modes.lock();
        let count = modes.get(language_id).map_or(0, |(_, count)| *count);
        modes.insert(language_id.to_string(), (mode, count + 1));
    }
}

/// In-memory style root
#[derive(Debug, Default)]
pub struct MemoryStyleRoot {
    next_id: AtomicU64,
    sheets: Mutex<BTreeMap<StyleNodeId, (String, String)>>,
}

impl MemoryStyleRoot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attached `(theme name, css)` pairs in attachment order
    pub fn stylesheets(&self) -> Vec<(String, String)> {
        self.sheets.lock().values().cloned().collect()
    }

    pub fn contains(&self, theme_name: &str) -> bool {
        self.sheets.lock().values().any(|(name, _)| name == theme_name)
    }

    pub fn len(&self) -> usize {
        self.sheets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.lock().is_empty()
    }
}

impl StyleRoot for MemoryStyleRoot {
    fn append_stylesheet(&self, theme_name: &str, css: &str) -> StyleNodeId {
        let id = StyleNodeId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.sheets
            .lock()
            .insert(id, (theme_name.to_string(), css.to_string()));
        id
    }

    fn remove_stylesheet(&self, node: StyleNodeId) {
        self.sheets.lock().remove(&node);
    }
}
