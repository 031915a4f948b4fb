//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::{Arc, Once};

use textmate_bind::primitives::grammar::GrammarRegistry;
use textmate_bind::services::editor::{HeadlessEditor, MemoryStyleRoot, ModeRegistry};
use textmate_bind::view::theme::RawTheme;
use textmate_bind::{BindingCoordinator, EditorEvent, GrammarSource, InstanceId, UpdateOutcome};

pub const X_GRAMMAR: &str = r#"
name: X
scope: source.x
file_extensions: [x]
contexts:
  main:
    - match: '\b(let|fn)\b'
      scope: keyword.control.x
    - match: '#.*$'
      scope: comment.line.x
    - match: '"'
      push: string
  string:
    - meta_scope: string.quoted.double.x
    - match: '"'
      pop: true
"#;

pub const Y_INJECTION: &str = r#"
name: Y
scope: inj.y
contexts:
  main:
    - match: '\bTODO\b'
      scope: comment.todo.y
"#;

pub const SOLAR_THEME: &str = r##"{
    "name": "solar",
    "settings": [
        { "settings": { "foreground": "#839496", "background": "#002b36", "caret": "#ffffff" } },
        { "scope": "keyword", "settings": { "foreground": "#859900", "fontStyle": "bold" } },
        { "scope": ["comment", "string"], "settings": { "foreground": "#586e75", "fontStyle": "italic" } }
    ]
}"##;

pub const NIGHT_THEME: &str = r##"{
    "name": "night",
    "tokenColors": [
        { "scope": "keyword.control", "settings": { "foreground": "#c678dd" } }
    ]
}"##;

/// Initialize tracing once for tests run with `RUST_LOG`
pub fn init_tracing_from_env() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn theme(json: &str) -> RawTheme {
    RawTheme::from_json(json).unwrap()
}

/// A coordinator wired to in-memory editor collaborators
pub struct Harness {
    pub coordinator: BindingCoordinator,
    pub registry: Arc<GrammarRegistry>,
    pub modes: Arc<ModeRegistry>,
    pub root: Arc<MemoryStyleRoot>,
}

impl Harness {
    pub fn new() -> Self {
        init_tracing_from_env();
        let registry = Arc::new(GrammarRegistry::new());
        let modes = Arc::new(ModeRegistry::new());
        let root = Arc::new(MemoryStyleRoot::new());
        let coordinator = BindingCoordinator::new(registry.clone(), modes.clone(), root.clone());
        Self {
            coordinator,
            registry,
            modes,
            root,
        }
    }

    /// A harness with `source.x` registered and bound to language `x`, and
    /// the `solar` and `night` themes
    pub fn with_x() -> Self {
        let harness = Self::new();
        harness.coordinator.add_grammar(
            "source.x",
            GrammarSource::from_yaml("source.x", X_GRAMMAR).unwrap(),
        );
        harness.registry.bind_language("source.x", "x").unwrap();
        harness.coordinator.add_theme(&theme(SOLAR_THEME)).unwrap();
        harness.coordinator.add_theme(&theme(NIGHT_THEME)).unwrap();
        harness
    }

    /// Attach a new editor and wait for its initial update
    pub async fn open(
        &self,
        mode: Option<&str>,
        theme: Option<&str>,
    ) -> (Arc<HeadlessEditor>, InstanceId, UpdateOutcome) {
        let editor = Arc::new(HeadlessEditor::new(mode, theme));
        let id = self.coordinator.attach(editor.clone());
        let outcome = self
            .coordinator
            .notify(id, EditorEvent::Attached)
            .unwrap()
            .outcome()
            .await
            .unwrap();
        (editor, id, outcome)
    }
}
