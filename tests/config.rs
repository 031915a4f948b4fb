// Configuration-driven setup: grammar and theme files on disk

mod common;

use std::sync::Arc;

use common::{Harness, SOLAR_THEME, X_GRAMMAR, Y_INJECTION};
use textmate_bind::config::BridgeConfig;
use textmate_bind::services::editor::HeadlessEditor;
use textmate_bind::primitives::grammar::{load_grammar_dir, LocalGrammarLoader};
use textmate_bind::services::styled_html::{render_document, render_lines_html};
use textmate_bind::view::theme::LocalThemeLoader;
use textmate_bind::{BridgeError, UpdateOutcome};

fn write_config(dir: &std::path::Path, body: &str) -> BridgeConfig {
    let path = dir.join("config.json");
    std::fs::write(&path, body).unwrap();
    BridgeConfig::load_from_file(&path).unwrap()
}

#[tokio::test]
async fn test_apply_config_registers_everything() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("x.sublime-syntax"), X_GRAMMAR).unwrap();
    std::fs::write(dir.path().join("y.sublime-syntax"), Y_INJECTION).unwrap();
    std::fs::write(dir.path().join("solar.json"), SOLAR_THEME).unwrap();

    let config = write_config(
        dir.path(),
        &format!(
            r#"{{
                "grammars": [
                    {{ "scope_name": "source.x", "path": "{0}/x.sublime-syntax", "language_id": "x", "load": "now" }},
                    {{ "scope_name": "inj.y", "path": "{0}/y.sublime-syntax" }}
                ],
                "injections": [ {{ "scope_name": "inj.y", "into": ["source.x"] }} ],
                "themes": ["{0}/solar.json"]
            }}"#,
            dir.path().display()
        ),
    );

    let h = Harness::new();
    h.coordinator
        .apply_config(&config, Arc::new(LocalGrammarLoader), &LocalThemeLoader)
        .await
        .unwrap();

    assert!(h.registry.has_language_registered("x"));
    assert!(h.coordinator.has_theme("solar"));
    // Loaded eagerly, injection included
    assert_eq!(h.registry.composite_builds(), 1);

    let (editor, _, outcome) = h.open(Some("x"), Some("solar")).await;
    assert_eq!(outcome, UpdateOutcome::Installed);
    assert_eq!(h.registry.composite_builds(), 1);

    editor.swap_doc("fn main\n\"text\"");
    let lines = editor.highlight(&h.modes).unwrap();
    let stylesheets: Vec<String> = h.root.stylesheets().into_iter().map(|(_, css)| css).collect();
    let html = render_document(&stylesheets, &render_lines_html(&lines, "solar"));

    assert!(html.contains(".cm-s-solar.CodeMirror"));
    assert!(html.contains("<pre class=\"CodeMirror cm-s-solar\">"));
    assert!(html.contains(">fn</span>"));
}

#[tokio::test]
async fn test_missing_grammar_file_surfaces_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let grammar_path = dir.path().join("x.sublime-syntax");
    let config = write_config(
        dir.path(),
        &serde_json::json!({
            "grammars": [ { "scope_name": "source.x", "path": grammar_path, "language_id": "x" } ]
        })
        .to_string(),
    );

    let h = Harness::new();
    // Deferred: registration succeeds, the read happens on first use
    h.coordinator
        .apply_config(&config, Arc::new(LocalGrammarLoader), &LocalThemeLoader)
        .await
        .unwrap();

    let editor = Arc::new(HeadlessEditor::new(Some("x"), None));
    let id = h.coordinator.attach(editor);
    let err = h.coordinator.update_instance(id).await.unwrap_err();
    assert!(matches!(err, BridgeError::GrammarLoad { .. }));
    assert!(h.registry.has_language_registered("x"));

    // The file shows up later and the next update reads it
    std::fs::write(&grammar_path, X_GRAMMAR).unwrap();
    let outcome = h.coordinator.update_instance(id).await.unwrap();
    assert_eq!(outcome, UpdateOutcome::Installed);
    assert_eq!(h.modes.definitions("x"), 1);
}

#[tokio::test]
async fn test_grammar_dir_keys_by_declared_scope() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("first.sublime-syntax"), X_GRAMMAR).unwrap();
    std::fs::write(dir.path().join("second.sublime-syntax"), Y_INJECTION).unwrap();
    std::fs::write(dir.path().join("broken.sublime-syntax"), "not: [valid").unwrap();
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let grammars = load_grammar_dir(&LocalGrammarLoader, dir.path());
    let scopes: Vec<&str> = grammars.iter().map(|(scope, _)| scope.as_str()).collect();
    assert_eq!(scopes, vec!["source.x", "inj.y"]);
}
