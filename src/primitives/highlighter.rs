//! Highlighters: a theme (or none) plus the tokenizer factory that bakes it
//! into editor modes.
//!
//! # Design
//! - **Themes are named**: every highlighter is registered under its theme
//!   name; `"default"` is the unthemed highlighter and is always present.
//! - **Grammars are shared**: highlighters never own grammars, they ask the
//!   [`GrammarRegistry`] for the compiled grammar of a language each time a
//!   tokenizer is built.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use super::grammar::GrammarRegistry;
use super::scope_style::scopes_to_class;
use super::tokenizer::{LineTokenizer, ModeDefinition, StyleFn};
use crate::error::BridgeError;
use crate::view::theme::{CompiledTheme, RawTheme};

/// Theme name meaning "no theme, use the editor's own token classes"
pub const DEFAULT_THEME: &str = "default";

/// Produces editor modes styled by one theme
#[derive(Debug, Default)]
pub struct Highlighter {
    theme: Option<Arc<CompiledTheme>>,
    css_text: OnceCell<String>,
}

impl Highlighter {
    pub fn unthemed() -> Self {
        Self::default()
    }

    pub fn themed(theme: CompiledTheme) -> Self {
        Self {
            theme: Some(Arc::new(theme)),
            css_text: OnceCell::new(),
        }
    }

    /// Name the highlighter is registered under
    pub fn name(&self) -> &str {
        self.theme.as_ref().map_or(DEFAULT_THEME, |t| t.name())
    }

    pub fn theme(&self) -> Option<&CompiledTheme> {
        self.theme.as_deref()
    }

    /// Stylesheet for the theme, generated once
    pub fn css_text(&self) -> Option<&str> {
        let theme = self.theme.as_ref()?;
        Some(self.css_text.get_or_init(|| theme.css_text()).as_str())
    }

    /// Style for a scope stack (innermost last)
    pub fn style_for<S: AsRef<str>>(&self, scopes: &[S]) -> Option<String> {
        match &self.theme {
            Some(theme) => theme.style_for(scopes),
            None => scopes_to_class(scopes).map(str::to_owned),
        }
    }

    /// Build a mode for `language_id`, loading its grammar if needed.
    ///
    /// Returns `Ok(None)` when the language has no grammar.
    pub async fn get_tokenizer(
        &self,
        registry: &GrammarRegistry,
        language_id: &str,
    ) -> Result<Option<ModeDefinition>, BridgeError> {
        let Some(grammar) = registry.load_grammar(language_id).await? else {
            return Ok(None);
        };

        let style: StyleFn = match &self.theme {
            Some(theme) => {
                let theme = Arc::clone(theme);
                Arc::new(move |scopes: &[String]| theme.style_for(scopes))
            }
            None => Arc::new(|scopes: &[String]| scopes_to_class(scopes).map(str::to_owned)),
        };

        Ok(Some(ModeDefinition::new(LineTokenizer::new(grammar), style)))
    }
}

/// Highlighters by theme name
#[derive(Debug)]
pub struct HighlighterSet {
    by_name: HashMap<String, Arc<Highlighter>>,
    unthemed: Arc<Highlighter>,
}

impl Default for HighlighterSet {
    fn default() -> Self {
        Self::new()
    }
}

impl HighlighterSet {
    /// A set holding only the unthemed `"default"` highlighter
    pub fn new() -> Self {
        let unthemed = Arc::new(Highlighter::unthemed());
        let mut by_name = HashMap::new();
        by_name.insert(DEFAULT_THEME.to_string(), Arc::clone(&unthemed));
        Self { by_name, unthemed }
    }

    /// Compile and register a theme.
    ///
    /// Fails when the theme is invalid or its name is taken; `"default"` is
    /// always taken.
    pub fn add_theme(&mut self, raw: &RawTheme) -> Result<Arc<Highlighter>, BridgeError> {
        let theme = CompiledTheme::compile(raw)?;
        if self.by_name.contains_key(theme.name()) {
            return Err(BridgeError::ThemeAlreadyRegistered(theme.name().to_string()));
        }
        let highlighter = Arc::new(Highlighter::themed(theme));
        self.by_name
            .insert(highlighter.name().to_string(), Arc::clone(&highlighter));
        tracing::info!("Registered theme '{}'", highlighter.name());
        Ok(highlighter)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Highlighter>> {
        self.by_name.get(name).cloned()
    }

    /// The highlighter for `name`, or the unthemed one if no such theme exists
    pub fn resolve(&self, name: &str) -> Arc<Highlighter> {
        self.get(name).unwrap_or_else(|| Arc::clone(&self.unthemed))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.by_name.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::grammar::{GrammarSource, LoadPolicy};

    fn raw_theme(name: &str) -> RawTheme {
        RawTheme::from_json(&format!(
            r##"{{ "name": "{name}", "settings": [ {{ "scope": "keyword", "settings": {{ "foreground": "#ff0000", "fontStyle": "bold" }} }} ] }}"##
        ))
        .unwrap()
    }

    #[test]
    fn test_set_rejects_default_and_duplicates() {
        let mut set = HighlighterSet::new();
        assert!(set.contains(DEFAULT_THEME));

        assert_eq!(
            set.add_theme(&raw_theme("default")).unwrap_err(),
            BridgeError::ThemeAlreadyRegistered("default".to_string())
        );
        set.add_theme(&raw_theme("red")).unwrap();
        assert!(matches!(
            set.add_theme(&raw_theme("red")),
            Err(BridgeError::ThemeAlreadyRegistered(_))
        ));
        assert_eq!(set.names(), vec!["default".to_string(), "red".to_string()]);
    }

    #[test]
    fn test_css_text_only_for_themes() {
        let mut set = HighlighterSet::new();
        let red = set.add_theme(&raw_theme("red")).unwrap();
        assert!(red.css_text().unwrap().contains(".cm-s-red .cm-tm-1"));
        assert!(set.get(DEFAULT_THEME).unwrap().css_text().is_none());
        assert_eq!(set.resolve("missing").name(), DEFAULT_THEME);
    }

    #[tokio::test]
    async fn test_get_tokenizer_uses_theme_classes() {
        let registry = GrammarRegistry::new();
        registry.add_grammar(
            "source.x",
            GrammarSource::from_yaml(
                "source.x",
                "name: X\nscope: source.x\ncontexts:\n  main:\n    - match: '\\bfn\\b'\n      scope: keyword.other.x\n",
            )
            .unwrap(),
        );
        registry
            .activate_language("source.x", "x", LoadPolicy::Defer)
            .await
            .unwrap();

        let mut set = HighlighterSet::new();
        let red = set.add_theme(&raw_theme("red")).unwrap();

        let themed = red.get_tokenizer(&registry, "x").await.unwrap().unwrap();
        let lines = themed.highlight_text("fn");
        assert_eq!(lines[0].spans[0].style.as_deref(), Some("tm-1 strong"));

        let plain = set
            .get(DEFAULT_THEME)
            .unwrap()
            .get_tokenizer(&registry, "x")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            plain.highlight_text("fn")[0].spans[0].style.as_deref(),
            Some("keyword")
        );

        assert!(red.get_tokenizer(&registry, "unknown").await.unwrap().is_none());
    }
}
