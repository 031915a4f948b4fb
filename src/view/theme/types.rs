//! TextMate theme data and its compiled, matchable form.
//!
//! Themes are plain JSON in the VS Code / TextMate layout:
//!
//! ```json
//! {
//!   "name": "solar",
//!   "tokenColors": [
//!     { "settings": { "foreground": "#839496", "background": "#002b36" } },
//!     { "scope": ["comment", "string.quoted"], "settings": { "foreground": "#586e75", "fontStyle": "italic" } }
//!   ]
//! }
//! ```

use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use syntect::highlighting::{FontStyle, ScopeSelectors};
use syntect::parsing::{MatchPower, Scope};

use crate::error::BridgeError;

static CSS_IDENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?[_a-zA-Z][_a-zA-Z0-9-]*$").unwrap());

static HEX_COLOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#([0-9a-fA-F]{3,4}|[0-9a-fA-F]{6}|[0-9a-fA-F]{8})$").unwrap());

/// Serializable TextMate theme
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTheme {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default, alias = "tokenColors")]
    pub settings: Vec<RawThemeRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawThemeRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Scope selectors; a rule without one sets the editor defaults
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<ScopeSpec>,

    #[serde(default)]
    pub settings: RawThemeSettings,
}

/// A single selector string (possibly comma separated) or a list of them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScopeSpec {
    One(String),
    Many(Vec<String>),
}

impl ScopeSpec {
    fn joined(&self) -> String {
        match self {
            ScopeSpec::One(s) => s.clone(),
            ScopeSpec::Many(list) => list.join(", "),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawThemeSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreground: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_highlight: Option<String>,
}

impl RawTheme {
    /// Parse theme JSON
    pub fn from_json(json: &str) -> Result<Self, BridgeError> {
        serde_json::from_str(json).map_err(|e| BridgeError::InvalidTheme {
            theme: "<unnamed>".to_string(),
            message: e.to_string(),
        })
    }
}

/// Editor-wide colors from the scopeless rule
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThemeDefaults {
    pub foreground: Option<String>,
    pub background: Option<String>,
    pub caret: Option<String>,
    pub selection: Option<String>,
    pub line_highlight: Option<String>,
}

#[derive(Debug, Clone)]
struct CompiledRule {
    selectors: ScopeSelectors,
    /// Palette id
    foreground: Option<usize>,
    font_style: Option<FontStyle>,
}

/// Resolved style of a scope stack
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThemeMatch {
    pub foreground: usize,
    pub font_style: FontStyle,
}

/// A validated theme ready for scope matching and CSS generation
#[derive(Debug, Clone)]
pub struct CompiledTheme {
    name: String,
    defaults: ThemeDefaults,
    /// Palette id `n` is stored at index `n - 1`
    palette: Vec<String>,
    rules: Vec<CompiledRule>,
}

impl CompiledTheme {
    /// Validate and compile a raw theme.
    ///
    /// The name must be present and usable as a CSS class. Colors that are not
    /// hex colors are ignored with a warning.
    pub fn compile(raw: &RawTheme) -> Result<Self, BridgeError> {
        let name = raw.name.clone().ok_or(BridgeError::ThemeMissingName)?;
        if !CSS_IDENT.is_match(&name) {
            return Err(BridgeError::InvalidThemeName(name));
        }

        let mut theme = CompiledTheme {
            name,
            defaults: ThemeDefaults::default(),
            palette: Vec::new(),
            rules: Vec::new(),
        };

        // Defaults claim the first palette ids
        for rule in raw.settings.iter().filter(|r| r.scope.is_none()) {
            let s = &rule.settings;
            let defaults = ThemeDefaults {
                foreground: theme.checked_color(s.foreground.as_deref()),
                background: theme.checked_color(s.background.as_deref()),
                caret: theme.checked_color(s.caret.as_deref()),
                selection: theme.checked_color(s.selection.as_deref()),
                line_highlight: theme.checked_color(s.line_highlight.as_deref()),
            };
            if let Some(fg) = &defaults.foreground {
                theme.intern_color(fg);
            }
            if let Some(bg) = &defaults.background {
                theme.intern_color(bg);
            }
            theme.defaults = ThemeDefaults {
                foreground: defaults.foreground.or(theme.defaults.foreground.take()),
                background: defaults.background.or(theme.defaults.background.take()),
                caret: defaults.caret.or(theme.defaults.caret.take()),
                selection: defaults.selection.or(theme.defaults.selection.take()),
                line_highlight: defaults
                    .line_highlight
                    .or(theme.defaults.line_highlight.take()),
            };
        }

        for rule in &raw.settings {
            let Some(scope) = &rule.scope else {
                continue;
            };
            let selectors =
                ScopeSelectors::from_str(&scope.joined()).map_err(|e| BridgeError::InvalidTheme {
                    theme: theme.name.clone(),
                    message: format!("bad scope selector '{}': {:?}", scope.joined(), e),
                })?;
            let foreground = theme
                .checked_color(rule.settings.foreground.as_deref())
                .map(|color| theme.intern_color(&color));
            let font_style = rule.settings.font_style.as_deref().map(parse_font_style);
            theme.rules.push(CompiledRule {
                selectors,
                foreground,
                font_style,
            });
        }

        tracing::debug!(
            "Compiled theme '{}': {} rules, {} colors",
            theme.name,
            theme.rules.len(),
            theme.palette.len()
        );
        Ok(theme)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn defaults(&self) -> &ThemeDefaults {
        &self.defaults
    }

    pub fn palette(&self) -> &[String] {
        &self.palette
    }

    /// Palette id of a color, ids starting at 1
    pub fn color_id(&self, color: &str) -> Option<usize> {
        let color = color.to_lowercase();
        self.palette.iter().position(|c| *c == color).map(|i| i + 1)
    }

    /// Match a scope stack (innermost last) against the rules.
    ///
    /// Only rules with a foreground are considered for the color; among
    /// matches the highest power wins and a later rule wins ties. The font
    /// style is resolved the same way among rules that set one.
    pub fn match_scopes(&self, scopes: &[Scope]) -> Option<ThemeMatch> {
        let mut best_fg: Option<(MatchPower, usize)> = None;
        let mut best_style: Option<(MatchPower, FontStyle)> = None;

        for rule in &self.rules {
            let Some(power) = rule.selectors.does_match(scopes) else {
                continue;
            };
            if let Some(fg) = rule.foreground {
                if best_fg.map_or(true, |(p, _)| power >= p) {
                    best_fg = Some((power, fg));
                }
            }
            if let Some(style) = rule.font_style {
                if best_style.map_or(true, |(p, _)| power >= p) {
                    best_style = Some((power, style));
                }
            }
        }

        best_fg.map(|(_, foreground)| ThemeMatch {
            foreground,
            font_style: best_style.map(|(_, s)| s).unwrap_or_else(FontStyle::empty),
        })
    }

    /// Token style for a scope stack (innermost last).
    ///
    /// Walks outwards from the innermost scope until some prefix of the stack
    /// resolves to a foreground color.
    pub fn style_for<S: AsRef<str>>(&self, scopes: &[S]) -> Option<String> {
        let parsed: Vec<Scope> = scopes
            .iter()
            .filter_map(|s| Scope::new(s.as_ref()).ok())
            .collect();

        (1..=parsed.len())
            .rev()
            .find_map(|end| self.match_scopes(&parsed[..end]))
            .map(token_class)
    }

    /// Stylesheet scoping this theme's token classes under `.cm-s-<name>`
    pub fn css_text(&self) -> String {
        let prefix = format!(".cm-s-{}", self.name);
        let mut css = String::new();

        let mut editor = Vec::new();
        if let Some(fg) = &self.defaults.foreground {
            editor.push(format!("color: {fg};"));
        }
        if let Some(bg) = &self.defaults.background {
            editor.push(format!("background-color: {bg};"));
        }
        if !editor.is_empty() {
            css.push_str(&format!("{prefix}.CodeMirror {{ {} }}\n", editor.join(" ")));
        }
        if let Some(caret) = &self.defaults.caret {
            css.push_str(&format!(
                "{prefix} .CodeMirror-cursor {{ border-left-color: {caret}; }}\n"
            ));
        }
        if let Some(selection) = &self.defaults.selection {
            css.push_str(&format!(
                "{prefix} .CodeMirror-selected {{ background: {selection}; }}\n"
            ));
        }
        if let Some(line) = &self.defaults.line_highlight {
            css.push_str(&format!(
                "{prefix} .CodeMirror-activeline-background {{ background: {line}; }}\n"
            ));
        }

        for (i, color) in self.palette.iter().enumerate() {
            css.push_str(&format!("{prefix} .cm-tm-{} {{ color: {color}; }}\n", i + 1));
        }

        css.push_str(&format!("{prefix} .cm-em {{ font-style: italic; }}\n"));
        css.push_str(&format!("{prefix} .cm-strong {{ font-weight: bold; }}\n"));
        css.push_str(&format!(
            "{prefix} .cm-underline {{ text-decoration: underline; }}\n"
        ));
        css
    }

    fn checked_color(&self, color: Option<&str>) -> Option<String> {
        let color = color?.trim();
        if HEX_COLOR.is_match(color) {
            Some(color.to_lowercase())
        } else {
            tracing::warn!("Theme '{}': ignoring invalid color '{}'", self.name, color);
            None
        }
    }

    fn intern_color(&mut self, color: &str) -> usize {
        match self.color_id(color) {
            Some(id) => id,
            None => {
                self.palette.push(color.to_lowercase());
                self.palette.len()
            }
        }
    }
}

/// `fontStyle` is a space separated list; unknown words are ignored
fn parse_font_style(value: &str) -> FontStyle {
    let mut style = FontStyle::empty();
    for word in value.split_whitespace() {
        match word {
            "italic" => style |= FontStyle::ITALIC,
            "bold" => style |= FontStyle::BOLD,
            "underline" => style |= FontStyle::UNDERLINE,
            _ => {}
        }
    }
    style
}

fn token_class(m: ThemeMatch) -> String {
    let mut class = format!("tm-{}", m.foreground);
    if m.font_style.contains(FontStyle::ITALIC) {
        class.push_str(" em");
    }
    if m.font_style.contains(FontStyle::BOLD) {
        class.push_str(" strong");
    }
    if m.font_style.contains(FontStyle::UNDERLINE) {
        class.push_str(" underline");
    }
    class
}
