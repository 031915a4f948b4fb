//! Error type shared by the grammar registry, the tokenizer factory and the
//! binding coordinator.
//!
//! Only configuration mistakes and genuine load failures are errors. A
//! superseded update or a language without a grammar is reported through
//! [`crate::services::coordinator::UpdateOutcome`] instead.

/// Errors surfaced to callers registering grammars, languages and themes,
/// or awaiting an update that needed to load a grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// A language id is already bound to a different scope name
    LanguageAlreadyBound {
        language_id: String,
        scope_name: String,
    },
    /// No grammar source is registered for a scope name
    GrammarNotRegistered {
        scope_name: String,
        dependent: Option<String>,
    },
    /// A grammar registered under one scope declares another
    ScopeMismatch { registered: String, declared: String },
    /// A string could not be parsed as a TextMate scope
    InvalidScope(String),
    /// An injection target list was empty or contained an invalid scope
    InvalidInjectionTarget(String),
    /// A pending grammar load failed
    GrammarLoad { scope_name: String, message: String },
    /// Grammar source text could not be parsed
    GrammarParse { scope_name: String, message: String },
    /// The grammar engine failed to tokenize a line
    Tokenize(String),
    /// An update was requested with no Tokio runtime to run it on
    NoRuntime,
    /// A theme object had no `name`
    ThemeMissingName,
    /// A theme name is not usable as a CSS class
    InvalidThemeName(String),
    /// A theme with the same name is already registered
    ThemeAlreadyRegistered(String),
    /// A theme rule could not be compiled
    InvalidTheme { theme: String, message: String },
}

impl std::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeError::LanguageAlreadyBound {
                language_id,
                scope_name,
            } => write!(
                f,
                "Language with ID '{language_id}' is already bound to '{scope_name}'. Overwrite not allowed"
            ),
            BridgeError::GrammarNotRegistered {
                scope_name,
                dependent: Some(dependent),
            } => write!(
                f,
                "Grammar for scope '{scope_name}' not found. It is a dependency of '{dependent}'. Use add_grammar to register one"
            ),
            BridgeError::GrammarNotRegistered {
                scope_name,
                dependent: None,
            } => write!(
                f,
                "'{scope_name}' doesn't have a grammar registered. Use add_grammar to register a grammar for it and its dependencies"
            ),
            BridgeError::ScopeMismatch {
                registered,
                declared,
            } => write!(
                f,
                "Grammar registered as '{registered}' declares scope '{declared}'"
            ),
            BridgeError::InvalidScope(scope) => write!(f, "Invalid scope name: '{scope}'"),
            BridgeError::InvalidInjectionTarget(msg) => {
                write!(f, "Invalid injection target list: {msg}")
            }
            BridgeError::GrammarLoad {
                scope_name,
                message,
            } => write!(f, "Failed to load grammar '{scope_name}': {message}"),
            BridgeError::GrammarParse {
                scope_name,
                message,
            } => write!(f, "Failed to parse grammar '{scope_name}': {message}"),
            BridgeError::Tokenize(msg) => write!(f, "Tokenize error: {msg}"),
            BridgeError::NoRuntime => {
                write!(f, "Editor updates must be requested from within a Tokio runtime")
            }
            BridgeError::ThemeMissingName => {
                write!(f, "Theme must have a 'name' property for referencing purposes")
            }
            BridgeError::InvalidThemeName(name) => {
                write!(f, "Theme name '{name}' is not a valid CSS class name")
            }
            BridgeError::ThemeAlreadyRegistered(name) => {
                write!(f, "Theme '{name}' is already registered")
            }
            BridgeError::InvalidTheme { theme, message } => {
                write!(f, "Invalid theme '{theme}': {message}")
            }
        }
    }
}

impl std::error::Error for BridgeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_message_names_dependent() {
        let err = BridgeError::GrammarNotRegistered {
            scope_name: "source.css".to_string(),
            dependent: Some("text.html".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("source.css"));
        assert!(msg.contains("dependency of 'text.html'"));
    }
}
