//! Line tokenizer and the editor-facing mode built on top of it.
//!
//! The editor drives a mode one token at a time: it hands over a
//! [`LineStream`] positioned inside the current line together with the mode's
//! [`TokenizerState`], and expects the stream to be advanced past exactly one
//! token. The whole line is tokenized on the first call for it and the tokens
//! are then served from a cache.

use std::collections::VecDeque;
use std::ops::Range;
use std::sync::Arc;

use syntect::parsing::{ParseState, ScopeStack};

use super::grammar::LoadedGrammar;
use crate::error::BridgeError;

/// Parser state carried from one line to the next
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleStack {
    parse_state: ParseState,
    scopes: ScopeStack,
}

/// A token produced by [`LineTokenizer::tokenize_line`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Byte offset one past the token's last byte
    pub end_index: usize,
    /// Scope names, innermost last
    pub scopes: Vec<String>,
}

/// Tokenizes single lines against one compiled grammar
#[derive(Debug, Clone)]
pub struct LineTokenizer {
    grammar: LoadedGrammar,
}

impl LineTokenizer {
    pub fn new(grammar: LoadedGrammar) -> Self {
        Self { grammar }
    }

    pub fn grammar(&self) -> &LoadedGrammar {
        &self.grammar
    }

    pub fn initial_rule_stack(&self) -> RuleStack {
        RuleStack {
            parse_state: self.grammar.initial_state(),
            scopes: ScopeStack::new(),
        }
    }

    /// Tokenize `line` (without its line terminator) starting from `rule_stack`.
    ///
    /// Returns tokens covering the whole line and the state for the next line.
    pub fn tokenize_line(
        &self,
        line: &str,
        rule_stack: &RuleStack,
    ) -> Result<(Vec<Token>, RuleStack), BridgeError> {
        let mut next = rule_stack.clone();
        let line_with_newline = format!("{line}\n");
        let ops = next
            .parse_state
            .parse_line(&line_with_newline, self.grammar.syntax_set())
            .map_err(|e| BridgeError::Tokenize(e.to_string()))?;

        let line_len = line.len();
        let mut tokens = Vec::new();
        let mut offset = 0;

        for (op_offset, op) in ops {
            let clamped = op_offset.min(line_len);
            if clamped > offset {
                tokens.push(Token {
                    end_index: clamped,
                    scopes: scope_names(&next.scopes),
                });
                offset = clamped;
            }
            next.scopes
                .apply(&op)
                .map_err(|e| BridgeError::Tokenize(format!("{e:?}")))?;
        }

        if offset < line_len {
            tokens.push(Token {
                end_index: line_len,
                scopes: scope_names(&next.scopes),
            });
        }

        Ok((tokens, next))
    }
}

fn scope_names(stack: &ScopeStack) -> Vec<String> {
    stack.as_slice().iter().map(|s| s.build_string()).collect()
}

/// The editor's cursor into the line being highlighted
#[derive(Debug, Clone)]
pub struct LineStream {
    pub string: String,
    pub pos: usize,
}

impl LineStream {
    pub fn new(line: impl Into<String>) -> Self {
        Self {
            string: line.into(),
            pos: 0,
        }
    }

    pub fn eol(&self) -> bool {
        self.pos >= self.string.len()
    }

    pub fn skip_to_end(&mut self) {
        self.pos = self.string.len();
    }

    /// Move forward to `end`, never backwards and never past the line end
    pub fn advance_to(&mut self, end: usize) {
        self.pos = self.pos.max(end.min(self.string.len()));
    }
}

/// Per-editor mode state
#[derive(Debug, Clone)]
pub struct TokenizerState {
    pub rule_stack: RuleStack,
    pub tokens_cache: VecDeque<Token>,
}

/// Maps a token's scope stack to a style string
pub type StyleFn = Arc<dyn Fn(&[String]) -> Option<String> + Send + Sync>;

/// A tokenizer mode as installed into the editor's mode table
#[derive(Clone)]
pub struct ModeDefinition {
    tokenizer: LineTokenizer,
    style: StyleFn,
}

/// A run of a line sharing one style
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyledSpan {
    pub range: Range<usize>,
    pub style: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyledLine {
    pub text: String,
    pub spans: Vec<StyledSpan>,
}

impl ModeDefinition {
    pub fn new(tokenizer: LineTokenizer, style: StyleFn) -> Self {
        Self { tokenizer, style }
    }

    pub fn scope_name(&self) -> &str {
        self.tokenizer.grammar().scope_name()
    }

    pub fn start_state(&self) -> TokenizerState {
        TokenizerState {
            rule_stack: self.tokenizer.initial_rule_stack(),
            tokens_cache: VecDeque::new(),
        }
    }

    /// Copy a state for the editor's snapshotting; the token cache is per-line
    /// and is not carried over.
    pub fn copy_state(&self, state: &TokenizerState) -> TokenizerState {
        TokenizerState {
            rule_stack: state.rule_stack.clone(),
            tokens_cache: VecDeque::new(),
        }
    }

    /// Advance `stream` past one token and return its style.
    ///
    /// When the line has no tokens left the stream is moved to the line end
    /// and `None` is returned.
    pub fn token(&self, stream: &mut LineStream, state: &mut TokenizerState) -> Option<String> {
        if stream.pos == 0 {
            match self.tokenizer.tokenize_line(&stream.string, &state.rule_stack) {
                Ok((tokens, next)) => {
                    state.tokens_cache = tokens.into();
                    state.rule_stack = next;
                }
                Err(e) => {
                    tracing::warn!("Tokenizing line failed in '{}': {}", self.scope_name(), e);
                    state.tokens_cache.clear();
                }
            }
        }

        let Some(token) = state.tokens_cache.pop_front() else {
            stream.skip_to_end();
            return None;
        };
        stream.advance_to(token.end_index);
        (self.style)(&token.scopes)
    }

    /// Carry the state across an empty line
    pub fn blank_line(&self, state: &mut TokenizerState) {
        if let Ok((_, next)) = self.tokenizer.tokenize_line("", &state.rule_stack) {
            state.rule_stack = next;
        }
        state.tokens_cache.clear();
    }

    /// Run the mode over a whole document the way the editor would
    pub fn highlight_text(&self, text: &str) -> Vec<StyledLine> {
        let mut state = self.start_state();
        let mut lines = Vec::new();

        for raw_line in text.split('\n') {
            let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
            let mut spans: Vec<StyledSpan> = Vec::new();

            if line.is_empty() {
                self.blank_line(&mut state);
            } else {
                let mut stream = LineStream::new(line);
                while !stream.eol() {
                    let start = stream.pos;
                    let style = self.token(&mut stream, &mut state);
                    if stream.pos == start {
                        break;
                    }
                    match spans.last_mut() {
                        Some(last) if last.style == style && last.range.end == start => {
                            last.range.end = stream.pos;
                        }
                        _ => spans.push(StyledSpan {
                            range: start..stream.pos,
                            style,
                        }),
                    }
                }
            }

            lines.push(StyledLine {
                text: line.to_string(),
                spans,
            });
        }

        lines
    }
}

impl std::fmt::Debug for ModeDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModeDefinition")
            .field("scope_name", &self.scope_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::grammar::{GrammarRegistry, GrammarSource, LoadPolicy};
    use crate::primitives::scope_style::scopes_to_class;

    const GRAMMAR: &str = r#"
name: X
scope: source.x
contexts:
  main:
    - match: '\b(let|fn)\b'
      scope: keyword.control.x
    - match: '"'
      push: string
    - match: '/\*'
      push: block_comment
  string:
    - meta_scope: string.quoted.double.x
    - match: '"'
      pop: true
  block_comment:
    - meta_scope: comment.block.x
    - match: '\*/'
      pop: true
"#;

    async fn mode() -> ModeDefinition {
        let registry = GrammarRegistry::new();
        registry.add_grammar("source.x", GrammarSource::from_yaml("source.x", GRAMMAR).unwrap());
        registry
            .activate_language("source.x", "x", LoadPolicy::Now)
            .await
            .unwrap();
        let grammar = registry.load_grammar("x").await.unwrap().unwrap();
        let style: StyleFn = Arc::new(|scopes: &[String]| scopes_to_class(scopes).map(str::to_owned));
        ModeDefinition::new(LineTokenizer::new(grammar), style)
    }

    #[tokio::test]
    async fn test_tokens_cover_line() {
        let mode = mode().await;
        let tokenizer = &mode.tokenizer;
        let (tokens, _) = tokenizer
            .tokenize_line("let a", &tokenizer.initial_rule_stack())
            .unwrap();

        assert_eq!(tokens.first().map(|t| t.end_index), Some(3));
        assert_eq!(tokens.last().map(|t| t.end_index), Some(5));
        assert!(tokens[0].scopes.contains(&"keyword.control.x".to_string()));
        assert_eq!(tokens[0].scopes[0], "source.x");
    }

    #[tokio::test]
    async fn test_token_steps_then_skips_to_end() {
        let mode = mode().await;
        let mut state = mode.start_state();
        let mut stream = LineStream::new("fn f");

        assert_eq!(mode.token(&mut stream, &mut state).as_deref(), Some("keyword"));
        assert_eq!(stream.pos, 2);
        assert_eq!(mode.token(&mut stream, &mut state), None);
        assert_eq!(stream.pos, 4);
        assert!(stream.eol());

        // Cache exhausted: no token, stream forced to the end
        let mut stream = LineStream::new("fn f");
        stream.pos = 1;
        assert_eq!(mode.token(&mut stream, &mut state), None);
        assert!(stream.eol());
    }

    #[tokio::test]
    async fn test_state_carries_across_lines() {
        let mode = mode().await;
        let lines = mode.highlight_text("/* open\n\nstill */ let");

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].spans[0].style.as_deref(), Some("comment"));
        assert!(lines[1].spans.is_empty());
        assert_eq!(lines[2].spans[0].style.as_deref(), Some("comment"));
        assert_eq!(
            lines[2].spans.last().and_then(|s| s.style.as_deref()),
            Some("keyword")
        );
    }

    #[tokio::test]
    async fn test_copy_state_drops_token_cache() {
        let mode = mode().await;
        let mut state = mode.start_state();
        let mut stream = LineStream::new("let x");
        mode.token(&mut stream, &mut state);
        assert!(!state.tokens_cache.is_empty());

        let copy = mode.copy_state(&state);
        assert!(copy.tokens_cache.is_empty());
        assert_eq!(copy.rule_stack, state.rule_stack);
    }
}
