//! The composite grammar set: every resolved grammar compiled into one
//! syntect `SyntaxSet`, with injections spliced into their host grammars.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use syntect::parsing::syntax_definition::{ContextReference, MatchOperation, Pattern};
use syntect::parsing::{Scope, SyntaxDefinition, SyntaxSet, SyntaxSetBuilder};

use super::types::LoadedGrammar;
use crate::error::BridgeError;

/// Compiled grammars plus the registered scope names they were built from
pub struct GrammarSet {
    syntax_set: Arc<SyntaxSet>,
    scopes: HashSet<String>,
}

impl GrammarSet {
    /// Compile `definitions`, injecting each host's injected scopes (when
    /// resolved) ahead of the host's own `main` patterns.
    pub fn build(
        definitions: &[(String, Arc<SyntaxDefinition>)],
        injections: &HashMap<String, BTreeSet<String>>,
    ) -> Result<Self, BridgeError> {
        let available: HashSet<&str> = definitions.iter().map(|(s, _)| s.as_str()).collect();

        let mut builder = SyntaxSetBuilder::new();
        builder.add_plain_text_syntax();

        let mut scopes = HashSet::new();
        for (scope_name, def) in definitions {
            let declared = def.scope.build_string();
            if &declared != scope_name {
                return Err(BridgeError::ScopeMismatch {
                    registered: scope_name.clone(),
                    declared,
                });
            }

            let mut def = SyntaxDefinition::clone(def);
            if let Some(injected) = injections.get(scope_name) {
                for injected_scope in injected.iter().rev() {
                    if available.contains(injected_scope.as_str()) && injected_scope != scope_name {
                        inject_into(&mut def, injected_scope)?;
                    }
                }
            }
            builder.add(def);
            scopes.insert(scope_name.clone());
        }

        Ok(Self {
            syntax_set: Arc::new(builder.build()),
            scopes,
        })
    }

    pub fn contains(&self, scope_name: &str) -> bool {
        self.scopes.contains(scope_name)
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Look up a compiled grammar by its registered scope name
    pub fn grammar(&self, scope_name: &str) -> Result<LoadedGrammar, BridgeError> {
        let target =
            Scope::new(scope_name).map_err(|_| BridgeError::InvalidScope(scope_name.to_string()))?;
        let index = self
            .syntax_set
            .syntaxes()
            .iter()
            .position(|syntax| syntax.scope == target)
            .ok_or_else(|| BridgeError::GrammarNotRegistered {
                scope_name: scope_name.to_string(),
                dependent: None,
            })?;
        Ok(LoadedGrammar::new(
            Arc::clone(&self.syntax_set),
            index,
            scope_name.to_string(),
        ))
    }
}

impl std::fmt::Debug for GrammarSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut scopes: Vec<&String> = self.scopes.iter().collect();
        scopes.sort();
        f.debug_struct("GrammarSet").field("scopes", &scopes).finish()
    }
}

/// Scopes of other grammars a definition refers to through `scope:` includes,
/// pushes, sets and embeds.
pub fn referenced_scopes(def: &SyntaxDefinition) -> Vec<String> {
    let own = def.scope.build_string();
    let mut found = BTreeSet::new();

    for context in def.contexts.values() {
        for pattern in &context.patterns {
            if let Pattern::Include(reference) = pattern {
                collect_reference(reference, &mut found);
            } else if let Pattern::Match(match_pattern) = pattern {
                if let MatchOperation::Push(references) | MatchOperation::Set(references) =
                    &match_pattern.operation
                {
                    for reference in references {
                        collect_reference(reference, &mut found);
                    }
                }
                if let Some(reference) = &match_pattern.with_prototype {
                    collect_reference(reference, &mut found);
                }
            }
        }
    }

    found.remove(&own);
    found.into_iter().collect()
}

fn collect_reference(reference: &ContextReference, found: &mut BTreeSet<String>) {
    if let ContextReference::ByScope { scope, .. } = reference {
        found.insert(scope.build_string());
    }
}

/// Prepend `include: scope:<injected>` to the host's `main` context
fn inject_into(host: &mut SyntaxDefinition, injected_scope: &str) -> Result<(), BridgeError> {
    let include = include_pattern(injected_scope)?;
    match host.contexts.get_mut("main") {
        Some(main) => {
            main.patterns.insert(0, include);
            Ok(())
        }
        None => {
            tracing::warn!(
                "Grammar '{}' has no main context, skipping injection of '{}'",
                host.scope.build_string(),
                injected_scope
            );
            Ok(())
        }
    }
}

/// Build an include pattern by letting syntect parse a one-rule grammar
fn include_pattern(injected_scope: &str) -> Result<Pattern, BridgeError> {
    let yaml = format!(
        "name: injection\nscope: source.injection\ncontexts:\n  main:\n    - include: scope:{injected_scope}\n"
    );
    let def = SyntaxDefinition::load_from_str(&yaml, true, None).map_err(|e| {
        BridgeError::InvalidInjectionTarget(format!("'{injected_scope}': {e}"))
    })?;
    def.contexts
        .get("main")
        .and_then(|main| main.patterns.first().cloned())
        .ok_or_else(|| {
            BridgeError::InvalidInjectionTarget(format!(
                "could not build an include for '{injected_scope}'"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::grammar::source::parse_definition;

    const HOST: &str = r#"
name: Host
scope: text.host
contexts:
  main:
    - match: '<style>'
      push: scope:source.css
    - include: scope:source.embedded
"#;

    const PLAIN: &str = r#"
name: Plain
scope: source.plain
contexts:
  main:
    - match: '\w+'
      scope: variable.other.plain
"#;

    #[test]
    fn test_referenced_scopes_lists_foreign_grammars() {
        let def = parse_definition("text.host", HOST).unwrap();
        assert_eq!(
            referenced_scopes(&def),
            vec!["source.css".to_string(), "source.embedded".to_string()]
        );
    }

    #[test]
    fn test_build_and_lookup() {
        let def = Arc::new(parse_definition("source.plain", PLAIN).unwrap());
        let set = GrammarSet::build(&[("source.plain".to_string(), def)], &HashMap::new()).unwrap();
        assert!(set.contains("source.plain"));
        assert_eq!(set.len(), 1);

        let grammar = set.grammar("source.plain").unwrap();
        assert_eq!(grammar.syntax().name, "Plain");
        assert!(set.grammar("source.missing").is_err());
    }

    #[test]
    fn test_scope_mismatch_rejected() {
        let def = Arc::new(parse_definition("source.other", PLAIN).unwrap());
        let result = GrammarSet::build(&[("source.other".to_string(), def)], &HashMap::new());
        assert!(matches!(result, Err(BridgeError::ScopeMismatch { .. })));
    }

    #[test]
    fn test_injection_prepends_include() {
        let mut host = parse_definition("source.plain", PLAIN).unwrap();
        let before = host.contexts["main"].patterns.len();
        inject_into(&mut host, "source.plain").unwrap();
        assert_eq!(host.contexts["main"].patterns.len(), before + 1);
    }
}
