//! Pure grammar registry state without I/O or async operations.
//!
//! `RegistryState` holds the language, scope and injection maps. It is owned
//! by a [`super::GrammarRegistry`]; every mutation here is synchronous so
//! configuration mistakes are reported at the call that caused them.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use syntect::parsing::{ParseState, Scope, SyntaxDefinition, SyntaxReference, SyntaxSet};

use super::composite::GrammarSet;
use super::source::{GrammarReloader, GrammarSource};
use crate::error::BridgeError;

/// When a freshly activated language loads its grammar
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadPolicy {
    /// Load before activation returns
    Now,
    /// Load after yielding to the scheduler
    Asap,
    /// Load lazily on first use
    #[default]
    Defer,
}

/// Language, scope and injection bookkeeping
#[derive(Debug, Default)]
pub struct RegistryState {
    sources: HashMap<String, GrammarSource>,
    language_to_scope: HashMap<String, String>,
    scope_to_language: HashMap<String, String>,
    /// Host scope -> scopes injected into it
    injections: HashMap<String, BTreeSet<String>>,
    /// Loads still running after the caller awaiting them went away
    parked: HashMap<String, SpawnedLoad>,
    /// Scope whose source is currently taken out for resolution
    in_flight: Option<String>,
    pub(super) composite: Option<Arc<GrammarSet>>,
    pub(super) composite_builds: usize,
}

impl RegistryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or overwrite the source for a scope.
    ///
    /// Overwriting a grammar that is part of the cached composite set drops the
    /// set so the next load rebuilds it.
    pub fn add_grammar(&mut self, scope_name: &str, source: GrammarSource) {
        if let Some(load) = self.parked.remove(scope_name) {
            tracing::debug!("Grammar '{}' replaced, abandoning its parked load", scope_name);
            load.handle.abort();
        }
        if let Some(previous) = self.sources.insert(scope_name.to_string(), source) {
            if previous.is_resolved()
                && self
                    .composite
                    .as_ref()
                    .is_some_and(|set| set.contains(scope_name))
            {
                tracing::debug!("Grammar '{}' overwritten, dropping grammar set", scope_name);
                self.composite = None;
            }
        }
    }

    /// Whether a source (pending or resolved) exists for a scope
    pub fn has_grammar(&self, scope_name: &str) -> bool {
        self.sources.contains_key(scope_name)
            || self.parked.contains_key(scope_name)
            || self.in_flight.as_deref() == Some(scope_name)
    }

    /// Bind a language id to a scope.
    ///
    /// Returns `false` when the exact binding already exists. Binding a
    /// language that is already bound elsewhere is rejected.
    pub fn bind_language(&mut self, scope_name: &str, language_id: &str) -> Result<bool, BridgeError> {
        if let Some(bound) = self.language_to_scope.get(language_id) {
            if bound == scope_name {
                return Ok(false);
            }
            return Err(BridgeError::LanguageAlreadyBound {
                language_id: language_id.to_string(),
                scope_name: bound.clone(),
            });
        }
        self.language_to_scope
            .insert(language_id.to_string(), scope_name.to_string());
        self.scope_to_language
            .insert(scope_name.to_string(), language_id.to_string());
        Ok(true)
    }

    pub fn scope_for_language(&self, language_id: &str) -> Option<&str> {
        self.language_to_scope.get(language_id).map(String::as_str)
    }

    pub fn has_language(&self, language_id: &str) -> bool {
        self.language_to_scope.contains_key(language_id)
    }

    /// Inject `scope_name` into every scope of `hosts`.
    ///
    /// Returns the language ids bound to any of the hosts.
    pub fn link_injections<S: AsRef<str>>(
        &mut self,
        scope_name: &str,
        hosts: &[S],
    ) -> Result<Vec<String>, BridgeError> {
        validate_scope(scope_name)?;
        if hosts.is_empty() {
            return Err(BridgeError::InvalidInjectionTarget(format!(
                "'{scope_name}' must be injected into at least one host scope"
            )));
        }
        for host in hosts {
            validate_injection_target(host.as_ref())?;
        }

        let mut affected = Vec::new();
        for host in hosts {
            let host = host.as_ref();
            self.injections
                .entry(host.to_string())
                .or_default()
                .insert(scope_name.to_string());
            self.push_affected(host, &mut affected);
        }

        self.composite = None;
        tracing::debug!(
            "Injected '{}' into {} host(s), affected languages: {:?}",
            scope_name,
            hosts.len(),
            affected
        );
        Ok(affected)
    }

    /// Remove `scope_name` from the injections of `hosts`, or from every host
    /// when `hosts` is `None`.
    pub fn unlink_injections<S: AsRef<str>>(
        &mut self,
        scope_name: &str,
        hosts: Option<&[S]>,
    ) -> Result<Vec<String>, BridgeError> {
        if let Some(hosts) = hosts {
            for host in hosts {
                validate_injection_target(host.as_ref())?;
            }
        }

        let mut affected = Vec::new();
        let mut host_scopes: Vec<String> = self.injections.keys().cloned().collect();
        host_scopes.sort();
        for host in host_scopes {
            if let Some(hosts) = hosts {
                if !hosts.iter().any(|h| h.as_ref() == host) {
                    continue;
                }
            }
            let removed = self
                .injections
                .get_mut(&host)
                .is_some_and(|injected| injected.remove(scope_name));
            if removed {
                self.push_affected(&host, &mut affected);
            }
        }
        self.injections.retain(|_, injected| !injected.is_empty());

        self.composite = None;
        Ok(affected)
    }

    /// Scopes injected into a host scope
    pub fn injections_into(&self, host: &str) -> Vec<String> {
        self.injections
            .get(host)
            .map(|injected| injected.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub(super) fn injection_graph(&self) -> &HashMap<String, BTreeSet<String>> {
        &self.injections
    }

    /// Take a scope out for resolution: a parked load if one is still
    /// running, otherwise its source
    pub(super) fn take_source(&mut self, scope_name: &str) -> Option<Resolution> {
        let taken = match self.parked.remove(scope_name) {
            Some(load) => Resolution::Spawned(load),
            None => Resolution::Source(self.sources.remove(scope_name)?),
        };
        self.in_flight = Some(scope_name.to_string());
        Some(taken)
    }

    /// Keep a load whose caller went away so the next resolution awaits it.
    ///
    /// A source registered meanwhile wins and the load is abandoned.
    pub(super) fn park_load(&mut self, scope_name: &str, load: SpawnedLoad) {
        self.clear_in_flight(scope_name);
        if self.sources.contains_key(scope_name) {
            load.handle.abort();
        } else {
            self.parked.insert(scope_name.to_string(), load);
        }
    }

    /// Store the outcome of a resolution started with [`Self::take_source`]:
    /// the resolved definition, or the source to fall back to after a failure.
    ///
    /// A source registered while the resolution was in flight wins.
    pub(super) fn finish_resolution(
        &mut self,
        scope_name: &str,
        outcome: Result<Arc<SyntaxDefinition>, GrammarSource>,
    ) {
        self.clear_in_flight(scope_name);
        let source = match outcome {
            Ok(def) => GrammarSource::Resolved(def),
            Err(fallback) => fallback,
        };
        self.sources.entry(scope_name.to_string()).or_insert(source);
    }

    fn clear_in_flight(&mut self, scope_name: &str) {
        if self.in_flight.as_deref() == Some(scope_name) {
            self.in_flight = None;
        }
    }

    /// Every resolved definition, keyed by registered scope name
    pub(super) fn resolved_definitions(&self) -> Vec<(String, Arc<SyntaxDefinition>)> {
        let mut defs: Vec<_> = self
            .sources
            .iter()
            .filter_map(|(scope, source)| source.resolved().map(|def| (scope.clone(), Arc::clone(def))))
            .collect();
        defs.sort_by(|a, b| a.0.cmp(&b.0));
        defs
    }

    fn push_affected(&self, host: &str, affected: &mut Vec<String>) {
        if let Some(language_id) = self.scope_to_language.get(host) {
            if !affected.contains(language_id) {
                affected.push(language_id.clone());
            }
        }
    }
}

/// What [`RegistryState::take_source`] hands out
pub(super) enum Resolution {
    Source(GrammarSource),
    Spawned(SpawnedLoad),
}

/// A grammar load running on its own task
pub(super) struct SpawnedLoad {
    pub(super) handle: tokio::task::JoinHandle<Result<SyntaxDefinition, BridgeError>>,
    /// Source to reinstate if the load fails
    pub(super) reload: Option<GrammarReloader>,
}

impl std::fmt::Debug for SpawnedLoad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnedLoad")
            .field("finished", &self.handle.is_finished())
            .field("reloadable", &self.reload.is_some())
            .finish()
    }
}

fn validate_scope(scope_name: &str) -> Result<(), BridgeError> {
    if scope_name.trim().is_empty() || Scope::new(scope_name).is_err() {
        return Err(BridgeError::InvalidScope(scope_name.to_string()));
    }
    Ok(())
}

fn validate_injection_target(host: &str) -> Result<(), BridgeError> {
    validate_scope(host).map_err(|_| {
        BridgeError::InvalidInjectionTarget(format!("'{host}' is not a valid host scope name"))
    })
}

/// A grammar resolved into the current grammar set
#[derive(Clone)]
pub struct LoadedGrammar {
    syntax_set: Arc<SyntaxSet>,
    index: usize,
    scope_name: String,
}

impl LoadedGrammar {
    pub(super) fn new(syntax_set: Arc<SyntaxSet>, index: usize, scope_name: String) -> Self {
        Self {
            syntax_set,
            index,
            scope_name,
        }
    }

    pub fn syntax_set(&self) -> &SyntaxSet {
        &self.syntax_set
    }

    pub fn syntax(&self) -> &SyntaxReference {
        &self.syntax_set.syntaxes()[self.index]
    }

    pub fn scope_name(&self) -> &str {
        &self.scope_name
    }

    /// Parser state at the start of a document
    pub fn initial_state(&self) -> ParseState {
        ParseState::new(self.syntax())
    }
}

impl std::fmt::Debug for LoadedGrammar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedGrammar")
            .field("scope_name", &self.scope_name)
            .field("index", &self.index)
            .finish()
    }
}
