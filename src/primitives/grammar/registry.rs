//! Grammar registry: the explicitly constructed owner of [`RegistryState`]
//! and of the cached [`GrammarSet`].

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use syntect::parsing::SyntaxDefinition;

use super::composite::{referenced_scopes, GrammarSet};
use super::source::{Advance, GrammarReloader, GrammarSource};
use super::types::{LoadPolicy, LoadedGrammar, RegistryState, Resolution, SpawnedLoad};
use crate::error::BridgeError;

/// Default extra wait for `asap` activations
pub const DEFAULT_ASAP_DELAY: Duration = Duration::from_millis(10);

/// Registry of TextMate grammars, the languages bound to them and the
/// injection graph between them.
pub struct GrammarRegistry {
    state: Mutex<RegistryState>,
    /// Serializes grammar resolution and grammar set builds
    load_gate: tokio::sync::Mutex<()>,
    asap_delay: Duration,
}

impl Default for GrammarRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl GrammarRegistry {
    pub fn new() -> Self {
        Self::with_asap_delay(DEFAULT_ASAP_DELAY)
    }

    pub fn with_asap_delay(asap_delay: Duration) -> Self {
        Self {
            state: Mutex::new(RegistryState::new()),
            load_gate: tokio::sync::Mutex::new(()),
            asap_delay,
        }
    }

    /// Register or overwrite the grammar source for a scope
    pub fn add_grammar(&self, scope_name: &str, source: GrammarSource) {
        tracing::debug!("Registering grammar '{}' ({:?})", scope_name, source);
        self.state.lock().add_grammar(scope_name, source);
    }

    /// Bind `language_id` to an already registered scope
    pub fn bind_language(&self, scope_name: &str, language_id: &str) -> Result<(), BridgeError> {
        let mut state = self.state.lock();
        if !state.has_grammar(scope_name) {
            return Err(BridgeError::GrammarNotRegistered {
                scope_name: scope_name.to_string(),
                dependent: None,
            });
        }
        if state.bind_language(scope_name, language_id)? {
            tracing::info!("Bound language '{}' to '{}'", language_id, scope_name);
        }
        Ok(())
    }

    /// Bind a language and load its grammar according to `policy`.
    ///
    /// Returns `true` when the grammar was loaded before returning.
    pub async fn activate_language(
        &self,
        scope_name: &str,
        language_id: &str,
        policy: LoadPolicy,
    ) -> Result<bool, BridgeError> {
        self.bind_language(scope_name, language_id)?;

        match policy {
            LoadPolicy::Now => {
                self.load_grammar(language_id).await?;
                Ok(true)
            }
            LoadPolicy::Asap => {
                idle_yield(self.asap_delay).await;
                self.load_grammar(language_id).await?;
                Ok(true)
            }
            LoadPolicy::Defer => Ok(false),
        }
    }

    pub fn has_language_registered(&self, language_id: &str) -> bool {
        self.state.lock().has_language(language_id)
    }

    pub fn scope_for_language(&self, language_id: &str) -> Option<String> {
        self.state
            .lock()
            .scope_for_language(language_id)
            .map(str::to_owned)
    }

    pub fn link_injections<S: AsRef<str>>(
        &self,
        scope_name: &str,
        hosts: &[S],
    ) -> Result<Vec<String>, BridgeError> {
        self.state.lock().link_injections(scope_name, hosts)
    }

    pub fn unlink_injections<S: AsRef<str>>(
        &self,
        scope_name: &str,
        hosts: Option<&[S]>,
    ) -> Result<Vec<String>, BridgeError> {
        self.state.lock().unlink_injections(scope_name, hosts)
    }

    /// Number of times the grammar set has been compiled
    pub fn composite_builds(&self) -> usize {
        self.state.lock().composite_builds
    }

    /// Resolve the grammar bound to `language_id`.
    ///
    /// Returns `Ok(None)` when the language is unbound or its scope has no
    /// source. Sources are resolved at most once; the grammar set is rebuilt
    /// only when it lacks a needed scope or was invalidated.
    pub async fn load_grammar(&self, language_id: &str) -> Result<Option<LoadedGrammar>, BridgeError> {
        let Some(scope_name) = self.scope_for_language(language_id) else {
            return Ok(None);
        };

        let _gate = self.load_gate.lock().await;
        if !self.state.lock().has_grammar(&scope_name) {
            return Ok(None);
        }

        let closure = self.resolve_closure(&scope_name).await?;
        let set = self.grammar_set_covering(&closure)?;
        set.grammar(&scope_name).map(Some)
    }

    /// Resolve a scope, the grammars it references and the grammars injected
    /// into it, recursively.
    async fn resolve_closure(&self, root: &str) -> Result<Vec<String>, BridgeError> {
        let mut seen = HashSet::new();
        let mut stack: Vec<(String, Option<String>)> = vec![(root.to_string(), None)];
        let mut closure = Vec::new();

        while let Some((scope_name, dependent)) = stack.pop() {
            if !seen.insert(scope_name.clone()) {
                continue;
            }
            let def = self.resolve_scope(&scope_name, dependent.as_deref()).await?;

            for dependency in referenced_scopes(&def) {
                stack.push((dependency, Some(scope_name.clone())));
            }
            for injected in self.state.lock().injections_into(&scope_name) {
                stack.push((injected, Some(scope_name.clone())));
            }
            closure.push(scope_name);
        }

        Ok(closure)
    }

    /// Advance one scope's source to `Resolved`, memoizing the result.
    ///
    /// Pending loads run on their own task. If this call is dropped while
    /// waiting, the load keeps running and the next resolution picks it up.
    async fn resolve_scope(
        &self,
        scope_name: &str,
        dependent: Option<&str>,
    ) -> Result<Arc<SyntaxDefinition>, BridgeError> {
        let taken = self.state.lock().take_source(scope_name).ok_or_else(|| {
            BridgeError::GrammarNotRegistered {
                scope_name: scope_name.to_string(),
                dependent: dependent.map(str::to_owned),
            }
        })?;

        let load = match taken {
            Resolution::Source(source) => match source.advance(scope_name) {
                Advance::Ready(def) => {
                    self.state
                        .lock()
                        .finish_resolution(scope_name, Ok(Arc::clone(&def)));
                    return Ok(def);
                }
                Advance::Failed { error, reload } => {
                    self.fail_resolution(scope_name, &error, reload);
                    return Err(error);
                }
                Advance::Pending { future, reload } => {
                    tracing::debug!("Awaiting grammar load for '{}'", scope_name);
                    SpawnedLoad {
                        handle: tokio::spawn(future),
                        reload,
                    }
                }
            },
            Resolution::Spawned(load) => {
                tracing::debug!("Resuming parked grammar load for '{}'", scope_name);
                load
            }
        };

        let pending = PendingLoad {
            state: &self.state,
            scope_name,
            load: Some(load),
        };
        let (result, reload) = pending.wait().await;
        match result {
            Ok(def) => {
                let def = Arc::new(def);
                self.state
                    .lock()
                    .finish_resolution(scope_name, Ok(Arc::clone(&def)));
                Ok(def)
            }
            Err(error) => {
                self.fail_resolution(scope_name, &error, reload);
                Err(error)
            }
        }
    }

    /// Put back what the next resolution of a failed scope should do: rerun a
    /// reloadable factory, or report the same error again.
    fn fail_resolution(&self, scope_name: &str, error: &BridgeError, reload: Option<GrammarReloader>) {
        let fallback = match reload {
            Some(reload) => {
                tracing::warn!("Grammar load for '{}' failed, will retry: {}", scope_name, error);
                GrammarSource::Reload(reload)
            }
            None => {
                tracing::warn!("Grammar load for '{}' failed: {}", scope_name, error);
                GrammarSource::Failed(error.clone())
            }
        };
        self.state
            .lock()
            .finish_resolution(scope_name, Err(fallback));
    }

    fn grammar_set_covering(&self, scopes: &[String]) -> Result<Arc<GrammarSet>, BridgeError> {
        let mut state = self.state.lock();
        if let Some(set) = &state.composite {
            if scopes.iter().all(|scope| set.contains(scope)) {
                return Ok(Arc::clone(set));
            }
        }

        let definitions = state.resolved_definitions();
        let set = Arc::new(GrammarSet::build(&definitions, state.injection_graph())?);
        state.composite = Some(Arc::clone(&set));
        state.composite_builds += 1;
        tracing::info!(
            "Built grammar set with {} grammars (build #{})",
            set.len(),
            state.composite_builds
        );
        Ok(set)
    }
}

/// A spawned grammar load being awaited. Dropped before the load finishes,
/// it parks the load in the registry instead of losing it.
struct PendingLoad<'a> {
    state: &'a Mutex<RegistryState>,
    scope_name: &'a str,
    load: Option<SpawnedLoad>,
}

impl PendingLoad<'_> {
    async fn wait(mut self) -> (Result<SyntaxDefinition, BridgeError>, Option<GrammarReloader>) {
        let result = match self.load.as_mut() {
            Some(load) => match (&mut load.handle).await {
                Ok(result) => result,
                Err(e) => Err(BridgeError::GrammarLoad {
                    scope_name: self.scope_name.to_string(),
                    message: format!("load task failed: {e}"),
                }),
            },
            None => Err(BridgeError::GrammarLoad {
                scope_name: self.scope_name.to_string(),
                message: "load already consumed".to_string(),
            }),
        };
        let reload = self.load.take().and_then(|load| load.reload);
        (result, reload)
    }
}

impl Drop for PendingLoad<'_> {
    fn drop(&mut self) {
        if let Some(load) = self.load.take() {
            tracing::debug!(
                "Caller stopped waiting for grammar '{}', parking its load",
                self.scope_name
            );
            self.state.lock().park_load(self.scope_name, load);
        }
    }
}

/// Yield to the scheduler, then wait out `delay`
async fn idle_yield(delay: Duration) {
    tokio::task::yield_now().await;
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
