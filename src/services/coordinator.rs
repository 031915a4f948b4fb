//! Binding coordinator: keeps every attached editor instance's mode bound to
//! a tokenizer for its language and theme.
//!
//! # Update pipeline
//!
//! Each `mode` / `theme` change or document swap queues an update for the
//! instance. Updates run one at a time in arrival order (see
//! [`UpdateQueue`]). A run:
//!
//! 1. reads the instance's language and theme,
//! 2. moves the instance's theme stylesheet reference from its previous theme
//!    to the new one,
//! 3. stops if the language's mode is already baked with that theme,
//! 4. stops if the language has no grammar,
//! 5. otherwise builds a tokenizer (the only await) and, unless a newer
//!    request for the instance arrived meanwhile, defines it as the mode for
//!    the language and records the theme baked into it.
//!
//! Stylesheet accounting happens before the await so two instances racing on
//! the same theme can never attach it twice.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::editor::{EditorEvent, EditorInstance, InstanceId, ModeTable, StyleRoot};
use super::theme_resources::ThemeResources;
use super::update_queue::UpdateQueue;
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::primitives::grammar::{GrammarLoader, GrammarRegistry, GrammarSource, LoadPolicy};
use crate::primitives::highlighter::{HighlighterSet, DEFAULT_THEME};
use crate::view::theme::{RawTheme, ThemeLoader};

/// How an update ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// A new mode was defined for the instance's language
    Installed,
    /// The mode was already baked with this theme, but the instance switched
    /// to it from another theme
    ThemeChanged,
    /// Nothing to do
    Unchanged,
    /// A newer request for the same instance replaced this one
    Superseded,
    /// The instance's language has no grammar
    NoGrammar,
}

impl UpdateOutcome {
    /// Whether the editor should refresh
    pub fn changed(self) -> bool {
        matches!(self, UpdateOutcome::Installed | UpdateOutcome::ThemeChanged)
    }
}

type UpdateResult = Result<UpdateOutcome, BridgeError>;

/// A queued update
pub struct UpdateTicket {
    receiver: oneshot::Receiver<UpdateResult>,
}

impl UpdateTicket {
    fn ready(result: UpdateResult) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self { receiver: rx }
    }

    /// Wait for the update to finish
    pub async fn outcome(self) -> UpdateResult {
        self.receiver.await.unwrap_or(Ok(UpdateOutcome::Superseded))
    }
}

struct InstanceEntry {
    editor: Arc<dyn EditorInstance>,
    /// Theme last bound to this instance
    prev_theme: String,
    /// Mode just re-applied by the coordinator; the resulting notification
    /// is ignored
    echo_mode: Option<String>,
}

struct CoordinatorState {
    root: Arc<dyn StyleRoot>,
    highlighters: HighlighterSet,
    instances: HashMap<InstanceId, InstanceEntry>,
    /// Language id -> theme baked into its current mode
    baked_themes: HashMap<String, String>,
    resources: ThemeResources,
}

struct Inner {
    registry: Arc<GrammarRegistry>,
    modes: Arc<dyn ModeTable>,
    state: Mutex<CoordinatorState>,
    queue: UpdateQueue<InstanceId, UpdateResult>,
    next_id: AtomicU64,
}

/// Binds editor instances to TextMate tokenizers and themes.
///
/// Cloning is cheap; clones share state. Updates requested outside a Tokio
/// runtime fail with [`BridgeError::NoRuntime`].
#[derive(Clone)]
pub struct BindingCoordinator {
    inner: Arc<Inner>,
}

impl BindingCoordinator {
    pub fn new(
        registry: Arc<GrammarRegistry>,
        modes: Arc<dyn ModeTable>,
        root: Arc<dyn StyleRoot>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                modes,
                state: Mutex::new(CoordinatorState {
                    root,
                    highlighters: HighlighterSet::new(),
                    instances: HashMap::new(),
                    baked_themes: HashMap::new(),
                    resources: ThemeResources::new(),
                }),
                queue: UpdateQueue::new(),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn registry(&self) -> &Arc<GrammarRegistry> {
        &self.inner.registry
    }

    pub fn add_grammar(&self, scope_name: &str, source: GrammarSource) {
        self.inner.registry.add_grammar(scope_name, source);
    }

    pub async fn activate_language(
        &self,
        scope_name: &str,
        language_id: &str,
        policy: LoadPolicy,
    ) -> Result<bool, BridgeError> {
        self.inner
            .registry
            .activate_language(scope_name, language_id, policy)
            .await
    }

    /// Inject `scope_name` into `hosts` and return the affected languages.
    ///
    /// Modes already baked for those languages are forgotten so the next
    /// update of any instance using them rebuilds the tokenizer.
    pub async fn link_injections<S: AsRef<str>>(
        &self,
        scope_name: &str,
        hosts: &[S],
    ) -> Result<Vec<String>, BridgeError> {
        let affected = self.inner.registry.link_injections(scope_name, hosts)?;
        self.invalidate_languages(&affected).await;
        Ok(affected)
    }

    /// Remove `scope_name` from `hosts` (all hosts when `None`) and return
    /// the affected languages.
    pub async fn unlink_injections<S: AsRef<str>>(
        &self,
        scope_name: &str,
        hosts: Option<&[S]>,
    ) -> Result<Vec<String>, BridgeError> {
        let affected = self.inner.registry.unlink_injections(scope_name, hosts)?;
        self.invalidate_languages(&affected).await;
        Ok(affected)
    }

    async fn invalidate_languages(&self, languages: &[String]) {
        for language_id in languages {
            let was_baked = self.inner.state.lock().baked_themes.remove(language_id).is_some();
            if !was_baked {
                continue;
            }
            tracing::debug!("Invalidated mode for '{}', preloading grammar", language_id);
            if let Err(e) = self.inner.registry.load_grammar(language_id).await {
                tracing::warn!("Preloading grammar for '{}' failed: {}", language_id, e);
            }
        }
    }

    /// Register a theme under its name
    pub fn add_theme(&self, theme: &RawTheme) -> Result<(), BridgeError> {
        self.inner.state.lock().highlighters.add_theme(theme)?;
        Ok(())
    }

    pub fn has_theme(&self, name: &str) -> bool {
        self.inner.state.lock().highlighters.contains(name)
    }

    /// Attach future theme stylesheets to `root`
    pub fn set_root(&self, root: Arc<dyn StyleRoot>) {
        self.inner.state.lock().root = root;
    }

    /// Start tracking an editor instance. The caller should follow up with
    /// [`EditorEvent::Attached`].
    pub fn attach(&self, editor: Arc<dyn EditorInstance>) -> InstanceId {
        let id = InstanceId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.state.lock().instances.insert(
            id,
            InstanceEntry {
                editor,
                prev_theme: DEFAULT_THEME.to_string(),
                echo_mode: None,
            },
        );
        tracing::debug!("Attached {}", id);
        id
    }

    /// Stop tracking an instance: drops its pending update and releases its
    /// theme stylesheet.
    pub fn detach(&self, id: InstanceId) {
        self.inner.queue.remove(&id, Ok(UpdateOutcome::Superseded));
        let mut state = self.inner.state.lock();
        if let Some(entry) = state.instances.remove(&id) {
            state.resources.release(&entry.prev_theme, id);
            tracing::debug!("Detached {}", id);
        }
    }

    /// Handle an editor notification.
    ///
    /// Returns the queued update, or `None` when the event needs no update
    /// (an unrelated option, an unknown instance or the echo of the
    /// coordinator re-applying a mode). Only a `mode` notification consumes
    /// the pending echo.
    pub fn notify(&self, id: InstanceId, event: EditorEvent) -> Option<UpdateTicket> {
        if let EditorEvent::OptionChanged(option) = &event {
            if option != "mode" && option != "theme" {
                return None;
            }
        }

        {
            let mut state = self.inner.state.lock();
            let entry = state.instances.get_mut(&id)?;
            if matches!(&event, EditorEvent::OptionChanged(option) if option == "mode") {
                if let Some(echo) = entry.echo_mode.take() {
                    if entry.editor.mode().as_deref() == Some(echo.as_str()) {
                        tracing::trace!("Ignoring mode echo on {}", id);
                        return None;
                    }
                }
            }
        }

        Some(self.request_update(id))
    }

    /// Queue an update for an instance
    pub fn request_update(&self, id: InstanceId) -> UpdateTicket {
        if !self.inner.state.lock().instances.contains_key(&id) {
            return UpdateTicket::ready(Ok(UpdateOutcome::Unchanged));
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("Update for {} requested outside a Tokio runtime", id);
            return UpdateTicket::ready(Err(BridgeError::NoRuntime));
        };

        let enqueued = self.inner.queue.push(id, Ok(UpdateOutcome::Superseded));
        if enqueued.start_drain {
            let coordinator = self.clone();
            runtime.spawn(async move { coordinator.drain().await });
        }
        UpdateTicket {
            receiver: enqueued.receiver,
        }
    }

    /// Queue an update for an instance and wait for it
    pub async fn update_instance(&self, id: InstanceId) -> UpdateResult {
        self.request_update(id).outcome().await
    }

    async fn drain(&self) {
        let mut guard = DrainGuard {
            queue: &self.inner.queue,
            finished: false,
        };
        while let Some((id, token)) = self.inner.queue.begin_next() {
            let result = self.run_update(id, &token).await;
            match &result {
                Ok(outcome) => tracing::debug!("Update for {} finished: {:?}", id, outcome),
                Err(e) => tracing::warn!("Update for {} failed: {}", id, e),
            }
            if matches!(result, Ok(outcome) if outcome.changed()) {
                self.reapply_mode(id);
            }
            self.inner.queue.finish(&id, result);
        }
        guard.finished = true;
    }

    /// Make the editor re-tokenize, suppressing the notification it echoes
    fn reapply_mode(&self, id: InstanceId) {
        let editor = {
            let mut state = self.inner.state.lock();
            let Some(entry) = state.instances.get_mut(&id) else {
                return;
            };
            entry.echo_mode = entry.editor.mode();
            Arc::clone(&entry.editor)
        };
        editor.reapply_mode();
    }

    async fn run_update(&self, id: InstanceId, token: &CancellationToken) -> UpdateResult {
        let inner = &self.inner;

        let (language_id, highlighter, theme_name, theme_changed, baked) = {
            let mut guard = inner.state.lock();
            let state = &mut *guard;
            let Some(entry) = state.instances.get_mut(&id) else {
                return Ok(UpdateOutcome::Unchanged);
            };

            let language_id = entry.editor.mode();
            let requested = entry.editor.theme().unwrap_or_else(|| DEFAULT_THEME.to_string());
            let highlighter = state.highlighters.resolve(&requested);
            if highlighter.name() != requested {
                tracing::debug!("Theme '{}' is not registered, using default", requested);
            }
            let theme_name = highlighter.name().to_string();
            let prev_theme = std::mem::replace(&mut entry.prev_theme, theme_name.clone());

            if prev_theme != theme_name {
                state.resources.release(&prev_theme, id);
            }
            if let Some(css) = highlighter.css_text() {
                state.resources.acquire(&theme_name, id, &state.root, css);
            }

            let theme_changed = prev_theme != theme_name;
            let baked = language_id
                .as_ref()
                .and_then(|l| state.baked_themes.get(l).cloned());
            (language_id, highlighter, theme_name, theme_changed, baked)
        };

        let Some(language_id) = language_id else {
            return Ok(UpdateOutcome::NoGrammar);
        };

        if baked.as_deref() == Some(theme_name.as_str()) {
            return Ok(if theme_changed {
                UpdateOutcome::ThemeChanged
            } else {
                UpdateOutcome::Unchanged
            });
        }

        if !inner.registry.has_language_registered(&language_id) {
            return Ok(UpdateOutcome::NoGrammar);
        }
        if token.is_cancelled() {
            return Ok(UpdateOutcome::Superseded);
        }

        let mode = highlighter.get_tokenizer(&inner.registry, &language_id).await?;

        if token.is_cancelled() {
            tracing::debug!("Discarding superseded tokenizer for '{}' on {}", language_id, id);
            return Ok(UpdateOutcome::Superseded);
        }
        let Some(mode) = mode else {
            return Ok(UpdateOutcome::NoGrammar);
        };

        inner.modes.define_mode(&language_id, mode);
        inner
            .state
            .lock()
            .baked_themes
            .insert(language_id.clone(), theme_name.clone());
        tracing::info!(
            "Defined mode '{}' with theme '{}' ({})",
            language_id,
            theme_name,
            id
        );
        Ok(UpdateOutcome::Installed)
    }

    /// Register grammars, injections and themes from configuration, then
    /// activate the configured languages.
    pub async fn apply_config(
        &self,
        config: &BridgeConfig,
        grammar_loader: Arc<dyn GrammarLoader>,
        theme_loader: &dyn ThemeLoader,
    ) -> Result<(), BridgeError> {
        for grammar in &config.grammars {
            self.add_grammar(
                &grammar.scope_name,
                GrammarSource::from_file(Arc::clone(&grammar_loader), &grammar.path),
            );
        }

        for injection in &config.injections {
            self.link_injections(&injection.scope_name, injection.into.as_slice())
                .await?;
        }

        for path in &config.themes {
            let theme = RawTheme::load(theme_loader, Path::new(path))?;
            self.add_theme(&theme)?;
        }

        for grammar in &config.grammars {
            if let Some(language_id) = &grammar.language_id {
                self.activate_language(
                    &grammar.scope_name,
                    language_id,
                    config.load_policy_for(grammar),
                )
                .await?;
            }
        }

        tracing::info!(
            "Applied config: {} grammars, {} injections, {} themes",
            config.grammars.len(),
            config.injections.len(),
            config.themes.len()
        );
        Ok(())
    }

    /// Theme baked into the current mode of `language_id`
    pub fn baked_theme(&self, language_id: &str) -> Option<String> {
        self.inner.state.lock().baked_themes.get(language_id).cloned()
    }

    /// Theme last bound to an instance
    pub fn bound_theme(&self, id: InstanceId) -> Option<String> {
        self.inner
            .state
            .lock()
            .instances
            .get(&id)
            .map(|entry| entry.prev_theme.clone())
    }

    /// Number of instances using a theme's stylesheet
    pub fn theme_ref_count(&self, theme_name: &str) -> usize {
        self.inner.state.lock().resources.ref_count(theme_name)
    }

    pub fn has_theme_resource(&self, theme_name: &str) -> bool {
        self.inner.state.lock().resources.is_attached(theme_name)
    }

    /// Stylesheet of a registered theme
    pub fn theme_css(&self, theme_name: &str) -> Option<String> {
        let highlighter = self.inner.state.lock().highlighters.get(theme_name)?;
        highlighter.css_text().map(str::to_owned)
    }
}

/// Releases the queue if a drain loop unwinds or is dropped mid-job, so
/// later requests start a fresh loop instead of waiting forever.
struct DrainGuard<'a> {
    queue: &'a UpdateQueue<InstanceId, UpdateResult>,
    finished: bool,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.queue.abort_drain();
        }
    }
}

impl std::fmt::Debug for BindingCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("BindingCoordinator")
            .field("instances", &state.instances.len())
            .field("baked_themes", &state.baked_themes)
            .field("resources", &state.resources)
            .finish()
    }
}
