//! Grammar sources and their memoizing resolution.
//!
//! A scope name maps to exactly one [`GrammarSource`]. Factories and pending
//! loads are replaced in place by their resolved definition the first time
//! they are awaited, so a grammar is never produced twice.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use syntect::parsing::SyntaxDefinition;

use crate::error::BridgeError;

/// A pending asynchronous grammar load
pub type GrammarFuture =
    Pin<Box<dyn Future<Output = Result<SyntaxDefinition, BridgeError>> + Send + 'static>>;

/// A lazy grammar factory, called once with the scope name being resolved
pub type GrammarFactory = Box<dyn FnOnce(&str) -> GrammarSource + Send + 'static>;

/// A factory that is kept until it produces a grammar, so a failed load is
/// retried on the next resolution
pub type GrammarReloader = Arc<dyn Fn(&str) -> GrammarSource + Send + Sync + 'static>;

/// Where the definition of a grammar comes from
pub enum GrammarSource {
    /// A definition supplied up front
    Static(SyntaxDefinition),
    /// Produces another source on first use
    Factory(GrammarFactory),
    /// Produces another source on every resolution until one succeeds
    Reload(GrammarReloader),
    /// An in-flight load
    Loading(GrammarFuture),
    /// The memoized result of any of the above
    Resolved(Arc<SyntaxDefinition>),
    /// A load that failed and cannot be retried; every resolution reports
    /// the error until the scope is registered again
    Failed(BridgeError),
}

/// Result of advancing a source as far as possible without awaiting
pub(crate) enum Advance {
    Ready(Arc<SyntaxDefinition>),
    Pending {
        future: GrammarFuture,
        /// Source to reinstate if the load fails
        reload: Option<GrammarReloader>,
    },
    Failed {
        error: BridgeError,
        reload: Option<GrammarReloader>,
    },
}

impl GrammarSource {
    /// Parse sublime-syntax YAML into a static source
    pub fn from_yaml(scope_name: &str, yaml: &str) -> Result<Self, BridgeError> {
        parse_definition(scope_name, yaml).map(Self::Static)
    }

    /// Wrap a closure as a lazy factory
    pub fn factory<F>(factory: F) -> Self
    where
        F: FnOnce(&str) -> GrammarSource + Send + 'static,
    {
        Self::Factory(Box::new(factory))
    }

    /// Wrap a closure as a factory that is rerun after a failed load
    pub fn reloadable<F>(factory: F) -> Self
    where
        F: Fn(&str) -> GrammarSource + Send + Sync + 'static,
    {
        Self::Reload(Arc::new(factory))
    }

    /// Wrap a future as a pending load
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = Result<SyntaxDefinition, BridgeError>> + Send + 'static,
    {
        Self::Loading(Box::pin(future))
    }

    /// Whether the source has already been resolved
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    /// The resolved definition, if any
    pub fn resolved(&self) -> Option<&Arc<SyntaxDefinition>> {
        match self {
            Self::Resolved(def) => Some(def),
            _ => None,
        }
    }

    /// Run factories and unwrap static definitions until the source is either
    /// ready, failed or waiting on a future.
    pub(crate) fn advance(self, scope_name: &str) -> Advance {
        let mut source = self;
        let mut reload: Option<GrammarReloader> = None;
        loop {
            source = match source {
                Self::Static(def) => return Advance::Ready(Arc::new(def)),
                Self::Resolved(def) => return Advance::Ready(def),
                Self::Loading(future) => return Advance::Pending { future, reload },
                Self::Failed(error) => return Advance::Failed { error, reload },
                Self::Factory(factory) => {
                    tracing::debug!("Running grammar factory for '{}'", scope_name);
                    factory(scope_name)
                }
                Self::Reload(factory) => {
                    tracing::debug!("Running reloadable grammar factory for '{}'", scope_name);
                    let next = factory.as_ref()(scope_name);
                    reload.get_or_insert(factory);
                    next
                }
            };
        }
    }
}

impl std::fmt::Debug for GrammarSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(def) => f.debug_tuple("Static").field(&def.scope).finish(),
            Self::Factory(_) => f.write_str("Factory(<fn>)"),
            Self::Reload(_) => f.write_str("Reload(<fn>)"),
            Self::Loading(_) => f.write_str("Loading(<future>)"),
            Self::Resolved(def) => f.debug_tuple("Resolved").field(&def.scope).finish(),
            Self::Failed(err) => f.debug_tuple("Failed").field(err).finish(),
        }
    }
}

/// Parse sublime-syntax YAML for the grammar registered as `scope_name`
pub fn parse_definition(scope_name: &str, yaml: &str) -> Result<SyntaxDefinition, BridgeError> {
    SyntaxDefinition::load_from_str(yaml, true, None).map_err(|e| BridgeError::GrammarParse {
        scope_name: scope_name.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const GRAMMAR: &str = r#"
name: X
scope: source.x
contexts:
  main:
    - match: '\bfn\b'
      scope: keyword.control.x
"#;

    #[test]
    fn test_static_source_advances_to_ready() {
        let source = GrammarSource::from_yaml("source.x", GRAMMAR).unwrap();
        match source.advance("source.x") {
            Advance::Ready(def) => assert_eq!(def.scope.build_string(), "source.x"),
            _ => panic!("static source should be ready"),
        }
    }

    #[test]
    fn test_factory_runs_once_per_advance() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let source = GrammarSource::factory(move |scope| {
            counter.fetch_add(1, Ordering::SeqCst);
            assert_eq!(scope, "source.x");
            GrammarSource::from_yaml(scope, GRAMMAR).unwrap()
        });

        assert!(matches!(source.advance("source.x"), Advance::Ready(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_factory_yielding_future_is_pending() {
        let source = GrammarSource::factory(|scope| {
            let scope = scope.to_string();
            GrammarSource::pending(async move { parse_definition(&scope, GRAMMAR) })
        });
        assert!(matches!(
            source.advance("source.x"),
            Advance::Pending { reload: None, .. }
        ));
    }

    #[test]
    fn test_reloadable_source_keeps_its_factory() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let source = GrammarSource::reloadable(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            GrammarSource::Failed(BridgeError::GrammarLoad {
                scope_name: "source.x".to_string(),
                message: "offline".to_string(),
            })
        });

        let Advance::Failed { reload: Some(reload), .. } = source.advance("source.x") else {
            panic!("reloadable source should hand back its factory");
        };
        let Advance::Failed { reload: Some(_), .. } =
            GrammarSource::Reload(reload).advance("source.x")
        else {
            panic!("reloadable source should hand back its factory");
        };
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failed_source_reports_error() {
        let source = GrammarSource::Failed(BridgeError::GrammarLoad {
            scope_name: "source.x".to_string(),
            message: "gone".to_string(),
        });
        assert!(matches!(
            source.advance("source.x"),
            Advance::Failed {
                error: BridgeError::GrammarLoad { .. },
                reload: None
            }
        ));
    }

    #[test]
    fn test_invalid_yaml_is_parse_error() {
        let err = GrammarSource::from_yaml("source.bad", "contexts: [").unwrap_err();
        assert!(matches!(err, BridgeError::GrammarParse { .. }));
    }
}
