//! Reference-counted theme stylesheets.
//!
//! A theme's stylesheet is attached when the first editor instance starts
//! using the theme and removed when the last one stops. The count is the size
//! of the set of instances using it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::editor::{InstanceId, StyleNodeId, StyleRoot};

struct ThemeResource {
    node: StyleNodeId,
    /// Root the stylesheet was attached to
    root: Arc<dyn StyleRoot>,
    users: HashSet<InstanceId>,
}

#[derive(Default)]
pub struct ThemeResources {
    resources: HashMap<String, ThemeResource>,
}

impl ThemeResources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `instance` uses `theme_name`, attaching `css` to `root` if
    /// this is the theme's first user.
    ///
    /// Returns `true` when the stylesheet was attached.
    pub fn acquire(
        &mut self,
        theme_name: &str,
        instance: InstanceId,
        root: &Arc<dyn StyleRoot>,
        css: &str,
    ) -> bool {
        if let Some(resource) = self.resources.get_mut(theme_name) {
            if resource.users.insert(instance) {
                tracing::debug!(
                    "Theme '{}' now used by {} instance(s)",
                    theme_name,
                    resource.users.len()
                );
            }
            return false;
        }

        let node = root.append_stylesheet(theme_name, css);
        self.resources.insert(
            theme_name.to_string(),
            ThemeResource {
                node,
                root: Arc::clone(root),
                users: HashSet::from([instance]),
            },
        );
        tracing::info!("Attached stylesheet for theme '{}' ({})", theme_name, instance);
        true
    }

    /// Record that `instance` no longer uses `theme_name`.
    ///
    /// Returns `true` when this detached the stylesheet.
    pub fn release(&mut self, theme_name: &str, instance: InstanceId) -> bool {
        let Some(resource) = self.resources.get_mut(theme_name) else {
            return false;
        };
        resource.users.remove(&instance);
        if !resource.users.is_empty() {
            return false;
        }

        if let Some(resource) = self.resources.remove(theme_name) {
            resource.root.remove_stylesheet(resource.node);
            tracing::info!("Detached stylesheet for theme '{}'", theme_name);
        }
        true
    }

    pub fn ref_count(&self, theme_name: &str) -> usize {
        self.resources
            .get(theme_name)
            .map_or(0, |resource| resource.users.len())
    }

    pub fn is_attached(&self, theme_name: &str) -> bool {
        self.resources.contains_key(theme_name)
    }

    pub fn uses(&self, theme_name: &str, instance: InstanceId) -> bool {
        self.resources
            .get(theme_name)
            .is_some_and(|resource| resource.users.contains(&instance))
    }

    pub fn themes(&self) -> Vec<String> {
        let mut themes: Vec<String> = self.resources.keys().cloned().collect();
        themes.sort();
        themes
    }
}

impl std::fmt::Debug for ThemeResources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (name, resource) in &self.resources {
            map.entry(name, &resource.users.len());
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::editor::MemoryStyleRoot;
    use proptest::prelude::*;

    fn id(n: u64) -> InstanceId {
        InstanceId(n)
    }

    #[test]
    fn test_last_release_detaches() {
        let memory = Arc::new(MemoryStyleRoot::new());
        let root: Arc<dyn StyleRoot> = memory.clone();
        let mut resources = ThemeResources::new();

        assert!(resources.acquire("t", id(1), &root, "css"));
        assert!(!resources.acquire("t", id(2), &root, "css"));
        assert!(!resources.acquire("t", id(2), &root, "css"));
        assert_eq!(resources.ref_count("t"), 2);
        assert_eq!(memory.len(), 1);

        assert!(!resources.release("t", id(1)));
        assert!(memory.contains("t"));
        assert!(resources.release("t", id(2)));
        assert!(memory.is_empty());
        assert!(!resources.is_attached("t"));
        assert!(!resources.release("t", id(2)));
    }

    #[test]
    fn test_detaches_from_original_root() {
        let first = Arc::new(MemoryStyleRoot::new());
        let second = Arc::new(MemoryStyleRoot::new());
        let first_root: Arc<dyn StyleRoot> = first.clone();
        let second_root: Arc<dyn StyleRoot> = second.clone();
        let mut resources = ThemeResources::new();

        resources.acquire("t", id(1), &first_root, "css");
        // Root switched: existing resource stays where it was
        resources.acquire("t", id(2), &second_root, "css");
        assert!(second.is_empty());

        resources.release("t", id(1));
        resources.release("t", id(2));
        assert!(first.is_empty());
    }

    proptest! {
        #[test]
        fn prop_count_matches_distinct_users(ops in proptest::collection::vec((any::<bool>(), 0u64..5, 0usize..3), 0..60)) {
            let memory = Arc::new(MemoryStyleRoot::new());
            let root: Arc<dyn StyleRoot> = memory.clone();
            let names = ["a", "b", "c"];
            let mut resources = ThemeResources::new();
            let mut model: HashMap<&str, HashSet<u64>> = HashMap::new();

            for (acquire, instance, theme) in ops {
                let name = names[theme];
                if acquire {
                    resources.acquire(name, id(instance), &root, "css");
                    model.entry(name).or_default().insert(instance);
                } else {
                    resources.release(name, id(instance));
                    if let Some(users) = model.get_mut(name) {
                        users.remove(&instance);
                    }
                }

                for name in names {
                    let expected = model.get(name).map_or(0, |u| u.len());
                    prop_assert_eq!(resources.ref_count(name), expected);
                    prop_assert_eq!(resources.is_attached(name), expected > 0);
                }
                let attached = model.values().filter(|u| !u.is_empty()).count();
                prop_assert_eq!(memory.len(), attached);
            }
        }
    }
}
