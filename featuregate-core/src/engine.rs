//! Feature evaluation engine
//!
//! Decides whether a feature is available, either against a caller-supplied
//! explicit list or against the shared registry.

use tracing::trace;

use crate::registry::{FeatureChange, FeatureRegistry, SubscriptionHandle};

/// Stateless feature availability evaluator
///
/// Holds a handle to the registry it falls back to; cloning is cheap and
/// every clone evaluates against the same registry.
///
/// # Examples
///
/// ```
/// use featuregate_core::{FeatureEngine, FeatureRegistry};
///
/// let registry = FeatureRegistry::new();
/// registry.replace(["beta", "gamma"]);
///
/// let engine = FeatureEngine::new(registry);
/// assert!(engine.is_enabled("beta"));
/// assert!(!engine.is_enabled("delta"));
///
/// // An explicit list overrides the registry entirely.
/// let scoped: &[&str] = &["alpha"];
/// assert!(!engine.check("beta", Some(scoped)));
/// ```
#[derive(Debug, Clone)]
pub struct FeatureEngine {
    registry: FeatureRegistry,
}

impl FeatureEngine {
    /// Create an engine evaluating against the given registry
    pub fn new(registry: FeatureRegistry) -> Self {
        Self { registry }
    }

    /// The registry this engine falls back to
    pub fn registry(&self) -> &FeatureRegistry {
        &self.registry
    }

    /// Decide whether `name` is available
    ///
    /// Precedence:
    /// 1. a non-empty explicit list is consulted alone; the registry is
    ///    ignored,
    /// 2. with no explicit list (`None`), the registry's current state
    ///    decides,
    /// 3. an explicit list that is present but empty means the caller
    ///    allowed zero features, so the result is `false` unconditionally.
    ///
    /// `name` is never validated; empty or whitespace strings are literal
    /// identifiers and matching is exact, case-sensitive equality.
    pub fn check<S: AsRef<str>>(&self, name: &str, explicit_list: Option<&[S]>) -> bool {
        let available = match explicit_list {
            Some(list) if !list.is_empty() => list.iter().any(|f| f.as_ref() == name),
            Some(_) => false,
            None => self.registry.contains(name),
        };

        if self.registry.logging_enabled() {
            trace!(
                "Feature check '{}' ({}): {}",
                name,
                if explicit_list.is_some() {
                    "explicit list"
                } else {
                    "registry"
                },
                available
            );
        }

        available
    }

    /// Decide against the registry alone, with no explicit list
    pub fn is_enabled(&self, name: &str) -> bool {
        self.check::<&str>(name, None)
    }

    /// Subscribe to registry changes through the engine
    ///
    /// Convenience forward to [`FeatureRegistry::subscribe`], so a consumer
    /// holding only an engine handle can re-check on every mutation.
    pub fn subscribe<F>(&self, observer: F) -> SubscriptionHandle
    where
        F: Fn(&FeatureChange) + Send + Sync + 'static,
    {
        self.registry.subscribe(observer)
    }
}
