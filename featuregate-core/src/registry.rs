//! Feature registry
//!
//! Holds the single shared set of enabled feature names and notifies
//! subscribers after every mutation.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use tracing::debug;
use uuid::Uuid;

use crate::seed::Seed;

/// Set of enabled feature names. Membership is exact, case-sensitive
/// string equality.
pub type FeatureSet = HashSet<String>;

/// Snapshot pair delivered to subscribers after a mutation.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureChange {
    /// Registry contents before the mutation
    pub previous: FeatureSet,

    /// Registry contents after the mutation
    pub current: FeatureSet,

    /// When the mutation was applied
    pub at: DateTime<Utc>,
}

impl FeatureChange {
    fn new(previous: FeatureSet, current: FeatureSet) -> Self {
        Self {
            previous,
            current,
            at: Utc::now(),
        }
    }

    /// True when the mutation left the registry contents unchanged.
    ///
    /// Redundant mutations still notify (e.g. `replace` with the same
    /// names); subscribers that want to skip rework check this.
    pub fn is_redundant(&self) -> bool {
        self.previous == self.current
    }
}

/// Registry configuration
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Enable diagnostic logging of mutations and deliveries
    pub enable_logging: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            enable_logging: true,
        }
    }
}

type ObserverFn = Box<dyn Fn(&FeatureChange) + Send + Sync>;

struct ObserverEntry {
    cancelled: AtomicBool,
    callback: ObserverFn,
}

/// Pending notifications, drained in FIFO order by whichever mutating
/// call started delivery. Keeps per-subscriber delivery in mutation
/// order when a callback re-enters the registry with its own mutation.
#[derive(Default)]
struct DispatchState {
    queue: VecDeque<FeatureChange>,
    draining: bool,
}

struct RegistryInner {
    features: RwLock<FeatureSet>,
    observers: DashMap<Uuid, Arc<ObserverEntry>>,
    dispatch: Mutex<DispatchState>,
    config: RegistryConfig,
}

/// Shared registry of enabled feature names
///
/// Cloning is cheap and every clone refers to the same underlying set, so
/// a single registry can be handed to every consumer that needs it.
///
/// # Examples
///
/// ```
/// use featuregate_core::FeatureRegistry;
///
/// let registry = FeatureRegistry::new();
/// registry.replace(["beta", "gamma"]);
///
/// assert!(registry.contains("beta"));
/// assert!(!registry.contains("delta"));
/// ```
#[derive(Clone)]
pub struct FeatureRegistry {
    inner: Arc<RegistryInner>,
}

impl FeatureRegistry {
    /// Create an empty registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create an empty registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                features: RwLock::new(FeatureSet::new()),
                observers: DashMap::new(),
                dispatch: Mutex::new(DispatchState::default()),
                config,
            }),
        }
    }

    /// Start building a registry with an initial feature set
    pub fn builder() -> FeatureRegistryBuilder {
        FeatureRegistryBuilder::new()
    }

    /// Overwrite the registry contents with exactly the given names
    ///
    /// Duplicates are collapsed. Always delivers one notification, even
    /// when the resulting set equals the previous one.
    pub fn replace<I, S>(&self, features: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mutate("replace", |set| {
            set.clear();
            set.extend(features.into_iter().map(Into::into));
        });
    }

    /// Insert each name if absent
    ///
    /// Inserting a name that is already present is a no-op. Delivers one
    /// notification per call, not one per name.
    pub fn add<I, S>(&self, features: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mutate("add", |set| {
            for feature in features {
                set.insert(feature.into());
            }
        });
    }

    /// Delete each name if present
    ///
    /// Removing an absent name is a no-op, not an error. Delivers one
    /// notification per call.
    pub fn remove<I, S>(&self, features: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.mutate("remove", |set| {
            for feature in features {
                set.remove(feature.as_ref());
            }
        });
    }

    /// Empty the registry. Delivers one notification.
    pub fn clear(&self) {
        self.mutate("clear", |set| set.clear());
    }

    /// Independent point-in-time copy of the registry contents
    ///
    /// Mutating the registry afterward never alters a returned snapshot.
    pub fn snapshot(&self) -> FeatureSet {
        self.inner.features.read().unwrap().clone()
    }

    /// Whether `name` is currently enabled
    pub fn contains(&self, name: &str) -> bool {
        self.inner.features.read().unwrap().contains(name)
    }

    /// Number of enabled features
    pub fn len(&self) -> usize {
        self.inner.features.read().unwrap().len()
    }

    /// Whether no features are enabled
    pub fn is_empty(&self) -> bool {
        self.inner.features.read().unwrap().is_empty()
    }

    /// Register `observer` to be invoked after every mutation
    ///
    /// The observer runs synchronously on the mutating call, strictly
    /// after the mutation is applied, so reads made inside the callback
    /// observe the post-mutation state. Callbacks may re-enter the
    /// registry (mutate, subscribe, cancel) without deadlocking; a
    /// mutation made inside a callback is applied immediately, but its
    /// notification is queued until the current delivery completes, so
    /// every subscriber sees notifications in mutation order.
    ///
    /// The returned handle must be kept and cancelled by the consumer;
    /// dropping it without cancelling leaves the observer registered.
    ///
    /// # Examples
    ///
    /// ```
    /// use featuregate_core::FeatureRegistry;
    ///
    /// let registry = FeatureRegistry::new();
    /// let subscription = registry.subscribe(|change| {
    ///     println!("{} features enabled", change.current.len());
    /// });
    ///
    /// registry.add(["beta"]);
    /// subscription.cancel();
    /// ```
    pub fn subscribe<F>(&self, observer: F) -> SubscriptionHandle
    where
        F: Fn(&FeatureChange) + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        let entry = Arc::new(ObserverEntry {
            cancelled: AtomicBool::new(false),
            callback: Box::new(observer),
        });
        self.inner.observers.insert(id, entry.clone());

        if self.inner.config.enable_logging {
            debug!("Observer {} subscribed to feature registry", id);
        }

        SubscriptionHandle {
            id,
            entry,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.inner.observers.len()
    }

    pub(crate) fn logging_enabled(&self) -> bool {
        self.inner.config.enable_logging
    }

    /// Apply a mutation under the write lock and enqueue its
    /// notification in the same critical section, so changes are queued
    /// in the order mutations were applied. Delivery runs with all locks
    /// released so callbacks can read and re-enter the registry.
    fn mutate(&self, op: &str, apply: impl FnOnce(&mut FeatureSet)) {
        let became_drainer = {
            let mut set = self.inner.features.write().unwrap();
            let previous = set.clone();
            apply(&mut set);
            let current = set.clone();

            if self.inner.config.enable_logging {
                debug!(
                    "Feature registry {}: {} -> {} features",
                    op,
                    previous.len(),
                    current.len()
                );
            }

            let mut dispatch = self.inner.dispatch.lock().unwrap();
            dispatch.queue.push_back(FeatureChange::new(previous, current));
            if dispatch.draining {
                // A delivery is already running (a callback re-entered,
                // or another thread is dispatching); it drains this
                // change after the current one finishes.
                false
            } else {
                dispatch.draining = true;
                true
            }
        };

        if became_drainer {
            self.drain();
        }
    }

    /// Deliver queued changes in FIFO order until the queue is empty.
    fn drain(&self) {
        loop {
            let change = {
                let mut dispatch = self.inner.dispatch.lock().unwrap();
                match dispatch.queue.pop_front() {
                    Some(change) => change,
                    None => {
                        dispatch.draining = false;
                        return;
                    }
                }
            };
            self.deliver(&change);
        }
    }

    fn deliver(&self, change: &FeatureChange) {
        // Collect entries first so callbacks can subscribe or cancel
        // without any map lock held.
        let observers: Vec<Arc<ObserverEntry>> = self
            .inner
            .observers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        for entry in observers {
            // Cancellation from another callback during this delivery
            // must suppress the invoke.
            if entry.cancelled.load(Ordering::SeqCst) {
                continue;
            }
            (entry.callback)(change);
        }
    }
}

impl Default for FeatureRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FeatureRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureRegistry")
            .field("features", &*self.inner.features.read().unwrap())
            .field("subscribers", &self.inner.observers.len())
            .finish()
    }
}

/// Handle to a registered observer
///
/// `cancel` is idempotent; once called, the observer receives no further
/// notifications, including for a delivery already in flight.
pub struct SubscriptionHandle {
    id: Uuid,
    entry: Arc<ObserverEntry>,
    registry: Weak<RegistryInner>,
}

impl SubscriptionHandle {
    /// Unregister the observer
    pub fn cancel(&self) {
        if self.entry.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(inner) = self.registry.upgrade() {
            inner.observers.remove(&self.id);
            if inner.config.enable_logging {
                debug!("Observer {} cancelled", self.id);
            }
        }
    }

    /// Whether `cancel` has been called
    pub fn is_cancelled(&self) -> bool {
        self.entry.cancelled.load(Ordering::SeqCst)
    }

    /// Unique id of this subscription
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Registry builder
///
/// Seeds the initial feature set before any subscriber exists, so seeding
/// delivers no notification.
pub struct FeatureRegistryBuilder {
    config: RegistryConfig,
    features: FeatureSet,
}

impl FeatureRegistryBuilder {
    /// Create a new registry builder
    pub fn new() -> Self {
        Self {
            config: RegistryConfig::default(),
            features: FeatureSet::new(),
        }
    }

    /// Enable/disable diagnostic logging
    pub fn enable_logging(mut self, enabled: bool) -> Self {
        self.config.enable_logging = enabled;
        self
    }

    /// Add names to the initial feature set
    pub fn with_features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.features.extend(features.into_iter().map(Into::into));
        self
    }

    /// Merge a loaded seed into the initial feature set
    pub fn with_seed(mut self, seed: Seed) -> Self {
        self.features.extend(seed.into_features());
        self
    }

    /// Build the registry
    pub fn build(self) -> FeatureRegistry {
        let registry = FeatureRegistry::with_config(self.config);
        if !self.features.is_empty() {
            *registry.inner.features.write().unwrap() = self.features;
        }
        registry
    }
}

impl Default for FeatureRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn set_of(names: &[&str]) -> FeatureSet {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_replace_deduplicates() {
        let registry = FeatureRegistry::new();
        registry.replace(["a", "b", "a", "b", "a"]);
        assert_eq!(registry.snapshot(), set_of(&["a", "b"]));
    }

    #[test]
    fn test_add_is_idempotent() {
        let registry = FeatureRegistry::new();
        registry.add(["x"]);
        let once = registry.snapshot();
        registry.add(["x"]);
        assert_eq!(registry.snapshot(), once);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let registry = FeatureRegistry::new();
        registry.add(["a"]);
        registry.remove(["never-added"]);
        assert_eq!(registry.snapshot(), set_of(&["a"]));
    }

    #[test]
    fn test_clear_empties() {
        let registry = FeatureRegistry::new();
        registry.replace(["a", "b"]);
        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_is_independent() {
        let registry = FeatureRegistry::new();
        registry.replace(["a"]);
        let snapshot = registry.snapshot();
        registry.replace(["b", "c"]);
        assert_eq!(snapshot, set_of(&["a"]));
    }

    #[test]
    fn test_empty_mutations_are_accepted() {
        let registry = FeatureRegistry::new();
        registry.add(Vec::<String>::new());
        registry.remove(Vec::<String>::new());
        registry.replace(Vec::<String>::new());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_replace_notifies_once_with_new_snapshot() {
        let registry = FeatureRegistry::new();
        let count = Arc::new(AtomicU32::new(0));
        let seen = Arc::new(RwLock::new(FeatureSet::new()));

        let count_clone = count.clone();
        let seen_clone = seen.clone();
        let _subscription = registry.subscribe(move |change| {
            count_clone.fetch_add(1, Ordering::SeqCst);
            *seen_clone.write().unwrap() = change.current.clone();
        });

        registry.replace(["a", "b"]);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.read().unwrap(), set_of(&["a", "b"]));
    }

    #[test]
    fn test_redundant_replace_still_notifies() {
        let registry = FeatureRegistry::new();
        registry.replace(["a"]);

        let count = Arc::new(AtomicU32::new(0));
        let count_clone = count.clone();
        let _subscription = registry.subscribe(move |change| {
            assert!(change.is_redundant());
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        registry.replace(["a"]);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_add_notifies_once_per_call() {
        let registry = FeatureRegistry::new();
        let count = Arc::new(AtomicU32::new(0));
        let count_clone = count.clone();
        let _subscription = registry.subscribe(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        registry.add(["a", "b", "c"]);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // No-op add still notifies once.
        registry.add(["a"]);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_change_carries_previous_snapshot() {
        let registry = FeatureRegistry::new();
        registry.replace(["a"]);

        let previous = Arc::new(RwLock::new(FeatureSet::new()));
        let previous_clone = previous.clone();
        let _subscription = registry.subscribe(move |change| {
            *previous_clone.write().unwrap() = change.previous.clone();
        });

        registry.add(["b"]);
        assert_eq!(*previous.read().unwrap(), set_of(&["a"]));
    }

    #[test]
    fn test_cancel_stops_delivery() {
        let registry = FeatureRegistry::new();
        let count = Arc::new(AtomicU32::new(0));
        let count_clone = count.clone();
        let subscription = registry.subscribe(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        subscription.cancel();
        registry.add(["c"]);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(registry.subscriber_count(), 0);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let registry = FeatureRegistry::new();
        let subscription = registry.subscribe(|_| {});
        subscription.cancel();
        subscription.cancel();
        assert!(subscription.is_cancelled());
    }

    #[test]
    fn test_cancel_from_another_callback_suppresses_in_flight_delivery() {
        // Delivery order across subscribers is unspecified, so retry with
        // fresh registries until the cancelling observer runs first and
        // the suppression path is actually taken.
        for _ in 0..64 {
            let registry = FeatureRegistry::new();

            let victim_count = Arc::new(AtomicU32::new(0));
            let victim_count_clone = victim_count.clone();
            let victim = Arc::new(registry.subscribe(move |_| {
                victim_count_clone.fetch_add(1, Ordering::SeqCst);
            }));

            let victim_clone = victim.clone();
            let _canceller = registry.subscribe(move |_| {
                victim_clone.cancel();
            });

            registry.add(["a"]);
            if victim_count.load(Ordering::SeqCst) == 0 {
                // Cancelled during delivery of this very mutation, before
                // the victim's turn; later mutations stay invisible too.
                registry.add(["b"]);
                assert_eq!(victim_count.load(Ordering::SeqCst), 0);
                return;
            }
        }
        panic!("cancelling observer was never delivered first");
    }

    #[test]
    fn test_reentrant_mutation_notifies_in_mutation_order() {
        let registry = FeatureRegistry::new();

        // On the first delivery only, mutate the registry from inside
        // the callback.
        let registry_clone = registry.clone();
        let fired = Arc::new(AtomicBool::new(false));
        let _mutator = registry.subscribe(move |_| {
            if !fired.swap(true, Ordering::SeqCst) {
                registry_clone.add(["second"]);
            }
        });

        let observed = Arc::new(RwLock::new(Vec::new()));
        let observed_clone = observed.clone();
        let _recorder = registry.subscribe(move |change| {
            observed_clone.write().unwrap().push(change.current.clone());
        });

        registry.add(["first"]);

        // The nested mutation's notification arrives after the outer
        // one, whichever subscriber was delivered to first.
        assert_eq!(
            *observed.read().unwrap(),
            vec![set_of(&["first"]), set_of(&["first", "second"])]
        );
    }

    #[test]
    fn test_callback_observes_post_mutation_state() {
        let registry = FeatureRegistry::new();
        let registry_clone = registry.clone();
        let observed = Arc::new(AtomicBool::new(false));
        let observed_clone = observed.clone();

        let _subscription = registry.subscribe(move |_| {
            observed_clone.store(registry_clone.contains("beta"), Ordering::SeqCst);
        });

        registry.add(["beta"]);
        assert!(observed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_builder_seeds_without_notification() {
        let registry = FeatureRegistry::builder()
            .enable_logging(false)
            .with_features(["a", "b"])
            .build();
        assert_eq!(registry.snapshot(), set_of(&["a", "b"]));
        assert_eq!(registry.subscriber_count(), 0);
    }

    #[test]
    fn test_clones_share_state() {
        let registry = FeatureRegistry::new();
        let clone = registry.clone();
        registry.add(["shared"]);
        assert!(clone.contains("shared"));
    }
}
