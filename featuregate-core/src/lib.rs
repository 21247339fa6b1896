//! Feature Registry and Evaluation Engine for Featuregate
//!
//! A shared, mutable registry of enabled feature names plus a stateless
//! evaluation engine, built for UI layers that conditionally render
//! content and re-evaluate whenever the registry changes.
//!
//! # Features
//!
//! - 🗂️ **Feature Registry** - One shared set of enabled names with
//!   replace/add/remove/clear mutation
//! - ✅ **Evaluation Engine** - Explicit-list-over-registry precedence
//!   with exact string matching
//! - 🔔 **Change Notifications** - Synchronous publish/subscribe on every
//!   mutation, no polling
//! - 🌱 **Seeding** - Initial feature set from env vars or JSON files
//!
//! # Quick Start
//!
//! ```
//! use featuregate_core::{FeatureEngine, FeatureRegistry};
//!
//! let registry = FeatureRegistry::new();
//! let engine = FeatureEngine::new(registry.clone());
//!
//! registry.replace(["beta", "gamma"]);
//! assert!(engine.is_enabled("beta"));
//!
//! // A UI element with its own feature list ignores the registry.
//! let scoped: &[&str] = &["alpha"];
//! assert!(!engine.check("beta", Some(scoped)));
//!
//! // An empty explicit list allows nothing.
//! let none: &[&str] = &[];
//! assert!(!engine.check("beta", Some(none)));
//! ```
//!
//! # Reacting to Changes
//!
//! ```
//! use featuregate_core::{FeatureEngine, FeatureRegistry};
//!
//! let registry = FeatureRegistry::new();
//! let engine = FeatureEngine::new(registry.clone());
//!
//! // A binding layer subscribes on mount and re-checks on every change.
//! let subscription = engine.subscribe(|change| {
//!     let visible = change.current.contains("new-ui");
//!     let _ = visible; // show or hide the element
//! });
//!
//! registry.add(["new-ui"]);
//!
//! // ...and cancels on unmount.
//! subscription.cancel();
//! ```
//!
//! # Seeding
//!
//! ```
//! use featuregate_core::{FeatureRegistry, Seed};
//!
//! let registry = FeatureRegistry::builder()
//!     .with_seed(Seed::from_list("beta, gamma"))
//!     .with_seed(Seed::from_env("FEATUREGATE_FEATURES"))
//!     .build();
//! assert!(registry.contains("beta"));
//! ```

pub mod engine;
pub mod registry;
pub mod seed;

pub use engine::FeatureEngine;
pub use registry::{
    FeatureChange, FeatureRegistry, FeatureRegistryBuilder, FeatureSet, RegistryConfig,
    SubscriptionHandle,
};
pub use seed::{Seed, SeedError};
