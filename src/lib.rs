// Featuregate - feature toggling for conditional UI rendering
//
// This library provides a shared feature registry, an evaluation engine
// with explicit-list precedence, and change subscriptions for UI bindings.

// Re-export core functionality
pub use featuregate_core::*;
