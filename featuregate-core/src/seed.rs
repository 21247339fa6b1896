//! Seed loading
//!
//! Boot-time sources for the initial feature set: an environment variable
//! with comma-separated names, or a JSON array of strings. The registry
//! itself never persists or reloads anything at runtime.

use std::path::Path;

use tracing::debug;

use crate::registry::FeatureSet;

/// Seed loading errors
#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("failed to read seed file: {0}")]
    Read(#[from] std::io::Error),

    #[error("invalid seed JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Initial feature set loaded from configuration
#[derive(Debug, Clone, Default)]
pub struct Seed {
    features: FeatureSet,
}

impl Seed {
    /// Parse a comma-separated list of names
    ///
    /// Names are trimmed and blanks dropped, so `"beta, gamma,"` yields
    /// `{"beta", "gamma"}`. This is the format the env source uses and is
    /// also suitable for markup attribute values.
    pub fn from_list(raw: &str) -> Self {
        let features = raw
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from)
            .collect();
        Self { features }
    }

    /// Read a comma-separated list from an environment variable
    ///
    /// A missing or empty variable yields an empty seed, not an error.
    pub fn from_env(var: &str) -> Self {
        match std::env::var(var) {
            Ok(raw) => {
                let seed = Self::from_list(&raw);
                debug!("Loaded {} feature(s) from {}", seed.features.len(), var);
                seed
            }
            Err(_) => Self::default(),
        }
    }

    /// Parse a JSON array of feature names
    pub fn from_json_str(raw: &str) -> Result<Self, SeedError> {
        let names: Vec<String> = serde_json::from_str(raw)?;
        Ok(Self {
            features: names.into_iter().collect(),
        })
    }

    /// Read and parse a JSON seed file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SeedError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// The loaded names
    pub fn features(&self) -> &FeatureSet {
        &self.features
    }

    /// Consume the seed, yielding the loaded names
    pub fn into_features(self) -> FeatureSet {
        self.features
    }
}
