use crate::{SimstoreError, SimstoreResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tunables for the query engine.
///
/// Every field has a default so that a partial `[engine]` table (or none at
/// all) is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Fixed vector dimension. `None` lets the first insert decide.
    #[serde(default)]
    pub dimension: Option<usize>,
    /// Maximum number of cached embeddings.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// Collections larger than this are searched through the clustered index.
    #[serde(default = "default_index_threshold")]
    pub index_threshold: usize,
    /// Number of k-means clusters. `None` picks `ceil(sqrt(n))`.
    #[serde(default)]
    pub num_clusters: Option<usize>,
    /// How many of the nearest clusters a query probes.
    #[serde(default = "default_probe_clusters")]
    pub probe_clusters: usize,
    /// Iteration cap for k-means.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Overflow share of the collection that triggers a rebuild.
    #[serde(default = "default_rebuild_overflow_ratio")]
    pub rebuild_overflow_ratio: f64,
    /// Build or rebuild the clustered index automatically after ingest.
    #[serde(default = "default_auto_rebuild")]
    pub auto_rebuild: bool,
    /// Semantic weight used when a query does not set one.
    #[serde(default = "default_semantic_weight")]
    pub default_semantic_weight: f64,
    /// Upper bound on a single embedding call, in milliseconds.
    #[serde(default)]
    pub embed_timeout_ms: Option<u64>,
    /// Seed for k-means centroid initialization.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_cache_capacity() -> usize {
    10_000
}
fn default_index_threshold() -> usize {
    10_000
}
fn default_probe_clusters() -> usize {
    4
}
fn default_max_iterations() -> usize {
    25
}
fn default_rebuild_overflow_ratio() -> f64 {
    0.10
}
fn default_auto_rebuild() -> bool {
    true
}
fn default_semantic_weight() -> f64 {
    1.0
}
fn default_seed() -> u64 {
    0x5eed_cafe
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dimension: None,
            cache_capacity: default_cache_capacity(),
            index_threshold: default_index_threshold(),
            num_clusters: None,
            probe_clusters: default_probe_clusters(),
            max_iterations: default_max_iterations(),
            rebuild_overflow_ratio: default_rebuild_overflow_ratio(),
            auto_rebuild: default_auto_rebuild(),
            default_semantic_weight: default_semantic_weight(),
            embed_timeout_ms: None,
            seed: default_seed(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> SimstoreResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| SimstoreError::Config(format!("Invalid engine config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> SimstoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SimstoreError::Config(format!(
                "Failed to read config '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> SimstoreResult<()> {
        if self.dimension == Some(0) {
            return Err(SimstoreError::Config("dimension must be at least 1".into()));
        }
        if self.cache_capacity == 0 {
            return Err(SimstoreError::Config(
                "cache_capacity must be at least 1".into(),
            ));
        }
        if self.num_clusters == Some(0) {
            return Err(SimstoreError::Config("num_clusters must be at least 1".into()));
        }
        if self.probe_clusters == 0 {
            return Err(SimstoreError::Config(
                "probe_clusters must be at least 1".into(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(SimstoreError::Config(
                "max_iterations must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.rebuild_overflow_ratio) {
            return Err(SimstoreError::Config(format!(
                "rebuild_overflow_ratio must be within [0, 1], got {}",
                self.rebuild_overflow_ratio
            )));
        }
        if !(0.0..=1.0).contains(&self.default_semantic_weight) {
            return Err(SimstoreError::Config(format!(
                "default_semantic_weight must be within [0, 1], got {}",
                self.default_semantic_weight
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.max_iterations, 25);
        assert!(config.auto_rebuild);
    }

    #[test]
    fn test_partial_toml() {
        let config = EngineConfig::from_toml_str(
            r#"
            cache_capacity = 2
            probe_clusters = 8
            embed_timeout_ms = 1500
            "#,
        )
        .unwrap();
        assert_eq!(config.cache_capacity, 2);
        assert_eq!(config.probe_clusters, 8);
        assert_eq!(config.embed_timeout_ms, Some(1500));
        assert_eq!(config.index_threshold, 10_000);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(EngineConfig::from_toml_str("cache_capacity = 0").is_err());
        assert!(EngineConfig::from_toml_str("probe_clusters = 0").is_err());
        assert!(EngineConfig::from_toml_str("rebuild_overflow_ratio = 1.5").is_err());
        assert!(EngineConfig::from_toml_str("default_semantic_weight = -0.1").is_err());
        assert!(EngineConfig::from_toml_str("dimension = 0").is_err());
    }

    #[test]
    fn test_unknown_type_is_config_error() {
        let err = EngineConfig::from_toml_str("cache_capacity = \"lots\"").unwrap_err();
        assert!(matches!(err, SimstoreError::Config(_)));
    }
}
