//! # Unified Configuration System
//!
//! Configuration for the scene tree, the resource loader, and engine-wide
//! behaviour such as logging. All structures are serde-serializable and load
//! from TOML or RON through the [`Config`] trait.
//!
//! ## Configuration Categories
//!
//! - **Scene Config**: root node, sibling naming, deferred command flushing
//! - **Resource Config**: search paths and caching for the resource loader
//! - **Engine Config**: top-level wrapper plus the log filter

use serde::{Serialize, Deserialize};

pub use crate::config::{Config, ConfigError, ConfigFormat};

/// # Scene Configuration
///
/// Controls how a [`SceneTree`](crate::scene::SceneTree) is bootstrapped and
/// how it processes queued work.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Name given to the root node
    pub root_name: String,
    /// Registered type the root node is constructed from
    pub root_type: String,
    /// Rename colliding siblings on attach (`Name`, `Name2`, ...)
    pub unique_names: bool,
    /// Maximum number of deferred-queue passes per flush
    pub deferred_flush_limit: usize,
}

impl SceneConfig {
    /// Create a new scene configuration
    pub fn new() -> Self {
        Self {
            root_name: "root".to_string(),
            root_type: "Node".to_string(),
            unique_names: true,
            deferred_flush_limit: 64,
        }
    }

    /// Set the root node name
    pub fn with_root_name(mut self, name: impl Into<String>) -> Self {
        self.root_name = name.into();
        self
    }

    /// Set the root node type
    pub fn with_root_type(mut self, type_name: impl Into<String>) -> Self {
        self.root_type = type_name.into();
        self
    }

    /// Enable or disable sibling name deduplication
    pub fn with_unique_names(mut self, enabled: bool) -> Self {
        self.unique_names = enabled;
        self
    }

    /// Set the deferred flush pass limit
    pub fn with_deferred_flush_limit(mut self, passes: usize) -> Self {
        self.deferred_flush_limit = passes;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.root_name.is_empty() {
            return Err(ConfigError::Invalid("root name cannot be empty".to_string()));
        }
        if self.root_name.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "root name '{}' cannot contain '/'",
                self.root_name
            )));
        }
        if self.root_type.is_empty() {
            return Err(ConfigError::Invalid("root type cannot be empty".to_string()));
        }
        if self.deferred_flush_limit == 0 {
            return Err(ConfigError::Invalid(
                "deferred flush limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// # Resource Configuration
///
/// Configuration for the resource loader collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// Directories searched, in order, for relative resource paths
    pub search_paths: Vec<String>,
    /// Whether loaded resources are cached by path
    pub enable_caching: bool,
}

impl ResourceConfig {
    /// Create a new resource configuration
    pub fn new() -> Self {
        Self {
            search_paths: vec!["resources".to_string(), ".".to_string()],
            enable_caching: true,
        }
    }

    /// Replace the search paths
    pub fn with_search_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Configure caching
    pub fn with_caching(mut self, enabled: bool) -> Self {
        self.enable_caching = enabled;
        self
    }
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// # Engine Configuration
///
/// Top-level configuration that encompasses all subsystems.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default log filter (overridden by `RUST_LOG`)
    pub log_level: String,
    /// Scene tree configuration
    pub scene: SceneConfig,
    /// Resource loader configuration
    pub resources: ResourceConfig,
}

impl EngineConfig {
    /// Create a new engine configuration with defaults
    pub fn new() -> Self {
        Self {
            log_level: "info".to_string(),
            scene: SceneConfig::default(),
            resources: ResourceConfig::default(),
        }
    }

    /// Set log level
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Set scene configuration
    pub fn with_scene(mut self, scene: SceneConfig) -> Self {
        self.scene = scene;
        self
    }

    /// Set resource configuration
    pub fn with_resources(mut self, resources: ResourceConfig) -> Self {
        self.resources = resources;
        self
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scene.validate()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl Config for EngineConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_scene_config() {
        let config = SceneConfig::new().with_root_name("a/b");
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = SceneConfig::new().with_deferred_flush_limit(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let text = r#"
            log_level = "debug"

            [scene]
            root_name = "world"
        "#;
        let config = EngineConfig::from_str_with_format(text, ConfigFormat::Toml).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.scene.root_name, "world");
        assert_eq!(config.scene.root_type, "Node");
        assert!(config.resources.enable_caching);
    }

    #[test]
    fn test_ron_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.ron");

        let config = EngineConfig::new()
            .with_log_level("trace")
            .with_scene(SceneConfig::new().with_unique_names(false));
        config.save_to_file(&path).unwrap();

        let loaded = EngineConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.log_level, "trace");
        assert!(!loaded.scene.unique_names);
    }

    #[test]
    fn test_unsupported_extension() {
        let result = EngineConfig::load_from_file("engine.json");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }
}
