//! Application configuration.

use std::path::Path;

use eg_cache::CacheConfig;
use eg_solver::LinearizationSettings;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Worker pool settings for multi-scenario runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ParallelConfig {
    pub enable: bool,
    /// Worker threads; 0 lets the pool pick one per core.
    pub threads: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub cache: CacheConfig,
    pub linearization: LinearizationSettings,
    pub parallel: ParallelConfig,
}

impl AppConfig {
    pub fn parse(content: &str, path: &Path) -> AppResult<Self> {
        serde_yaml::from_str(content).map_err(|source| AppError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| AppError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eg_solver::{LinearizationMethod, ReferenceKind};

    #[test]
    fn partial_config_fills_defaults() {
        let yaml = "cache:\n  expiry_time: 60\nlinearization:\n  method: jacobian\nparallel:\n  enable: true\n";
        let config = AppConfig::parse(yaml, Path::new("inline.yaml")).unwrap();
        assert!(config.cache.enable);
        assert!(!config.cache.reset_cache);
        assert_eq!(config.cache.expiry_time, 60);
        assert_eq!(config.linearization.method, LinearizationMethod::Jacobian);
        assert_eq!(config.linearization.reference, ReferenceKind::NoLoad);
        assert!(config.parallel.enable);
        assert_eq!(config.parallel.threads, 0);
    }

    #[test]
    fn empty_document_is_default() {
        let config = AppConfig::parse("{}", Path::new("inline.yaml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn bad_yaml_names_the_file() {
        let err = AppConfig::parse("cache: [1, 2", Path::new("broken.yaml")).unwrap_err();
        assert!(err.to_string().contains("broken.yaml"));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let path = std::env::temp_dir().join("eg_app_config_missing.yaml");
        let _ = std::fs::remove_file(&path);
        assert!(matches!(
            AppConfig::load(&path),
            Err(AppError::ConfigRead { .. })
        ));
    }
}
