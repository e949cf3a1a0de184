//! Scenario sources: where scenario records come from.
//!
//! A source hands out immutable snapshots together with a data version.
//! The version changes whenever the underlying records change, so cached
//! models built from an older snapshot are never reused for newer data.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use eg_project::{ProjectError, ScenarioDef};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use crate::error::ScenarioError;

/// One read-only view of a scenario's records.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioSnapshot {
    pub scenario: ScenarioDef,
    pub data_version: String,
}

pub trait ScenarioSource: Send + Sync {
    fn load(&self, name: &str) -> Result<ScenarioSnapshot, ScenarioError>;

    /// Names of every scenario this source can load, sorted.
    fn list(&self) -> Result<Vec<String>, ScenarioError>;
}

/// A directory holding one `<name>.yaml` per scenario.
///
/// The data version is the SHA-256 of the file bytes.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scenario_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.yaml"))
    }
}

impl ScenarioSource for DirectorySource {
    fn load(&self, name: &str) -> Result<ScenarioSnapshot, ScenarioError> {
        let path = self.scenario_path(name);
        let bytes = std::fs::read(&path).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => ScenarioError::NotFound(name.to_string()),
            _ => source_error(name, format!("{}: {err}", path.display())),
        })?;
        let content = std::str::from_utf8(&bytes)
            .map_err(|err| source_error(name, format!("{}: {err}", path.display())))?;
        let scenario = eg_project::parse_yaml(content).map_err(|err| match err {
            ProjectError::Validation(v) => ScenarioError::Validation(v),
            other => source_error(name, other.to_string()),
        })?;
        if scenario.name != name {
            tracing::warn!(
                file = %path.display(),
                declared = %scenario.name,
                "scenario name differs from file name"
            );
        }

        Ok(ScenarioSnapshot {
            scenario,
            data_version: format!("{:x}", Sha256::digest(&bytes)),
        })
    }

    fn list(&self) -> Result<Vec<String>, ScenarioError> {
        let entries = std::fs::read_dir(&self.root).map_err(|err| ScenarioError::Source {
            scenario: "*".to_string(),
            reason: format!("{}: {err}", self.root.display()),
        })?;
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "yaml"))
            .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).map(String::from))
            .collect();
        names.sort();
        Ok(names)
    }
}

fn source_error(name: &str, reason: String) -> ScenarioError {
    ScenarioError::Source {
        scenario: name.to_string(),
        reason,
    }
}

/// Scenarios held in memory, keyed by scenario name.
///
/// Every insert bumps a revision counter that serves as the data version.
#[derive(Debug, Default)]
pub struct InMemorySource {
    scenarios: RwLock<BTreeMap<String, (ScenarioDef, u64)>>,
    revision: RwLock<u64>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scenario(self, scenario: ScenarioDef) -> Self {
        self.insert(scenario);
        self
    }

    /// Add or replace a scenario; returns its new revision.
    pub fn insert(&self, scenario: ScenarioDef) -> u64 {
        let mut revision = self.revision.write();
        *revision += 1;
        self.scenarios
            .write()
            .insert(scenario.name.clone(), (scenario, *revision));
        *revision
    }

    pub fn remove(&self, name: &str) -> bool {
        self.scenarios.write().remove(name).is_some()
    }
}

impl ScenarioSource for InMemorySource {
    fn load(&self, name: &str) -> Result<ScenarioSnapshot, ScenarioError> {
        let scenarios = self.scenarios.read();
        let (scenario, revision) = scenarios
            .get(name)
            .ok_or_else(|| ScenarioError::NotFound(name.to_string()))?;
        Ok(ScenarioSnapshot {
            scenario: scenario.clone(),
            data_version: format!("rev-{revision}"),
        })
    }

    fn list(&self) -> Result<Vec<String>, ScenarioError> {
        Ok(self.scenarios.read().keys().cloned().collect())
    }
}
