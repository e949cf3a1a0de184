//! Error types for the eg-app service layer.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use eg_cache::CacheError;
use eg_der::DerError;
use eg_graph::GraphError;
use eg_network::NetworkError;
use eg_project::ValidationError;
use eg_solver::SolverError;

/// Stable classification of a failed scenario, independent of which
/// stage produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    DuplicateElement,
    DanglingReference,
    InvalidTopology,
    Linearization,
    ProfileAlignment,
    CacheBuildTimeout,
    InvalidData,
    DataSource,
}

impl ErrorKind {
    /// Only a timed-out build is worth retrying unchanged.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::CacheBuildTimeout)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::DuplicateElement => "duplicate_element",
            ErrorKind::DanglingReference => "dangling_reference",
            ErrorKind::InvalidTopology => "invalid_topology",
            ErrorKind::Linearization => "linearization",
            ErrorKind::ProfileAlignment => "profile_alignment",
            ErrorKind::CacheBuildTimeout => "cache_build_timeout",
            ErrorKind::InvalidData => "invalid_data",
            ErrorKind::DataSource => "data_source",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of one scenario. Cloned out of the cache for every caller that
/// waited on the same build.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScenarioError {
    #[error("Scenario not found: {0}")]
    NotFound(String),

    #[error("Failed to load scenario '{scenario}': {reason}")]
    Source { scenario: String, reason: String },

    #[error("Scenario validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Network model error: {0}")]
    Network(#[from] NetworkError),

    #[error("DER model error: {0}")]
    Der(#[from] DerError),

    #[error("Linearization error: {0}")]
    Linearization(#[from] SolverError),

    #[error("Failed to fingerprint scenario '{scenario}': {reason}")]
    Fingerprint { scenario: String, reason: String },

    #[error("Model build for '{scenario}' exceeded {waited:?}")]
    CacheBuildTimeout { scenario: String, waited: Duration },

    #[error("Worker for scenario '{scenario}' panicked: {message}")]
    WorkerPanic { scenario: String, message: String },
}

impl ScenarioError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScenarioError::NotFound(_) | ScenarioError::Source { .. } => ErrorKind::DataSource,
            ScenarioError::Validation(_)
            | ScenarioError::Fingerprint { .. }
            | ScenarioError::WorkerPanic { .. } => ErrorKind::InvalidData,
            ScenarioError::Network(err) => network_kind(err),
            ScenarioError::Der(err) => match err {
                DerError::ProfileAlignment { .. } => ErrorKind::ProfileAlignment,
                _ => ErrorKind::InvalidData,
            },
            ScenarioError::Linearization(err) => match err {
                SolverError::Network(inner) => network_kind(inner),
                _ if err.is_linearization_failure() => ErrorKind::Linearization,
                _ => ErrorKind::InvalidData,
            },
            ScenarioError::CacheBuildTimeout { .. } => ErrorKind::CacheBuildTimeout,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Convert a cache outcome for `scenario` into a scenario error.
    pub fn from_cache(scenario: &str, err: CacheError<ScenarioError>) -> Self {
        match err {
            CacheError::Build(shared) => (*shared).clone(),
            CacheError::BuildTimeout { waited, .. } => ScenarioError::CacheBuildTimeout {
                scenario: scenario.to_string(),
                waited,
            },
        }
    }
}

fn network_kind(err: &NetworkError) -> ErrorKind {
    match err {
        NetworkError::Graph(GraphError::DuplicateElement { .. }) => ErrorKind::DuplicateElement,
        NetworkError::Graph(GraphError::DanglingReference { .. }) => ErrorKind::DanglingReference,
        NetworkError::Graph(GraphError::InvalidTopology { .. }) => ErrorKind::InvalidTopology,
        _ => ErrorKind::InvalidData,
    }
}

/// Errors outside any single scenario: configuration and process setup.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Failed to read config file: {path}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Project error: {0}")]
    Project(String),

    #[error("Failed to start worker pool: {0}")]
    ThreadPool(String),

    #[error("{failed} of {total} scenarios failed")]
    ScenariosFailed { failed: usize, total: usize },

    #[error(transparent)]
    Scenario(#[from] ScenarioError),
}

/// Result type for eg-app operations.
pub type AppResult<T> = Result<T, AppError>;

impl From<eg_project::ProjectError> for AppError {
    fn from(err: eg_project::ProjectError) -> Self {
        AppError::Project(err.to_string())
    }
}

impl From<NetworkError> for AppError {
    fn from(err: NetworkError) -> Self {
        AppError::Scenario(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eg_graph::ElementCategory;
    use std::sync::Arc;

    #[test]
    fn structural_errors_keep_their_kind() {
        let dup: ScenarioError = NetworkError::from(GraphError::DuplicateElement {
            category: ElementCategory::Node,
            name: "n1".into(),
        })
        .into();
        assert_eq!(dup.kind(), ErrorKind::DuplicateElement);

        let dangling: ScenarioError = SolverError::Network(NetworkError::from(
            GraphError::DanglingReference {
                category: ElementCategory::Der,
                name: "d1".into(),
                target_category: ElementCategory::Node,
                target: "nowhere".into(),
            },
        ))
        .into();
        assert_eq!(dangling.kind(), ErrorKind::DanglingReference);
        assert!(!dangling.is_retryable());
    }

    #[test]
    fn numerical_failures_are_linearization() {
        let err: ScenarioError = SolverError::Islanded {
            rows: vec!["n3.a".into()],
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Linearization);
    }

    #[test]
    fn timeout_is_the_only_retryable_kind() {
        let err = ScenarioError::from_cache(
            "s1",
            CacheError::BuildTimeout {
                key: "abc".into(),
                waited: Duration::from_secs(3),
            },
        );
        assert_eq!(err.kind(), ErrorKind::CacheBuildTimeout);
        assert!(err.is_retryable());

        let shared = Arc::new(ScenarioError::NotFound("s1".into()));
        let err = ScenarioError::from_cache("s1", CacheError::Build(shared));
        assert_eq!(err, ScenarioError::NotFound("s1".into()));
        assert_eq!(err.kind(), ErrorKind::DataSource);
        assert!(!err.is_retryable());
    }
}
