//! Error types for cached model construction.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::fingerprint::Fingerprint;

/// Outcome of a failed `get_or_build`.
///
/// `Build` carries the builder's own error, shared by every caller that
/// waited on the same build.
#[derive(Error, Debug)]
pub enum CacheError<E> {
    #[error("Model build failed: {0}")]
    Build(Arc<E>),

    #[error("Build of '{key}' still running after {waited:?}; slot released")]
    BuildTimeout { key: Fingerprint, waited: Duration },
}

impl<E> Clone for CacheError<E> {
    fn clone(&self) -> Self {
        match self {
            CacheError::Build(e) => CacheError::Build(Arc::clone(e)),
            CacheError::BuildTimeout { key, waited } => CacheError::BuildTimeout {
                key: key.clone(),
                waited: *waited,
            },
        }
    }
}

impl<E> CacheError<E> {
    /// Timeouts are recoverable by retrying; build failures are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CacheError::BuildTimeout { .. })
    }

    /// The builder error, if this is a build failure.
    pub fn build_error(&self) -> Option<&E> {
        match self {
            CacheError::Build(e) => Some(e),
            CacheError::BuildTimeout { .. } => None,
        }
    }
}

pub type CacheResult<T, E> = Result<T, CacheError<E>>;
