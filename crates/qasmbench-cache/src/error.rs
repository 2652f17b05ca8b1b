//! Error handling for the build cache.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors raised by the cache itself.
#[derive(Error, Debug)]
pub enum CacheError {
    /// A cache must hold at least one entry.
    #[error("Cache capacity must be at least 1")]
    InvalidCapacity,

    /// Filesystem failure under the cache directory.
    #[error("Cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The on-disk index could not be written.
    #[error("Cache index error: {0}")]
    Index(#[from] serde_json::Error),

    /// The builder failed; nothing was cached.
    #[error(transparent)]
    Build(#[from] BuildError),
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors raised while producing an artifact.
#[derive(Error, Debug)]
pub enum BuildError {
    /// The build tool could not be started.
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The build tool ran and reported failure.
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    /// The build succeeded but the expected artifact is not there.
    #[error("Build artifact not found: {0}")]
    MissingArtifact(PathBuf),

    /// Build inputs could not be read for fingerprinting.
    #[error("Failed to fingerprint {path}: {source}")]
    Fingerprint {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Any other builder failure.
    #[error("Build failed: {0}")]
    Other(String),
}
