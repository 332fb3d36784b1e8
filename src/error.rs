use std::path::PathBuf;

use thiserror::Error;

/// Why a frame did not produce a relative motion.
///
/// Both variants are expected, per-frame outcomes; the tracker skips the pose
/// update and carries on with the next frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MotionError {
    /// Fewer correspondences than the gating threshold.
    #[error("need at least {required} correspondences, got {found}")]
    InsufficientMatches { found: usize, required: usize },
    /// No consensus essential matrix, too few inliers, or no pose passed the cheirality check.
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),
}

/// Errors raised while loading or validating an [`OdometryConfig`](crate::config::OdometryConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Errors raised while writing a trajectory to disk.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to serialize trajectory: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
