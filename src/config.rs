//! Tracking configuration.
//!
//! Every field has a default, so a JSON file only needs the values it changes:
//!
//! ```json
//! { "intrinsics": { "fx": 718.856, "fy": 718.856, "cx": 607.19, "cy": 185.21 },
//!   "estimator": { "min_matches": 80 } }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{algorithms::Intrinsics, error::ConfigError};

/// Oriented FAST / steered BRIEF detection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Upper bound on features kept per frame.
    pub max_features: usize,
    /// FAST-9 intensity threshold.
    pub fast_threshold: u8,
    pub pyramid_levels: usize,
    /// Downscale between consecutive pyramid levels.
    pub scale_factor: f64,
    /// Non-maximum suppression radius in pixels; `0` disables it.
    pub nms_radius: u32,
    /// Corners closer than this to the border are dropped.
    pub edge_margin: u32,
    /// Gaussian sigma applied before sampling descriptors.
    pub blur_sigma: f32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_features: 1000,
            fast_threshold: 20,
            pyramid_levels: 8,
            scale_factor: 1.2,
            nms_radius: 3,
            edge_margin: 16,
            blur_sigma: 2.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Reject mutual matches with a larger Hamming distance.
    pub max_distance: Option<u32>,
}

/// Which `sample_consensus::Consensus` implementation fits the models.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsensusMethod {
    #[default]
    Ransac,
    Arrsac,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Correspondences required before estimation is attempted.
    pub min_matches: usize,
    /// Inliers required for the essential matrix to be accepted.
    pub min_inliers: usize,
    /// Sampson distance threshold in pixels.
    pub ransac_threshold: f64,
    pub ransac_confidence: f64,
    pub ransac_max_iterations: usize,
    pub consensus: ConsensusMethod,
    /// Seed for the sampler; every frame starts from it.
    pub seed: u64,
    /// Report zero translation when a rotation alone explains the matches.
    pub detect_pure_rotation: bool,
    /// Rotation-only inliers needed, as a fraction of essential-matrix inliers.
    pub pure_rotation_ratio: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            min_matches: 50,
            min_inliers: 8,
            ransac_threshold: 1.0,
            ransac_confidence: 0.999,
            ransac_max_iterations: 1000,
            consensus: ConsensusMethod::Ransac,
            seed: 42,
            detect_pure_rotation: true,
            pure_rotation_ratio: 0.9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OdometryConfig {
    pub intrinsics: Intrinsics,
    pub extractor: ExtractorConfig,
    pub matcher: MatcherConfig,
    pub estimator: EstimatorConfig,
    /// Fixed multiplier on every unit-length translation step.
    pub scale: f64,
    pub trajectory_capacity: usize,
}

impl Default for OdometryConfig {
    fn default() -> Self {
        Self {
            intrinsics: Intrinsics::default(),
            extractor: ExtractorConfig::default(),
            matcher: MatcherConfig::default(),
            estimator: EstimatorConfig::default(),
            scale: 1.0,
            trajectory_capacity: 1000,
        }
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

impl OdometryConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let k = &self.intrinsics;
        for (field, value) in [("intrinsics.fx", k.fx), ("intrinsics.fy", k.fy)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid(field, format!("focal length must be positive, got {value}")));
            }
        }
        if !(k.cx.is_finite() && k.cy.is_finite()) {
            return Err(invalid("intrinsics", "principal point must be finite"));
        }

        let extractor = &self.extractor;
        if extractor.pyramid_levels == 0 {
            return Err(invalid("extractor.pyramid_levels", "need at least one level"));
        }
        if !(extractor.scale_factor.is_finite() && extractor.scale_factor > 1.0) {
            return Err(invalid(
                "extractor.scale_factor",
                format!("must be greater than 1, got {}", extractor.scale_factor),
            ));
        }
        if !(extractor.blur_sigma.is_finite() && extractor.blur_sigma > 0.0) {
            return Err(invalid("extractor.blur_sigma", "must be positive"));
        }

        let estimator = &self.estimator;
        if estimator.min_inliers < 8 {
            return Err(invalid(
                "estimator.min_inliers",
                "the 8-point solver needs at least 8 inliers",
            ));
        }
        if estimator.min_matches < estimator.min_inliers {
            return Err(invalid(
                "estimator.min_matches",
                format!("must be at least min_inliers ({})", estimator.min_inliers),
            ));
        }
        if !(estimator.ransac_threshold.is_finite() && estimator.ransac_threshold > 0.0) {
            return Err(invalid("estimator.ransac_threshold", "must be positive"));
        }
        if !(estimator.ransac_confidence > 0.0 && estimator.ransac_confidence < 1.0) {
            return Err(invalid("estimator.ransac_confidence", "must lie in (0, 1)"));
        }
        if estimator.ransac_max_iterations == 0 {
            return Err(invalid("estimator.ransac_max_iterations", "must be positive"));
        }
        if !(estimator.pure_rotation_ratio > 0.0 && estimator.pure_rotation_ratio <= 1.0) {
            return Err(invalid("estimator.pure_rotation_ratio", "must lie in (0, 1]"));
        }

        if !self.scale.is_finite() {
            return Err(invalid("scale", "must be finite"));
        }
        if self.trajectory_capacity == 0 {
            return Err(invalid("trajectory_capacity", "must hold at least one point"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = OdometryConfig::default();
        config.validate().expect("defaults validate");
        assert_eq!(config.estimator.min_matches, 50);
        assert_eq!(config.extractor.max_features, 1000);
        assert_eq!(config.trajectory_capacity, 1000);
        assert_eq!(config.scale, 1.0);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = OdometryConfig::from_json_str(
            r#"{ "scale": 0.5, "estimator": { "min_matches": 80, "consensus": "arrsac" } }"#,
        )
        .expect("valid config");

        assert_eq!(config.scale, 0.5);
        assert_eq!(config.estimator.min_matches, 80);
        assert_eq!(config.estimator.consensus, ConsensusMethod::Arrsac);
        assert_eq!(config.estimator.ransac_threshold, 1.0);
        assert_eq!(config.intrinsics, Intrinsics::default());
    }

    #[test]
    fn json_round_trip() {
        let config = OdometryConfig::default();
        let json = config.to_json_pretty().expect("serializes");
        assert_eq!(OdometryConfig::from_json_str(&json).expect("parses"), config);
    }

    #[test]
    fn rejects_invalid_values() {
        let err = OdometryConfig::from_json_str(r#"{ "trajectory_capacity": 0 }"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "trajectory_capacity",
                ..
            }
        ));

        let err =
            OdometryConfig::from_json_str(r#"{ "intrinsics": { "fx": -1, "fy": 500, "cx": 0, "cy": 0 } }"#)
                .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "intrinsics.fx", .. }));

        assert!(matches!(
            OdometryConfig::from_json_str("{ not json").unwrap_err(),
            ConfigError::Parse(_)
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = OdometryConfig::from_json_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
