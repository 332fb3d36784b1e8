use arrsac::Arrsac;
use nalgebra::{Matrix3, Point2, Rotation3, Vector3};
use rand::{rngs::StdRng, SeedableRng};
use sample_consensus::{Consensus, Estimator, Model};

use crate::{
    algorithms::{
        camera::disambiguate_camera_pose,
        epipolar::{
            decompose_essential, essential_8point, fundamental_from_essential,
            rotation_from_bearings, sampson_distance,
        },
        ransac::Ransac,
        Intrinsics,
    },
    config::{ConsensusMethod, EstimatorConfig},
    error::MotionError,
    slam::{features::FeatureSet, matcher::Correspondence},
};

/// Pixel coordinates of one correspondence.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointPair {
    pub prev: Point2<f64>,
    pub cur: Point2<f64>,
}

/// Resolve correspondences into pixel pairs. Indices that do not exist in either set are skipped.
pub fn point_pairs(prev: &FeatureSet, cur: &FeatureSet, matches: &[Correspondence]) -> Vec<PointPair> {
    matches
        .iter()
        .filter_map(|m| {
            Some(PointPair {
                prev: prev.get(m.prev)?.keypoint.point(),
                cur: cur.get(m.cur)?.keypoint.point(),
            })
        })
        .collect()
}

/// Motion of the camera between two consecutive frames.
///
/// A point `X_cur` in the current camera frame sits at `rotation * X_cur + translation`
/// in the previous camera frame. The translation is unit length, or zero when the
/// frames are related by a rotation alone.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RelativeMotion {
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
}

/// Which model explained the correspondences.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MotionModel {
    /// Essential matrix decomposition; unit translation.
    General,
    /// Rotation-only homography; zero translation.
    PureRotation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MotionEstimate {
    pub motion: RelativeMotion,
    pub model: MotionModel,
    /// Indices into the pairs handed to [`MotionEstimator::estimate`].
    pub inliers: Vec<usize>,
}

/// Essential matrix together with its pixel-space fundamental matrix.
#[derive(Clone, Copy, Debug)]
pub struct EssentialModel {
    pub essential: Matrix3<f64>,
    pub fundamental: Matrix3<f64>,
}

impl Model<PointPair> for EssentialModel {
    /// Sampson distance to the epipolar constraint, in pixels
    fn residual(&self, data: &PointPair) -> f64 {
        sampson_distance(&self.fundamental, &data.prev, &data.cur)
    }
}

/// Normalized 8-point solver on calibrated coordinates.
pub struct EssentialMatrixEstimator {
    intrinsics: Intrinsics,
}

impl EssentialMatrixEstimator {
    pub fn new(intrinsics: Intrinsics) -> Self {
        Self { intrinsics }
    }
}

impl Estimator<PointPair> for EssentialMatrixEstimator {
    const MIN_SAMPLES: usize = 8;
    type Model = EssentialModel;
    type ModelIter = Option<EssentialModel>;

    fn estimate<I>(&self, data: I) -> Self::ModelIter
    where
        I: Iterator<Item = PointPair> + Clone,
    {
        let (prev, cur): (Vec<_>, Vec<_>) = data
            .map(|pair| (self.intrinsics.normalize(&pair.prev), self.intrinsics.normalize(&pair.cur)))
            .unzip();

        let essential = essential_8point(&prev, &cur)?;
        Some(EssentialModel {
            essential,
            fundamental: fundamental_from_essential(&essential, &self.intrinsics.inverse()),
        })
    }
}

/// Camera rotation with the infinite homography `K R K^-1` it induces.
#[derive(Clone, Copy, Debug)]
pub struct RotationModel {
    pub rotation: Rotation3<f64>,
    pub homography: Matrix3<f64>,
}

impl Model<PointPair> for RotationModel {
    /// First-order geometric error in pixels: the transfer error into the previous image,
    /// shared between both images so it is on the same footing as the Sampson distance.
    fn residual(&self, data: &PointPair) -> f64 {
        let mapped = self.homography * Vector3::new(data.cur.x, data.cur.y, 1.0);
        if mapped.z.abs() <= f64::EPSILON {
            return f64::INFINITY;
        }
        let (x, y) = (mapped.x / mapped.z, mapped.y / mapped.z);
        ((x - data.prev.x).powi(2) + (y - data.prev.y).powi(2)).sqrt() * std::f64::consts::FRAC_1_SQRT_2
    }
}

/// Two-point rotation solver on bearing vectors.
pub struct RotationEstimator {
    intrinsics: Intrinsics,
}

impl RotationEstimator {
    pub fn new(intrinsics: Intrinsics) -> Self {
        Self { intrinsics }
    }
}

impl Estimator<PointPair> for RotationEstimator {
    const MIN_SAMPLES: usize = 2;
    type Model = RotationModel;
    type ModelIter = Option<RotationModel>;

    fn estimate<I>(&self, data: I) -> Self::ModelIter
    where
        I: Iterator<Item = PointPair> + Clone,
    {
        let (prev, cur): (Vec<_>, Vec<_>) = data
            .map(|pair| (self.intrinsics.bearing(&pair.prev), self.intrinsics.bearing(&pair.cur)))
            .unzip();

        let rotation = rotation_from_bearings(&prev, &cur)?;
        Some(RotationModel {
            rotation,
            homography: self.intrinsics.matrix() * rotation.matrix() * self.intrinsics.inverse(),
        })
    }
}

/// Robust relative pose from pixel correspondences.
#[derive(Clone, Debug)]
pub struct MotionEstimator {
    intrinsics: Intrinsics,
    config: EstimatorConfig,
}

impl MotionEstimator {
    pub fn new(intrinsics: Intrinsics, config: EstimatorConfig) -> Self {
        Self { intrinsics, config }
    }

    pub fn intrinsics(&self) -> &Intrinsics {
        &self.intrinsics
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Estimate the motion of the camera from the previous frame to the current one.
    ///
    /// Every call reseeds the sampler, so equal input gives an equal estimate.
    pub fn estimate(&self, pairs: &[PointPair]) -> Result<MotionEstimate, MotionError> {
        if pairs.len() < self.config.min_matches {
            return Err(MotionError::InsufficientMatches {
                found: pairs.len(),
                required: self.config.min_matches,
            });
        }

        // Perform Random Sampling Consensus technique to find the Essential Matrix.
        // The Sampson residual is measured in pixels, so the threshold is too.
        let essential = self.consensus(&EssentialMatrixEstimator::new(self.intrinsics), pairs);
        let essential_support = essential.as_ref().map_or(0, |(_, inliers)| inliers.len());

        // A rotation alone leaves the translation unobservable and the essential matrix
        // is fit to noise, so report the rotation with zero translation instead.
        if self.config.detect_pure_rotation {
            if let Some(estimate) = self.pure_rotation(pairs, essential_support) {
                return Ok(estimate);
            }
        }

        let (essential, inliers) = essential
            .ok_or_else(|| MotionError::DegenerateGeometry("no consensus essential matrix".into()))?;
        if inliers.len() < self.config.min_inliers {
            return Err(MotionError::DegenerateGeometry(format!(
                "{} essential matrix inliers, need {}",
                inliers.len(),
                self.config.min_inliers
            )));
        }

        let motion = self.recover_pose(&essential, pairs, &inliers)?;
        tracing::debug!(
            inliers = inliers.len(),
            pairs = pairs.len(),
            "recovered pose from essential matrix"
        );

        Ok(MotionEstimate {
            motion,
            model: MotionModel::General,
            inliers,
        })
    }

    fn pure_rotation(&self, pairs: &[PointPair], essential_inliers: usize) -> Option<MotionEstimate> {
        let (model, inliers) = self.consensus(&RotationEstimator::new(self.intrinsics), pairs)?;

        let required = self.config.pure_rotation_ratio * essential_inliers as f64;
        if inliers.len() < self.config.min_inliers || (inliers.len() as f64) < required {
            return None;
        }

        tracing::debug!(
            inliers = inliers.len(),
            essential_inliers,
            "correspondences explained by rotation alone"
        );
        Some(MotionEstimate {
            motion: RelativeMotion {
                rotation: model.rotation,
                translation: Vector3::zeros(),
            },
            model: MotionModel::PureRotation,
            inliers,
        })
    }

    /// Pick the decomposition of `E` that places most inliers in front of both cameras.
    fn recover_pose(
        &self,
        essential: &EssentialModel,
        pairs: &[PointPair],
        inliers: &[usize],
    ) -> Result<RelativeMotion, MotionError> {
        let candidates = decompose_essential(&essential.essential)
            .ok_or_else(|| MotionError::DegenerateGeometry("essential matrix SVD failed".into()))?;

        let (cur, prev): (Vec<_>, Vec<_>) = inliers
            .iter()
            .map(|&i| {
                (
                    self.intrinsics.normalize(&pairs[i].cur),
                    self.intrinsics.normalize(&pairs[i].prev),
                )
            })
            .unzip();

        let (best, in_front) = disambiguate_camera_pose(&candidates, &cur, &prev);
        if 2 * in_front <= inliers.len() {
            return Err(MotionError::DegenerateGeometry(format!(
                "only {in_front} of {} inliers in front of both cameras",
                inliers.len()
            )));
        }

        let (rotation, translation) = candidates[best];
        Ok(RelativeMotion {
            rotation: Rotation3::from_matrix_unchecked(rotation),
            translation,
        })
    }

    fn consensus<E>(&self, estimator: &E, pairs: &[PointPair]) -> Option<(E::Model, Vec<usize>)>
    where
        E: Estimator<PointPair>,
    {
        let rng = StdRng::seed_from_u64(self.config.seed);
        let data = pairs.iter().copied();

        match self.config.consensus {
            ConsensusMethod::Ransac => Ransac::new(
                self.config.ransac_threshold,
                self.config.ransac_confidence,
                self.config.ransac_max_iterations,
                rng,
            )
            .model_inliers(estimator, data),
            // This is an ARRSAC (Adaptive Real-Time Random Sample Consensus) package,
            // https://people.inf.ethz.ch/pomarc/pubs/RaguramECCV08.pdf
            ConsensusMethod::Arrsac => Arrsac::new(self.config.ransac_threshold, rng)
                .model_inliers(estimator, data)
                .map(|(model, inliers)| (model, inliers.into_iter().collect())),
        }
    }
}
