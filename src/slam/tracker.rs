use image::GrayImage;

use crate::{
    config::OdometryConfig,
    error::{ConfigError, MotionError},
    slam::{
        features::{FeatureExtractor, FeatureSet},
        matcher::FeatureMatcher,
        motion::{point_pairs, MotionEstimate, MotionEstimator, MotionModel},
        pose::{GlobalPose, PoseIntegrator},
        trajectory::{TrajectoryBuffer, TrajectoryPoint},
    },
};

/// Everything kept from the previously processed frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameState {
    pub frame_index: u64,
    pub features: FeatureSet,
}

/// Tracking states
#[derive(Clone, Debug, Default, PartialEq)]
pub enum TrackingState {
    /// No frame has been processed yet.
    #[default]
    Uninitialized,
    /// Holds the last frame to match the next one against.
    Tracking(FrameState),
}

impl TrackingState {
    pub fn last_frame(&self) -> Option<&FrameState> {
        match self {
            Self::Uninitialized => None,
            Self::Tracking(frame) => Some(frame),
        }
    }
}

/// What one call to [`Tracker::advance`] produced.
#[derive(Clone, Debug, PartialEq)]
pub enum TrackStep {
    /// First frame; nothing to match against.
    Initialized,
    Estimated {
        correspondences: usize,
        result: Result<MotionEstimate, MotionError>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum FrameStatus {
    Initialized,
    MotionAccepted { inliers: usize, model: MotionModel },
    MotionSkipped(MotionError),
}

/// Per-frame outcome of [`Tracker::process_frame`].
#[derive(Clone, Debug, PartialEq)]
pub struct FrameReport {
    pub frame_index: u64,
    pub keypoints: usize,
    pub correspondences: usize,
    pub status: FrameStatus,
}

impl FrameReport {
    pub fn is_accepted(&self) -> bool {
        matches!(self.status, FrameStatus::MotionAccepted { .. })
    }
}

/// Frame-to-frame monocular visual odometry.
///
/// Every frame is matched against the one before it; a failed estimate leaves the pose
/// and trajectory untouched and the next frame is matched against this one.
pub struct Tracker {
    extractor: FeatureExtractor,
    matcher: FeatureMatcher,
    estimator: MotionEstimator,
    integrator: PoseIntegrator,
    trajectory: TrajectoryBuffer,
    state: TrackingState,
    /// Index of the most recent frame; the first frame is 1.
    frame_count: u64,
    last_correspondences: usize,
}

impl Default for Tracker {
    fn default() -> Self {
        Self::from_valid_config(&OdometryConfig::default())
    }
}

impl Tracker {
    pub fn new(config: &OdometryConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: &OdometryConfig) -> Self {
        Self {
            extractor: FeatureExtractor::new(config.extractor.clone()),
            matcher: FeatureMatcher::new(config.matcher.clone()),
            estimator: MotionEstimator::new(config.intrinsics, config.estimator.clone()),
            integrator: PoseIntegrator::new(config.scale),
            trajectory: TrajectoryBuffer::new(config.trajectory_capacity),
            state: TrackingState::Uninitialized,
            frame_count: 0,
            last_correspondences: 0,
        }
    }

    /// The state transition, without touching the pose or trajectory.
    ///
    /// The returned state always holds `current`, whatever the estimate's outcome.
    pub fn advance(&self, state: TrackingState, current: FrameState) -> (TrackingState, TrackStep) {
        let step = match state {
            TrackingState::Uninitialized => TrackStep::Initialized,
            TrackingState::Tracking(previous) => {
                let matches = self.matcher.match_features(&previous.features, &current.features);
                let pairs = point_pairs(&previous.features, &current.features, &matches);
                TrackStep::Estimated {
                    correspondences: matches.len(),
                    result: self.estimator.estimate(&pairs),
                }
            }
        };

        (TrackingState::Tracking(current), step)
    }

    /// Track one image. Frames must arrive in temporal order.
    pub fn process_frame(&mut self, image: &GrayImage) -> FrameReport {
        if image.width() == 0 || image.height() == 0 {
            tracing::warn!(frame = self.frame_count + 1, "empty image");
        }

        self.process_features(self.extractor.extract(image))
    }

    /// Track one frame whose features were extracted elsewhere.
    pub fn process_features(&mut self, features: FeatureSet) -> FrameReport {
        self.frame_count += 1;
        let frame_index = self.frame_count;
        let keypoints = features.len();

        let state = std::mem::take(&mut self.state);
        let (state, step) = self.advance(state, FrameState { frame_index, features });
        self.state = state;

        let (correspondences, status) = match step {
            TrackStep::Initialized => {
                tracing::info!(frame = frame_index, keypoints, "tracking initialized");
                (0, FrameStatus::Initialized)
            }
            TrackStep::Estimated {
                correspondences,
                result: Ok(estimate),
            } => {
                let pose = self.integrator.apply(&estimate.motion);
                self.trajectory
                    .push(TrajectoryPoint::new(frame_index, &pose.position));

                tracing::debug!(
                    frame = frame_index,
                    keypoints,
                    correspondences,
                    inliers = estimate.inliers.len(),
                    model = ?estimate.model,
                    "motion accepted"
                );
                (
                    correspondences,
                    FrameStatus::MotionAccepted {
                        inliers: estimate.inliers.len(),
                        model: estimate.model,
                    },
                )
            }
            TrackStep::Estimated {
                correspondences,
                result: Err(error),
            } => {
                tracing::debug!(
                    frame = frame_index,
                    keypoints,
                    correspondences,
                    %error,
                    "motion skipped"
                );
                (correspondences, FrameStatus::MotionSkipped(error))
            }
        };

        self.last_correspondences = correspondences;

        FrameReport {
            frame_index,
            keypoints,
            correspondences,
            status,
        }
    }

    /// Return to the origin. The last frame stays, so tracking continues with the next one.
    pub fn reset(&mut self) {
        self.integrator.reset();
        self.trajectory.reset(self.frame_count);
        tracing::info!(frame = self.frame_count, "pose reset");
    }

    pub fn pose(&self) -> &GlobalPose {
        self.integrator.pose()
    }

    pub fn trajectory(&self) -> &TrajectoryBuffer {
        &self.trajectory
    }

    pub fn trajectory_snapshot(&self) -> Vec<TrajectoryPoint> {
        self.trajectory.snapshot()
    }

    pub fn last_correspondence_count(&self) -> usize {
        self.last_correspondences
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn state(&self) -> &TrackingState {
        &self.state
    }

    /// Features of the most recent frame.
    pub fn current_features(&self) -> Option<&FeatureSet> {
        self.state.last_frame().map(|frame| &frame.features)
    }
}
