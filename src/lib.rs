//! Monocular frame-to-frame visual odometry.
//!
//! Each grayscale frame goes through oriented FAST / steered BRIEF extraction, mutual
//! nearest neighbour matching against the previous frame, and robust essential matrix
//! estimation. The recovered relative motion is chained into a global pose (up to the
//! configured scale) and recorded in a bounded trajectory.
//!
//! ```no_run
//! use monovo::{OdometryConfig, System};
//!
//! let mut system = System::new(&OdometryConfig::default())?;
//! for path in ["0000.png", "0001.png"] {
//!     let report = system.track_monocular(&image::open(path)?);
//!     println!("{:?}", report.status);
//! }
//! println!("{}", system.shutdown());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod algorithms;
pub mod config;
pub mod error;
pub mod slam;

pub use algorithms::Intrinsics;
pub use config::{ConsensusMethod, EstimatorConfig, ExtractorConfig, MatcherConfig, OdometryConfig};
pub use error::{ConfigError, ExportError, MotionError};
pub use slam::{
    features::{Feature, FeatureExtractor, FeatureSet, Keypoint},
    matcher::{Correspondence, FeatureMatcher},
    motion::{MotionEstimate, MotionEstimator, MotionModel, PointPair, RelativeMotion},
    pose::{GlobalPose, PoseIntegrator},
    system::{PresentedFrame, Presenter, SessionSummary, System},
    tracker::{FrameReport, FrameState, FrameStatus, TrackStep, Tracker, TrackingState},
    trajectory::{TrajectoryBuffer, TrajectoryPoint},
};
