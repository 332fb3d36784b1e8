use std::fmt;

use image::DynamicImage;
use nalgebra::Vector3;

use crate::{
    config::OdometryConfig,
    error::ConfigError,
    slam::{
        features::FeatureSet,
        pose::GlobalPose,
        tracker::{FrameReport, Tracker},
        trajectory::TrajectoryBuffer,
    },
};

/// The frame being shown, with whatever was detected on it.
pub struct PresentedFrame<'a> {
    pub image: &'a DynamicImage,
    pub report: &'a FrameReport,
    pub features: Option<&'a FeatureSet>,
}

/// Receives the tracking result of every frame. Drawing and output live behind this trait;
/// the tracker itself never renders anything.
pub trait Presenter {
    fn present(
        &mut self,
        frame: &PresentedFrame<'_>,
        pose: &GlobalPose,
        trajectory: &TrajectoryBuffer,
        match_count: usize,
    );
}

/// Totals reported when a session ends.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSummary {
    pub frames_processed: u64,
    pub final_position: Vector3<f64>,
    pub trajectory_points: usize,
    pub distance_travelled: f64,
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = &self.final_position;
        write!(
            f,
            "{} frames, final position ({:.3}, {:.3}, {:.3}), {} trajectory points, {:.3} travelled",
            self.frames_processed, p.x, p.y, p.z, self.trajectory_points, self.distance_travelled
        )
    }
}

#[derive(Default)]
pub struct System {
    /// Tracker. It receives a frame and computes the associated camera pose.
    pub tracker: Tracker,
}

impl System {
    pub fn new(config: &OdometryConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            tracker: Tracker::new(config)?,
        })
    }

    pub fn track_monocular(&mut self, image: &DynamicImage) -> FrameReport {
        self.tracker.process_frame(&image.to_luma8())
    }

    /// Track a frame and hand the result to `presenter`.
    pub fn track_monocular_with<P: Presenter + ?Sized>(
        &mut self,
        image: &DynamicImage,
        presenter: &mut P,
    ) -> FrameReport {
        let report = self.track_monocular(image);
        let frame = PresentedFrame {
            image,
            report: &report,
            features: self.tracker.current_features(),
        };
        presenter.present(
            &frame,
            self.tracker.pose(),
            self.tracker.trajectory(),
            self.tracker.last_correspondence_count(),
        );
        report
    }

    pub fn reset(&mut self) {
        self.tracker.reset();
    }

    // Run any important cleanup procedures then SLAM instance is no longer in use
    pub fn shutdown(self) -> SessionSummary {
        let summary = SessionSummary {
            frames_processed: self.tracker.frame_count(),
            final_position: self.tracker.pose().position,
            trajectory_points: self.tracker.trajectory().len(),
            distance_travelled: self.tracker.trajectory().total_distance(),
        };
        tracing::info!(%summary, "session finished");
        summary
    }
}
