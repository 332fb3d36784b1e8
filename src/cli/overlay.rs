//! Presenters used by the command line: annotated frames on disk and log output.

use std::path::PathBuf;

use image::{Pixel, Rgba, RgbaImage};
use imageproc::{drawing, rect::Rect};
use monovo::{FrameReport, FrameStatus, GlobalPose, PresentedFrame, Presenter, TrajectoryBuffer, TrajectoryPoint};
use once_cell::sync::Lazy;

/// Side length of the top-down trajectory inset, in pixels.
const INSET_SIZE: u32 = 160;
const INSET_MARGIN: u32 = 8;
const STATUS_LENGTH: u32 = 120;
const STATUS_HEIGHT: u32 = 6;

static RED: Lazy<Rgba<u8>> = Lazy::new(|| *Rgba::from_slice(&[255, 0, 0, 255]));
static GREEN: Lazy<Rgba<u8>> = Lazy::new(|| *Rgba::from_slice(&[0, 255, 0, 255]));
static BLUE: Lazy<Rgba<u8>> = Lazy::new(|| *Rgba::from_slice(&[0, 128, 255, 255]));
static BACKGROUND: Lazy<Rgba<u8>> = Lazy::new(|| *Rgba::from_slice(&[16, 16, 16, 255]));

/// Writes every frame with its keypoints and a top-down (X-Z) view of the trajectory.
pub struct OverlayPresenter {
    out_dir: PathBuf,
}

impl OverlayPresenter {
    pub fn new(out_dir: PathBuf) -> std::io::Result<Self> {
        std::fs::create_dir_all(&out_dir)?;
        Ok(Self { out_dir })
    }

    fn render(&self, frame: &PresentedFrame<'_>, trajectory: &TrajectoryBuffer) -> RgbaImage {
        let mut canvas = frame.image.to_rgba8();

        for feature in frame.features.into_iter().flatten() {
            drawing::draw_hollow_circle_mut(
                &mut canvas,
                // draw the keypoint onto the image
                (feature.keypoint.x as _, feature.keypoint.y as _),
                // larger circles for coarser pyramid levels
                2 + feature.keypoint.level as i32,
                *GREEN,
            );
        }

        draw_status(&mut canvas, frame.report);
        draw_inset(&mut canvas, &trajectory.snapshot());
        canvas
    }
}

/// `frame_<index>_k<keypoints>_m<matches>.png`, so a directory listing reads as a log.
fn frame_file_name(report: &FrameReport) -> String {
    format!(
        "frame_{:06}_k{}_m{}.png",
        report.frame_index, report.keypoints, report.correspondences
    )
}

impl Presenter for OverlayPresenter {
    fn present(
        &mut self,
        frame: &PresentedFrame<'_>,
        _pose: &GlobalPose,
        trajectory: &TrajectoryBuffer,
        _match_count: usize,
    ) {
        let path = self.out_dir.join(frame_file_name(frame.report));
        if let Err(error) = self.render(frame, trajectory).save(&path) {
            tracing::warn!(path = %path.display(), %error, "failed to write annotated frame");
        }
    }
}

/// Bar along the top left: its colour is the frame's outcome, its length the inlier share
/// of the matches.
fn draw_status(canvas: &mut RgbaImage, report: &FrameReport) {
    let (colour, fill) = match &report.status {
        FrameStatus::Initialized => (*BLUE, 1.0),
        FrameStatus::MotionAccepted { inliers, .. } => (
            *GREEN,
            *inliers as f64 / report.correspondences.max(1) as f64,
        ),
        FrameStatus::MotionSkipped(_) => (*RED, 1.0),
    };

    let length = (STATUS_LENGTH as f64 * fill.clamp(0.0, 1.0)).round() as u32;
    if length == 0 || canvas.width() < STATUS_LENGTH + INSET_MARGIN {
        return;
    }
    drawing::draw_filled_rect_mut(
        canvas,
        Rect::at(INSET_MARGIN as i32, INSET_MARGIN as i32).of_size(length, STATUS_HEIGHT),
        colour,
    );
}

/// Draw the trajectory in the top right corner, camera forward (+Z) pointing up.
fn draw_inset(canvas: &mut RgbaImage, trajectory: &[TrajectoryPoint]) {
    let (width, height) = canvas.dimensions();
    if width < INSET_SIZE + INSET_MARGIN || height < INSET_SIZE + INSET_MARGIN {
        return;
    }

    let left = width - INSET_SIZE - INSET_MARGIN;
    let top = INSET_MARGIN;
    drawing::draw_filled_rect_mut(
        canvas,
        Rect::at(left as i32, top as i32).of_size(INSET_SIZE, INSET_SIZE),
        *BACKGROUND,
    );

    let points: Vec<(f32, f32)> = inset_coordinates(trajectory, INSET_SIZE)
        .into_iter()
        .map(|(x, y)| (x + left as f32, y + top as f32))
        .collect();

    for segment in points.windows(2) {
        drawing::draw_line_segment_mut(canvas, segment[0], segment[1], *BLUE);
    }
    if let Some(&(x, y)) = points.last() {
        drawing::draw_hollow_circle_mut(canvas, (x as i32, y as i32), 3, *RED);
    }
}

/// Map trajectory positions into a `size` square, origin in the centre, fitted to the
/// largest X or Z excursion so far.
fn inset_coordinates(trajectory: &[TrajectoryPoint], size: u32) -> Vec<(f32, f32)> {
    let extent = trajectory
        .iter()
        .map(|p| p.position[0].abs().max(p.position[2].abs()))
        .fold(1.0f64, f64::max);

    let half = size as f64 / 2.0;
    let scale = (half - 4.0) / extent;
    trajectory
        .iter()
        .map(|p| {
            (
                (half + p.position[0] * scale) as f32,
                (half - p.position[2] * scale) as f32,
            )
        })
        .collect()
}

/// Logs the position of every frame whose motion was accepted.
#[derive(Default)]
pub struct LogPresenter;

impl Presenter for LogPresenter {
    fn present(
        &mut self,
        frame: &PresentedFrame<'_>,
        pose: &GlobalPose,
        _trajectory: &TrajectoryBuffer,
        match_count: usize,
    ) {
        let report = frame.report;
        match &report.status {
            FrameStatus::MotionAccepted { inliers, model } => {
                let p = &pose.position;
                tracing::info!(
                    frame = report.frame_index,
                    matches = match_count,
                    inliers,
                    ?model,
                    "position ({:.3}, {:.3}, {:.3})",
                    p.x,
                    p.y,
                    p.z
                );
            }
            FrameStatus::MotionSkipped(error) => {
                tracing::info!(frame = report.frame_index, matches = match_count, "skipped: {error}");
            }
            FrameStatus::Initialized => {
                tracing::info!(frame = report.frame_index, keypoints = report.keypoints, "first frame");
            }
        }
    }
}

/// Fans every frame out to several presenters.
#[derive(Default)]
pub struct Presenters(pub Vec<Box<dyn Presenter>>);

impl Presenter for Presenters {
    fn present(
        &mut self,
        frame: &PresentedFrame<'_>,
        pose: &GlobalPose,
        trajectory: &TrajectoryBuffer,
        match_count: usize,
    ) {
        for presenter in &mut self.0 {
            presenter.present(frame, pose, trajectory, match_count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage};
    use monovo::MotionModel;
    use nalgebra::Vector3;

    #[test]
    fn inset_is_centred_and_fitted() {
        let trajectory = [
            TrajectoryPoint::new(0, &Vector3::zeros()),
            TrajectoryPoint::new(1, &Vector3::new(0.0, 5.0, 2.0)),
            TrajectoryPoint::new(2, &Vector3::new(-2.0, 0.0, 2.0)),
        ];
        let mapped = inset_coordinates(&trajectory, 100);

        assert_eq!(mapped[0], (50.0, 50.0));
        // forward is up, the vertical axis is ignored
        assert_eq!(mapped[1], (50.0, 4.0));
        assert_eq!(mapped[2], (4.0, 4.0));
    }

    #[test]
    fn writes_annotated_frames() {
        let dir = tempfile::tempdir().unwrap();
        let mut presenter = OverlayPresenter::new(dir.path().join("frames")).unwrap();

        let image = DynamicImage::ImageLuma8(GrayImage::new(320, 240));
        let report = FrameReport {
            frame_index: 3,
            keypoints: 0,
            correspondences: 0,
            status: FrameStatus::Initialized,
        };
        let frame = PresentedFrame {
            image: &image,
            report: &report,
            features: None,
        };
        presenter.present(&frame, &GlobalPose::default(), &TrajectoryBuffer::new(4), 0);

        let written = image::open(dir.path().join("frames/frame_000003_k0_m0.png")).unwrap();
        assert_eq!((written.width(), written.height()), (320, 240));
        // initialization is marked in blue
        assert_eq!(written.to_rgba8().get_pixel(INSET_MARGIN, INSET_MARGIN), &*BLUE);
    }

    #[test]
    fn status_bar_tracks_inlier_share() {
        let report = FrameReport {
            frame_index: 9,
            keypoints: 500,
            correspondences: 200,
            status: FrameStatus::MotionAccepted {
                inliers: 100,
                model: MotionModel::General,
            },
        };
        assert_eq!(frame_file_name(&report), "frame_000009_k500_m200.png");

        let mut canvas = RgbaImage::new(320, 240);
        draw_status(&mut canvas, &report);
        let y = INSET_MARGIN;
        assert_eq!(canvas.get_pixel(INSET_MARGIN, y), &*GREEN);
        assert_eq!(canvas.get_pixel(INSET_MARGIN + STATUS_LENGTH / 2 - 1, y), &*GREEN);
        assert_eq!(canvas.get_pixel(INSET_MARGIN + STATUS_LENGTH / 2, y), &Rgba([0, 0, 0, 0]));
    }
}
