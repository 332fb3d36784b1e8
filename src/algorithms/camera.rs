use nalgebra::{Matrix3, Matrix3x4, Point2, Vector3};
use serde::{Deserialize, Serialize};

use super::triangulation::triangulate_linear;

/// Pinhole camera calibration (no distortion).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl Default for Intrinsics {
    /// Rough guess for an uncalibrated 640x480 webcam.
    fn default() -> Self {
        Self::from_focal_and_size(500.0, 640.0, 480.0)
    }
}

impl Intrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// Square pixels with the principal point in the image centre.
    pub fn from_focal_and_size(focal: f64, width: f64, height: f64) -> Self {
        Self::new(focal, focal, width / 2.0, height / 2.0)
    }

    /// The calibration matrix `K`.
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    /// Closed-form `K^-1`.
    pub fn inverse(&self) -> Matrix3<f64> {
        Matrix3::new(
            1.0 / self.fx,
            0.0,
            -self.cx / self.fx,
            0.0,
            1.0 / self.fy,
            -self.cy / self.fy,
            0.0,
            0.0,
            1.0,
        )
    }

    /// Pixel to normalized image plane (`z = 1`).
    pub fn normalize(&self, pixel: &Point2<f64>) -> Point2<f64> {
        Point2::new(
            (pixel.x - self.cx) / self.fx,
            (pixel.y - self.cy) / self.fy,
        )
    }

    /// Pixel to unit bearing vector.
    pub fn bearing(&self, pixel: &Point2<f64>) -> Vector3<f64> {
        let p = self.normalize(pixel);
        Vector3::new(p.x, p.y, 1.0).normalize()
    }

    /// Project a camera-frame ray. Returns `None` for rays at or behind the image plane.
    pub fn project(&self, ray: &Vector3<f64>) -> Option<Point2<f64>> {
        if ray.z <= f64::EPSILON {
            return None;
        }
        Some(Point2::new(
            self.fx * ray.x / ray.z + self.cx,
            self.fy * ray.y / ray.z + self.cy,
        ))
    }
}

/// Determines which Camera Pose is correct by evaluating the [Cheirality Condition](http://users.cecs.anu.edu.au/~hartley/Papers/cheiral/revision/cheiral.pdf),
/// which is defined as when the triangulated point lies in front of both cameras.
///
/// Each candidate `(R, t)` maps current-camera points into the previous camera as
/// `X_prev = R X_cur + t`. Points are triangulated in the current camera frame, so the
/// condition is `X_3 > 0` (current camera) and `r_3 X + t_3 > 0` (previous camera).
///
/// `cur` and `prev` are corresponding points on the normalized image plane.
/// Returns the index of the winning candidate and how many points it placed in front.
pub fn disambiguate_camera_pose(
    candidates: &[(Matrix3<f64>, Vector3<f64>)],
    cur: &[Point2<f64>],
    prev: &[Point2<f64>],
) -> (usize, usize) {
    let camera_cur = Matrix3x4::identity();

    // compute the score for the set of points belonging to each configuration,
    // and then return the group with the most points in front of the camera views.
    let mut max_satisfied = (0, 0);
    for (i, (r, t)) in candidates.iter().enumerate() {
        let camera_prev = projection_matrix(r, t);

        let score = cur
            .iter()
            .zip(prev)
            .filter_map(|(x_cur, x_prev)| triangulate_linear(&camera_cur, &camera_prev, x_cur, x_prev))
            .filter(|x| x.z > 0.0 && (r.row(2) * x)[0] + t.z > 0.0)
            .count();

        if score > max_satisfied.1 {
            max_satisfied = (i, score);
        }
    }

    max_satisfied
}

/// `[R | t]`
pub fn projection_matrix(r: &Matrix3<f64>, t: &Vector3<f64>) -> Matrix3x4<f64> {
    let mut p = Matrix3x4::zeros();
    p.fixed_slice_mut::<3, 3>(0, 0).copy_from(r);
    p.set_column(3, t);
    p
}
