use nalgebra::{Rotation3, Vector3};

use crate::{algorithms::epipolar::project_to_rotation, slam::motion::RelativeMotion};

/// Camera orientation and position in the world frame, where the world frame is the
/// camera frame of the first image (or of the image at the last reset).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GlobalPose {
    pub rotation: Rotation3<f64>,
    pub position: Vector3<f64>,
}

impl Default for GlobalPose {
    fn default() -> Self {
        Self {
            rotation: Rotation3::identity(),
            position: Vector3::zeros(),
        }
    }
}

/// Chains relative motions into a global pose.
///
/// Monocular translation has no scale, so every step is multiplied by the same constant.
#[derive(Clone, Debug)]
pub struct PoseIntegrator {
    pose: GlobalPose,
    scale: f64,
}

impl Default for PoseIntegrator {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl PoseIntegrator {
    pub fn new(scale: f64) -> Self {
        Self {
            pose: GlobalPose::default(),
            scale,
        }
    }

    pub fn pose(&self) -> &GlobalPose {
        &self.pose
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Moves the position along the translation expressed in the world frame, using the
    /// orientation from *before* this step, then composes the rotation.
    ///
    /// The composed rotation is projected back onto SO(3) so drift does not accumulate.
    pub fn apply(&mut self, motion: &RelativeMotion) -> &GlobalPose {
        self.pose.position += self.scale * (self.pose.rotation * motion.translation);

        let composed = motion.rotation * self.pose.rotation;
        self.pose.rotation = project_to_rotation(composed.matrix()).unwrap_or(composed);

        &self.pose
    }

    pub fn reset(&mut self) {
        self.pose = GlobalPose::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Matrix3;

    #[test]
    fn translation_uses_previous_orientation() {
        let mut integrator = PoseIntegrator::new(2.0);
        let quarter_turn = Rotation3::from_axis_angle(&Vector3::y_axis(), std::f64::consts::FRAC_PI_2);

        integrator.apply(&RelativeMotion {
            rotation: quarter_turn,
            translation: Vector3::z(),
        });
        // the first step is taken with the identity orientation
        assert_relative_eq!(integrator.pose().position, Vector3::new(0.0, 0.0, 2.0), epsilon = 1e-12);

        integrator.apply(&RelativeMotion {
            rotation: Rotation3::identity(),
            translation: Vector3::z(),
        });
        // the second step is rotated by the quarter turn
        assert_relative_eq!(integrator.pose().position, Vector3::new(2.0, 0.0, 2.0), epsilon = 1e-12);
    }

    #[test]
    fn zero_translation_only_rotates() {
        let mut integrator = PoseIntegrator::default();
        let rotation = Rotation3::from_euler_angles(0.1, 0.2, 0.3);
        integrator.apply(&RelativeMotion {
            rotation,
            translation: Vector3::zeros(),
        });
        assert_eq!(integrator.pose().position, Vector3::zeros());
        assert_relative_eq!(integrator.pose().rotation, rotation, epsilon = 1e-12);
    }

    #[test]
    fn rotation_stays_orthonormal() {
        let mut integrator = PoseIntegrator::default();
        let step = RelativeMotion {
            rotation: Rotation3::from_euler_angles(0.013, -0.021, 0.017),
            translation: Vector3::new(0.2, 0.1, 0.97).normalize(),
        };
        for _ in 0..5000 {
            integrator.apply(&step);
        }

        let r = integrator.pose().rotation.into_inner();
        assert_relative_eq!(r.transpose() * r, Matrix3::identity(), epsilon = 1e-9);
        assert_relative_eq!(r.determinant(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn reset_returns_to_origin() {
        let mut integrator = PoseIntegrator::new(0.5);
        integrator.apply(&RelativeMotion {
            rotation: Rotation3::from_euler_angles(0.0, 0.3, 0.0),
            translation: Vector3::x(),
        });
        integrator.reset();
        assert_eq!(integrator.pose(), &GlobalPose::default());
        assert_eq!(integrator.scale(), 0.5);
    }
}
