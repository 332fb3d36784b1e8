use nalgebra::{Matrix3x4, Matrix4, Point2, RowVector4, Vector3};

/// Homogeneous weights below this are treated as points at infinity.
const MIN_HOMOGENEOUS_WEIGHT: f64 = 1e-12;

/// Linear (DLT) triangulation of one correspondence seen by two cameras.
///
/// `camera_matrix1` / `camera_matrix2` are `3x4` projection matrices and `x1` / `x2`
/// the observations in the coordinates those matrices project into (pixels for
/// `K [R | t]`, normalized coordinates for `[R | t]`).
/// Returns `None` when the solution lies at infinity.
pub fn triangulate_linear(
    camera_matrix1: &Matrix3x4<f64>,
    camera_matrix2: &Matrix3x4<f64>,
    x1: &Point2<f64>,
    x2: &Point2<f64>,
) -> Option<Vector3<f64>> {
    let matrix_a = Matrix4::from_rows(&[
        RowVector4::new(
            x1.y * camera_matrix1.m31 - camera_matrix1.m21,
            x1.y * camera_matrix1.m32 - camera_matrix1.m22,
            x1.y * camera_matrix1.m33 - camera_matrix1.m23,
            x1.y * camera_matrix1.m34 - camera_matrix1.m24,
        ),
        RowVector4::new(
            x1.x * camera_matrix1.m31 - camera_matrix1.m11,
            x1.x * camera_matrix1.m32 - camera_matrix1.m12,
            x1.x * camera_matrix1.m33 - camera_matrix1.m13,
            x1.x * camera_matrix1.m34 - camera_matrix1.m14,
        ),
        RowVector4::new(
            x2.y * camera_matrix2.m31 - camera_matrix2.m21,
            x2.y * camera_matrix2.m32 - camera_matrix2.m22,
            x2.y * camera_matrix2.m33 - camera_matrix2.m23,
            x2.y * camera_matrix2.m34 - camera_matrix2.m24,
        ),
        RowVector4::new(
            x2.x * camera_matrix2.m31 - camera_matrix2.m11,
            x2.x * camera_matrix2.m32 - camera_matrix2.m12,
            x2.x * camera_matrix2.m33 - camera_matrix2.m13,
            x2.x * camera_matrix2.m34 - camera_matrix2.m14,
        ),
    ]);

    // the solution is the right singular vector of the smallest singular value
    let svd = matrix_a.svd(false, true);
    let matrix_v_t = svd.v_t?;
    let (smallest, _) = svd.singular_values.argmin();
    let solution = matrix_v_t.row(smallest);

    // convert from homogenous coordinates back into euclidean
    let w = solution[3];
    if w.abs() < MIN_HOMOGENEOUS_WEIGHT {
        return None;
    }
    Some(Vector3::new(solution[0], solution[1], solution[2]) / w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::camera::projection_matrix;
    use approx::assert_relative_eq;
    use nalgebra::{Matrix3, Rotation3};

    #[test]
    fn recovers_point_from_two_views() {
        let point = Vector3::new(0.3, -0.2, 4.0);
        let r = *Rotation3::from_euler_angles(0.02, -0.1, 0.05).matrix();
        let t = Vector3::new(0.5, 0.1, -0.05);

        let p1 = projection_matrix(&Matrix3::identity(), &Vector3::zeros());
        let p2 = projection_matrix(&r, &t);

        let x1 = Point2::new(point.x / point.z, point.y / point.z);
        let moved = r * point + t;
        let x2 = Point2::new(moved.x / moved.z, moved.y / moved.z);

        let estimate = triangulate_linear(&p1, &p2, &x1, &x2).expect("finite point");
        assert_relative_eq!(estimate, point, epsilon = 1e-8);
    }
}
