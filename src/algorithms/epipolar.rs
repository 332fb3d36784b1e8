//! Two-view epipolar geometry on calibrated (normalized) coordinates.
//!
//! Conventions: a point `X_cur` in the current camera maps to the previous camera as
//! `X_prev = R X_cur + t`, and the essential matrix `E = [t]x R` satisfies
//! `x_prev^T E x_cur = 0`.

use nalgebra::{DMatrix, Matrix3, Point2, Rotation3, Vector3};

/// Hartley normalization: translate to the centroid and scale to mean distance `sqrt(2)`.
///
/// Returns the conditioned points and the similarity transform `T` that produced them.
pub fn normalize_points(points: &[Point2<f64>]) -> Option<(Vec<Point2<f64>>, Matrix3<f64>)> {
    if points.is_empty() {
        return None;
    }

    let n = points.len() as f64;
    let centroid = points
        .iter()
        .fold(Vector3::zeros(), |acc, p| acc + Vector3::new(p.x, p.y, 0.0))
        / n;

    let mean_dist = points
        .iter()
        .map(|p| ((p.x - centroid.x).powi(2) + (p.y - centroid.y).powi(2)).sqrt())
        .sum::<f64>()
        / n;

    if mean_dist <= f64::EPSILON {
        return None;
    }

    let scale = std::f64::consts::SQRT_2 / mean_dist;
    let transform = Matrix3::new(
        scale,
        0.0,
        -scale * centroid.x,
        0.0,
        scale,
        -scale * centroid.y,
        0.0,
        0.0,
        1.0,
    );

    let conditioned = points
        .iter()
        .map(|p| Point2::new(scale * (p.x - centroid.x), scale * (p.y - centroid.y)))
        .collect();

    Some((conditioned, transform))
}

/// Normalized 8-point algorithm for the essential matrix.
///
/// Takes at least eight correspondences on the normalized image plane and solves the
/// linear system in a least-squares sense, then projects the result onto the
/// essential manifold. The output has unit Frobenius norm.
pub fn essential_8point(prev: &[Point2<f64>], cur: &[Point2<f64>]) -> Option<Matrix3<f64>> {
    const COLUMNS: usize = 9;

    if prev.len() != cur.len() || prev.len() < 8 {
        return None;
    }

    let (prev_n, t_prev) = normalize_points(prev)?;
    let (cur_n, t_cur) = normalize_points(cur)?;

    // dst^T * E * src = 0, with dst = prev and src = cur.
    // pad to a square system so the full right singular basis is available.
    let rows = prev.len().max(COLUMNS);
    let mut matrix_a = DMatrix::<f64>::zeros(rows, COLUMNS);
    for (i, (dst, src)) in prev_n.iter().zip(&cur_n).enumerate() {
        matrix_a[(i, 0)] = dst.x * src.x;
        matrix_a[(i, 1)] = dst.x * src.y;
        matrix_a[(i, 2)] = dst.x;
        matrix_a[(i, 3)] = dst.y * src.x;
        matrix_a[(i, 4)] = dst.y * src.y;
        matrix_a[(i, 5)] = dst.y;
        matrix_a[(i, 6)] = src.x;
        matrix_a[(i, 7)] = src.y;
        matrix_a[(i, 8)] = 1.0;
    }

    // Solve for the nullspace of the constraint matrix.
    let svd = matrix_a.svd(false, true);
    let matrix_v_t = svd.v_t?;
    let (smallest, _) = svd.singular_values.argmin();
    let essential_conditioned = Matrix3::from_row_iterator(matrix_v_t.row(smallest).iter().copied());

    let essential = t_prev.transpose() * essential_conditioned * t_cur;
    let essential = enforce_essential_constraints(&essential)?;

    let norm = essential.norm();
    if norm <= f64::EPSILON || !norm.is_finite() {
        return None;
    }
    Some(essential / norm)
}

/// Project a `3x3` matrix onto the essential manifold by forcing the singular values
/// to `(s, s, 0)`, with `s` the mean of the two largest.
pub fn enforce_essential_constraints(e: &Matrix3<f64>) -> Option<Matrix3<f64>> {
    let svd = e.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;

    // singular values are not guaranteed to be ordered
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| svd.singular_values[b].total_cmp(&svd.singular_values[a]));
    let s = 0.5 * (svd.singular_values[order[0]] + svd.singular_values[order[1]]);

    let mut diagonal = Vector3::zeros();
    diagonal[order[0]] = s;
    diagonal[order[1]] = s;

    Some(u * Matrix3::from_diagonal(&diagonal) * v_t)
}

/// Decompose an essential matrix into its four candidate `(R, t)` pairs.
///
/// Every rotation is proper (`det = +1`) and every translation is unit length; the
/// physically valid pair is selected by a cheirality check.
pub fn decompose_essential(e: &Matrix3<f64>) -> Option<[(Matrix3<f64>, Vector3<f64>); 4]> {
    let svd = e.svd(true, true);
    let mut u = svd.u?;
    let mut v_t = svd.v_t?;

    // move the null singular direction into the third column of U / row of V^T
    let (null_index, _) = svd.singular_values.argmin();
    if null_index != 2 {
        u.swap_columns(null_index, 2);
        v_t.swap_rows(null_index, 2);
    }

    if u.determinant() < 0.0 {
        u.column_mut(2).neg_mut();
    }
    if v_t.determinant() < 0.0 {
        v_t.row_mut(2).neg_mut();
    }

    let matrix_w = Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0);

    // R = U W V^T and R = U W^T V^T
    let rotation1 = u * matrix_w * v_t;
    let rotation2 = u * matrix_w.transpose() * v_t;

    // t = u_3 where: U[u_1, u_2, u_3]
    let t = u.column(2).normalize();

    Some([
        (rotation1, t),
        (rotation1, -t),
        (rotation2, t),
        (rotation2, -t),
    ])
}

/// Least-squares rotation aligning bearings, `prev ≈ R cur` (Kabsch).
///
/// Returns `None` when the bearings do not constrain a unique rotation, e.g. all parallel.
pub fn rotation_from_bearings(
    prev: &[Vector3<f64>],
    cur: &[Vector3<f64>],
) -> Option<Rotation3<f64>> {
    const MIN_SPREAD: f64 = 1e-9;

    if prev.len() != cur.len() || prev.len() < 2 {
        return None;
    }

    let covariance = prev
        .iter()
        .zip(cur)
        .fold(Matrix3::zeros(), |acc, (p, c)| acc + p * c.transpose());

    let mut singular = covariance.singular_values();
    singular
        .as_mut_slice()
        .sort_by(|a, b| b.total_cmp(a));
    if singular[1] < MIN_SPREAD {
        return None;
    }

    project_to_rotation(&covariance)
}

/// Nearest proper rotation (Frobenius sense) to `m`, via SVD.
pub fn project_to_rotation(m: &Matrix3<f64>) -> Option<Rotation3<f64>> {
    let svd = m.svd(true, true);
    let mut u = svd.u?;
    let v_t = svd.v_t?;

    // reflect along the weakest singular direction when U V^T is improper
    if (u * v_t).determinant() < 0.0 {
        let (weakest, _) = svd.singular_values.argmin();
        u.column_mut(weakest).neg_mut();
    }

    Some(Rotation3::from_matrix_unchecked(u * v_t))
}

/// Fundamental matrix for pixel coordinates, `F = K^-T E K^-1`.
pub fn fundamental_from_essential(e: &Matrix3<f64>, k_inv: &Matrix3<f64>) -> Matrix3<f64> {
    k_inv.transpose() * e * k_inv
}

/// First-order geometric (Sampson) distance of a correspondence to the epipolar
/// constraint `prev^T F cur = 0`, in the units of the coordinates (pixels for `F`).
pub fn sampson_distance(f: &Matrix3<f64>, prev: &Point2<f64>, cur: &Point2<f64>) -> f64 {
    let x_prev = Vector3::new(prev.x, prev.y, 1.0);
    let x_cur = Vector3::new(cur.x, cur.y, 1.0);

    let f_cur = f * x_cur;
    let ft_prev = f.transpose() * x_prev;
    let algebraic = x_prev.dot(&f_cur);

    let denominator =
        f_cur.x * f_cur.x + f_cur.y * f_cur.y + ft_prev.x * ft_prev.x + ft_prev.y * ft_prev.y;
    if denominator <= f64::EPSILON {
        return f64::INFINITY;
    }

    algebraic.abs() / denominator.sqrt()
}

/// Cross-product matrix, `[v]x w = v x w`.
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn scene() -> Vec<Vector3<f64>> {
        (0..20)
            .map(|i| {
                let i = i as f64;
                Vector3::new(
                    (i * 0.37).sin() * 2.0,
                    (i * 0.53).cos() * 1.5,
                    4.0 + (i * 0.71).sin() * 2.0,
                )
            })
            .collect()
    }

    fn observe(
        points: &[Vector3<f64>],
        r: &Matrix3<f64>,
        t: &Vector3<f64>,
    ) -> (Vec<Point2<f64>>, Vec<Point2<f64>>) {
        let cur = points.iter().map(|x| Point2::new(x.x / x.z, x.y / x.z)).collect();
        let prev = points
            .iter()
            .map(|x| {
                let y = r * x + t;
                Point2::new(y.x / y.z, y.y / y.z)
            })
            .collect();
        (prev, cur)
    }

    fn angle_between(a: &Matrix3<f64>, b: &Matrix3<f64>) -> f64 {
        let cos = (((a.transpose() * b).trace() - 1.0) * 0.5).clamp(-1.0, 1.0);
        cos.acos()
    }

    #[test]
    fn eight_point_satisfies_epipolar_constraint() {
        let r = *Rotation3::from_euler_angles(0.05, -0.1, 0.02).matrix();
        let t = Vector3::new(0.4, -0.1, 0.2);
        let (prev, cur) = observe(&scene(), &r, &t);

        let e = essential_8point(&prev, &cur).expect("well conditioned scene");
        for (p, c) in prev.iter().zip(&cur) {
            let residual = Vector3::new(p.x, p.y, 1.0).dot(&(e * Vector3::new(c.x, c.y, 1.0)));
            assert!(residual.abs() < 1e-9, "residual {residual}");
        }

        let expected = skew(&t) * r;
        let expected = expected / expected.norm();
        let aligned = if (e - expected).norm() < (e + expected).norm() { e } else { -e };
        assert_relative_eq!(aligned, expected, epsilon = 1e-6);
    }

    #[test]
    fn decomposition_contains_true_pose() {
        let r = *Rotation3::from_euler_angles(0.1, -0.05, 0.2).matrix();
        let t = Vector3::new(0.1, 0.02, -0.03);

        let candidates = decompose_essential(&(skew(&t) * r)).expect("valid essential matrix");
        let found = candidates.iter().any(|(r_est, t_est)| {
            angle_between(r_est, &r) < 1e-6 && t_est.dot(&t.normalize()) > 1.0 - 1e-6
        });
        assert!(found, "essential decomposition did not recover pose");

        for (r_est, t_est) in &candidates {
            assert_relative_eq!(r_est.determinant(), 1.0, epsilon = 1e-9);
            assert_relative_eq!(t_est.norm(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn kabsch_recovers_rotation() {
        let r = Rotation3::from_euler_angles(0.2, 0.1, -0.3);
        let cur: Vec<_> = scene().iter().map(|x| x.normalize()).collect();
        let prev: Vec<_> = cur.iter().map(|b| r * b).collect();

        let estimate = rotation_from_bearings(&prev, &cur).expect("spread bearings");
        assert!(angle_between(estimate.matrix(), r.matrix()) < 1e-9);

        let parallel = vec![Vector3::z(); 4];
        assert!(rotation_from_bearings(&parallel, &parallel).is_none());
    }

    #[test]
    fn sampson_distance_is_zero_on_the_epipolar_line() {
        let r = Matrix3::identity();
        let t = Vector3::new(1.0, 0.0, 0.0);
        let e = skew(&t) * r;

        // pure x translation: epipolar lines are horizontal
        let on_line = sampson_distance(&e, &Point2::new(0.3, 0.2), &Point2::new(-0.1, 0.2));
        let off_line = sampson_distance(&e, &Point2::new(0.3, 0.25), &Point2::new(-0.1, 0.2));
        assert!(on_line < 1e-12);
        assert!(off_line > 0.01);
    }

    #[test]
    fn projection_restores_orthonormality() {
        let drifted = Rotation3::from_euler_angles(0.3, 0.2, 0.1).into_inner() * 1.001
            + Matrix3::from_element(1e-4);
        let r = project_to_rotation(&drifted).expect("svd converges");
        assert_relative_eq!(r.matrix().transpose() * r.matrix(), Matrix3::identity(), epsilon = 1e-12);
        assert_relative_eq!(r.matrix().determinant(), 1.0, epsilon = 1e-12);
    }
}
