//! Zhang's closed-form camera matrix from plane homographies.
//!
//! Each homography `H = K [r1 r2 t]` gives two linear constraints on the
//! image of the absolute conic `B = K⁻ᵀ K⁻¹`:
//! `h1ᵀ B h2 = 0` and `h1ᵀ B h1 = h2ᵀ B h2`. A third row enforces zero skew
//! (`B12 = 0`), which makes two views sufficient.

use crate::Degeneracy;
use calib_pose_core::{normalize_points, Intrinsics, Distortion};
use log::debug;
use nalgebra::{DMatrix, Matrix3, Point2, SVector};

/// Row `v_ij` of Zhang's system for columns `i`, `j` of `h`, over the
/// unknowns `(B11, B12, B22, B13, B23, B33)`.
fn v_ij(h: &Matrix3<f64>, i: usize, j: usize) -> SVector<f64, 6> {
    let hi = h.column(i);
    let hj = h.column(j);
    SVector::<f64, 6>::from_row_slice(&[
        hi[0] * hj[0],
        hi[0] * hj[1] + hi[1] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ])
}

/// Similarity that conditions all image points of all views at once.
///
/// Applying the same map to every homography keeps `N K` upper triangular
/// with zero skew, so `K = N⁻¹ Kn`.
pub fn image_normalization(views: &[Vec<Point2<f64>>]) -> Matrix3<f64> {
    let all: Vec<Point2<f64>> = views.iter().flatten().copied().collect();
    normalize_points(&all).1
}

/// Estimate `fx, fy, cx, cy` (zero skew, no distortion).
///
/// `homographies` map the target plane to pixels and `normalization` is the
/// image conditioning from [`image_normalization`]. `rank_tolerance` bounds
/// the ratio of the second smallest to the largest singular value of the
/// constraint matrix; below it the null space is not unique.
pub fn intrinsics_from_homographies(
    homographies: &[Matrix3<f64>],
    normalization: &Matrix3<f64>,
    rank_tolerance: f64,
) -> Result<Intrinsics, Degeneracy> {
    let m = homographies.len();
    // Thin SVD needs at least as many rows as unknowns.
    let rows = (2 * m + 1).max(6);
    let mut v = DMatrix::<f64>::zeros(rows, 6);

    for (k, h) in homographies.iter().enumerate() {
        let hn = normalization * h;
        let scale = hn.norm();
        let hn = if scale > 0.0 { hn / scale } else { hn };

        let r12 = v_ij(&hn, 0, 1);
        let r_diag = v_ij(&hn, 0, 0) - v_ij(&hn, 1, 1);
        v.row_mut(2 * k).copy_from(&(r12 / r12.norm().max(1e-300)).transpose());
        v.row_mut(2 * k + 1)
            .copy_from(&(r_diag / r_diag.norm().max(1e-300)).transpose());
    }
    v[(2 * m, 1)] = 1.0;

    let svd = v.svd(false, true);
    let v_t = svd.v_t.ok_or(Degeneracy::RankDeficient { ratio: 0.0 })?;

    let mut order: Vec<(usize, f64)> = svd.singular_values.iter().copied().enumerate().collect();
    order.sort_by(|a, b| b.1.total_cmp(&a.1));
    let largest = order[0].1;
    let ratio = if largest > 0.0 { order[4].1 / largest } else { 0.0 };
    debug!("zhang: {m} views, singular value ratio {ratio:.3e}");
    if !(ratio >= rank_tolerance) {
        return Err(Degeneracy::RankDeficient { ratio });
    }
    let b = v_t.row(order[5].0);

    let (b11, b12, b22, b13, b23, b33) = (b[0], b[1], b[2], b[3], b[4], b[5]);

    let denom = b11 * b22 - b12 * b12;
    let denom_norm = b11 * b11 + b22 * b22;
    if !(denom_norm > 0.0) || denom.abs() / denom_norm <= 1e-6 {
        return Err(Degeneracy::NoPositiveSolution);
    }

    let v0 = (b12 * b13 - b11 * b23) / denom;
    let lambda = b33 - (b13 * b13 + v0 * (b12 * b13 - b11 * b23)) / b11;
    let fx2 = lambda / b11;
    let fy2 = lambda * b11 / denom;
    if !(fx2 > 0.0 && fy2 > 0.0) {
        return Err(Degeneracy::NoPositiveSolution);
    }
    let alpha = fx2.sqrt();
    let beta = fy2.sqrt();
    let u0 = -b13 * alpha * alpha / lambda;

    let kn = Matrix3::new(alpha, 0.0, u0, 0.0, beta, v0, 0.0, 0.0, 1.0);
    let n_inv = normalization
        .try_inverse()
        .ok_or(Degeneracy::NoPositiveSolution)?;
    let k = n_inv * kn;
    let k = k / k[(2, 2)];

    Intrinsics::new(k[(0, 0)], k[(1, 1)], k[(0, 2)], k[(1, 2)], Distortion::none())
        .map_err(|_| Degeneracy::NoPositiveSolution)
}
