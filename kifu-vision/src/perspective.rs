//! Perspective rectification: maps a detected quadrilateral onto the
//! canonical square frame the grid fitter and stone assigner both expect.

use anyhow::{Context, Result};
use ndarray::Array2;

use crate::geometry::Point2;

/// A 3x3 homography, row-major.
#[derive(Debug, Clone, Copy)]
pub struct Homography(pub [[f64; 3]; 3]);

impl Homography {
    pub fn apply(&self, p: Point2) -> Point2 {
        let h = &self.0;
        let x = h[0][0] * p.x + h[0][1] * p.y + h[0][2];
        let y = h[1][0] * p.x + h[1][1] * p.y + h[1][2];
        let w = h[2][0] * p.x + h[2][1] * p.y + h[2][2];
        Point2::new(x / w, y / w)
    }

    pub fn apply_many(&self, points: &[Point2]) -> Vec<Point2> {
        points.iter().map(|&p| self.apply(p)).collect()
    }

    /// Solves for the homography mapping `src[i] -> dst[i]` for four
    /// point correspondences, by direct linear solve of the 8x8 system
    /// (the general `getPerspectiveTransform` four-point case; no
    /// over-determined least squares is needed because exactly four
    /// corners are ever supplied).
    pub fn from_four_points(src: [Point2; 4], dst: [Point2; 4]) -> Result<Self> {
        let mut a = Array2::<f64>::zeros((8, 8));
        let mut b = Array2::<f64>::zeros((8, 1));

        for i in 0..4 {
            let (x, y) = (src[i].x, src[i].y);
            let (u, v) = (dst[i].x, dst[i].y);

            a[[2 * i, 0]] = x;
            a[[2 * i, 1]] = y;
            a[[2 * i, 2]] = 1.0;
            a[[2 * i, 6]] = -x * u;
            a[[2 * i, 7]] = -y * u;
            b[[2 * i, 0]] = u;

            a[[2 * i + 1, 3]] = x;
            a[[2 * i + 1, 4]] = y;
            a[[2 * i + 1, 5]] = 1.0;
            a[[2 * i + 1, 6]] = -x * v;
            a[[2 * i + 1, 7]] = -y * v;
            b[[2 * i + 1, 0]] = v;
        }

        let h = gaussian_solve(a, b).context("solving perspective transform")?;

        Ok(Homography([
            [h[0], h[1], h[2]],
            [h[3], h[4], h[5]],
            [h[6], h[7], 1.0],
        ]))
    }
}

/// Solves `a * x = b` by Gaussian elimination with partial pivoting.
pub(crate) fn gaussian_solve(mut a: Array2<f64>, mut b: Array2<f64>) -> Result<Vec<f64>> {
    let n = a.nrows();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[[i, col]].abs().partial_cmp(&a[[j, col]].abs()).unwrap())
            .unwrap();
        if a[[pivot, col]].abs() < 1e-12 {
            anyhow::bail!("singular system in perspective solve");
        }
        if pivot != col {
            for k in 0..n {
                a.swap((col, k), (pivot, k));
            }
            b.swap((col, 0), (pivot, 0));
        }
        let pivot_val = a[[col, col]];
        for row in (col + 1)..n {
            let factor = a[[row, col]] / pivot_val;
            for k in col..n {
                a[[row, k]] -= factor * a[[col, k]];
            }
            b[[row, 0]] -= factor * b[[col, 0]];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let mut sum = b[[row, 0]];
        for k in (row + 1)..n {
            sum -= a[[row, k]] * x[k];
        }
        x[row] = sum / a[[row, row]];
    }
    Ok(x)
}

/// The 600x600 canonical frame every detector/grid/assign stage operates
/// on downstream of rectification.
pub const CANONICAL_SIZE: f64 = 600.0;

/// The padded 660x660 canvas used by the optional double-transform pass.
pub const DOUBLE_TRANSFORM_SIZE: f64 = 660.0;
pub const DOUBLE_TRANSFORM_PADDING: f64 = 30.0;

pub fn canonical_square(size: f64) -> [Point2; 4] {
    [
        Point2::new(0.0, 0.0),
        Point2::new(size, 0.0),
        Point2::new(size, size),
        Point2::new(0.0, size),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_mapping() {
        let src = canonical_square(600.0);
        let dst = canonical_square(600.0);
        let h = Homography::from_four_points(src, dst).unwrap();
        let p = Point2::new(300.0, 150.0);
        let out = h.apply(p);
        assert!((out.x - p.x).abs() < 1e-6);
        assert!((out.y - p.y).abs() < 1e-6);
    }

    #[test]
    fn test_quad_to_square() {
        // A slightly skewed source quad mapping onto the canonical square.
        let src = [
            Point2::new(10.0, 5.0),
            Point2::new(590.0, 20.0),
            Point2::new(580.0, 595.0),
            Point2::new(5.0, 580.0),
        ];
        let dst = canonical_square(600.0);
        let h = Homography::from_four_points(src, dst).unwrap();
        for (s, d) in src.iter().zip(dst.iter()) {
            let out = h.apply(*s);
            assert!((out.x - d.x).abs() < 1e-3);
            assert!((out.y - d.y).abs() < 1e-3);
        }
    }
}
