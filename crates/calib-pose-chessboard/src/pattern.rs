use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

/// Inner-corner counts of a checkerboard: `cols` corners per row, `rows` rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatternSize {
    pub cols: usize,
    pub rows: usize,
}

impl PatternSize {
    pub fn new(cols: usize, rows: usize) -> Self {
        Self { cols, rows }
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.cols * self.rows
    }

    /// Row-major pattern template on the `z = 0` plane.
    ///
    /// Index `j * cols + i` sits at `(i * square, j * square, 0)`, matching the
    /// order produced by the detector.
    pub fn object_points(&self, square_size: f64) -> Vec<Point3<f64>> {
        let mut out = Vec::with_capacity(self.count());
        for j in 0..self.rows {
            for i in 0..self.cols {
                out.push(Point3::new(
                    i as f64 * square_size,
                    j as f64 * square_size,
                    0.0,
                ));
            }
        }
        out
    }
}

/// Outcome of a pattern search.
///
/// `found == false` is an ordinary result (occlusion, blur, wrong board);
/// in that case `corners` holds the largest partial lattice, unordered.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PatternCorners {
    pub found: bool,
    pub corners: Vec<Point2<f32>>,
}

impl PatternCorners {
    pub fn not_found(partial: Vec<Point2<f32>>) -> Self {
        Self {
            found: false,
            corners: partial,
        }
    }
}

/// Why a full pattern could not be located.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PatternNotFound {
    #[error("pattern must have at least 2x2 inner corners (got {cols}x{rows})")]
    InvalidPatternSize { cols: usize, rows: usize },
    #[error("only {found} corner candidates, {needed} needed")]
    TooFewCorners { found: usize, needed: usize },
    #[error("no lattice could be grown from the candidates")]
    NoLattice,
    #[error("largest lattice has {found} corners in a {cols}x{rows} box, pattern needs {needed}")]
    Incomplete {
        found: usize,
        cols: usize,
        rows: usize,
        needed: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_points_are_row_major() {
        let p = PatternSize::new(5, 8);
        let pts = p.object_points(0.03);
        assert_eq!(pts.len(), 40);
        assert_eq!(pts[1], Point3::new(0.03, 0.0, 0.0));
        assert_eq!(pts[5], Point3::new(0.0, 0.03, 0.0));
        assert!(pts.iter().all(|q| q.z == 0.0));
    }
}
