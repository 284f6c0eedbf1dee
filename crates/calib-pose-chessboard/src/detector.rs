use crate::gridgraph::{grow_lattice, GridGraph, Lattice};
use crate::params::ChessboardParams;
use crate::pattern::{PatternCorners, PatternNotFound, PatternSize};
use calib_pose_core::Corner;
use log::{debug, info};
use nalgebra::Point2;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Chessboard detector working on a cloud of X-junction candidates.
pub struct ChessboardDetector {
    pub params: ChessboardParams,
}

impl ChessboardDetector {
    pub fn new(params: ChessboardParams) -> Self {
        Self { params }
    }

    /// Locate a full `pattern` among `corners`.
    ///
    /// A negative result is reported as `found == false`, never as an error.
    /// On success the corners are row-major (see `try_find_pattern_corners`).
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, corners), fields(candidates = corners.len()))
    )]
    pub fn find_pattern_corners(&self, corners: &[Corner], pattern: PatternSize) -> PatternCorners {
        match self.search(corners, pattern) {
            Ok(ordered) => PatternCorners {
                found: true,
                corners: ordered,
            },
            Err((reason, partial)) => {
                debug!("pattern {}x{} not found: {reason}", pattern.cols, pattern.rows);
                PatternCorners::not_found(partial)
            }
        }
    }

    /// Like `find_pattern_corners`, with the failure reason.
    ///
    /// Ordering invariant: index `j * cols + i` is the corner in row `j`,
    /// column `i`, matching `PatternSize::object_points`. Rows advance along
    /// the board's first axis, the (row, column) frame is right-handed in
    /// image coordinates, and corner 0 is the candidate ordering whose first
    /// point is closest to the image top-left.
    pub fn try_find_pattern_corners(
        &self,
        corners: &[Corner],
        pattern: PatternSize,
    ) -> Result<Vec<Point2<f32>>, PatternNotFound> {
        self.search(corners, pattern).map_err(|(reason, _)| reason)
    }

    fn search(
        &self,
        corners: &[Corner],
        pattern: PatternSize,
    ) -> Result<Vec<Point2<f32>>, (PatternNotFound, Vec<Point2<f32>>)> {
        if pattern.cols < 2 || pattern.rows < 2 {
            return Err((
                PatternNotFound::InvalidPatternSize {
                    cols: pattern.cols,
                    rows: pattern.rows,
                },
                Vec::new(),
            ));
        }

        // 1. Filter by strength.
        let positions: Vec<Point2<f32>> = corners
            .iter()
            .filter(|c| c.strength >= self.params.min_strength)
            .map(|c| c.position)
            .collect();

        let needed = pattern.count();
        if positions.len() < needed {
            return Err((
                PatternNotFound::TooFewCorners {
                    found: positions.len(),
                    needed,
                },
                Vec::new(),
            ));
        }

        // 2. Neighbour lists.
        let graph = GridGraph::new(&positions, self.params.graph.k_neighbors);

        // 3. Grow lattices from seeds near the centroid until one fits.
        let mut best: Option<Lattice> = None;
        for seed in seeds_by_centrality(&positions, self.params.max_seeds) {
            let lattice = grow_lattice(&positions, &graph, seed, &self.params.graph);
            if let Some(ordered) = extract_pattern(&lattice, &positions, pattern) {
                info!(
                    "pattern {}x{} found from seed {seed} ({} candidates)",
                    pattern.cols,
                    pattern.rows,
                    positions.len()
                );
                return Ok(ordered);
            }
            if best.as_ref().map_or(true, |b| lattice.len() > b.len()) {
                best = Some(lattice);
            }
        }

        let Some(best) = best.filter(|b| !b.is_empty()) else {
            return Err((PatternNotFound::NoLattice, Vec::new()));
        };
        let (_, _, cols, rows) = best.bounds().unwrap_or((0, 0, 0, 0));
        let partial = best.cells.values().map(|&i| positions[i]).collect();
        Err((
            PatternNotFound::Incomplete {
                found: best.len(),
                cols,
                rows,
                needed,
            },
            partial,
        ))
    }
}

fn seeds_by_centrality(positions: &[Point2<f32>], max_seeds: usize) -> Vec<usize> {
    let n = positions.len().max(1) as f32;
    let centroid = positions
        .iter()
        .fold(nalgebra::Vector2::zeros(), |acc, p| acc + p.coords)
        / n;
    let mut order: Vec<usize> = (0..positions.len()).collect();
    order.sort_by(|&a, &b| {
        let da = (positions[a].coords - centroid).norm_squared();
        let db = (positions[b].coords - centroid).norm_squared();
        da.total_cmp(&db)
    });
    order.truncate(max_seeds.max(1));
    order
}

/// Turn a complete lattice into row-major corners in canonical orientation.
fn extract_pattern(
    lattice: &Lattice,
    positions: &[Point2<f32>],
    pattern: PatternSize,
) -> Option<Vec<Point2<f32>>> {
    let (min_i, min_j, w, h) = lattice.bounds()?;
    if lattice.len() != w * h || w * h != pattern.count() {
        return None;
    }
    let transposed = if (w, h) == (pattern.cols, pattern.rows) {
        false
    } else if (w, h) == (pattern.rows, pattern.cols) {
        true
    } else {
        return None;
    };

    // at(i, j) with i < cols, j < rows in pattern orientation.
    let at = |i: usize, j: usize| -> Option<Point2<f32>> {
        let (li, lj) = if transposed { (j, i) } else { (i, j) };
        let idx = lattice
            .cells
            .get(&(min_i + li as i32, min_j + lj as i32))?;
        Some(positions[*idx])
    };

    let (cols, rows) = (pattern.cols, pattern.rows);
    // Transposed symmetries only keep the box shape on square patterns.
    let symmetries = if cols == rows { 8 } else { 4 };

    let mut best: Option<(f32, Vec<Point2<f32>>)> = None;
    for sym in 0..symmetries {
        let mut ordered = Vec::with_capacity(pattern.count());
        for j in 0..rows {
            for i in 0..cols {
                let (si, sj) = symmetry(sym, i, j, cols, rows);
                ordered.push(at(si, sj)?);
            }
        }
        let row_dir = ordered[1] - ordered[0];
        let col_dir = ordered[cols] - ordered[0];
        if row_dir.x * col_dir.y - row_dir.y * col_dir.x <= 0.0 {
            continue;
        }
        let key = ordered[0].x + ordered[0].y;
        if best.as_ref().map_or(true, |(k, _)| key < *k) {
            best = Some((key, ordered));
        }
    }
    best.map(|(_, ordered)| ordered)
}

/// The dihedral symmetries of a `cols × rows` index box (indices 4..8 need a
/// square box).
fn symmetry(sym: usize, i: usize, j: usize, cols: usize, rows: usize) -> (usize, usize) {
    let (fi, fj) = (cols - 1 - i, rows - 1 - j);
    match sym {
        0 => (i, j),
        1 => (fi, fj),
        2 => (fi, j),
        3 => (i, fj),
        4 => (j, i),
        5 => (rows - 1 - j, cols - 1 - i),
        6 => (rows - 1 - j, i),
        _ => (j, cols - 1 - i),
    }
}
