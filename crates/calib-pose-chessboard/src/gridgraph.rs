use crate::params::GridGraphParams;
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::{Point2, Vector2};
use std::collections::{HashMap, VecDeque};

/// k-nearest-neighbour lists for a corner cloud, nearest first, self excluded.
pub struct GridGraph {
    pub neighbors: Vec<Vec<usize>>,
}

impl GridGraph {
    pub fn new(positions: &[Point2<f32>], k_neighbors: usize) -> Self {
        let coords = positions.iter().map(|p| [p.x, p.y]).collect::<Vec<_>>();
        let tree: KdTree<f32, 2> = (&coords).into();

        let neighbors = positions
            .iter()
            .enumerate()
            .map(|(i, p)| {
                tree.nearest_n::<SquaredEuclidean>(&[p.x, p.y], k_neighbors + 1)
                    .into_iter()
                    .map(|nn| nn.item as usize)
                    .filter(|&j| j != i)
                    .collect()
            })
            .collect();

        Self { neighbors }
    }
}

/// Integer grid coordinates assigned to corner indices.
#[derive(Debug, Default)]
pub struct Lattice {
    pub cells: HashMap<(i32, i32), usize>,
}

impl Lattice {
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// `(min_i, min_j, width, height)` of the occupied box.
    pub fn bounds(&self) -> Option<(i32, i32, usize, usize)> {
        let min_i = self.cells.keys().map(|c| c.0).min()?;
        let max_i = self.cells.keys().map(|c| c.0).max()?;
        let min_j = self.cells.keys().map(|c| c.1).min()?;
        let max_j = self.cells.keys().map(|c| c.1).max()?;
        Some((
            min_i,
            min_j,
            (max_i - min_i + 1) as usize,
            (max_j - min_j + 1) as usize,
        ))
    }
}

struct Step {
    di: i32,
    dj: i32,
    u: Vector2<f32>,
    v: Vector2<f32>,
}

/// Match an edge against the four signed local axes.
fn classify_edge(
    d: Vector2<f32>,
    u: Vector2<f32>,
    v: Vector2<f32>,
    params: &GridGraphParams,
) -> Option<Step> {
    let cos_tol = params.axis_tolerance_deg.to_radians().cos();
    let len = d.norm();
    if len <= f32::EPSILON {
        return None;
    }

    let candidates = [
        (u, 1, 0, true),
        (-u, -1, 0, true),
        (v, 0, 1, false),
        (-v, 0, -1, false),
    ];

    let mut best: Option<(f32, Step)> = None;
    for (axis, di, dj, along_u) in candidates {
        let axis_len = axis.norm();
        if axis_len <= f32::EPSILON {
            continue;
        }
        let cos = d.dot(&axis) / (len * axis_len);
        let ratio = len / axis_len;
        if cos < cos_tol || ratio < params.min_spacing_ratio || ratio > params.max_spacing_ratio {
            continue;
        }
        if best.as_ref().is_some_and(|(c, _)| *c >= cos) {
            continue;
        }
        // The axis we moved along is re-estimated from the edge itself.
        let signed = if di + dj > 0 { d } else { -d };
        let step = if along_u {
            Step { di, dj, u: signed, v }
        } else {
            Step { di, dj, u, v: signed }
        };
        best = Some((cos, step));
    }
    best.map(|(_, s)| s)
}

/// Pick initial axes at `seed`: the nearest edge and the first roughly
/// perpendicular edge of similar length.
fn seed_axes(
    positions: &[Point2<f32>],
    graph: &GridGraph,
    seed: usize,
    params: &GridGraphParams,
) -> Option<(Vector2<f32>, Vector2<f32>)> {
    let nbrs = graph.neighbors.get(seed)?;
    let origin = positions[seed];
    let u = positions[*nbrs.first()?] - origin;
    let u_len = u.norm();
    if u_len <= f32::EPSILON {
        return None;
    }
    let sin_tol = params.axis_tolerance_deg.to_radians().sin();

    nbrs.iter().skip(1).find_map(|&j| {
        let d = positions[j] - origin;
        let len = d.norm();
        let cos = (d.dot(&u) / (len * u_len)).abs();
        let ratio = len / u_len;
        (cos < sin_tol && ratio >= params.min_spacing_ratio && ratio <= params.max_spacing_ratio)
            .then_some((u, d))
    })
}

/// Breadth-first lattice growth from `seed`, carrying local axis estimates
/// so that perspective and lens distortion are followed smoothly.
///
/// Each corner is assigned at most once, so the walk is bounded by the
/// number of candidates.
pub fn grow_lattice(
    positions: &[Point2<f32>],
    graph: &GridGraph,
    seed: usize,
    params: &GridGraphParams,
) -> Lattice {
    let mut lattice = Lattice::default();
    let Some((u0, v0)) = seed_axes(positions, graph, seed, params) else {
        return lattice;
    };

    let mut coord_of: Vec<Option<(i32, i32)>> = vec![None; positions.len()];
    let mut queue = VecDeque::new();

    coord_of[seed] = Some((0, 0));
    lattice.cells.insert((0, 0), seed);
    queue.push_back((seed, u0, v0));

    while let Some((node, u, v)) = queue.pop_front() {
        let Some((i, j)) = coord_of[node] else {
            continue;
        };
        for &nb in &graph.neighbors[node] {
            if coord_of[nb].is_some() {
                continue;
            }
            let d = positions[nb] - positions[node];
            let Some(step) = classify_edge(d, u, v, params) else {
                continue;
            };
            let cell = (i + step.di, j + step.dj);
            if lattice.cells.contains_key(&cell) {
                continue;
            }
            coord_of[nb] = Some(cell);
            lattice.cells.insert(cell, nb);
            queue.push_back((nb, step.u, step.v));
        }
    }

    lattice
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grid(cols: usize, rows: usize, spacing: f32) -> Vec<Point2<f32>> {
        (0..rows)
            .flat_map(|j| {
                (0..cols).map(move |i| Point2::new(20.0 + i as f32 * spacing, 30.0 + j as f32 * spacing))
            })
            .collect()
    }

    #[test]
    fn neighbors_exclude_self_and_are_sorted() {
        let pts = grid(3, 3, 10.0);
        let graph = GridGraph::new(&pts, 4);
        let center = &graph.neighbors[4];
        assert_eq!(center.len(), 4);
        assert!(!center.contains(&4));
        for &n in center {
            assert_relative_eq!((pts[n] - pts[4]).norm(), 10.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn grows_full_lattice_on_regular_grid() {
        let pts = grid(5, 4, 12.0);
        let graph = GridGraph::new(&pts, 8);
        let lattice = grow_lattice(&pts, &graph, 7, &GridGraphParams::default());
        assert_eq!(lattice.len(), 20);
        let (_, _, w, h) = lattice.bounds().expect("bounds");
        assert_eq!((w.min(h), w.max(h)), (4, 5));
    }

    #[test]
    fn diagonal_edges_are_not_grid_steps() {
        let u = Vector2::new(10.0, 0.0);
        let v = Vector2::new(0.0, 10.0);
        let params = GridGraphParams::default();
        assert!(classify_edge(Vector2::new(10.0, 10.0), u, v, &params).is_none());
        let step = classify_edge(Vector2::new(-10.5, 0.8), u, v, &params).expect("left step");
        assert_eq!((step.di, step.dj), (-1, 0));
        assert_relative_eq!(step.u, Vector2::new(10.5, -0.8), epsilon = 1e-6);
    }
}
