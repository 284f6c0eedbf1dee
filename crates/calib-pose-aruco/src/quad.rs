//! Marker candidate quadrilaterals.
//!
//! Extraction steps:
//! 1. Local-mean adaptive threshold to a dark mask.
//! 2. 4-connected components; components touching the image border are
//!    dropped since a marker must be fully visible.
//! 3. Convex hull of the component boundary and a 4-corner fit (farthest
//!    point pairs), rejected when the quad covers too little of the hull.
//! 4. Each side is re-fitted by total least squares on the boundary pixels
//!    near it, shifted half a pixel outward, and the corners are the
//!    intersections of consecutive lines.

use crate::threshold::adaptive_threshold;
use crate::IdentificationRejected;
use calib_pose_core::GrayImageView;
use log::trace;
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Four corners in clockwise image order (y pointing down).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectedQuadrilateral {
    pub corners: [Point2<f32>; 4],
}

impl DetectedQuadrilateral {
    /// Normalise the winding to clockwise, keeping `corners[0]` first.
    pub fn new(corners: [Point2<f32>; 4]) -> Self {
        let [a, b, c, d] = corners;
        if signed_area(&corners) < 0.0 {
            Self {
                corners: [a, d, c, b],
            }
        } else {
            Self { corners }
        }
    }

    /// Area in square pixels.
    pub fn area(&self) -> f32 {
        signed_area(&self.corners).abs()
    }

    pub fn side_lengths(&self) -> [f32; 4] {
        let c = &self.corners;
        [0, 1, 2, 3].map(|i| (c[(i + 1) % 4] - c[i]).norm())
    }

    pub fn is_convex(&self) -> bool {
        let c = &self.corners;
        (0..4).all(|i| {
            let e0 = c[(i + 1) % 4] - c[i];
            let e1 = c[(i + 2) % 4] - c[(i + 1) % 4];
            e0.x * e1.y - e0.y * e1.x > 0.0
        })
    }

    pub fn corners_f64(&self) -> [Point2<f64>; 4] {
        self.corners.map(|c| Point2::new(c.x as f64, c.y as f64))
    }
}

/// Shoelace sum; positive for clockwise order in image coordinates.
fn signed_area(c: &[Point2<f32>; 4]) -> f32 {
    0.5 * (0..4)
        .map(|i| {
            let (p, q) = (c[i], c[(i + 1) % 4]);
            p.x * q.y - q.x * p.y
        })
        .sum::<f32>()
}

/// Cheap geometric plausibility checks run before any sampling.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct QuadGate {
    pub min_side_px: f32,
    pub min_area_px: f32,
    /// Longest over shortest side.
    pub max_aspect_ratio: f32,
}

impl Default for QuadGate {
    fn default() -> Self {
        Self {
            min_side_px: 10.0,
            min_area_px: 150.0,
            max_aspect_ratio: 4.0,
        }
    }
}

/// Reject quads that cannot be a visible marker.
pub fn validate_quad(
    quad: &DetectedQuadrilateral,
    gate: &QuadGate,
) -> Result<(), IdentificationRejected> {
    if quad
        .corners
        .iter()
        .any(|c| !c.x.is_finite() || !c.y.is_finite())
        || !quad.is_convex()
    {
        return Err(IdentificationRejected::NonConvex);
    }
    let sides = quad.side_lengths();
    let shortest = sides.iter().copied().fold(f32::INFINITY, f32::min);
    let longest = sides.iter().copied().fold(0.0, f32::max);
    let area = quad.area();
    if shortest < gate.min_side_px || area < gate.min_area_px {
        return Err(IdentificationRejected::TooSmall {
            min_side: shortest,
            area,
        });
    }
    let ratio = longest / shortest;
    if ratio > gate.max_aspect_ratio {
        return Err(IdentificationRejected::AspectRatio { ratio });
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct QuadParams {
    /// Adaptive threshold window is `(2 * radius + 1)²`.
    pub window_radius: usize,
    /// Intensity margin below the local mean for a pixel to count as dark.
    pub threshold_offset: f32,
    pub min_component_pixels: usize,
    /// Components larger than this fraction of the image are ignored.
    pub max_component_fraction: f32,
    /// Minimal quad area over hull area.
    pub min_fill: f32,
    /// Refit sides with sub-pixel lines.
    pub refine_edges: bool,
    pub gate: QuadGate,
}

impl Default for QuadParams {
    fn default() -> Self {
        Self {
            window_radius: 15,
            threshold_offset: 7.0,
            min_component_pixels: 40,
            max_component_fraction: 0.5,
            min_fill: 0.85,
            refine_edges: true,
            gate: QuadGate::default(),
        }
    }
}

/// Find dark-bordered quadrilateral candidates in `img`.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(img, params), fields(width = img.width, height = img.height))
)]
pub fn detect_quads(img: &GrayImageView<'_>, params: &QuadParams) -> Vec<DetectedQuadrilateral> {
    let (w, h) = (img.width, img.height);
    let mask = adaptive_threshold(img, params.window_radius, params.threshold_offset);
    let max_pixels = (params.max_component_fraction.clamp(0.0, 1.0) * (w * h) as f32) as usize;

    let mut visited = vec![false; w * h];
    let mut queue = VecDeque::new();
    let mut component = Vec::new();
    let mut out = Vec::new();

    for start in 0..w * h {
        if !mask[start] || visited[start] {
            continue;
        }
        visited[start] = true;
        queue.push_back(start);
        component.clear();
        let mut touches_border = false;

        while let Some(idx) = queue.pop_front() {
            component.push(idx);
            let (x, y) = (idx % w, idx / w);
            if x == 0 || y == 0 || x + 1 == w || y + 1 == h {
                touches_border = true;
                continue;
            }
            for n in [idx - 1, idx + 1, idx - w, idx + w] {
                if mask[n] && !visited[n] {
                    visited[n] = true;
                    queue.push_back(n);
                }
            }
        }

        if touches_border
            || component.len() < params.min_component_pixels
            || component.len() > max_pixels
        {
            continue;
        }

        // Interior components only, so all four neighbours exist.
        let boundary: Vec<Point2<f32>> = component
            .iter()
            .filter(|&&idx| !(mask[idx - 1] && mask[idx + 1] && mask[idx - w] && mask[idx + w]))
            .map(|&idx| Point2::new((idx % w) as f32, (idx / w) as f32))
            .collect();

        if let Some(quad) = fit_quad(&boundary, params) {
            if validate_quad(&quad, &params.gate).is_ok() {
                out.push(quad);
            }
        }
    }

    trace!("detect_quads: {} candidates", out.len());
    out
}

fn fit_quad(boundary: &[Point2<f32>], params: &QuadParams) -> Option<DetectedQuadrilateral> {
    let hull = convex_hull(boundary);
    if hull.len() < 4 {
        return None;
    }
    let hull_area = polygon_area(&hull);
    if hull_area <= 0.0 {
        return None;
    }

    let centroid = hull.iter().fold(Vector2::zeros(), |acc, p| acc + p.coords) / hull.len() as f32;
    let centroid = Point2::from(centroid);

    let farthest_from = |q: Point2<f32>| {
        hull.iter()
            .copied()
            .max_by(|a, b| (a - q).norm_squared().total_cmp(&(b - q).norm_squared()))
    };
    let c0 = farthest_from(centroid)?;
    let c2 = farthest_from(c0)?;
    let diag = c2 - c0;
    let side = |p: &Point2<f32>| diag.x * (p.y - c0.y) - diag.y * (p.x - c0.x);
    let c1 = hull.iter().copied().max_by(|a, b| side(a).total_cmp(&side(b)))?;
    let c3 = hull.iter().copied().min_by(|a, b| side(a).total_cmp(&side(b)))?;
    if side(&c1) <= 0.0 || side(&c3) >= 0.0 {
        return None;
    }

    let coarse = DetectedQuadrilateral::new([c0, c1, c2, c3]);
    if coarse.area() < params.min_fill * hull_area {
        return None;
    }

    let quad = if params.refine_edges {
        refine_edges(&coarse, boundary).unwrap_or(coarse)
    } else {
        coarse
    };
    Some(start_top_left(quad))
}

/// Rotate the corner list so the corner nearest the image origin comes first.
fn start_top_left(quad: DetectedQuadrilateral) -> DetectedQuadrilateral {
    let first = (0..4)
        .min_by(|&a, &b| {
            let ka = quad.corners[a].x + quad.corners[a].y;
            let kb = quad.corners[b].x + quad.corners[b].y;
            ka.total_cmp(&kb)
        })
        .unwrap_or(0);
    DetectedQuadrilateral {
        corners: [0, 1, 2, 3].map(|k| quad.corners[(first + k) % 4]),
    }
}

/// Line `n · p = c` with unit normal `n` pointing out of the quad.
struct Line {
    n: Vector2<f32>,
    c: f32,
}

fn refine_edges(
    quad: &DetectedQuadrilateral,
    boundary: &[Point2<f32>],
) -> Option<DetectedQuadrilateral> {
    const BAND_PX: f32 = 2.0;
    let corners = quad.corners;
    let center = Point2::from(corners.iter().fold(Vector2::zeros(), |acc, p| acc + p.coords) / 4.0);

    let mut lines = Vec::with_capacity(4);
    for i in 0..4 {
        let (a, b) = (corners[i], corners[(i + 1) % 4]);
        let ab = b - a;
        let len = ab.norm();
        if len < 1.0 {
            return None;
        }
        let dir = ab / len;
        let normal = Vector2::new(-dir.y, dir.x);

        let near: Vec<Point2<f32>> = boundary
            .iter()
            .copied()
            .filter(|p| {
                let d = p - a;
                let t = d.dot(&dir) / len;
                (0.1..=0.9).contains(&t) && d.dot(&normal).abs() <= BAND_PX
            })
            .collect();
        if near.len() < 3 {
            return None;
        }
        lines.push(fit_line(&near, center)?);
    }

    let mut refined = [Point2::origin(); 4];
    let sides = quad.side_lengths();
    for k in 0..4 {
        // Corner k joins side k-1 and side k.
        let p = intersect(&lines[(k + 3) % 4], &lines[k])?;
        let tolerance = 2.0_f32.max(0.1 * sides[k].min(sides[(k + 3) % 4]));
        if (p - corners[k]).norm() > tolerance {
            return None;
        }
        refined[k] = p;
    }
    Some(DetectedQuadrilateral::new(refined))
}

/// Total-least-squares line through boundary pixel centres, moved half a
/// pixel outward onto the dark/bright transition.
fn fit_line(points: &[Point2<f32>], inside: Point2<f32>) -> Option<Line> {
    let n = points.len() as f32;
    let mean = points.iter().fold(Vector2::zeros(), |acc, p| acc + p.coords) / n;
    let (mut sxx, mut sxy, mut syy) = (0.0f32, 0.0f32, 0.0f32);
    for p in points {
        let d = p.coords - mean;
        sxx += d.x * d.x;
        sxy += d.x * d.y;
        syy += d.y * d.y;
    }
    let theta = 0.5 * (2.0 * sxy).atan2(sxx - syy);
    let mut normal = Vector2::new(-theta.sin(), theta.cos());
    if normal.dot(&(mean - inside.coords)) < 0.0 {
        normal = -normal;
    }
    let c = normal.dot(&mean) + 0.5;
    c.is_finite().then_some(Line { n: normal, c })
}

fn intersect(l0: &Line, l1: &Line) -> Option<Point2<f32>> {
    let det = l0.n.x * l1.n.y - l0.n.y * l1.n.x;
    if det.abs() < 1e-6 {
        return None;
    }
    Some(Point2::new(
        (l0.c * l1.n.y - l1.c * l0.n.y) / det,
        (l0.n.x * l1.c - l1.n.x * l0.c) / det,
    ))
}

/// Monotone-chain convex hull, clockwise in image coordinates.
fn convex_hull(points: &[Point2<f32>]) -> Vec<Point2<f32>> {
    let mut pts = points.to_vec();
    pts.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    let cross = |o: &Point2<f32>, a: &Point2<f32>, b: &Point2<f32>| {
        (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
    };

    // Lower chain, then upper chain; each drops its last point, which
    // starts the other chain.
    let mut hull: Vec<Point2<f32>> = Vec::with_capacity(2 * pts.len());
    let chains = [pts.clone(), pts.iter().rev().copied().collect::<Vec<_>>()];
    for chain in &chains {
        let start = hull.len();
        for p in chain {
            while hull.len() >= start + 2
                && cross(&hull[hull.len() - 2], &hull[hull.len() - 1], p) <= 0.0
            {
                hull.pop();
            }
            hull.push(*p);
        }
        hull.pop();
    }
    hull
}

fn polygon_area(poly: &[Point2<f32>]) -> f32 {
    let n = poly.len();
    0.5 * (0..n)
        .map(|i| {
            let (p, q) = (poly[i], poly[(i + 1) % n]);
            p.x * q.y - q.x * p.y
        })
        .sum::<f32>()
        .abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::render_marker_image;

    fn square(x0: f32, y0: f32, s: f32) -> [Point2<f32>; 4] {
        [
            Point2::new(x0, y0),
            Point2::new(x0 + s, y0),
            Point2::new(x0 + s, y0 + s),
            Point2::new(x0, y0 + s),
        ]
    }

    #[test]
    fn counter_clockwise_input_is_normalised() {
        let [a, b, c, d] = square(0.0, 0.0, 20.0);
        let q = DetectedQuadrilateral::new([a, d, c, b]);
        assert_eq!(q.corners, [a, b, c, d]);
        assert!(q.is_convex());
        assert!((q.area() - 400.0).abs() < 1e-3);
    }

    #[test]
    fn gate_rejects_degenerate_quads() {
        let gate = QuadGate::default();
        let ok = DetectedQuadrilateral::new(square(10.0, 10.0, 40.0));
        assert!(validate_quad(&ok, &gate).is_ok());

        let tiny = DetectedQuadrilateral::new(square(10.0, 10.0, 5.0));
        assert!(matches!(
            validate_quad(&tiny, &gate),
            Err(IdentificationRejected::TooSmall { .. })
        ));

        let sliver = DetectedQuadrilateral::new([
            Point2::new(0.0, 0.0),
            Point2::new(100.0, 0.0),
            Point2::new(100.0, 12.0),
            Point2::new(0.0, 12.0),
        ]);
        assert!(matches!(
            validate_quad(&sliver, &gate),
            Err(IdentificationRejected::AspectRatio { .. })
        ));

        let bowtie = DetectedQuadrilateral {
            corners: [
                Point2::new(0.0, 0.0),
                Point2::new(40.0, 40.0),
                Point2::new(40.0, 0.0),
                Point2::new(0.0, 40.0),
            ],
        };
        assert_eq!(
            validate_quad(&bowtie, &gate),
            Err(IdentificationRejected::NonConvex)
        );
    }

    #[test]
    fn hull_of_square_grid_keeps_the_corners() {
        let mut pts = Vec::new();
        for y in 0..5 {
            for x in 0..5 {
                pts.push(Point2::new(x as f32, y as f32));
            }
        }
        let hull = convex_hull(&pts);
        assert_eq!(hull.len(), 4);
        assert!((polygon_area(&hull) - 16.0).abs() < 1e-4);
    }

    #[test]
    fn extracts_rendered_marker_outline() {
        // 6 cells of 12 px starting at pixel 30: edges at 29.5 and 101.5.
        let img = render_marker_image(0x4cad, 4, 12, 30);
        let quads = detect_quads(&img.view(), &QuadParams::default());

        let truth = square(29.5, 29.5, 72.0);
        let hit = quads
            .iter()
            .find(|q| (q.corners[0] - truth[0]).norm() < 1.0)
            .expect("outer marker quad");
        for (c, t) in hit.corners.iter().zip(truth.iter()) {
            assert!((c - t).norm() < 0.3, "corner {c:?} vs {t:?}");
        }
    }
}
